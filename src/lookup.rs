//! Boundary to the contact directory
//!
//! The resolver only needs one operation from the directory: given a raw key
//! and its addressing scheme, return the matching contact, report that there
//! is none, or fail. How the directory answers is opaque to the resolver.

use crate::cache::types::{ContactInfo, ContactRecord};
use crate::error::{ResolverError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// How a call-log key addresses its counterpart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressScheme {
    /// A URI-style address such as `alice@sip.example.com`
    Address,

    /// A dialable phone number
    Number,
}

impl AddressScheme {
    /// Classify a raw key
    ///
    /// A key containing `@` (or its percent-encoded form) is an address;
    /// anything else is treated as a phone number.
    pub fn classify(key: &str) -> Self {
        if key.contains('@') || key.contains("%40") {
            AddressScheme::Address
        } else {
            AddressScheme::Number
        }
    }
}

impl fmt::Display for AddressScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressScheme::Address => write!(f, "address"),
            AddressScheme::Number => write!(f, "number"),
        }
    }
}

/// Source of contact records, called from the resolver worker
///
/// Implementations may block on I/O inside the returned future. `Ok(NotFound)`
/// means the directory answered and has no match; `Err` means it could not
/// answer and the key should be left as it is.
#[async_trait]
pub trait LookupSource: Send + Sync {
    async fn resolve(&self, key: &str, scheme: AddressScheme) -> Result<ContactRecord>;
}

/// Digits-only form of a phone number, keeping a leading `+`
pub fn normalize_digits(number: &str) -> String {
    let trimmed = number.trim();
    let mut out = String::with_capacity(trimmed.len());
    if trimmed.starts_with('+') {
        out.push('+');
    }
    out.extend(trimmed.chars().filter(|c| c.is_ascii_digit()));
    out
}

/// Serialized form of an in-memory directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    #[serde(default)]
    pub numbers: HashMap<String, ContactInfo>,

    #[serde(default)]
    pub addresses: HashMap<String, ContactInfo>,
}

/// Directory held in memory
///
/// Numbers are matched on their digits-only form, addresses
/// case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    numbers: HashMap<String, ContactInfo>,
    addresses: HashMap<String, ContactInfo>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a contact under a phone number
    pub fn insert_number(&mut self, number: &str, info: ContactInfo) {
        self.numbers.insert(normalize_digits(number), info);
    }

    /// Register a contact under an address
    pub fn insert_address(&mut self, address: &str, info: ContactInfo) {
        self.addresses.insert(address.to_uppercase(), info);
    }

    /// Load a directory from its JSON snapshot
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: DirectorySnapshot = serde_json::from_str(json)?;
        let mut directory = Self::new();
        for (number, info) in snapshot.numbers {
            directory.insert_number(&number, info);
        }
        for (address, info) in snapshot.addresses {
            directory.insert_address(&address, info);
        }
        Ok(directory)
    }

    pub fn len(&self) -> usize {
        self.numbers.len() + self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find(&self, key: &str, scheme: AddressScheme) -> Option<&ContactInfo> {
        match scheme {
            AddressScheme::Address => self.addresses.get(&key.to_uppercase()),
            AddressScheme::Number => self.numbers.get(&normalize_digits(key)),
        }
    }
}

#[async_trait]
impl LookupSource for InMemoryDirectory {
    async fn resolve(&self, key: &str, scheme: AddressScheme) -> Result<ContactRecord> {
        if key.trim().is_empty() {
            return Err(ResolverError::LookupFailed("empty lookup key".to_string()));
        }

        Ok(self
            .find(key, scheme)
            .cloned()
            .map(ContactRecord::Found)
            .unwrap_or(ContactRecord::NotFound))
    }
}
