//! Row-level view model for call log entries
//!
//! The grouping layer hands over rows; this module turns a row (or a group
//! of rows) plus whatever the cache holds for its number into the details a
//! list item displays. It never waits on a lookup: missing contacts simply
//! render with the best formatting available for the raw number.

use crate::cache::entry::CacheEntry;
use crate::lookup::AddressScheme;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Kind of call recorded in a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    Incoming,
    Outgoing,
    Missed,
    Voicemail,
    Other(i32),
}

impl CallType {
    /// Map a call-log type code
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => CallType::Incoming,
            2 => CallType::Outgoing,
            3 => CallType::Missed,
            4 => CallType::Voicemail,
            other => CallType::Other(other),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            CallType::Incoming => 1,
            CallType::Outgoing => 2,
            CallType::Missed => 3,
            CallType::Voicemail => 4,
            CallType::Other(code) => *code,
        }
    }
}

/// One call record as supplied by the grouping layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRow {
    pub id: i64,
    pub number: String,
    pub date: DateTime<Utc>,
    pub duration: Duration,
    pub call_type: CallType,
    pub country_iso: Option<String>,
    pub geocoded_location: Option<String>,
    pub voicemail_uri: Option<String>,
    /// Row belongs to the "new calls" section
    pub is_new: bool,
}

impl CallRow {
    pub fn new(id: i64, number: impl Into<String>, call_type: CallType) -> Self {
        Self {
            id,
            number: number.into(),
            date: Utc::now(),
            duration: Duration::ZERO,
            call_type,
            country_iso: None,
            geocoded_location: None,
            voicemail_uri: None,
            is_new: false,
        }
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_country(mut self, iso: impl Into<String>) -> Self {
        self.country_iso = Some(iso.into());
        self
    }

    pub fn with_geocode(mut self, location: impl Into<String>) -> Self {
        self.geocoded_location = Some(location.into());
        self
    }

    pub fn with_voicemail(mut self, uri: impl Into<String>) -> Self {
        self.voicemail_uri = Some(uri.into());
        self
    }

    pub fn marked_new(mut self) -> Self {
        self.is_new = true;
        self
    }
}

/// Secondary action offered next to a row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SecondaryAction {
    PlayVoicemail { row_id: i64, uri: Option<String> },
    ReturnCall { number: String },
    None,
}

/// Contact fields shown when a row's number resolved to a named contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDisplay {
    pub name: String,
    pub number_type: i32,
    pub label: Option<String>,
    pub person_id: i64,
    pub thumbnail_uri: Option<String>,
    pub lookup_key: Option<String>,
}

/// Everything a list item needs to draw one row or group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowDetails {
    pub row_id: i64,
    pub group_size: usize,
    pub number: String,
    pub formatted_number: String,
    pub country_iso: String,
    pub geocoded_location: Option<String>,
    pub call_types: Vec<CallType>,
    pub date: DateTime<Utc>,
    pub duration: Duration,
    pub contact: Option<ContactDisplay>,
    pub highlighted: bool,
    pub secondary_action: SecondaryAction,
}

/// Formats a phone number for display
///
/// Implementations may consult locale metadata; the binder only guarantees
/// it never calls this for empty numbers or for addresses.
pub trait NumberFormatter: Send + Sync {
    fn format(&self, number: &str, normalized: Option<&str>, country_iso: &str) -> String;
}

/// Formatter that groups North American numbers and leaves others unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicNumberFormatter;

impl NumberFormatter for BasicNumberFormatter {
    fn format(&self, number: &str, normalized: Option<&str>, country_iso: &str) -> String {
        let source = if number.trim().is_empty() {
            normalized.unwrap_or(number)
        } else {
            number
        };

        if !matches!(country_iso, "US" | "CA") {
            return source.to_string();
        }

        let digits: String = source.chars().filter(|c| c.is_ascii_digit()).collect();
        let has_plus = source.trim_start().starts_with('+');
        match digits.len() {
            10 if !has_plus => format!("({}) {}-{}", &digits[0..3], &digits[3..6], &digits[6..]),
            11 if digits.starts_with('1') => {
                let prefix = if has_plus { "+1" } else { "1" };
                format!("{} {}-{}-{}", prefix, &digits[1..4], &digits[4..7], &digits[7..])
            }
            _ => source.to_string(),
        }
    }
}

/// Format a raw number the way the row should display it
pub fn format_number(
    formatter: &dyn NumberFormatter,
    number: &str,
    normalized: Option<&str>,
    country_iso: &str,
) -> String {
    if number.is_empty() {
        return String::new();
    }
    if AddressScheme::classify(number) == AddressScheme::Address {
        return number.to_string();
    }
    formatter.format(number, normalized, country_iso)
}

/// Compose the details for a group of rows
///
/// `rows` must be non-empty; the first row supplies the number, date and
/// actions, every row contributes its call type. `cached` is the cache entry
/// for the first row's number as read at bind time.
pub fn compose_details(
    rows: &[CallRow],
    cached: Option<&CacheEntry>,
    formatter: &dyn NumberFormatter,
    default_country_iso: &str,
) -> Option<RowDetails> {
    let row = rows.first()?;

    let country_iso = row
        .country_iso
        .as_deref()
        .filter(|iso| !iso.is_empty())
        .unwrap_or(default_country_iso)
        .to_string();

    let contact = cached.and_then(|entry| entry.contact());

    let formatted_number = match (cached, contact) {
        (Some(entry), Some(info)) => entry
            .formatted_number_or_init(|| {
                format_number(
                    formatter,
                    info.number
                        .as_deref()
                        .filter(|number| !number.is_empty())
                        .unwrap_or(row.number.as_str()),
                    info.normalized_number.as_deref(),
                    &country_iso,
                )
            })
            .to_string(),
        _ => format_number(formatter, &row.number, None, &country_iso),
    };

    let contact = contact.filter(|info| info.has_name()).map(|info| ContactDisplay {
        name: info.name.clone().unwrap_or_default(),
        number_type: info.number_type,
        label: info.label.clone(),
        person_id: info.person_id,
        thumbnail_uri: info.thumbnail_uri.clone(),
        lookup_key: info.lookup_key.clone(),
    });

    let secondary_action = if row.call_type == CallType::Voicemail {
        SecondaryAction::PlayVoicemail {
            row_id: row.id,
            uri: row.voicemail_uri.clone(),
        }
    } else if !row.number.is_empty() {
        SecondaryAction::ReturnCall {
            number: row.number.clone(),
        }
    } else {
        SecondaryAction::None
    };

    Some(RowDetails {
        row_id: row.id,
        group_size: rows.len(),
        number: row.number.clone(),
        formatted_number,
        country_iso,
        geocoded_location: row.geocoded_location.clone(),
        call_types: rows.iter().map(|r| r.call_type).collect(),
        date: row.date,
        duration: row.duration,
        contact,
        highlighted: row.is_new,
        secondary_action,
    })
}
