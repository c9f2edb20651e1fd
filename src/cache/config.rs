//! Configuration for the contact resolver

use crate::error::{ResolverError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Configuration for the contact cache and its background resolver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Maximum number of resolved numbers kept in memory
    pub cache_capacity: usize,

    /// Delay between the first settled render and the deferred worker start
    pub start_delay: Duration,

    /// Upper bound on how long the worker waits for a request before it
    /// re-checks its stop flag
    pub poll_interval: Duration,

    /// ISO 3166-1 alpha-2 country used when a row carries no country of its own
    pub default_country_iso: String,

    /// Name the worker uses in its log messages
    pub worker_name: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 100,
            start_delay: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(1000),
            default_country_iso: "US".to_string(),
            worker_name: "CallLogContactLookup".to_string(),
        }
    }
}

impl ResolverConfig {
    /// Create a new builder for resolver configuration
    pub fn builder() -> ResolverConfigBuilder {
        ResolverConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(ResolverError::ConfigError(
                "cache_capacity must be greater than 0".to_string(),
            ));
        }

        if self.poll_interval.is_zero() {
            return Err(ResolverError::ConfigError(
                "poll_interval must be greater than 0".to_string(),
            ));
        }

        let iso = &self.default_country_iso;
        if iso.len() != 2 || !iso.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ResolverError::ConfigError(format!(
                "default_country_iso must be a two-letter country code, got {:?}",
                iso
            )));
        }

        Ok(())
    }

    /// Load configuration from the environment, reading a `.env` file first
    /// if one exists
    ///
    /// Recognised variables: `CALLLOG_CACHE_CAPACITY`, `CALLLOG_START_DELAY_MS`,
    /// `CALLLOG_POLL_INTERVAL_MS`, `CALLLOG_COUNTRY_ISO`. Unset variables keep
    /// their defaults.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenv::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable source
    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(raw) = lookup("CALLLOG_CACHE_CAPACITY") {
            builder = builder.cache_capacity(parse_var("CALLLOG_CACHE_CAPACITY", &raw)?);
        }
        if let Some(raw) = lookup("CALLLOG_START_DELAY_MS") {
            let millis = parse_var("CALLLOG_START_DELAY_MS", &raw)?;
            builder = builder.start_delay(Duration::from_millis(millis));
        }
        if let Some(raw) = lookup("CALLLOG_POLL_INTERVAL_MS") {
            let millis = parse_var("CALLLOG_POLL_INTERVAL_MS", &raw)?;
            builder = builder.poll_interval(Duration::from_millis(millis));
        }
        if let Some(raw) = lookup("CALLLOG_COUNTRY_ISO") {
            builder = builder.default_country_iso(raw.trim().to_ascii_uppercase());
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| {
        ResolverError::ConfigError(format!("{} has an invalid value: {:?}", name, raw))
    })
}

/// Builder for resolver configuration
#[derive(Debug, Default)]
pub struct ResolverConfigBuilder {
    cache_capacity: Option<usize>,
    start_delay: Option<Duration>,
    poll_interval: Option<Duration>,
    default_country_iso: Option<String>,
    worker_name: Option<String>,
}

impl ResolverConfigBuilder {
    /// Set maximum number of cached numbers
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    /// Set the deferred start delay
    pub fn start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    /// Set the worker's bounded wait
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Set the fallback country for number formatting
    pub fn default_country_iso(mut self, iso: impl Into<String>) -> Self {
        self.default_country_iso = Some(iso.into());
        self
    }

    /// Set the worker name
    pub fn worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = Some(name.into());
        self
    }

    /// Build the resolver configuration
    pub fn build(self) -> ResolverConfig {
        let defaults = ResolverConfig::default();

        ResolverConfig {
            cache_capacity: self.cache_capacity.unwrap_or(defaults.cache_capacity),
            start_delay: self.start_delay.unwrap_or(defaults.start_delay),
            poll_interval: self.poll_interval.unwrap_or(defaults.poll_interval),
            default_country_iso: self
                .default_country_iso
                .unwrap_or(defaults.default_country_iso),
            worker_name: self.worker_name.unwrap_or(defaults.worker_name),
        }
    }
}

/// Preset configurations
impl ResolverConfig {
    /// Short intervals so tests observe the worker within milliseconds
    pub fn responsive() -> Self {
        Self {
            start_delay: Duration::from_millis(20),
            poll_interval: Duration::from_millis(20),
            ..Default::default()
        }
    }

    /// Larger cache for long call histories
    pub fn large() -> Self {
        Self {
            cache_capacity: 1_000,
            ..Default::default()
        }
    }
}
