//! Engine configuration.

use std::time::Duration;

/// Configuration shared by every request opened on a [`crate::Database`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// How long a registry entry lives when the request has no deadline.
    pub registry_ttl: Duration,

    /// Maximum number of candidates accepted by batch uniqueness checks.
    pub batch_limit: usize,

    /// Separator used when joining composite key columns into a fingerprint.
    ///
    /// Must not contain a backslash, which escapes it inside values.
    pub fingerprint_delimiter: &'static str,

    /// Whether an audit sink failure fails the mutating operation.
    pub audit_failures_fatal: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry_ttl: Duration::from_secs(5 * 60),
            batch_limit: 500,
            fingerprint_delimiter: ",",
            audit_failures_fatal: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the registry TTL fallback.
    #[must_use]
    pub const fn registry_ttl(mut self, ttl: Duration) -> Self {
        self.registry_ttl = ttl;
        self
    }

    /// Sets the batch limit.
    #[must_use]
    pub const fn batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }

    /// Sets the fingerprint delimiter.
    #[must_use]
    pub const fn fingerprint_delimiter(mut self, delimiter: &'static str) -> Self {
        self.fingerprint_delimiter = delimiter;
        self
    }

    /// Sets whether audit failures are fatal.
    #[must_use]
    pub const fn audit_failures_fatal(mut self, fatal: bool) -> Self {
        self.audit_failures_fatal = fatal;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.registry_ttl, Duration::from_secs(300));
        assert_eq!(config.batch_limit, 500);
        assert_eq!(config.fingerprint_delimiter, ",");
        assert!(!config.audit_failures_fatal);
    }

    #[test]
    fn builder_chain() {
        let config = Config::new()
            .batch_limit(10)
            .fingerprint_delimiter("|")
            .audit_failures_fatal(true);
        assert_eq!(config.batch_limit, 10);
        assert_eq!(config.fingerprint_delimiter, "|");
        assert!(config.audit_failures_fatal);
    }
}
