//! Tunable timing constants.

use std::time::Duration;

/// Core timing configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Lifetime of a key cache entry; reads extend it
    pub cache_ttl: Duration,
    /// How long a published identity stays valid
    pub key_lifetime: Duration,
    /// Republish own identity once the newest publication is older than this
    pub max_key_post_age: Duration,
    /// Period of the own-identity check
    pub distribute_period: Duration,
    /// Period of counterparty re-validation
    pub validate_period: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(30 * 60),
            key_lifetime: Duration::from_secs(30 * 24 * 60 * 60),
            max_key_post_age: Duration::from_secs(3 * 24 * 60 * 60),
            distribute_period: Duration::from_secs(10 * 60),
            validate_period: Duration::from_secs(30 * 60),
        }
    }
}

impl CoreConfig {
    /// Key lifetime in milliseconds.
    pub fn key_lifetime_ms(&self) -> u64 {
        self.key_lifetime.as_millis() as u64
    }

    /// Maximum publication age in milliseconds.
    pub fn max_key_post_age_ms(&self) -> u64 {
        self.max_key_post_age.as_millis() as u64
    }

    /// Shortest maintenance period; the maintenance loop wakes this often.
    pub fn maintenance_tick(&self) -> Duration {
        self.distribute_period.min(self.validate_period)
    }
}
