use std::time::Duration;

use serde::Deserialize;

/// Configuration surface for the admission layer.
///
/// Deserializable from the hosting service's config file; durations accept
/// humantime strings such as `"500ms"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdmissionConfig {
    /// Token refill rate per key, in tokens per second.
    pub rate: f64,

    /// Burst capacity per key.
    pub burst: u32,

    /// Maximum number of distinct keys retained by the limiter store.
    pub cache_capacity: usize,

    /// Number of bulkhead execution slots.
    pub workers: usize,

    /// Maximum time a request may wait for a bulkhead slot.
    #[serde(with = "humantime_serde")]
    pub max_wait: Duration,
}

/// Rejected configuration values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },
}

impl AdmissionConfig {
    /// Validate that every knob is positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate <= 0.0 || !self.rate.is_finite() {
            return Err(ConfigError::NotPositive {
                field: "rate",
                value: self.rate,
            });
        }
        if self.burst == 0 {
            return Err(ConfigError::NotPositive {
                field: "burst",
                value: 0.0,
            });
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::NotPositive {
                field: "cache_capacity",
                value: 0.0,
            });
        }
        if self.workers == 0 {
            return Err(ConfigError::NotPositive {
                field: "workers",
                value: 0.0,
            });
        }
        if self.max_wait.is_zero() {
            return Err(ConfigError::NotPositive {
                field: "max_wait",
                value: 0.0,
            });
        }
        Ok(())
    }
}
