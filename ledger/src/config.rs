//! Ledger configuration.

use std::time::Duration;

/// Lock configuration.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// How often idle lock entries are pruned.
    pub cleanup_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(30),
        }
    }
}

impl LockConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(ms) = std::env::var("LEDGER_LOCK_CLEANUP_MS") {
            if let Ok(ms) = ms.parse() {
                config.cleanup_interval = Duration::from_millis(ms);
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.cleanup_interval.is_zero() {
            return Err("Lock cleanup interval cannot be zero".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        assert!(LockConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let config = LockConfig {
            cleanup_interval: Duration::ZERO,
        };
        assert!(config.validate().is_err());
    }
}
