//! Remote invoker configuration.

use std::time::Duration;

/// Configuration for the remote ledger invoker.
#[derive(Debug, Clone)]
pub struct InvokerConfig {
    /// How long a call may wait for the counterparty before it is treated as
    /// unreachable.
    pub request_timeout: Duration,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl InvokerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(ms) = std::env::var("LEDGER_REQUEST_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                config.request_timeout = Duration::from_millis(ms);
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.request_timeout.is_zero() {
            return Err("Request timeout cannot be zero".to_string());
        }
        Ok(())
    }
}
