//! Acquirer configuration.

use ledgerbridge_common::{Amount, Endpoint, LedgerPair, PartyId};
use ledgerbridge_invoker::InvokerConfig;
use ledgerbridge_ledger::LockConfig;

/// Default fee added to every brokered withdrawal.
pub const DEFAULT_SERVICE_CHARGE: Amount = 5;

/// Main acquirer configuration.
#[derive(Debug, Clone)]
pub struct AcquirerConfig {
    /// This ledger's party.
    pub party: PartyId,
    /// The issuing party whose customers withdraw through us.
    pub counterparty: PartyId,
    /// Where the issuer's ledger is reached.
    pub counterparty_endpoint: Endpoint,
    /// Fee added to each successful withdrawal when computing the obligation.
    pub service_charge: Amount,
    /// Remote invoker configuration.
    pub invoker_config: InvokerConfig,
    /// Lock configuration.
    pub lock_config: LockConfig,
    /// Log level.
    pub log_level: String,
}

impl Default for AcquirerConfig {
    fn default() -> Self {
        Self {
            party: PartyId::new("ABI"),
            counterparty: PartyId::new("IBI"),
            counterparty_endpoint: Endpoint::new("ledgerbridge/issuer"),
            service_charge: DEFAULT_SERVICE_CHARGE,
            invoker_config: InvokerConfig::default(),
            lock_config: LockConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl AcquirerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(party) = std::env::var("ACQUIRER_PARTY") {
            config.party = PartyId::new(party);
        }

        if let Ok(party) = std::env::var("ISSUER_PARTY") {
            config.counterparty = PartyId::new(party);
        }

        if let Ok(endpoint) = std::env::var("ISSUER_ENDPOINT") {
            config.counterparty_endpoint = Endpoint::new(endpoint);
        }

        if let Ok(charge) = std::env::var("SERVICE_CHARGE") {
            if let Ok(charge) = charge.parse() {
                config.service_charge = charge;
            }
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        config.invoker_config = InvokerConfig::from_env();
        config.lock_config = LockConfig::from_env();

        config
    }

    /// The pair whose obligation this acquirer tracks: the issuer owes us.
    pub fn ledger_pair(&self) -> LedgerPair {
        LedgerPair::new(self.counterparty.clone(), self.party.clone())
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !self.party.is_valid() {
            return Err(format!("Invalid acquirer party: {:?}", self.party.as_str()));
        }

        if !self.counterparty.is_valid() {
            return Err(format!(
                "Invalid issuer party: {:?}",
                self.counterparty.as_str()
            ));
        }

        if self.party == self.counterparty {
            return Err("Acquirer and issuer must be different parties".to_string());
        }

        if !self.counterparty_endpoint.is_valid() {
            return Err("Issuer endpoint cannot be empty".to_string());
        }

        self.invoker_config.validate()?;
        self.lock_config.validate()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AcquirerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.service_charge, 5);
        assert_eq!(config.ledger_pair().obligation_key(), "obligation/IBI->ABI");
    }

    #[test]
    fn test_invalid_config() {
        let mut config = AcquirerConfig::default();
        config.counterparty = config.party.clone();
        assert!(config.validate().is_err());

        let mut config = AcquirerConfig::default();
        config.counterparty_endpoint = Endpoint::new("");
        assert!(config.validate().is_err());
    }
}
