//! Acquirer entry points.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use ledgerbridge_common::{Endpoint, InitRecord, LedgerBridgeError, PartyId, Result};
use ledgerbridge_invoker::{Chaincode, LedgerTransport, RemoteLedgerInvoker};
use ledgerbridge_ledger::{KeyedLockManager, KvStore};

use crate::config::AcquirerConfig;
use crate::router::CommandRouter;
use crate::settlement_ledger::SettlementLedger;

/// Function name the query path answers to.
pub const QUERY_FUNCTION: &str = "Query";

/// The acquirer's ledger behind the chaincode surface.
///
/// `invoke` and `query` take `[counterpartyEndpoint, operation, payload]`.
pub struct AcquirerChaincode {
    /// This ledger's party.
    party: PartyId,
    /// Command router.
    router: CommandRouter,
    /// Store the init marker is written to.
    store: Arc<dyn KvStore>,
    /// Locks the settlement ledger serializes on.
    locks: Arc<KeyedLockManager>,
}

impl AcquirerChaincode {
    /// Create a new acquirer around an assembled router.
    pub fn new(
        party: PartyId,
        router: CommandRouter,
        store: Arc<dyn KvStore>,
        locks: Arc<KeyedLockManager>,
    ) -> Self {
        Self {
            party,
            router,
            store,
            locks,
        }
    }

    /// Assemble an acquirer from configuration.
    pub fn from_config(
        config: &AcquirerConfig,
        store: Arc<dyn KvStore>,
        transport: Arc<dyn LedgerTransport>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(LedgerBridgeError::ConfigurationError)?;

        let locks = Arc::new(KeyedLockManager::new(config.lock_config.clone()));
        let settlement = SettlementLedger::new(
            config.ledger_pair(),
            store.clone(),
            locks.clone(),
            config.service_charge,
        );
        let invoker = RemoteLedgerInvoker::new(config.invoker_config.clone(), transport);
        let router = CommandRouter::new(
            config.counterparty_endpoint.clone(),
            Arc::new(invoker),
            Arc::new(settlement),
        );

        Ok(Self::new(config.party.clone(), router, store, locks))
    }

    /// The command router.
    pub fn router(&self) -> &CommandRouter {
        &self.router
    }

    /// Start background tasks. Must be called from within a Tokio runtime.
    pub fn start_background_tasks(&self) -> JoinHandle<()> {
        info!(party = %self.party, "Starting lock cleanup");
        self.locks.start_cleanup()
    }

    async fn initialize(&self, args: &[String]) -> Result<Vec<u8>> {
        if !args.is_empty() {
            return Err(LedgerBridgeError::InvalidArguments(format!(
                "Init expects no arguments, got {}",
                args.len()
            )));
        }

        // Obligation first. Initializing it twice is a no-op, so init can be retried.
        self.router.settlement().initialize().await?;

        let record = InitRecord::new(self.party.clone(), "acquirer initialized");
        self.store.put(&record.key(), record.to_bytes()?).await?;
        Ok(Vec::new())
    }
}

/// Split `[endpoint, operation, payload]`.
fn command_args(args: &[String]) -> Result<(Endpoint, &str, &str)> {
    let [endpoint, operation, payload] = args else {
        return Err(LedgerBridgeError::InvalidArguments(format!(
            "expected 3 arguments (counterparty endpoint, operation, payload), got {}",
            args.len()
        )));
    };
    Ok((Endpoint::new(endpoint.as_str()), operation, payload))
}

#[async_trait]
impl Chaincode for AcquirerChaincode {
    #[instrument(skip(self, args), fields(party = %self.party))]
    async fn init(&self, args: &[String]) -> Result<Vec<u8>> {
        info!("Acquirer init");
        let result = self.initialize(args).await;
        if let Err(e) = &result {
            warn!(error = %e, "Acquirer init failed");
        }
        result
    }

    #[instrument(skip(self, args), fields(party = %self.party))]
    async fn invoke(&self, function: &str, args: &[String]) -> Result<Vec<u8>> {
        info!(function, args = ?args, "Acquirer invoke");
        let (endpoint, operation, payload) = command_args(args).map_err(|e| {
            warn!(error = %e, "Acquirer invoke refused");
            e
        })?;
        self.router
            .route(&endpoint, operation, payload)
            .await?
            .to_bytes()
    }

    #[instrument(skip(self, args), fields(party = %self.party))]
    async fn query(&self, function: &str, args: &[String]) -> Result<Vec<u8>> {
        info!(function, args = ?args, "Acquirer query");
        if function != QUERY_FUNCTION {
            let err = LedgerBridgeError::UnknownOperation(format!(
                "query function must be {QUERY_FUNCTION}, got {function}"
            ));
            warn!(error = %err, "Acquirer query refused");
            return Err(err);
        }
        let (endpoint, operation, payload) = command_args(args).map_err(|e| {
            warn!(error = %e, "Acquirer query refused");
            e
        })?;
        self.router
            .route_query(&endpoint, operation, payload)
            .await?
            .to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerbridge_invoker::LocalNetwork;
    use ledgerbridge_ledger::MemoryStore;

    /// Store whose writes fail for keys under one prefix.
    struct PrefixFailingStore {
        inner: MemoryStore,
        prefix: &'static str,
    }

    #[async_trait]
    impl KvStore for PrefixFailingStore {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
            if key.starts_with(self.prefix) {
                return Err(LedgerBridgeError::StorageFailure(format!(
                    "write of {key} failed"
                )));
            }
            self.inner.put(key, value).await
        }
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn acquirer() -> (AcquirerChaincode, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let acquirer = AcquirerChaincode::from_config(
            &AcquirerConfig::default(),
            store.clone(),
            Arc::new(LocalNetwork::new()),
        )
        .unwrap();
        (acquirer, store)
    }

    #[tokio::test]
    async fn test_init_creates_zero_obligation_and_marker() {
        let (acquirer, store) = acquirer();

        acquirer.init(&[]).await.unwrap();
        assert_eq!(store.keys_with_prefix("init/"), vec!["init/ABI"]);
        assert_eq!(
            store.keys_with_prefix("obligation/"),
            vec!["obligation/IBI->ABI"]
        );
        assert_eq!(
            acquirer.router().settlement().current().await.unwrap().amount,
            0
        );

        assert!(matches!(
            acquirer.init(&args(&["extra"])).await,
            Err(LedgerBridgeError::InvalidArguments(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_obligation_read_writes_no_marker() {
        let (acquirer, store) = acquirer();
        store.set_fail_reads(true);

        assert!(matches!(
            acquirer.init(&[]).await,
            Err(LedgerBridgeError::StorageFailure(_))
        ));
        assert!(store.keys_with_prefix("init/").is_empty());
        assert!(store.keys_with_prefix("obligation/").is_empty());

        store.set_fail_reads(false);
        acquirer.init(&[]).await.unwrap();
        assert_eq!(store.keys_with_prefix("init/"), vec!["init/ABI"]);
    }

    #[tokio::test]
    async fn test_failed_marker_write_can_be_retried() {
        let store = Arc::new(PrefixFailingStore {
            inner: MemoryStore::new(),
            prefix: "init/",
        });
        let acquirer = AcquirerChaincode::from_config(
            &AcquirerConfig::default(),
            store.clone(),
            Arc::new(LocalNetwork::new()),
        )
        .unwrap();

        assert!(matches!(
            acquirer.init(&[]).await,
            Err(LedgerBridgeError::StorageFailure(_))
        ));
        assert!(store.inner.keys_with_prefix("init/").is_empty());
        assert_eq!(
            acquirer.router().settlement().current().await.unwrap().amount,
            0
        );
    }

    #[tokio::test]
    async fn test_argument_count_is_checked() {
        let (acquirer, store) = acquirer();

        assert!(matches!(
            acquirer
                .invoke("invoke", &args(&["ledgerbridge/issuer", "WithdrawFund"]))
                .await,
            Err(LedgerBridgeError::InvalidArguments(_))
        ));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_query_requires_query_function() {
        let (acquirer, _) = acquirer();

        assert!(matches!(
            acquirer
                .query(
                    "Peek",
                    &args(&["ledgerbridge/issuer", "GetSettlement", "ledgerbridge/issuer"])
                )
                .await,
            Err(LedgerBridgeError::UnknownOperation(_))
        ));

        let response = acquirer
            .query(
                QUERY_FUNCTION,
                &args(&["ledgerbridge/issuer", "GetSettlement", "ledgerbridge/issuer"]),
            )
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&response).unwrap();
        assert_eq!(json["amount"], 0);
        assert_eq!(json["owing_party"], "IBI");
    }

    #[tokio::test]
    async fn test_unreachable_issuer_surfaces_unreachable() {
        let (acquirer, store) = acquirer();
        acquirer.init(&[]).await.unwrap();
        let writes = store.write_count();

        let err = acquirer
            .invoke(
                "invoke",
                &args(&["ledgerbridge/issuer", "WithdrawFund", "alice,30"]),
            )
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.write_count(), writes);
    }

    #[test]
    fn test_invalid_config_is_refused() {
        let mut config = AcquirerConfig::default();
        config.counterparty = config.party.clone();

        assert!(matches!(
            AcquirerChaincode::from_config(
                &config,
                Arc::new(MemoryStore::new()),
                Arc::new(LocalNetwork::new())
            ),
            Err(LedgerBridgeError::ConfigurationError(_))
        ));
    }
}
