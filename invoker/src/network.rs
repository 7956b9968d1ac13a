//! Transports that carry invocations to a counterparty ledger.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info};

use ledgerbridge_common::{Endpoint, RejectionReason};

use crate::chaincode::{deliver, Chaincode, Invocation};

/// Why a delivery did not produce a response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The target could not be reached.
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// The target ran the call and returned an application error.
    #[error("rejected [{}]: {}", .0.code, .0.message)]
    Rejected(RejectionReason),
}

/// Delivers one invocation and waits for the counterparty's answer.
#[async_trait]
pub trait LedgerTransport: Send + Sync {
    /// Deliver `invocation` to its target.
    async fn deliver(&self, invocation: &Invocation) -> Result<Vec<u8>, TransportError>;
}

/// In-process network of ledgers addressed by endpoint.
///
/// Endpoints can be taken offline and a fixed delivery delay can be set to
/// model an unreachable or slow counterparty.
#[derive(Default)]
pub struct LocalNetwork {
    /// Registered ledgers.
    ledgers: DashMap<Endpoint, Arc<dyn Chaincode>>,
    /// Endpoints currently refusing connections.
    offline: RwLock<HashSet<Endpoint>>,
    /// Delay applied before every delivery.
    latency: RwLock<Option<Duration>>,
}

impl LocalNetwork {
    /// Create an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a ledger reachable at `endpoint`.
    pub fn register(&self, endpoint: Endpoint, chaincode: Arc<dyn Chaincode>) {
        info!(endpoint = %endpoint, "Ledger registered");
        self.ledgers.insert(endpoint, chaincode);
    }

    /// Take an endpoint offline, or bring it back.
    pub fn set_offline(&self, endpoint: &Endpoint, offline: bool) {
        let mut set = self.offline.write();
        if offline {
            set.insert(endpoint.clone());
        } else {
            set.remove(endpoint);
        }
        info!(endpoint = %endpoint, offline, "Endpoint availability changed");
    }

    /// Delay every delivery by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    /// Check if an endpoint is registered and online.
    pub fn is_reachable(&self, endpoint: &Endpoint) -> bool {
        self.ledgers.contains_key(endpoint) && !self.offline.read().contains(endpoint)
    }
}

#[async_trait]
impl LedgerTransport for LocalNetwork {
    async fn deliver(&self, invocation: &Invocation) -> Result<Vec<u8>, TransportError> {
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.offline.read().contains(&invocation.target) {
            return Err(TransportError::Unreachable(format!(
                "{} is offline",
                invocation.target
            )));
        }

        // Clone out so the map shard is not held while the target runs.
        let chaincode = self
            .ledgers
            .get(&invocation.target)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                TransportError::Unreachable(format!("no ledger at {}", invocation.target))
            })?;

        debug!(
            tx_id = %invocation.tx_id,
            target = %invocation.target,
            mode = ?invocation.mode,
            "Delivering invocation"
        );

        deliver(chaincode.as_ref(), invocation)
            .await
            .map_err(|e| TransportError::Rejected(RejectionReason::from(&e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ledgerbridge_common::{LedgerBridgeError, Result};

    use crate::config::InvokerConfig;
    use crate::invoker::RemoteLedgerInvoker;

    struct FixedChaincode;

    #[async_trait]
    impl Chaincode for FixedChaincode {
        async fn init(&self, _args: &[String]) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }

        async fn invoke(&self, _function: &str, _args: &[String]) -> Result<Vec<u8>> {
            Err(LedgerBridgeError::insufficient_funds("alice", 200, 100))
        }

        async fn query(&self, _function: &str, _args: &[String]) -> Result<Vec<u8>> {
            Ok(b"100".to_vec())
        }
    }

    fn network() -> (LocalNetwork, Endpoint) {
        let network = LocalNetwork::new();
        let endpoint = Endpoint::new("issuer");
        network.register(endpoint.clone(), Arc::new(FixedChaincode));
        (network, endpoint)
    }

    #[tokio::test]
    async fn test_delivers_to_registered_ledger() {
        let (network, endpoint) = network();
        let invocation = Invocation::query(endpoint, "GetAccountBalance", ["alice".to_string()]);

        assert_eq!(network.deliver(&invocation).await.unwrap(), b"100".to_vec());
    }

    #[tokio::test]
    async fn test_application_error_is_rejection() {
        let (network, endpoint) = network();
        let invocation = Invocation::invoke(endpoint, "Withdraw", Vec::new());

        match network.deliver(&invocation).await {
            Err(TransportError::Rejected(reason)) => assert_eq!(reason.code, "INSUFFICIENT_FUNDS"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_offline_and_unknown_are_unreachable() {
        let (network, endpoint) = network();
        network.set_offline(&endpoint, true);
        assert!(!network.is_reachable(&endpoint));

        let invocation = Invocation::query(endpoint.clone(), "GetAccountBalance", Vec::new());
        assert!(matches!(
            network.deliver(&invocation).await,
            Err(TransportError::Unreachable(_))
        ));

        network.set_offline(&endpoint, false);
        assert!(network.deliver(&invocation).await.is_ok());

        let stray = Invocation::query(Endpoint::new("nowhere"), "GetAccountBalance", Vec::new());
        assert!(matches!(
            network.deliver(&stray).await,
            Err(TransportError::Unreachable(_))
        ));
    }

    struct CountingChaincode {
        invokes: AtomicUsize,
    }

    #[async_trait]
    impl Chaincode for CountingChaincode {
        async fn init(&self, _args: &[String]) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }

        async fn invoke(&self, _function: &str, _args: &[String]) -> Result<Vec<u8>> {
            self.invokes.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn query(&self, _function: &str, _args: &[String]) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_endpoint_times_out_before_delivery() {
        let network = Arc::new(LocalNetwork::new());
        let endpoint = Endpoint::new("issuer");
        let issuer = Arc::new(CountingChaincode {
            invokes: AtomicUsize::new(0),
        });
        network.register(endpoint.clone(), issuer.clone());
        network.set_latency(Some(Duration::from_secs(60)));

        let invoker = RemoteLedgerInvoker::new(
            InvokerConfig {
                request_timeout: Duration::from_secs(5),
            },
            network.clone(),
        );

        let err = invoker
            .invoke(&endpoint, "Withdraw", vec!["alice".into(), "30".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerBridgeError::RemoteUnreachable { .. }));
        assert_eq!(issuer.invokes.load(Ordering::SeqCst), 0);

        network.set_latency(None);
        assert!(invoker.invoke(&endpoint, "Withdraw", Vec::new()).await.is_ok());
        assert_eq!(issuer.invokes.load(Ordering::SeqCst), 1);
    }
}
