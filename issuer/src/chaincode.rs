//! Issuer entry points.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use ledgerbridge_common::{
    encode, parse_amount, parse_signed, Amount, InitRecord, LedgerBridgeError, PartyId, Result,
};
use ledgerbridge_invoker::Chaincode;
use ledgerbridge_ledger::{Account, AccountLedger, KeyedLockManager, KvStore};

/// Operations the issuer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuerOperation {
    /// Seed a customer's balance.
    Init,
    /// Add funds to a customer.
    Deposit,
    /// Take funds from a customer.
    Withdraw,
    /// Read a customer's balance.
    GetAccountBalance,
}

impl IssuerOperation {
    /// Wire name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssuerOperation::Init => "Init",
            IssuerOperation::Deposit => "Deposit",
            IssuerOperation::Withdraw => "Withdraw",
            IssuerOperation::GetAccountBalance => "GetAccountBalance",
        }
    }

    /// Check if the operation leaves state untouched.
    pub fn is_read_only(&self) -> bool {
        matches!(self, IssuerOperation::GetAccountBalance)
    }
}

impl fmt::Display for IssuerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssuerOperation {
    type Err = LedgerBridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Init" => Ok(IssuerOperation::Init),
            "Deposit" => Ok(IssuerOperation::Deposit),
            "Withdraw" => Ok(IssuerOperation::Withdraw),
            "GetAccountBalance" => Ok(IssuerOperation::GetAccountBalance),
            other => Err(LedgerBridgeError::UnknownOperation(other.to_string())),
        }
    }
}

/// Balance returned by every issuer operation that touches an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceResponse {
    /// Customer name.
    pub customer_name: String,
    /// Balance after the operation.
    pub balance: Amount,
}

impl From<&Account> for BalanceResponse {
    fn from(account: &Account) -> Self {
        Self {
            customer_name: account.customer_name.clone(),
            balance: account.balance,
        }
    }
}

/// The issuer's ledger behind the chaincode surface.
pub struct IssuerChaincode {
    /// Customer balances.
    ledger: AccountLedger,
    /// Store the init marker is written to.
    store: Arc<dyn KvStore>,
}

impl IssuerChaincode {
    /// Create a new issuer over `store`.
    pub fn new(party: PartyId, store: Arc<dyn KvStore>, locks: Arc<KeyedLockManager>) -> Self {
        Self {
            ledger: AccountLedger::new(party, store.clone(), locks),
            store,
        }
    }

    /// The underlying account ledger.
    pub fn ledger(&self) -> &AccountLedger {
        &self.ledger
    }

    /// Seed one customer: `[customerName, startingBalance]`.
    async fn seed(&self, args: &[String]) -> Result<Vec<u8>> {
        let [customer, balance] = args else {
            return Err(LedgerBridgeError::InvalidArguments(format!(
                "Init expects 2 arguments (customer name, starting balance), got {}",
                args.len()
            )));
        };

        let balance = parse_amount(balance).map_err(|e| {
            LedgerBridgeError::InvalidArguments(format!("starting balance: {}", e.detail()))
        })?;

        // Marker first, so a failed marker write seeds no account.
        let record = InitRecord::new(self.ledger.party().clone(), customer.as_str());
        self.store.put(&record.key(), record.to_bytes()?).await?;

        let account = self.ledger.open_account(customer, balance).await?;
        encode(&BalanceResponse::from(&account))
    }

    async fn dispatch(&self, operation: IssuerOperation, args: &[String]) -> Result<Vec<u8>> {
        match operation {
            IssuerOperation::Init => self.seed(args).await,
            IssuerOperation::Deposit => {
                let (customer, amount) = customer_and_amount(operation, args)?;
                let account = self.ledger.deposit(customer, amount).await?;
                encode(&BalanceResponse::from(&account))
            }
            IssuerOperation::Withdraw => {
                let (customer, amount) = customer_and_amount(operation, args)?;
                let account = self.ledger.withdraw(customer, amount).await?;
                encode(&BalanceResponse::from(&account))
            }
            IssuerOperation::GetAccountBalance => {
                let [customer] = args else {
                    return Err(LedgerBridgeError::InvalidArguments(format!(
                        "GetAccountBalance expects 1 argument (customer name), got {}",
                        args.len()
                    )));
                };
                let account = self.ledger.account(customer).await?;
                encode(&BalanceResponse::from(&account))
            }
        }
    }
}

fn customer_and_amount(operation: IssuerOperation, args: &[String]) -> Result<(&str, i128)> {
    let [customer, amount] = args else {
        return Err(LedgerBridgeError::InvalidArguments(format!(
            "{operation} expects 2 arguments (customer name, amount), got {}",
            args.len()
        )));
    };
    Ok((customer.as_str(), parse_signed(amount)?))
}

#[async_trait]
impl Chaincode for IssuerChaincode {
    #[instrument(skip(self, args), fields(party = %self.ledger.party()))]
    async fn init(&self, args: &[String]) -> Result<Vec<u8>> {
        info!(args = ?args, "Issuer init");
        let result = self.seed(args).await;
        if let Err(e) = &result {
            warn!(error = %e, "Issuer init failed");
        }
        result
    }

    #[instrument(skip(self, args), fields(party = %self.ledger.party()))]
    async fn invoke(&self, function: &str, args: &[String]) -> Result<Vec<u8>> {
        info!(function, args = ?args, "Issuer invoke");
        let result = match function.parse::<IssuerOperation>() {
            Ok(op) if op.is_read_only() => Err(LedgerBridgeError::UnknownOperation(format!(
                "{op} is a query"
            ))),
            Ok(op) => self.dispatch(op, args).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            warn!(function, error = %e, "Issuer invoke failed");
        }
        result
    }

    #[instrument(skip(self, args), fields(party = %self.ledger.party()))]
    async fn query(&self, function: &str, args: &[String]) -> Result<Vec<u8>> {
        info!(function, args = ?args, "Issuer query");
        let result = match function.parse::<IssuerOperation>() {
            Ok(op) if op.is_read_only() => self.dispatch(op, args).await,
            Ok(op) => Err(LedgerBridgeError::UnknownOperation(format!(
                "{op} changes state and cannot be queried"
            ))),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            warn!(function, error = %e, "Issuer query failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerbridge_ledger::MemoryStore;
    use tokio_test::assert_ok;

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

    fn issuer() -> (IssuerChaincode, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let issuer = IssuerChaincode::new(
            PartyId::new("IBI"),
            store.clone(),
            Arc::new(KeyedLockManager::default()),
        );
        (issuer, store)
    }

    fn balance(bytes: &[u8]) -> Amount {
        serde_json::from_slice::<BalanceResponse>(bytes).unwrap().balance
    }

    #[tokio::test]
    async fn test_init_seeds_customer_and_marker() {
        let (issuer, store) = issuer();

        let response = issuer.init(&args(&["alice", "100"])).await.unwrap();
        assert_eq!(balance(&response), 100);
        assert_eq!(store.keys_with_prefix("init/"), vec!["init/IBI"]);

        let response = issuer
            .query("GetAccountBalance", &args(&["alice"]))
            .await
            .unwrap();
        assert_eq!(balance(&response), 100);
    }

    #[tokio::test]
    async fn test_failed_marker_write_seeds_nothing() {
        let store = Arc::new(PrefixFailingStore {
            inner: MemoryStore::new(),
            prefix: "init/",
        });
        let issuer = IssuerChaincode::new(
            PartyId::new("IBI"),
            store.clone(),
            Arc::new(KeyedLockManager::default()),
        );

        assert!(matches!(
            issuer.init(&args(&["alice", "100"])).await,
            Err(LedgerBridgeError::StorageFailure(_))
        ));
        assert!(matches!(
            issuer.ledger().get_balance("alice").await,
            Err(LedgerBridgeError::NotFound(_))
        ));
        assert!(store.inner.keys_with_prefix("").is_empty());
    }

    #[tokio::test]
    async fn test_init_argument_validation() {
        let (issuer, _) = issuer();

        for bad in [args(&[]), args(&["alice"]), args(&["alice", "x"]), args(&["alice", "-1"])] {
            assert!(matches!(
                issuer.init(&bad).await,
                Err(LedgerBridgeError::InvalidArguments(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_withdraw_and_deposit() {
        let (issuer, _) = issuer();
        issuer.init(&args(&["alice", "100"])).await.unwrap();

        let response = issuer.invoke("Withdraw", &args(&["alice", "30"])).await.unwrap();
        assert_eq!(balance(&response), 70);

        let response = issuer.invoke("Deposit", &args(&["alice", "5"])).await.unwrap();
        assert_eq!(balance(&response), 75);
    }

    #[tokio::test]
    async fn test_invoke_init_adds_customer() {
        let (issuer, _) = issuer();
        assert_ok!(issuer.init(&args(&["alice", "100"])).await);
        assert_ok!(issuer.invoke("Init", &args(&["bob", "40"])).await);

        assert_eq!(issuer.ledger().get_balance("alice").await.unwrap(), 100);
        assert_eq!(issuer.ledger().get_balance("bob").await.unwrap(), 40);
    }

    #[tokio::test]
    async fn test_amount_errors() {
        let (issuer, _) = issuer();
        issuer.init(&args(&["alice", "100"])).await.unwrap();

        assert!(matches!(
            issuer.invoke("Withdraw", &args(&["alice", "lots"])).await,
            Err(LedgerBridgeError::MalformedAmount(_))
        ));
        assert!(matches!(
            issuer.invoke("Deposit", &args(&["alice", "-3"])).await,
            Err(LedgerBridgeError::InvalidAmount(_))
        ));
        assert!(matches!(
            issuer.invoke("Withdraw", &args(&["alice", "200"])).await,
            Err(LedgerBridgeError::InsufficientFunds(_))
        ));
        let huge = u64::MAX.to_string();
        assert!(matches!(
            issuer.invoke("Withdraw", &args(&["alice", huge.as_str()])).await,
            Err(LedgerBridgeError::InsufficientFunds(_))
        ));
        assert_eq!(issuer.ledger().get_balance("alice").await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_operation_routing() {
        let (issuer, _) = issuer();
        issuer.init(&args(&["alice", "100"])).await.unwrap();

        assert!(matches!(
            issuer.invoke("Transfer", &args(&["alice", "1"])).await,
            Err(LedgerBridgeError::UnknownOperation(_))
        ));
        assert!(matches!(
            issuer.query("Withdraw", &args(&["alice", "1"])).await,
            Err(LedgerBridgeError::UnknownOperation(_))
        ));
        assert!(matches!(
            issuer.invoke("GetAccountBalance", &args(&["alice"])).await,
            Err(LedgerBridgeError::UnknownOperation(_))
        ));
        assert!(matches!(
            issuer.query("GetAccountBalance", &args(&["alice", "extra"])).await,
            Err(LedgerBridgeError::InvalidArguments(_))
        ));
        assert!(matches!(
            issuer.query("GetAccountBalance", &args(&["bob"])).await,
            Err(LedgerBridgeError::NotFound(_))
        ));
    }
}
