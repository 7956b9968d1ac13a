//! Counters for the command router.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ledgerbridge_common::{Amount, LedgerBridgeError};

/// Router metrics.
pub struct Metrics {
    /// Commands received, including ones rejected at parse time.
    pub commands_total: AtomicU64,
    /// Commands that failed before any side effect.
    pub commands_invalid: AtomicU64,
    /// Withdrawals debited and accumulated.
    pub withdrawals_success: AtomicU64,
    /// Withdrawals the counterparty refused.
    pub withdrawals_rejected: AtomicU64,
    /// Withdrawals that never reached the counterparty.
    pub withdrawals_unreachable: AtomicU64,
    /// Withdrawals debited at the counterparty whose obligation was not recorded.
    pub withdrawals_unrecorded: AtomicU64,
    /// Sum of amounts debited at the counterparty, without charges.
    pub withdrawn_amount: AtomicU64,
    /// Settlements that cleared a non-zero obligation.
    pub settlements_cleared: AtomicU64,
    /// Settlements that found nothing owed.
    pub settlements_no_dues: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            commands_total: AtomicU64::new(0),
            commands_invalid: AtomicU64::new(0),
            withdrawals_success: AtomicU64::new(0),
            withdrawals_rejected: AtomicU64::new(0),
            withdrawals_unreachable: AtomicU64::new(0),
            withdrawals_unrecorded: AtomicU64::new(0),
            withdrawn_amount: AtomicU64::new(0),
            settlements_cleared: AtomicU64::new(0),
            settlements_no_dues: AtomicU64::new(0),
        }
    }

    /// Increment commands received.
    pub fn command_received(&self) {
        self.commands_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a command refused before dispatch.
    pub fn command_invalid(&self) {
        self.commands_invalid.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a withdrawal debited and accumulated.
    pub fn withdrawal_success(&self, amount: Amount) {
        self.withdrawals_success.fetch_add(1, Ordering::Relaxed);
        self.withdrawn_amount.fetch_add(amount, Ordering::Relaxed);
    }

    /// Record a withdrawal debited at the counterparty but missing from the
    /// obligation.
    pub fn withdrawal_unrecorded(&self, amount: Amount) {
        self.withdrawals_unrecorded.fetch_add(1, Ordering::Relaxed);
        self.withdrawn_amount.fetch_add(amount, Ordering::Relaxed);
    }

    /// Record a failed withdrawal by its cause.
    pub fn withdrawal_failed(&self, error: &LedgerBridgeError) {
        if error.is_retryable() {
            self.withdrawals_unreachable.fetch_add(1, Ordering::Relaxed);
        } else {
            self.withdrawals_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a settlement that cleared dues.
    pub fn settlement_cleared(&self) {
        self.settlements_cleared.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a settlement with nothing owed.
    pub fn settlement_no_dues(&self) {
        self.settlements_no_dues.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            commands_total: self.commands_total.load(Ordering::Relaxed),
            commands_invalid: self.commands_invalid.load(Ordering::Relaxed),
            withdrawals_success: self.withdrawals_success.load(Ordering::Relaxed),
            withdrawals_rejected: self.withdrawals_rejected.load(Ordering::Relaxed),
            withdrawals_unreachable: self.withdrawals_unreachable.load(Ordering::Relaxed),
            withdrawals_unrecorded: self.withdrawals_unrecorded.load(Ordering::Relaxed),
            withdrawn_amount: self.withdrawn_amount.load(Ordering::Relaxed),
            settlements_cleared: self.settlements_cleared.load(Ordering::Relaxed),
            settlements_no_dues: self.settlements_no_dues.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP ledgerbridge_commands_total Total router commands
# TYPE ledgerbridge_commands_total counter
ledgerbridge_commands_total {}

# HELP ledgerbridge_commands_invalid Commands refused before dispatch
# TYPE ledgerbridge_commands_invalid counter
ledgerbridge_commands_invalid {}

# HELP ledgerbridge_withdrawals_success Withdrawals debited and accumulated
# TYPE ledgerbridge_withdrawals_success counter
ledgerbridge_withdrawals_success {}

# HELP ledgerbridge_withdrawals_rejected Withdrawals refused by the counterparty
# TYPE ledgerbridge_withdrawals_rejected counter
ledgerbridge_withdrawals_rejected {}

# HELP ledgerbridge_withdrawals_unreachable Withdrawals that did not reach the counterparty
# TYPE ledgerbridge_withdrawals_unreachable counter
ledgerbridge_withdrawals_unreachable {}

# HELP ledgerbridge_withdrawals_unrecorded Withdrawals debited but missing from the obligation
# TYPE ledgerbridge_withdrawals_unrecorded counter
ledgerbridge_withdrawals_unrecorded {}

# HELP ledgerbridge_withdrawn_amount Sum of withdrawn amounts
# TYPE ledgerbridge_withdrawn_amount counter
ledgerbridge_withdrawn_amount {}

# HELP ledgerbridge_settlements_cleared Settlements that cleared dues
# TYPE ledgerbridge_settlements_cleared counter
ledgerbridge_settlements_cleared {}

# HELP ledgerbridge_settlements_no_dues Settlements with nothing owed
# TYPE ledgerbridge_settlements_no_dues counter
ledgerbridge_settlements_no_dues {}
"#,
            snapshot.commands_total,
            snapshot.commands_invalid,
            snapshot.withdrawals_success,
            snapshot.withdrawals_rejected,
            snapshot.withdrawals_unreachable,
            snapshot.withdrawals_unrecorded,
            snapshot.withdrawn_amount,
            snapshot.settlements_cleared,
            snapshot.settlements_no_dues,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub commands_total: u64,
    pub commands_invalid: u64,
    pub withdrawals_success: u64,
    pub withdrawals_rejected: u64,
    pub withdrawals_unreachable: u64,
    pub withdrawals_unrecorded: u64,
    pub withdrawn_amount: u64,
    pub settlements_cleared: u64,
    pub settlements_no_dues: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;
