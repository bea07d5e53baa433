//! Transient per-transaction bookkeeping.

use crate::record::CoinbaseReward;

/// Mutable state accompanying the transaction currently being replayed:
/// its success flag, its encoded byte size, and the enclosing block's
/// coinbase rewards.
///
/// Reset to the zero value after each flush so nothing leaks into the
/// next transaction or block.
#[derive(Debug, Default)]
pub struct TransactionContext {
    pub(crate) failed: bool,
    pub(crate) size: f64,
    pub(crate) coinbase_rewards: Vec<CoinbaseReward>,
}

impl TransactionContext {
    /// Marks the transaction as failed or successful.
    pub fn set_failed(&mut self, failed: bool) {
        self.failed = failed;
    }

    /// Sets the transaction's encoded size in bytes.
    pub fn set_size(&mut self, size: f64) {
        self.size = size;
    }

    /// Replaces the enclosing block's coinbase reward list.
    pub fn set_coinbase_rewards(&mut self, rewards: Vec<CoinbaseReward>) {
        self.coinbase_rewards = rewards;
    }

    /// Clears the per-transaction fields after a transaction flush. The
    /// reward list belongs to the enclosing block and survives until the
    /// block header is written.
    pub fn reset_transaction(&mut self) {
        self.failed = false;
        self.size = 0.0;
    }

    /// Returns the context to its zero value.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
