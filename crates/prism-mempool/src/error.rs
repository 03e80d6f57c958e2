//! Mempool error types.

use prism_primitives::Txid;
use thiserror::Error;

/// Mempool errors.
#[derive(Error, Debug)]
pub enum MempoolError {
    /// Transaction already in the pool.
    #[error("Transaction already in mempool: {0}")]
    AlreadyExists(Txid),

    /// Another pooled transaction spends the same input.
    #[error("Double spend: input of {0} already spent in mempool")]
    DoubleSpend(Txid),

    /// Pool is at capacity.
    #[error("Mempool full: {count} transactions, max {max}")]
    Full { count: usize, max: usize },

    /// Transaction not found.
    #[error("Transaction not found in mempool: {0}")]
    NotFound(Txid),

    /// Coinbase and coinstake transactions never enter the pool.
    #[error("Reward transaction rejected from mempool: {0}")]
    RewardTransaction(Txid),
}

/// Result type for mempool operations.
pub type MempoolResult<T> = Result<T, MempoolError>;
