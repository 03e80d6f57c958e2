//! Kernel error types.
//!
//! Variants split along the handling policy: consensus violations are
//! surfaced as typed rejection reasons, transient conditions are retried on
//! the next minting tick, and invariant breaches are fatal to the caller.

use prism_primitives::{BlockHash, Hash256, Txid};
use thiserror::Error;

/// Errors from stake modifier and kernel operations.
#[derive(Error, Debug)]
pub enum KernelError {
    /// Transaction timestamp earlier than the staked output's block.
    #[error("Coinstake timestamp violation: tx time {time_tx} before block-from time {time_block_from}")]
    TimestampViolation { time_tx: u32, time_block_from: u32 },

    /// Coin younger than the era's minimum stake age.
    #[error(
        "Min age violation: height={height} from-height={from_height} \
         from-time={time_block_from} min-age={min_age} tx-time={time_tx}"
    )]
    MinAgeViolation {
        height: u32,
        from_height: u32,
        time_block_from: u32,
        min_age: u32,
        time_tx: u32,
    },

    /// Coin shallower than the era's minimum stake depth.
    #[error("Min depth violation: depth {depth}, minimum {min_depth}")]
    MinDepthViolation { depth: u32, min_depth: u32 },

    /// Negative, zero, overflowing or above-limit proof target.
    #[error("Bad stake target: bits {bits:#010x}")]
    BadTarget { bits: u32 },

    /// The stake hash missed the weighted target.
    #[error("Stake hash does not meet target: proof {proof}")]
    TargetMissed { proof: Hash256 },

    /// Kernel modifier not resolvable yet; retry next tick.
    #[error("Kernel stake modifier unavailable: {0}")]
    ModifierUnavailable(String),

    /// Walked past genesis while resolving a modifier.
    #[error("Reached genesis block while resolving stake modifier")]
    ReachedGenesis,

    /// No generated modifier exists at genesis.
    #[error("No stake modifier generation at genesis block")]
    NoGenerationAtGenesis,

    /// No candidate satisfied a selection round.
    #[error("Unable to select block for stake modifier at round {round}")]
    SelectionFailed { round: u32 },

    /// Verification called on something that is not a coinstake.
    #[error("Not a coinstake: {0}")]
    NotCoinstake(Txid),

    /// The kernel prevout's transaction is not indexed.
    #[error("Transaction index entry not found: {0}")]
    PrevoutNotFound(Txid),

    /// The kernel prevout's containing block is not indexed.
    #[error("Block index entry not found: {0}")]
    BlockNotIndexed(BlockHash),

    /// The coinstake kernel input failed script verification.
    #[error("Script verification failed on coinstake {txid}: {reason}")]
    InvalidSignature { txid: Txid, reason: String },

    /// Block and coinstake timestamps disagree or are misaligned.
    #[error("Coinstake timestamp does not meet protocol: block {time_block}, tx {time_tx}")]
    BadCoinstakeTimestamp { time_block: i64, time_tx: i64 },
}

impl KernelError {
    /// Transient conditions clear on their own; callers retry next tick
    /// instead of surfacing a rejection.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            KernelError::ModifierUnavailable(_) | KernelError::PrevoutNotFound(_)
        )
    }
}

/// Result type for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;
