//! Chain error types.

use prism_primitives::BlockHash;
use thiserror::Error;

/// Errors from block index and chain state operations.
#[derive(Error, Debug)]
pub enum ChainError {
    /// Block already present in the index.
    #[error("Block already known: {0}")]
    DuplicateBlock(BlockHash),

    /// Predecessor missing from the index.
    #[error("Previous block not found: {0}")]
    OrphanBlock(BlockHash),

    /// Block failed a validity rule.
    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    /// Proof-of-stake validation failed.
    #[error("Invalid proof of stake: {0}")]
    InvalidProofOfStake(String),

    /// Proof-of-work hash above target.
    #[error("Invalid proof of work: {0}")]
    InvalidProofOfWork(String),

    /// Stake modifier checkpoint mismatch.
    #[error("Stake modifier checkpoint mismatch at height {height}: checksum {checksum:#010x}")]
    ModifierCheckpointMismatch { height: u32, checksum: u32 },

    /// Internal invariant breach.
    #[error("Chain state corrupted: {0}")]
    Corrupted(String),
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;
