//! Wallet error types.

use prism_primitives::Hash160;
use thiserror::Error;

/// Wallet errors.
#[derive(Error, Debug)]
pub enum WalletError {
    /// No key for the requested id.
    #[error("Key not found for id {0}")]
    KeyNotFound(Hash160),

    /// Wallet is locked.
    #[error("Wallet is locked")]
    Locked,

    /// Input index out of range.
    #[error("Input index {0} out of range")]
    BadInputIndex(usize),

    /// The output script is not a form this wallet can sign.
    #[error("Unsupported script form for signing")]
    UnsupportedScript,

    /// Block has no coinstake to derive the signing key from.
    #[error("Cannot sign a block without a coinstake")]
    NotProofOfStake,
}

/// Result type for wallet operations.
pub type WalletResult<T> = Result<T, WalletError>;
