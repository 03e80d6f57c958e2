//! Miner error types.

use thiserror::Error;

/// Errors from block assembly and minting.
#[derive(Error, Debug)]
pub enum MinerError {
    /// No coin produced a kernel this tick; retry after the stake timeout.
    #[error("No kernel found for coinstake")]
    StakeNotFound,

    /// Chain-side failure.
    #[error("Chain error: {0}")]
    Chain(#[from] prism_chain::ChainError),

    /// Kernel-side failure.
    #[error("Kernel error: {0}")]
    Kernel(#[from] prism_kernel::KernelError),

    /// Wallet-side failure (key lookup, signing).
    #[error("Wallet error: {0}")]
    Wallet(#[from] prism_wallet::WalletError),

    /// Template construction invariant breach.
    #[error("Template construction failed: {0}")]
    TemplateFailed(String),
}

/// Result type for miner operations.
pub type MinerResult<T> = Result<T, MinerError>;
