//! # prism-wallet
//!
//! Staking wallet interface and a self-contained in-memory implementation.
//!
//! This crate provides:
//! - The `Coin` model (spendable outputs with confirmation metadata)
//! - The `StakingWallet` trait: the surface the minter and assembler use
//! - `MemoryWallet`: key storage, coin tracking, input and block signing
//! - `WalletScriptVerifier`: the matching script-verification seam
//!
//! Signing uses a deterministic hash-bound scheme behind the trait; the
//! verification counterpart lives in [`WalletScriptVerifier`]. Swapping in a
//! curve signature touches only those two implementations.

mod coin;
mod error;
mod signing;
mod wallet;

pub use coin::Coin;
pub use error::{WalletError, WalletResult};
pub use signing::{signature_hash, WalletScriptVerifier, SIGHASH_ALL};
pub use wallet::{MemoryWallet, StakingWallet, WalletKey};
