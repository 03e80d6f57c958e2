//! # prism-kernel
//!
//! Proof-of-stake kernel protocol and stake modifier engine.
//!
//! This crate provides:
//! - Stake modifier computation and caching (the 64-bit entropy anchor)
//! - Kernel modifier resolution for both stake protocol eras
//! - The stake hash, per-coin target test, kernel search and verification
//! - Coinstake verification and the coinstake timestamp rule
//! - `Chainstate`: the in-memory `ChainManager` implementation that connects
//!   blocks and writes the cached modifier fields
//!
//! The same kernel test runs on the minter side (search) and the validator
//! side (verify) and must agree bit for bit; both call through
//! [`stake_hash`] and [`stake_target_hit`].

mod chainstate;
mod error;
mod kernel;
mod modifier;
mod verify;

pub use chainstate::Chainstate;
pub use error::{KernelError, KernelResult};
pub use kernel::{check_kernel, search_kernel, stake_hash, stake_target_hit, StakeProof};
pub use modifier::{
    check_stake_modifier_checkpoints, compute_next_stake_modifier, kernel_stake_modifier,
    selection_interval, selection_interval_section, stake_entropy_bit, stake_modifier_checksum,
    ModifierInfo, FIRST_BLOCK_MODIFIER,
};
pub use verify::{
    check_coinstake_timestamp, check_proof_of_stake, ScriptVerifier, TransactionProvider,
};
