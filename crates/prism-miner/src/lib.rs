//! # prism-miner
//!
//! Block assembly and proof-of-stake minting.
//!
//! This crate provides:
//! - `BlockAssembler`: template construction with ancestor-feerate package
//!   selection, canonical transaction ordering and the witness commitment
//! - Coinstake creation: kernel search over the wallet's stakable coins
//! - `StakeMinter`: the background minting task with interrupt-sensitive
//!   sleeps and warm-up gates
//!
//! Template construction acquires the chain lock, then the mempool view,
//! and holds both for the whole call; the coinstake path takes the wallet
//! lock last. That order is fixed (see the concurrency notes in
//! `prism-mempool`).

mod assembler;
mod coinstake;
mod error;
mod minter;

pub use assembler::{AssemblerOptions, AssemblerStats, BlockAssembler, BlockTemplate, TemplateEntry};
pub use error::{MinerError, MinerResult};
pub use minter::{Interrupt, MinterConfig, NetworkInfo, StakeMinter};

/// Default block weight budget (`-blockmaxweight`).
pub const DEFAULT_BLOCK_MAX_WEIGHT: u64 = 4_000_000;

/// Weight reserved for the coinbase transaction.
pub const COINBASE_WEIGHT_RESERVE: u64 = 4_000;

/// Sigop cost reserved for the coinbase transaction.
pub const COINBASE_SIGOPS_RESERVE: u64 = 400;

/// Consecutive package failures tolerated near a full block.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 1_000;
