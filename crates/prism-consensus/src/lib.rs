//! # prism-consensus
//!
//! Frozen consensus parameters and reward schedule for the Prism blockchain.
//!
//! This crate provides:
//! - The per-network parameters oracle (`ChainParams::select`)
//! - Stake protocol eras and the `era_for` switch
//! - Block subsidy, coin-age reward and treasury schedule
//! - Block version / proof-algorithm encoding
//!
//! The oracle is a read-only value built once at startup and threaded through
//! construction of every consensus component; nothing here mutates after
//! `select`.

mod era;
mod params;
mod subsidy;
mod version;

pub use era::StakeEra;
pub use params::{
    ChainParams, ConsensusParams, Deployment, Network, ParamsError, ParamsResult,
    RegtestOverrides, TreasuryPayee,
};
pub use subsidy::{block_subsidy, fill_treasury_outputs, treasury_payment};
pub use version::{compute_block_version, MIN_BLOCK_VERSION};
