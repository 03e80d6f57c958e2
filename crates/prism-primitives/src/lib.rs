//! # prism-primitives
//!
//! Chain data model and hash primitives for the Prism blockchain.
//!
//! This crate provides:
//! - Hash newtypes (`Hash256`, `Hash160`) and the node's digest functions
//! - The proof-of-work algorithm tag and single-point hash dispatch
//! - Compact-bits difficulty encoding over `BigUint`
//! - Consensus serialization of transactions, headers and blocks
//! - Minimal script classification and builders for the staking paths
//! - Merkle roots and the witness commitment

mod amount;
mod block;
mod compact;
mod hash;
mod merkle;
mod pow;
mod script;
mod serialize;
mod transaction;

pub use amount::{parse_money, Amount, CENT, COIN, MAX_MONEY};
pub use block::{Block, BlockHeader};
pub use compact::{compact_to_target, target_to_compact, CompactTarget};
pub use hash::{hash160, hash256, sha1d, Hash160, Hash256};
pub use merkle::{
    block_merkle_root, merkle_root, witness_commitment, witness_commitment_script,
    witness_merkle_root, WITNESS_COMMITMENT_HEADER,
};
pub use pow::{pow_hash, Algo, ALGO_VERSION_MASK, ALGO_VERSION_SHIFT};
pub use script::{Script, ScriptType};
pub use serialize::{Encodable, Encoder};
pub use transaction::{OutPoint, Transaction, TxIn, TxOut};

/// Alias used where a hash identifies a block.
pub type BlockHash = Hash256;

/// Alias used where a hash identifies a transaction.
pub type Txid = Hash256;

/// Witness scale factor: weight = base_size * 3 + total_size.
pub const WITNESS_SCALE_FACTOR: u64 = 4;

/// Hard upper bound on block weight.
pub const MAX_BLOCK_WEIGHT: u64 = 4_000_000;

/// Hard upper bound on block sigop cost.
pub const MAX_BLOCK_SIGOPS_COST: u64 = 80_000;

/// Lock times below this threshold are block heights, above it unix times.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;
