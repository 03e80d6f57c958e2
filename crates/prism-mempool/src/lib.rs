//! # prism-mempool
//!
//! Transaction mempool for the Prism blockchain.
//!
//! This crate provides:
//! - Transaction storage with parent/child dependency links
//! - Cached with-ancestor aggregates (fees, weight, sigops, count)
//! - Ancestor-score ordering for block template selection
//! - Ancestor and descendant enumeration
//! - Double-spend detection against pooled inputs
//!
//! The pool is the `L_mempool` lock in the locking order: it is acquired
//! after the chain lock and before the wallet lock, and template
//! construction holds a single view of it for the whole call.

mod entry;
mod error;
mod fee;
mod pool;

pub use entry::MempoolEntry;
pub use error::{MempoolError, MempoolResult};
pub use fee::FeeRate;
pub use pool::{Mempool, MempoolView};

/// Default maximum number of transactions.
pub const DEFAULT_MAX_TXS: usize = 50_000;
