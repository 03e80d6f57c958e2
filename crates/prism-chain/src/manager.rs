//! The chain manager surface.
//!
//! Everything the assembler and minter need from the chain lives behind this
//! trait; the working implementation is `prism_kernel::Chainstate`.

use crate::{ChainResult, IndexEntry};
use prism_primitives::{Algo, Block, BlockHash};

/// External chain-management interface.
pub trait ChainManager: Send + Sync {
    /// Validate and connect a new block, as if received from a peer.
    fn process_new_block(&self, block: &Block) -> ChainResult<()>;

    /// Look up an index entry by hash.
    fn lookup(&self, hash: &BlockHash) -> Option<IndexEntry>;

    /// The active tip entry.
    fn active_tip(&self) -> IndexEntry;

    /// The active successor of an entry.
    fn active_next(&self, entry: &IndexEntry) -> Option<IndexEntry>;

    /// Active chain height.
    fn active_height(&self) -> u32;

    /// Median time past of the block with `hash`.
    fn median_time_past(&self, hash: &BlockHash) -> Option<i64>;

    /// Required bits for a block of `algo` following `prev`.
    fn next_work_required(&self, prev: &BlockHash, algo: Algo) -> Option<u32>;

    /// Run the validity checks a freshly assembled block must pass.
    /// `check_pow` and `check_merkle` can be relaxed for templates that are
    /// completed later.
    fn test_block_validity(&self, block: &Block, check_pow: bool, check_merkle: bool)
        -> ChainResult<()>;
}
