//! The block index.
//!
//! An arena of header entries: each entry points at its predecessor by arena
//! id and the active chain is a sparse vector of arena ids indexed by height.
//! Entries are append-only; the cached stake modifier fields are written once
//! by the validator when the block is connected.

use crate::{ChainError, ChainResult};
use prism_consensus::ConsensusParams;
use prism_primitives::{Algo, BlockHash, Hash256};
use std::collections::HashMap;

/// Entry flag: the block is proof-of-stake.
pub const BLOCK_FLAG_PROOF_OF_STAKE: u32 = 1 << 0;
/// Entry flag: the stake entropy bit is one.
pub const BLOCK_FLAG_STAKE_ENTROPY: u32 = 1 << 1;
/// Entry flag: this block generated a fresh stake modifier.
pub const BLOCK_FLAG_GENERATED_MODIFIER: u32 = 1 << 2;

/// One block header in the index.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub hash: BlockHash,
    pub height: u32,
    /// Arena id of the predecessor; `None` only for genesis.
    pub prev: Option<usize>,
    pub version: i32,
    pub time: u32,
    pub bits: u32,
    pub flags: u32,
    /// Cached stake modifier (see `prism-kernel`).
    pub stake_modifier: u64,
    /// Running checksum for the hard checkpoint table.
    pub modifier_checksum: u32,
    /// Kernel proof hash (PoS) or the header's own proof hash (PoW).
    pub proof_hash: Hash256,
}

impl IndexEntry {
    pub fn algo(&self) -> Algo {
        Algo::from_version(self.version)
    }

    pub fn is_proof_of_stake(&self) -> bool {
        self.flags & BLOCK_FLAG_PROOF_OF_STAKE != 0
    }

    pub fn generated_stake_modifier(&self) -> bool {
        self.flags & BLOCK_FLAG_GENERATED_MODIFIER != 0
    }

    pub fn stake_entropy_bit(&self) -> u8 {
        ((self.flags & BLOCK_FLAG_STAKE_ENTROPY) != 0) as u8
    }

    pub fn block_time(&self) -> i64 {
        self.time as i64
    }
}

/// Arena of block headers plus the active chain.
#[derive(Debug, Default)]
pub struct BlockIndex {
    entries: Vec<IndexEntry>,
    by_hash: HashMap<BlockHash, usize>,
    /// `active[height]` is the arena id of the active block at that height.
    active: Vec<usize>,
}

impl BlockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known headers (all forks included).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a header entry. Every entry except genesis must name a known
    /// predecessor; the height is derived from it.
    pub fn insert(&mut self, mut entry: IndexEntry) -> ChainResult<usize> {
        if self.by_hash.contains_key(&entry.hash) {
            return Err(ChainError::DuplicateBlock(entry.hash));
        }
        match entry.prev {
            Some(prev) => {
                let prev_entry = self
                    .entries
                    .get(prev)
                    .ok_or_else(|| ChainError::Corrupted(format!("bad prev id {prev}")))?;
                entry.height = prev_entry.height + 1;
            }
            None => {
                if !self.entries.is_empty() {
                    return Err(ChainError::Corrupted(
                        "second genesis entry rejected".to_string(),
                    ));
                }
                entry.height = 0;
            }
        }
        let id = self.entries.len();
        self.by_hash.insert(entry.hash, id);
        self.entries.push(entry);
        Ok(id)
    }

    /// Arena id of a block hash.
    pub fn get(&self, hash: &BlockHash) -> Option<usize> {
        self.by_hash.get(hash).copied()
    }

    pub fn entry(&self, id: usize) -> &IndexEntry {
        &self.entries[id]
    }

    pub fn entry_mut(&mut self, id: usize) -> &mut IndexEntry {
        &mut self.entries[id]
    }

    pub fn prev_of(&self, id: usize) -> Option<usize> {
        self.entries[id].prev
    }

    /// Active-chain height; panics on an empty index.
    pub fn active_height(&self) -> u32 {
        self.entries[*self.active.last().expect("active chain empty")].height
    }

    /// Arena id of the active tip.
    pub fn active_tip(&self) -> Option<usize> {
        self.active.last().copied()
    }

    /// Arena id of the active block at `height`.
    pub fn active_at(&self, height: u32) -> Option<usize> {
        self.active.get(height as usize).copied()
    }

    /// True when `id` lies on the active chain.
    pub fn active_contains(&self, id: usize) -> bool {
        let height = self.entries[id].height;
        self.active_at(height) == Some(id)
    }

    /// The active successor of `id`, if any.
    pub fn active_next(&self, id: usize) -> Option<usize> {
        if !self.active_contains(id) {
            return None;
        }
        self.active_at(self.entries[id].height + 1)
    }

    /// Make the chain ending at `id` the active chain. Only the chain
    /// manager calls this; consensus code never writes membership.
    pub fn activate(&mut self, id: usize) {
        let height = self.entries[id].height as usize;
        self.active.truncate(height + 1);
        self.active.resize(height + 1, usize::MAX);
        let mut cursor = Some(id);
        while let Some(cur) = cursor {
            let h = self.entries[cur].height as usize;
            if self.active.get(h).copied() == Some(cur) {
                break;
            }
            self.active[h] = cur;
            cursor = self.entries[cur].prev;
        }
    }

    /// Median time past over the last 11 blocks ending at `id`.
    pub fn median_time_past(&self, id: usize) -> i64 {
        let mut times = Vec::with_capacity(11);
        let mut cursor = Some(id);
        while let Some(cur) = cursor {
            if times.len() == 11 {
                break;
            }
            times.push(self.entries[cur].block_time());
            cursor = self.entries[cur].prev;
        }
        times.sort_unstable();
        times[times.len() / 2]
    }

    /// Required proof target for a block of `algo` following `prev`.
    ///
    /// Returns the bits of the nearest ancestor using the same algorithm, or
    /// the algorithm's limit when there is none or retargeting is off; the
    /// full averaging retarget lives in the external difficulty module.
    pub fn next_work_required(&self, params: &ConsensusParams, prev: usize, algo: Algo) -> u32 {
        let limit = params.pow_limit_bits(algo);
        if params.pow_no_retargeting {
            return limit;
        }
        let mut cursor = Some(prev);
        while let Some(cur) = cursor {
            let entry = &self.entries[cur];
            let entry_matches = if algo == Algo::Pos {
                entry.is_proof_of_stake()
            } else {
                !entry.is_proof_of_stake() && entry.algo() == algo
            };
            if entry_matches {
                return entry.bits;
            }
            if entry.height == 0 {
                break;
            }
            cursor = entry.prev;
        }
        limit
    }
}

/// Convenience constructor for fresh entries awaiting modifier computation.
impl IndexEntry {
    pub fn new(hash: BlockHash, prev: Option<usize>, version: i32, time: u32, bits: u32) -> Self {
        IndexEntry {
            hash,
            height: 0,
            prev,
            version,
            time,
            bits,
            flags: 0,
            stake_modifier: 0,
            modifier_checksum: 0,
            proof_hash: Hash256::ZERO,
        }
    }
}
