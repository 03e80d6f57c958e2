//! Block headers and blocks.

use crate::hash::{hash256, Hash256};
use crate::pow::{pow_hash, Algo};
use crate::serialize::{Encodable, Encoder};
use crate::transaction::Transaction;
use crate::BlockHash;

/// Block header. The proof algorithm is encoded in `version`
/// (see [`Algo::from_version`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_hash: BlockHash,
    pub merkle_root: Hash256,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// The content hash identifying this block.
    pub fn hash(&self) -> BlockHash {
        hash256(&self.consensus_bytes())
    }

    pub fn algo(&self) -> Algo {
        Algo::from_version(self.version)
    }

    /// The proof hash under this header's algorithm.
    pub fn pow_hash(&self) -> Hash256 {
        pow_hash(self.algo(), &self.consensus_bytes())
    }
}

impl Encodable for BlockHeader {
    fn consensus_encode(&self, enc: &mut Encoder) {
        enc.put_i32(self.version);
        enc.put_hash(&self.prev_hash);
        enc.put_hash(&self.merkle_root);
        enc.put_u32(self.time);
        enc.put_u32(self.bits);
        enc.put_u32(self.nonce);
    }
}

/// A block: header, transactions and (for proof-of-stake) the block
/// signature over the header hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub txs: Vec<Transaction>,
    pub signature: Vec<u8>,
}

impl Block {
    pub fn hash(&self) -> BlockHash {
        self.header.hash()
    }

    pub fn block_time(&self) -> u32 {
        self.header.time
    }

    /// A block is proof-of-stake when its second transaction is a coinstake.
    pub fn is_proof_of_stake(&self) -> bool {
        self.txs.len() > 1 && self.txs[1].is_coinstake()
    }

    pub fn coinstake(&self) -> Option<&Transaction> {
        if self.is_proof_of_stake() {
            Some(&self.txs[1])
        } else {
            None
        }
    }

    /// Total block weight including transactions.
    pub fn weight(&self) -> u64 {
        let header_weight = self.header.consensus_size() as u64 * 4;
        header_weight + self.txs.iter().map(|tx| tx.weight()).sum::<u64>()
    }
}

impl Encodable for Block {
    fn consensus_encode(&self, enc: &mut Encoder) {
        self.header.consensus_encode(enc);
        enc.put_var_int(self.txs.len() as u64);
        for tx in &self.txs {
            tx.consensus_encode(enc);
        }
        enc.put_var_bytes(&self.signature);
    }
}
