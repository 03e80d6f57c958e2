//! Merkle roots and the witness commitment.

use crate::block::Block;
use crate::hash::{hash256, Hash256};
use crate::script::{Script, OP_RETURN};

/// Marker bytes prefixing the witness commitment output.
pub const WITNESS_COMMITMENT_HEADER: [u8; 4] = [0xaa, 0x21, 0xa9, 0xed];

/// Merkle root over a list of leaf hashes, duplicating the last node of odd
/// levels.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    if leaves.is_empty() {
        return Hash256::ZERO;
    }
    let mut level: Vec<Hash256> = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        for pair in level.chunks(2) {
            let left = pair[0];
            let right = if pair.len() == 2 { pair[1] } else { pair[0] };
            let mut data = [0u8; 64];
            data[..32].copy_from_slice(left.as_bytes());
            data[32..].copy_from_slice(right.as_bytes());
            next.push(hash256(&data));
        }
        level = next;
    }
    level[0]
}

/// Merkle root over the block's transaction ids.
pub fn block_merkle_root(block: &Block) -> Hash256 {
    let txids: Vec<Hash256> = block.txs.iter().map(|tx| tx.txid()).collect();
    merkle_root(&txids)
}

/// Merkle root over witness transaction ids; the coinbase leaf is zero.
pub fn witness_merkle_root(block: &Block) -> Hash256 {
    let mut leaves: Vec<Hash256> = Vec::with_capacity(block.txs.len());
    for (i, tx) in block.txs.iter().enumerate() {
        leaves.push(if i == 0 { Hash256::ZERO } else { tx.wtxid() });
    }
    merkle_root(&leaves)
}

/// The witness commitment value: H(witness root || reserved value).
pub fn witness_commitment(block: &Block) -> Hash256 {
    let root = witness_merkle_root(block);
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(root.as_bytes());
    hash256(&data)
}

/// The coinbase output script carrying the witness commitment.
pub fn witness_commitment_script(commitment: &Hash256) -> Script {
    let mut payload = Vec::with_capacity(36);
    payload.extend_from_slice(&WITNESS_COMMITMENT_HEADER);
    payload.extend_from_slice(commitment.as_bytes());
    let mut script = Script::from_bytes(vec![OP_RETURN]);
    script.push_data(&payload);
    script
}
