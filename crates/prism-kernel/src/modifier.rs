//! The stake modifier engine.
//!
//! The stake modifier prevents a coin owner from computing future
//! proofs-of-stake at the time the coin confirms: to satisfy the kernel
//! protocol the coin must hash with a modifier taken from chain history it
//! could not have known. The modifier is a 64-bit value whose bits are
//! contributed by blocks selected from a past window, re-rolled once per
//! modifier interval rather than every block so an attacker cannot gain
//! control of extra bits by extending the chain.

use crate::{KernelError, KernelResult};
use num_bigint::BigUint;
use prism_chain::BlockIndex;
use prism_consensus::{ChainParams, ConsensusParams, Network, StakeEra};
use prism_primitives::{hash160, hash256, Block, Encoder, Hash256};
use std::collections::HashSet;
use tracing::debug;

/// Fixed modifier of the first block ("stakemod" in ASCII).
pub const FIRST_BLOCK_MODIFIER: u64 = 0x7374_616b_656d_6f64;

/// Resolved kernel modifier with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModifierInfo {
    pub modifier: u64,
    pub height: u32,
    pub time: i64,
}

/// Duration (seconds) of selection round `section`.
///
/// The sections form a geometric series: early rounds get short windows,
/// widening up to one full modifier interval for the last round.
pub fn selection_interval_section(params: &ConsensusParams, section: u32) -> i64 {
    assert!(section < 64);
    let interval = params.modifier_interval as i64;
    let ratio = params.modifier_interval_ratio as i64;
    interval * 63 / (63 + (63 - section as i64) * (ratio - 1))
}

/// Total duration (seconds) of all 64 selection rounds.
pub fn selection_interval(params: &ConsensusParams) -> i64 {
    (0..64)
        .map(|section| selection_interval_section(params, section))
        .sum()
}

/// Last generated modifier at or before `id`, with its generation time.
fn last_stake_modifier(index: &BlockIndex, id: usize) -> KernelResult<(u64, i64)> {
    let mut cursor = id;
    while index.prev_of(cursor).is_some() && !index.entry(cursor).generated_stake_modifier() {
        cursor = index.prev_of(cursor).expect("checked above");
    }
    let entry = index.entry(cursor);
    if !entry.generated_stake_modifier() {
        return Err(KernelError::NoGenerationAtGenesis);
    }
    Ok((entry.stake_modifier, entry.block_time()))
}

/// Ranking hash of a candidate block: H(block_hash || prev_modifier) read as
/// a little-endian integer, shifted right 32 bits for proof-of-stake blocks
/// so stake always beats work of equal raw hash.
fn selection_hash(candidate: &Hash256, prev_modifier: u64, is_pos: bool) -> BigUint {
    let mut enc = Encoder::with_capacity(40);
    enc.put_hash(candidate);
    enc.put_u64(prev_modifier);
    let mut value = hash256(enc.as_slice()).to_biguint();
    if is_pos {
        value >>= 32;
    }
    value
}

/// Select the candidate with the smallest selection hash whose timestamp is
/// within `stop`, excluding already-selected blocks. Ties keep the earliest
/// candidate in `sorted` order.
fn select_block_from_candidates(
    index: &BlockIndex,
    sorted: &[(i64, Hash256, usize)],
    selected: &HashSet<usize>,
    stop: i64,
    prev_modifier: u64,
    round: u32,
) -> KernelResult<usize> {
    let mut best: Option<(BigUint, usize)> = None;
    for &(time, ref hash, id) in sorted {
        if best.is_some() && time > stop {
            break;
        }
        if selected.contains(&id) {
            continue;
        }
        let rank = selection_hash(hash, prev_modifier, index.entry(id).is_proof_of_stake());
        match &best {
            Some((best_rank, _)) if rank >= *best_rank => {}
            _ => best = Some((rank, id)),
        }
    }
    best.map(|(_, id)| id)
        .ok_or(KernelError::SelectionFailed { round })
}

/// Compute the stake modifier of the block following `prev`.
///
/// Returns `(modifier, generated)`: the modifier is inherited unchanged while
/// the previous block's time stays inside the current modifier interval, and
/// freshly generated from 64 selected contributor blocks once the interval
/// rolls over.
pub fn compute_next_stake_modifier(
    params: &ChainParams,
    index: &BlockIndex,
    prev: Option<usize>,
    print_modifier: bool,
) -> KernelResult<(u64, bool)> {
    let consensus = &params.consensus;
    let prev = match prev {
        None => return Ok((0, true)), // genesis modifier is zero
        Some(prev) => prev,
    };

    // The first block gets a fixed modifier; only regtest keeps using it.
    if index.entry(prev).height == 0 || params.network == Network::Regtest {
        return Ok((FIRST_BLOCK_MODIFIER, true));
    }

    let (prev_modifier, prev_modifier_time) = last_stake_modifier(index, prev)?;
    let interval = consensus.modifier_interval as i64;
    let prev_block_time = index.entry(prev).block_time();
    if print_modifier {
        debug!(
            modifier = format!("{prev_modifier:#018x}"),
            time = prev_modifier_time,
            "compute_next_stake_modifier: prev modifier"
        );
    }
    if prev_modifier_time / interval >= prev_block_time / interval {
        // Same interval: keep the current modifier.
        return Ok((prev_modifier, false));
    }

    // Gather candidate blocks reaching back one full selection interval
    // before the interval boundary, oldest first.
    let selection_start = (prev_block_time / interval) * interval - selection_interval(consensus);
    let mut candidates: Vec<(i64, Hash256, usize)> = Vec::new();
    let mut cursor = Some(prev);
    while let Some(id) = cursor {
        let entry = index.entry(id);
        if entry.block_time() < selection_start {
            break;
        }
        candidates.push((entry.block_time(), entry.hash, id));
        cursor = index.prev_of(id);
    }

    // Sort by (time, hash as little-endian integer). The key is total, so
    // any prior ordering of equal-time candidates is irrelevant.
    candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.to_biguint().cmp(&b.1.to_biguint())));

    // Pick one contributor block per round and take its entropy bit.
    let mut new_modifier: u64 = 0;
    let mut selected: HashSet<usize> = HashSet::new();
    let mut stop = selection_start;
    let rounds = 64.min(candidates.len() as u32);
    for round in 0..rounds {
        stop += selection_interval_section(consensus, round);
        let id = select_block_from_candidates(
            index,
            &candidates,
            &selected,
            stop,
            prev_modifier,
            round,
        )?;
        let entry = index.entry(id);
        new_modifier |= (entry.stake_entropy_bit() as u64) << round;
        selected.insert(id);
        if print_modifier {
            debug!(
                round,
                stop,
                height = entry.height,
                bit = entry.stake_entropy_bit(),
                "compute_next_stake_modifier: selected block"
            );
        }
    }

    if print_modifier {
        debug!(
            modifier = format!("{new_modifier:#018x}"),
            time = prev_block_time,
            "compute_next_stake_modifier: new modifier"
        );
    }
    Ok((new_modifier, true))
}

/// Resolve the modifier a stake attempt at `time_tx` must hash with.
///
/// * Post-upgrade (v0.5): walk backwards from `prev` to the most recent
///   modifier generated at least (min-age − selection-interval) before the
///   stake time. The tip being too recent is a transient failure.
/// * Pre-upgrade (v0.3): walk forwards from the coin's block for one
///   selection interval, over the active chain where possible and otherwise
///   over a temporary chain built down from `prev`.
pub fn kernel_stake_modifier(
    params: &ChainParams,
    index: &BlockIndex,
    prev: usize,
    block_from: usize,
    time_tx: u32,
    adjusted_now: i64,
) -> KernelResult<ModifierInfo> {
    let consensus = &params.consensus;
    let next_height = index.entry(prev).height + 1;
    if consensus.era_for(next_height) == StakeEra::V05 {
        kernel_stake_modifier_v05(consensus, index, prev, time_tx)
    } else {
        kernel_stake_modifier_v03(consensus, index, prev, block_from, adjusted_now)
    }
}

fn kernel_stake_modifier_v05(
    consensus: &ConsensusParams,
    index: &BlockIndex,
    prev: usize,
    time_tx: u32,
) -> KernelResult<ModifierInfo> {
    let min_age = consensus.stake_min_age[StakeEra::V05.index()] as i64;
    let interval = selection_interval(consensus);

    let mut cursor = prev;
    let mut modifier_height = index.entry(prev).height;
    let mut modifier_time = index.entry(prev).block_time();

    if modifier_time + min_age - interval <= time_tx as i64 {
        // The tip has not outrun the stake window yet.
        return Err(KernelError::ModifierUnavailable(format!(
            "best block {} at height {} too old for stake",
            index.entry(prev).hash,
            index.entry(prev).height
        )));
    }
    while modifier_time + min_age - interval > time_tx as i64 {
        cursor = index.prev_of(cursor).ok_or(KernelError::ReachedGenesis)?;
        let entry = index.entry(cursor);
        if entry.generated_stake_modifier() {
            modifier_height = entry.height;
            modifier_time = entry.block_time();
        }
    }
    Ok(ModifierInfo {
        modifier: index.entry(cursor).stake_modifier,
        height: modifier_height,
        time: modifier_time,
    })
}

fn kernel_stake_modifier_v03(
    consensus: &ConsensusParams,
    index: &BlockIndex,
    prev: usize,
    block_from: usize,
    adjusted_now: i64,
) -> KernelResult<ModifierInfo> {
    let from_entry = index.entry(block_from);
    let from_time = from_entry.block_time();
    let mut modifier_height = from_entry.height;
    let mut modifier_time = from_time;
    let interval = selection_interval(consensus);
    let min_age = consensus.stake_min_age[StakeEra::V05.index()] as i64;

    // The walk cannot rely on the active chain alone: the block being
    // validated may extend a fork. Build a temporary chain from `prev` down
    // to the first active ancestor and step through it after the active part.
    let depth = index.entry(prev).height as i64 - (from_entry.height as i64 - 1);
    let mut tmp_chain: Vec<usize> = Vec::new();
    let mut cursor = prev;
    for _ in 1..=depth.max(0) {
        if index.active_contains(cursor) {
            break;
        }
        tmp_chain.push(cursor);
        match index.prev_of(cursor) {
            Some(p) => cursor = p,
            None => break,
        }
    }
    tmp_chain.reverse();

    let mut taken = 0usize;
    let mut id = block_from;
    while modifier_time < from_time + interval {
        let old_entry = index.entry(id);
        let use_tmp = !tmp_chain.is_empty()
            && old_entry.height + 1 >= index.entry(tmp_chain[0]).height;
        let next = if use_tmp {
            let next = tmp_chain.get(taken).copied();
            taken += 1;
            next
        } else {
            index.active_next(id)
        };
        let next = match next {
            Some(next) => next,
            None => {
                // Reached the best block; may happen while behind on sync.
                // Only noteworthy when the coin is otherwise old enough.
                let msg = format!(
                    "reached best block {} at height {}",
                    old_entry.hash, old_entry.height
                );
                if old_entry.block_time() + min_age - interval > adjusted_now {
                    debug!("kernel_stake_modifier: {msg}");
                }
                return Err(KernelError::ModifierUnavailable(msg));
            }
        };
        id = next;
        let entry = index.entry(id);
        if entry.generated_stake_modifier() {
            modifier_height = entry.height;
            modifier_time = entry.block_time();
        }
    }
    Ok(ModifierInfo {
        modifier: index.entry(id).stake_modifier,
        height: modifier_height,
        time: modifier_time,
    })
}

/// Entropy bit contributed by a block to future modifiers.
///
/// Post-upgrade headers use the low bit of the block hash; older blocks take
/// bit 31 of limb 4 of the signature's Hash160.
pub fn stake_entropy_bit(consensus: &ConsensusParams, block: &Block, print_modifier: bool) -> u8 {
    let bit = if block.header.version >= consensus.upgrade_block_version[1] {
        (block.hash().low_u64() & 1) as u8
    } else {
        let sig_hash = hash160(&block.signature);
        (sig_hash.le_limb(4) >> 31) as u8
    };
    if print_modifier {
        debug!(
            time = block.header.time,
            hash = %block.hash(),
            bit,
            "stake_entropy_bit"
        );
    }
    bit
}

/// Running checksum binding a block's stake state to its ancestry:
/// H(prev_checksum || flags || proof_hash || modifier) truncated to the top
/// 32 bits of the little-endian interpretation.
pub fn stake_modifier_checksum(
    prev_checksum: Option<u32>,
    flags: u32,
    proof_hash: &Hash256,
    modifier: u64,
) -> u32 {
    let mut enc = Encoder::with_capacity(48);
    if let Some(prev) = prev_checksum {
        enc.put_u32(prev);
    }
    enc.put_u32(flags);
    enc.put_hash(proof_hash);
    enc.put_u64(modifier);
    let digest = hash256(enc.as_slice());
    u32::from_le_bytes(digest.as_bytes()[28..32].try_into().expect("4 bytes"))
}

/// Verify a checksum against the hard checkpoint table. Heights without an
/// entry pass silently.
pub fn check_stake_modifier_checkpoints(
    consensus: &ConsensusParams,
    height: u32,
    checksum: u32,
) -> bool {
    match consensus.stake_modifier_checkpoints.get(&height) {
        Some(&expected) => expected == checksum,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_chain::{IndexEntry, BLOCK_FLAG_GENERATED_MODIFIER, BLOCK_FLAG_STAKE_ENTROPY};
    use prism_consensus::RegtestOverrides;

    fn testnet_params() -> ChainParams {
        ChainParams::testnet()
    }

    fn regtest_params() -> ChainParams {
        ChainParams::regtest(&RegtestOverrides::default()).unwrap()
    }

    /// Build a linear active chain of `len` synthetic entries spaced
    /// `spacing` seconds apart, first block at `start`.
    fn build_index(len: usize, start: u32, spacing: u32, entropy: impl Fn(usize) -> bool) -> BlockIndex {
        let mut index = BlockIndex::new();
        let mut prev = None;
        for i in 0..len {
            let mut entry = IndexEntry::new(
                hash256(&(i as u32).to_le_bytes()),
                prev,
                4,
                start + spacing * i as u32,
                0x1d00_ffff,
            );
            entry.flags |= BLOCK_FLAG_GENERATED_MODIFIER;
            if entropy(i) {
                entry.flags |= BLOCK_FLAG_STAKE_ENTROPY;
            }
            entry.stake_modifier = i as u64;
            let id = index.insert(entry).unwrap();
            index.activate(id);
            prev = Some(id);
        }
        index
    }

    #[test]
    fn test_selection_interval_sections_widen() {
        let params = testnet_params();
        let first = selection_interval_section(&params.consensus, 0);
        let last = selection_interval_section(&params.consensus, 63);
        assert!(first < last, "early rounds get shorter sections");
        assert_eq!(last, params.consensus.modifier_interval as i64);
        // Worst case bound from the data model: M * 63.
        assert!(selection_interval(&params.consensus) <= 63 * params.consensus.modifier_interval as i64);
    }

    #[test]
    fn test_genesis_modifier_is_zero() {
        let params = testnet_params();
        let index = BlockIndex::new();
        let (modifier, generated) =
            compute_next_stake_modifier(&params, &index, None, false).unwrap();
        assert_eq!(modifier, 0);
        assert!(generated);
    }

    #[test]
    fn test_first_block_modifier_sentinel() {
        let params = testnet_params();
        let index = build_index(1, 1_000_000, 64, |_| false);
        let (modifier, generated) =
            compute_next_stake_modifier(&params, &index, Some(0), false).unwrap();
        assert_eq!(modifier, FIRST_BLOCK_MODIFIER);
        assert!(generated);
    }

    #[test]
    fn test_regtest_always_uses_sentinel() {
        let params = regtest_params();
        let index = build_index(20, 1_000_000, 32, |_| false);
        let (modifier, generated) =
            compute_next_stake_modifier(&params, &index, Some(19), false).unwrap();
        assert_eq!(modifier, FIRST_BLOCK_MODIFIER);
        assert!(generated);
    }

    #[test]
    fn test_modifier_inherited_within_interval() {
        let params = testnet_params();
        // Two blocks one second apart: same modifier interval.
        let mut index = build_index(2, 1_000_000, 1, |_| false);
        // Make both carry the same generated modifier state.
        index.entry_mut(1).stake_modifier = index.entry(0).stake_modifier;
        let (modifier, generated) =
            compute_next_stake_modifier(&params, &index, Some(1), false).unwrap();
        assert_eq!(modifier, index.entry(1).stake_modifier);
        assert!(!generated, "same interval inherits");
    }

    /// Clear the generated flag on every entry but genesis, so the last
    /// generated modifier is old enough to force a fresh roll.
    fn clear_generated_above_genesis(index: &mut BlockIndex, len: usize) {
        for id in 1..len {
            index.entry_mut(id).flags &= !BLOCK_FLAG_GENERATED_MODIFIER;
        }
    }

    #[test]
    fn test_modifier_generated_after_interval_rollover() {
        let params = testnet_params();
        let interval = params.consensus.modifier_interval;
        // Blocks spaced two intervals apart always roll over.
        let mut index = build_index(8, 1_000_000, interval * 2, |i| i % 2 == 0);
        clear_generated_above_genesis(&mut index, 8);
        let (_, generated) =
            compute_next_stake_modifier(&params, &index, Some(7), false).unwrap();
        assert!(generated);
    }

    #[test]
    fn test_generated_modifier_collects_entropy_bits() {
        let params = testnet_params();
        let interval = params.consensus.modifier_interval;
        // All entropy bits set: every selected round contributes a one.
        let mut index = build_index(8, 1_000_000, interval * 2, |_| true);
        clear_generated_above_genesis(&mut index, 8);
        let (modifier, generated) =
            compute_next_stake_modifier(&params, &index, Some(7), false).unwrap();
        assert!(generated);
        assert_ne!(modifier, 0);
        // With fewer than 64 candidates only the low rounds can be set.
        assert_eq!(modifier & !((1u64 << 8) - 1), 0);
    }

    #[test]
    fn test_selection_hash_favors_pos() {
        let hash = hash256(b"candidate");
        let pow_rank = selection_hash(&hash, 42, false);
        let pos_rank = selection_hash(&hash, 42, true);
        assert_eq!(pos_rank, pow_rank >> 32);
    }

    #[test]
    fn test_candidate_sort_is_total() {
        // Equal times fall back to the little-endian integer order.
        let a = Hash256::from_biguint(&BigUint::from(5u8));
        let b = Hash256::from_biguint(&BigUint::from(7u8));
        let mut v = vec![(10i64, b, 1usize), (10i64, a, 0usize)];
        v.sort_by(|x, y| x.0.cmp(&y.0).then_with(|| x.1.to_biguint().cmp(&y.1.to_biguint())));
        assert_eq!(v[0].2, 0);
    }

    #[test]
    fn test_kernel_modifier_v05_walks_back() {
        let params = testnet_params();
        let spacing = 600u32;
        let index = build_index(64, 1_000_000, spacing, |_| false);
        let tip = 63usize;
        // A stake far enough past the tip resolves to some ancestor modifier.
        let min_age = params.consensus.stake_min_age[1] as i64;
        let interval = selection_interval(&params.consensus);
        let tip_time = index.entry(tip).block_time();
        let time_tx = (tip_time + min_age - interval - 10) as u32;
        // Upgrade block is 0 on testnet, so the v0.5 walk applies.
        let info = kernel_stake_modifier(&params, &index, tip, 0, time_tx, tip_time).unwrap();
        assert!(info.height <= 63);
        assert_eq!(info.modifier, index.entry(info.height as usize).stake_modifier);
    }

    #[test]
    fn test_kernel_modifier_v05_best_block_too_old() {
        let params = testnet_params();
        let index = build_index(4, 1_000_000, 600, |_| false);
        let tip_time = index.entry(3).block_time();
        // A stake time far in the future fails transiently.
        let min_age = params.consensus.stake_min_age[1] as i64;
        let time_tx = (tip_time + min_age) as u32;
        let err = kernel_stake_modifier(&params, &index, 3, 0, time_tx, tip_time).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_kernel_modifier_v03_walks_forward() {
        let mut params = ChainParams::main();
        // Force the pre-upgrade era for all heights.
        params.consensus.mandatory_upgrade_block = [u32::MAX, u32::MAX];
        let interval = selection_interval(&params.consensus);
        let spacing = 80u32;
        let blocks = (interval as u32 / spacing + 10) as usize;
        let index = build_index(blocks, 1_000_000, spacing, |_| false);
        let tip = blocks - 1;
        let info =
            kernel_stake_modifier(&params, &index, tip, 0, 1_000_000, 2_000_000_000).unwrap();
        // The forward walk lands one selection interval past the coin block.
        let expected_time = 1_000_000i64 + interval;
        assert!(info.time >= expected_time - spacing as i64 * 2);
        assert!((info.height as usize) < blocks);
    }

    #[test]
    fn test_kernel_modifier_v03_reaches_best_block() {
        let mut params = ChainParams::main();
        params.consensus.mandatory_upgrade_block = [u32::MAX, u32::MAX];
        // Far fewer blocks than one selection interval of history.
        let index = build_index(4, 1_000_000, 80, |_| false);
        let err = kernel_stake_modifier(&params, &index, 3, 0, 1_000_000, 1_000_000).unwrap_err();
        assert!(err.is_transient());
    }

    fn bare_block(version: i32, time: u32) -> Block {
        use prism_primitives::{BlockHeader, OutPoint, Transaction, TxIn, TxOut};
        let mut coinbase = Transaction::new(time);
        coinbase.inputs.push(TxIn::new(OutPoint::null()));
        coinbase.outputs.push(TxOut::empty());
        Block {
            header: BlockHeader {
                version,
                prev_hash: Hash256::ZERO,
                merkle_root: Hash256::ZERO,
                time,
                bits: 0x1d00_ffff,
                nonce: 0,
            },
            txs: vec![coinbase],
            signature: Vec::new(),
        }
    }

    #[test]
    fn test_entropy_bit_post_upgrade_is_hash_low_bit() {
        let params = testnet_params();
        let block = bare_block(9, 1_000_000);
        let bit = stake_entropy_bit(&params.consensus, &block, false);
        assert_eq!(bit as u64, block.hash().low_u64() & 1);
    }

    #[test]
    fn test_entropy_bit_pre_upgrade_uses_signature() {
        let mut params = ChainParams::main();
        params.consensus.upgrade_block_version = [i32::MAX, i32::MAX];
        let mut block = bare_block(4, 1_000_000);
        block.signature = vec![0xab; 72];
        let bit = stake_entropy_bit(&params.consensus, &block, false);
        let expected = (hash160(&block.signature).le_limb(4) >> 31) as u8;
        assert_eq!(bit, expected);
    }

    #[test]
    fn test_checksum_changes_with_inputs() {
        let proof = hash256(b"proof");
        let base = stake_modifier_checksum(Some(1), 0, &proof, 42);
        assert_ne!(base, stake_modifier_checksum(Some(2), 0, &proof, 42));
        assert_ne!(base, stake_modifier_checksum(Some(1), 1, &proof, 42));
        assert_ne!(base, stake_modifier_checksum(Some(1), 0, &proof, 43));
    }

    #[test]
    fn test_checkpoints_pass_when_absent() {
        let params = regtest_params();
        assert!(check_stake_modifier_checkpoints(&params.consensus, 10, 0xdead_beef));
    }

    #[test]
    fn test_checkpoints_enforced_when_present() {
        let params = testnet_params();
        let expected = params.consensus.stake_modifier_checkpoints[&0];
        assert!(check_stake_modifier_checkpoints(&params.consensus, 0, expected));
        assert!(!check_stake_modifier_checkpoints(&params.consensus, 0, expected ^ 1));
    }
}
