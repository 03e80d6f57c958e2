//! The kernel protocol.
//!
//! A coinstake's kernel (input 0) must satisfy
//! `hash(modifier || block-from time || prevout || tx time) <= target * weight`
//! so the chance of minting is proportional to the stake held. The modifier
//! scrambles the computation with chain entropy the coin owner could not
//! have predicted at confirmation time; the block-from time and prevout
//! fields keep simultaneous minters from colliding on the same kernel.
//!
//! [`check_kernel`] is the validator side and [`search_kernel`] the minter
//! side; both run the identical hash and target test.

use crate::modifier::{kernel_stake_modifier, ModifierInfo};
use crate::{KernelError, KernelResult};
use num_bigint::BigUint;
use prism_chain::BlockIndex;
use prism_consensus::ChainParams;
use prism_primitives::{compact_to_target, hash256, Algo, Amount, Encoder, Hash256, OutPoint};
use tracing::debug;

/// A kernel that satisfied the target test.
#[derive(Debug, Clone)]
pub struct StakeProof {
    /// The winning proof hash.
    pub proof_hash: Hash256,
    /// The modifier hashed into the proof.
    pub modifier: ModifierInfo,
    /// The transaction time the proof was found at.
    pub time: u32,
}

/// The stake hash of one kernel attempt.
pub fn stake_hash(
    modifier: u64,
    time_block_from: u32,
    prevout: &OutPoint,
    time_tx: u32,
) -> Hash256 {
    let mut enc = Encoder::with_capacity(52);
    enc.put_u64(modifier);
    enc.put_u32(time_block_from);
    enc.put_u32(prevout.vout);
    enc.put_hash(&prevout.txid);
    enc.put_u32(time_tx);
    hash256(enc.as_slice())
}

/// Test a proof hash against the per-coin target.
///
/// The stake weight is the raw output value post-upgrade and value / 100
/// before it.
pub fn stake_target_hit(
    proof_hash: &Hash256,
    value: Amount,
    target_per_coin: &BigUint,
    full_weight: bool,
) -> bool {
    let weight = if full_weight { value } else { value / 100 };
    if weight <= 0 {
        return false;
    }
    proof_hash.to_biguint() <= BigUint::from(weight as u64) * target_per_coin
}

/// Shared preconditions of check and search. Returns the decoded target and
/// whether the full-weight rule applies.
fn kernel_preconditions(
    params: &ChainParams,
    index: &BlockIndex,
    prev: usize,
    block_from: usize,
    time_tx: u32,
    bits: u32,
) -> KernelResult<(BigUint, bool)> {
    let consensus = &params.consensus;
    let height = index.entry(prev).height + 1;
    let from_entry = index.entry(block_from);
    let time_block_from = from_entry.time;
    let min_age = consensus.stake_min_age_at(height);
    let min_depth = consensus.stake_min_depth_at(height);

    if time_tx < time_block_from {
        return Err(KernelError::TimestampViolation {
            time_tx,
            time_block_from,
        });
    }
    if time_block_from + min_age > time_tx {
        return Err(KernelError::MinAgeViolation {
            height,
            from_height: from_entry.height,
            time_block_from,
            min_age,
            time_tx,
        });
    }
    let depth = height - from_entry.height;
    if depth < min_depth {
        return Err(KernelError::MinDepthViolation { depth, min_depth });
    }

    let decoded = compact_to_target(bits);
    if !decoded.is_valid() || decoded.target > consensus.pow_limit(Algo::Pos) {
        return Err(KernelError::BadTarget { bits });
    }

    Ok((decoded.target, consensus.era_for(height).is_upgraded()))
}

/// Validator-side kernel check: compute the stake hash once at `time_tx` and
/// apply the target test.
#[allow(clippy::too_many_arguments)]
pub fn check_kernel(
    params: &ChainParams,
    index: &BlockIndex,
    prev: usize,
    block_from: usize,
    value: Amount,
    prevout: &OutPoint,
    time_tx: u32,
    bits: u32,
    adjusted_now: i64,
    print_proof: bool,
) -> KernelResult<StakeProof> {
    let (target, full_weight) =
        kernel_preconditions(params, index, prev, block_from, time_tx, bits)?;
    let modifier = kernel_stake_modifier(
        params,
        index,
        prev,
        block_from,
        time_tx,
        adjusted_now,
    )?;

    let time_block_from = index.entry(block_from).time;
    let proof_hash = stake_hash(modifier.modifier, time_block_from, prevout, time_tx);
    if print_proof {
        debug!(
            modifier = format!("{:#018x}", modifier.modifier),
            modifier_height = modifier.height,
            from_height = index.entry(block_from).height,
            time_tx,
            proof = %proof_hash,
            "check_kernel"
        );
    }

    let height = index.entry(prev).height + 1;
    if stake_target_hit(&proof_hash, value, &target, full_weight)
        || params.consensus.allows_historic_stake_bypass(height)
    {
        Ok(StakeProof {
            proof_hash,
            modifier,
            time: time_tx,
        })
    } else {
        Err(KernelError::TargetMissed { proof: proof_hash })
    }
}

/// Minter-side kernel search over the forward drift window.
///
/// Tries `time_tx = base_time + i` for `i` from `hash_drift` down to zero,
/// stepping one timestamp slot per iteration post-upgrade. `hash_drift` must
/// already be aligned to the stake timestamp mask. Returns `Ok(None)` when
/// no slot hits, the modifier is transiently unavailable, or `abort`
/// observes a new tip.
#[allow(clippy::too_many_arguments)]
pub fn search_kernel(
    params: &ChainParams,
    index: &BlockIndex,
    prev: usize,
    block_from: usize,
    value: Amount,
    prevout: &OutPoint,
    base_time: u32,
    hash_drift: u32,
    bits: u32,
    adjusted_now: i64,
    abort: &dyn Fn() -> bool,
    print_proof: bool,
) -> KernelResult<Option<StakeProof>> {
    let consensus = &params.consensus;
    debug_assert_eq!(hash_drift & consensus.stake_timestamp_mask, 0);

    let (target, full_weight) =
        kernel_preconditions(params, index, prev, block_from, base_time, bits)?;
    let modifier = match kernel_stake_modifier(
        params,
        index,
        prev,
        block_from,
        base_time,
        adjusted_now,
    ) {
        Ok(info) => info,
        Err(err) if err.is_transient() => {
            debug!("search_kernel: {err}");
            return Ok(None);
        }
        Err(err) => return Err(err),
    };

    let height = index.entry(prev).height + 1;
    let iteration = if consensus.era_for(height).is_upgraded() {
        consensus.stake_timestamp_mask + 1
    } else {
        1
    };
    let time_block_from = index.entry(block_from).time;

    let mut i = hash_drift as i64;
    while i >= 0 {
        // A new block arrived; this search is stale.
        if abort() {
            return Ok(None);
        }
        let try_time = base_time + i as u32;
        let proof_hash = stake_hash(modifier.modifier, time_block_from, prevout, try_time);
        if stake_target_hit(&proof_hash, value, &target, full_weight) {
            if print_proof {
                debug!(
                    modifier = format!("{:#018x}", modifier.modifier),
                    try_time,
                    proof = %proof_hash,
                    "search_kernel: kernel found"
                );
            }
            return Ok(Some(StakeProof {
                proof_hash,
                modifier,
                time: try_time,
            }));
        }
        i -= iteration as i64;
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_chain::{IndexEntry, BLOCK_FLAG_GENERATED_MODIFIER};
    use prism_consensus::{ChainParams, RegtestOverrides};
    use prism_primitives::{hash256, COIN};

    fn regtest_params() -> ChainParams {
        ChainParams::regtest(&RegtestOverrides::default()).unwrap()
    }

    /// Regtest-style index: an old genesis, the block containing the staked
    /// coin aged `age` seconds, and a fresh tip. Returns (index, tip, from).
    fn staking_index(age: u32, now: u32) -> (BlockIndex, usize, usize) {
        let mut index = BlockIndex::new();
        let mut genesis =
            IndexEntry::new(hash256(b"genesis"), None, 4, now - age - 3600, 0x207f_ffff);
        genesis.flags |= BLOCK_FLAG_GENERATED_MODIFIER;
        let genesis_id = index.insert(genesis).unwrap();
        index.activate(genesis_id);

        let mut coin_block =
            IndexEntry::new(hash256(b"from"), Some(genesis_id), 4, now - age, 0x207f_ffff);
        coin_block.flags |= BLOCK_FLAG_GENERATED_MODIFIER;
        coin_block.stake_modifier = crate::FIRST_BLOCK_MODIFIER;
        let from_id = index.insert(coin_block).unwrap();
        index.activate(from_id);

        let mut tip = IndexEntry::new(hash256(b"tip"), Some(from_id), 4, now - 16, 0x207f_ffff);
        tip.flags |= BLOCK_FLAG_GENERATED_MODIFIER;
        tip.stake_modifier = crate::FIRST_BLOCK_MODIFIER;
        let tip_id = index.insert(tip).unwrap();
        index.activate(tip_id);
        (index, tip_id, from_id)
    }

    #[test]
    fn test_stake_hash_is_deterministic() {
        let prevout = OutPoint::new(hash256(b"coin"), 1);
        let a = stake_hash(42, 1000, &prevout, 2000);
        let b = stake_hash(42, 1000, &prevout, 2000);
        assert_eq!(a, b);
        assert_ne!(a, stake_hash(43, 1000, &prevout, 2000));
        assert_ne!(a, stake_hash(42, 1001, &prevout, 2000));
        assert_ne!(a, stake_hash(42, 1000, &prevout, 2001));
        assert_ne!(a, stake_hash(42, 1000, &OutPoint::new(hash256(b"coin"), 2), 2000));
    }

    #[test]
    fn test_target_hit_boundary_is_exact() {
        let value: Amount = 10_000;
        let target = BigUint::from(1_000_000u64);
        let bound = BigUint::from(value as u64) * &target;

        let exactly = Hash256::from_biguint(&bound);
        assert!(stake_target_hit(&exactly, value, &target, true));

        let above = Hash256::from_biguint(&(bound + 1u32));
        assert!(!stake_target_hit(&above, value, &target, true));
    }

    #[test]
    fn test_target_weight_era_division() {
        let value: Amount = 1000;
        let target = BigUint::from(1u64);
        let proof = Hash256::from_biguint(&BigUint::from(500u32));
        // Full weight: bound 1000; divided weight: bound 10.
        assert!(stake_target_hit(&proof, value, &target, true));
        assert!(!stake_target_hit(&proof, value, &target, false));
    }

    #[test]
    fn test_zero_weight_never_hits() {
        let target = BigUint::from(u64::MAX);
        assert!(!stake_target_hit(&Hash256::ZERO, 0, &target, true));
        assert!(!stake_target_hit(&Hash256::ZERO, 50, &target, false));
    }

    #[test]
    fn test_check_kernel_min_age_boundary() {
        let params = regtest_params();
        let now = 2_000_000;
        let min_age = params.consensus.stake_min_age_at(3);
        // Coin aged exactly min_age passes the age gate.
        let (index, tip, from) = staking_index(min_age, now);
        let prevout = OutPoint::new(hash256(b"coin"), 0);
        let result = check_kernel(
            &params, &index, tip, from, 10_000 * COIN, &prevout, now, 0x207f_ffff, now as i64,
            false,
        );
        assert!(!matches!(result, Err(KernelError::MinAgeViolation { .. })));

        // One second younger fails.
        let (index, tip, from) = staking_index(min_age - 1, now);
        let result = check_kernel(
            &params, &index, tip, from, 10_000 * COIN, &prevout, now, 0x207f_ffff, now as i64,
            false,
        );
        assert!(matches!(result, Err(KernelError::MinAgeViolation { .. })));
    }

    #[test]
    fn test_check_kernel_min_depth_boundary() {
        let mut params = regtest_params();
        let now = 2_000_000;
        let (index, tip, from) = staking_index(7200, now);
        let prevout = OutPoint::new(hash256(b"coin"), 0);
        // The coin sits two blocks below the next height.
        params.consensus.stake_min_depth = [2, 2];
        let result = check_kernel(
            &params, &index, tip, from, 10_000 * COIN, &prevout, now, 0x207f_ffff, now as i64,
            false,
        );
        assert!(!matches!(result, Err(KernelError::MinDepthViolation { .. })));

        // One more required confirmation fails.
        params.consensus.stake_min_depth = [3, 3];
        let result = check_kernel(
            &params, &index, tip, from, 10_000 * COIN, &prevout, now, 0x207f_ffff, now as i64,
            false,
        );
        assert!(matches!(result, Err(KernelError::MinDepthViolation { .. })));
    }

    #[test]
    fn test_check_kernel_rejects_time_before_block_from() {
        let params = regtest_params();
        let now = 2_000_000;
        let (index, tip, from) = staking_index(3600, now);
        let prevout = OutPoint::new(hash256(b"coin"), 0);
        let early = index.entry(from).time - 1;
        let result = check_kernel(
            &params, &index, tip, from, COIN, &prevout, early, 0x207f_ffff, now as i64, false,
        );
        assert!(matches!(result, Err(KernelError::TimestampViolation { .. })));
    }

    #[test]
    fn test_check_kernel_rejects_bad_bits() {
        let params = regtest_params();
        let now = 2_000_000;
        let (index, tip, from) = staking_index(3600, now);
        let prevout = OutPoint::new(hash256(b"coin"), 0);
        for bits in [0u32, 0x2080_0001 /* negative */, 0xff00_ffff /* overflow */] {
            let result = check_kernel(
                &params, &index, tip, from, COIN, &prevout, now, bits, now as i64, false,
            );
            assert!(matches!(result, Err(KernelError::BadTarget { .. })), "{bits:#x}");
        }
    }

    #[test]
    fn test_search_and_verify_agree() {
        // Round-trip property: the time found by search passes check with
        // identical modifier, prevout and amount.
        let params = regtest_params();
        let now: u32 = 2_000_000;
        let (index, tip, from) = staking_index(7200, now);
        let prevout = OutPoint::new(hash256(b"coin"), 0);
        let value = 10_000 * COIN;
        let base = now & !params.consensus.stake_timestamp_mask;

        let found = search_kernel(
            &params, &index, tip, from, value, &prevout, base, 16, 0x207f_ffff, now as i64,
            &|| false, false,
        )
        .unwrap()
        .expect("regtest limit target must hit");

        let verified = check_kernel(
            &params, &index, tip, from, value, &prevout, found.time, 0x207f_ffff, now as i64,
            false,
        )
        .unwrap();
        assert_eq!(verified.proof_hash, found.proof_hash);
        assert_eq!(verified.modifier, found.modifier);
    }

    #[test]
    fn test_search_aborts_when_tip_moves() {
        let params = regtest_params();
        let now: u32 = 2_000_000;
        let (index, tip, from) = staking_index(7200, now);
        let prevout = OutPoint::new(hash256(b"coin"), 0);
        let base = now & !params.consensus.stake_timestamp_mask;
        let result = search_kernel(
            &params, &index, tip, from, 10_000 * COIN, &prevout, base, 16, 0x207f_ffff,
            now as i64, &|| true, false,
        )
        .unwrap();
        assert!(result.is_none(), "tip advance must cancel the search");
    }

    #[test]
    fn test_search_steps_by_timestamp_slots() {
        let params = regtest_params();
        let now: u32 = 2_000_000;
        let (index, tip, from) = staking_index(7200, now);
        let prevout = OutPoint::new(hash256(b"coin"), 0);
        let base = now & !params.consensus.stake_timestamp_mask;
        let mask = params.consensus.stake_timestamp_mask;

        let found = search_kernel(
            &params, &index, tip, from, 10_000 * COIN, &prevout, base, 4 * (mask + 1),
            0x207f_ffff, now as i64, &|| false, false,
        )
        .unwrap()
        .expect("hit");
        // Post-upgrade (upgrade height 0) slots stay mask-aligned.
        assert_eq!(found.time & mask, 0);
    }
}
