//! Coinstake creation.

use crate::{AssemblerOptions, MinerError, MinerResult};
use prism_chain::BlockIndex;
use prism_consensus::{block_subsidy, fill_treasury_outputs, ChainParams};
use prism_kernel::search_kernel;
use prism_primitives::{Amount, Script, ScriptType, Transaction, TxIn, TxOut, COIN};
use prism_wallet::{Coin, StakingWallet, SIGHASH_ALL};
use tracing::{debug, warn};

/// Coin age consumed by a kernel input, in coin-days. Accrual is capped at
/// the era's maximum stake age.
fn coin_age_days(params: &ChainParams, coin: &Coin, height: u32, time_tx: u32) -> u64 {
    let age = time_tx.saturating_sub(coin.time) as u64;
    let capped = age.min(params.consensus.stake_max_age_at(height) as u64);
    (coin.value as u128 * capped as u128 / COIN as u128 / 86_400) as u64
}

/// Search the wallet's stakable coins for a kernel and build the signed
/// coinstake. `block_time` is aligned forward to a timestamp slot first and
/// carries the winning kernel time back to the caller. Returns `Ok(None)`
/// when no coin produced a kernel this tick.
#[allow(clippy::too_many_arguments)]
pub(crate) fn create_coinstake(
    params: &ChainParams,
    index: &BlockIndex,
    wallet: &dyn StakingWallet,
    height: u32,
    prev: usize,
    block_time: &mut u32,
    bits: u32,
    options: &AssemblerOptions,
    adjusted_now: i64,
) -> MinerResult<Option<Transaction>> {
    let consensus = &params.consensus;

    // Align the candidate time to the next timestamp slot.
    while *block_time & consensus.stake_timestamp_mask != 0 {
        *block_time += 1;
    }

    // Wallet lock is taken after the chain and mempool locks, never before.
    let coins = wallet.select_stake_coins();
    let start_height = index.entry(prev).height;
    let abort = || index.active_height() != start_height;

    for coin in coins {
        if abort() {
            break;
        }
        let Some(block_from) = index.active_at(coin.height) else {
            debug!(outpoint = ?coin.outpoint, "Stake input not on the active chain");
            continue;
        };

        // Only consider coins meeting the era's age and depth floors.
        let from_time = index.entry(block_from).time;
        if from_time + consensus.stake_min_age_at(height) > *block_time
            || height - coin.height < consensus.stake_min_depth_at(height)
        {
            continue;
        }

        let found = match search_kernel(
            params,
            index,
            prev,
            block_from,
            coin.value,
            &coin.outpoint,
            *block_time,
            options.hash_drift,
            bits,
            adjusted_now,
            &abort,
            options.print_coinstake,
        ) {
            Ok(Some(proof)) => proof,
            Ok(None) => continue,
            Err(err) => {
                debug!(outpoint = ?coin.outpoint, "Kernel search skipped coin: {err}");
                continue;
            }
        };
        if options.print_coinstake {
            debug!(outpoint = ?coin.outpoint, time = found.time, "Kernel found");
        }

        // Derive the output script: key-hash forms are converted to
        // pay-to-pubkey with the wallet's stored key.
        let script_out = match coin.script_pubkey.classify() {
            ScriptType::PubKey(_) => coin.script_pubkey.clone(),
            ScriptType::PubKeyHash(id) | ScriptType::WitnessKeyHash(id) => {
                match wallet.get_key(&id) {
                    Some(key) => Script::pay_to_pubkey(&key.pubkey),
                    None => {
                        debug!(outpoint = ?coin.outpoint, "No key for kernel script");
                        continue;
                    }
                }
            }
            ScriptType::NonStandard => {
                debug!(outpoint = ?coin.outpoint, "Unsupported kernel script form");
                continue;
            }
        };

        *block_time = found.time;
        let mut coinstake = Transaction::new(found.time);
        coinstake.inputs.push(TxIn::new(coin.outpoint));
        coinstake.outputs.push(TxOut::empty());

        let coin_age = coin_age_days(params, &coin, height, found.time);
        let reward = block_subsidy(consensus, height, true, coin_age);
        if reward <= 0 {
            // Refuse to mint a zero or negative reward.
            warn!(height, coin_age, "Stake reward would be zero; cancelling");
            return Ok(None);
        }
        let credit: Amount = coin.value + reward;
        coinstake.outputs.push(TxOut::new(credit, script_out));
        fill_treasury_outputs(consensus, height, &mut coinstake.outputs);

        let prev_out = TxOut::new(coin.value, coin.script_pubkey.clone());
        wallet
            .sign_input(&mut coinstake, 0, &prev_out, SIGHASH_ALL)
            .map_err(MinerError::Wallet)?;

        return Ok(Some(coinstake));
    }

    Ok(None)
}
