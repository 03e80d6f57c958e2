//! Block subsidy and treasury schedule.

use crate::params::ConsensusParams;
use prism_primitives::{Amount, TxOut, CENT, COIN};

/// Annual stake reward, per-cent of coin value.
const STAKE_REWARD_PERCENT: Amount = 5;

/// The subsidy of a block at `height`.
///
/// Proof-of-work blocks earn the halving schedule; proof-of-stake blocks earn
/// a reward proportional to the consumed coin age (`coin_age` in coin-days).
pub fn block_subsidy(
    params: &ConsensusParams,
    height: u32,
    proof_of_stake: bool,
    coin_age: u64,
) -> Amount {
    if proof_of_stake {
        if height < params.pos_start_block {
            return 0;
        }
        return coin_age as Amount * STAKE_REWARD_PERCENT * CENT / 365;
    }

    if height > params.last_pow_block {
        return 0;
    }
    let halvings = height / params.subsidy_halving_interval;
    if halvings >= 64 {
        return 0;
    }
    (50 * COIN) >> halvings
}

/// The per-block treasury amount at `height`; zero before payments start.
pub fn treasury_payment(params: &ConsensusParams, height: u32) -> Amount {
    if height >= params.treasury_payments_start_block {
        params.treasury_payment
    } else {
        0
    }
}

/// Append the treasury outputs for `height` to a reward transaction.
pub fn fill_treasury_outputs(params: &ConsensusParams, height: u32, outputs: &mut Vec<TxOut>) {
    let payment = treasury_payment(params, height);
    if payment <= 0 {
        return;
    }
    for payee in &params.treasury_payees {
        outputs.push(TxOut::new(
            payment * payee.percent as Amount / 100,
            payee.script.clone(),
        ));
    }
}
