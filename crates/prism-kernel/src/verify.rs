//! Coinstake verification.

use crate::kernel::{check_kernel, StakeProof};
use crate::{KernelError, KernelResult};
use prism_chain::BlockIndex;
use prism_consensus::{ChainParams, ConsensusParams};
use prism_primitives::{Block, BlockHash, Transaction, TxOut, Txid};
use tracing::debug;

/// Source of indexed transactions (the external transaction index).
pub trait TransactionProvider: Send + Sync {
    /// The transaction and the hash of its containing block.
    fn get_transaction(&self, txid: &Txid) -> Option<(Transaction, BlockHash)>;
}

/// Script execution seam. Full script validation is an external collaborator;
/// the kernel only needs input and block-signature verification.
pub trait ScriptVerifier: Send + Sync {
    /// Verify input `index` of `tx` against the output it spends.
    fn verify_input(&self, tx: &Transaction, index: usize, prev_out: &TxOut)
        -> Result<(), String>;

    /// Verify the block signature against the coinstake's output key.
    fn verify_block_signature(&self, block: &Block) -> Result<(), String>;
}

/// The coinstake timestamp protocol: the transaction carries the block time
/// and that time falls on a timestamp-slot boundary.
pub fn check_coinstake_timestamp(consensus: &ConsensusParams, time_block: i64, time_tx: i64) -> bool {
    time_block == time_tx && time_tx & consensus.stake_timestamp_mask as i64 == 0
}

/// Verify a coinstake transaction: resolve its kernel prevout, check the
/// kernel input's script, then run the kernel target test.
#[allow(clippy::too_many_arguments)]
pub fn check_proof_of_stake(
    params: &ChainParams,
    index: &BlockIndex,
    prev: usize,
    tx: &Transaction,
    bits: u32,
    time_tx: u32,
    txs: &dyn TransactionProvider,
    scripts: &dyn ScriptVerifier,
    adjusted_now: i64,
    print_proof: bool,
) -> KernelResult<StakeProof> {
    if !tx.is_coinstake() {
        return Err(KernelError::NotCoinstake(tx.txid()));
    }

    // Kernel input 0 must match the stake hash target per coin (bits).
    let prevout = tx.inputs[0].prevout;
    let (prev_tx, block_hash) = txs
        .get_transaction(&prevout.txid)
        .ok_or(KernelError::PrevoutNotFound(prevout.txid))?;
    let block_from = index
        .get(&block_hash)
        .ok_or(KernelError::BlockNotIndexed(block_hash))?;
    let prev_out = prev_tx
        .outputs
        .get(prevout.vout as usize)
        .ok_or(KernelError::PrevoutNotFound(prevout.txid))?;

    scripts
        .verify_input(tx, 0, prev_out)
        .map_err(|reason| KernelError::InvalidSignature {
            txid: tx.txid(),
            reason,
        })?;

    let proof = check_kernel(
        params,
        index,
        prev,
        block_from,
        prev_out.value,
        &prevout,
        time_tx,
        bits,
        adjusted_now,
        print_proof,
    );
    if let Err(err) = &proof {
        // May occur during initial download or while behind on sync.
        debug!(txid = %tx.txid(), "check_proof_of_stake: kernel check failed: {err}");
    }
    proof
}
