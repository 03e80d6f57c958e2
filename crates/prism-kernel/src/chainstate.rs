//! The in-memory chain state.
//!
//! `Chainstate` owns the block index behind the chain lock (`L_chain` in the
//! locking order), validates and connects new blocks, and writes the cached
//! stake modifier fields exactly once per entry. It is the `ChainManager`
//! implementation the assembler and minter run against.

use crate::modifier::{
    check_stake_modifier_checkpoints, compute_next_stake_modifier, stake_entropy_bit,
    stake_modifier_checksum,
};
use crate::verify::{check_coinstake_timestamp, check_proof_of_stake, ScriptVerifier,
    TransactionProvider};
use parking_lot::RwLock;
use prism_chain::{
    BlockIndex, ChainError, ChainManager, ChainResult, Clock, IndexEntry,
    BLOCK_FLAG_GENERATED_MODIFIER, BLOCK_FLAG_PROOF_OF_STAKE, BLOCK_FLAG_STAKE_ENTROPY,
};
use prism_consensus::ChainParams;
use prism_primitives::{
    block_merkle_root, compact_to_target, Algo, Block, BlockHash, Hash256, Transaction, Txid,
    MAX_BLOCK_WEIGHT,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// In-memory chain state: block index, active chain and transaction index.
pub struct Chainstate {
    params: Arc<ChainParams>,
    clock: Arc<dyn Clock>,
    scripts: Arc<dyn ScriptVerifier>,
    index: RwLock<BlockIndex>,
    txs: RwLock<HashMap<Txid, (Transaction, BlockHash)>>,
    print_modifier: bool,
}

impl Chainstate {
    /// Create a chain state holding only the genesis entry.
    pub fn new(
        params: Arc<ChainParams>,
        scripts: Arc<dyn ScriptVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut index = BlockIndex::new();
        let consensus = &params.consensus;
        let mut genesis = IndexEntry::new(
            consensus.genesis_hash,
            None,
            consensus.genesis_version,
            consensus.genesis_time,
            consensus.genesis_bits,
        );
        genesis.flags |= BLOCK_FLAG_GENERATED_MODIFIER;
        genesis.modifier_checksum =
            stake_modifier_checksum(None, genesis.flags, &Hash256::ZERO, 0);
        let id = index.insert(genesis).expect("empty index accepts genesis");
        index.activate(id);

        Self {
            params,
            clock,
            scripts,
            index: RwLock::new(index),
            txs: RwLock::new(HashMap::new()),
            print_modifier: false,
        }
    }

    /// Enable verbose modifier tracing (`-printstakemodifier`).
    pub fn with_print_modifier(mut self, enabled: bool) -> Self {
        self.print_modifier = enabled;
        self
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Run `f` under the chain read lock.
    pub fn with_index<R>(&self, f: impl FnOnce(&BlockIndex) -> R) -> R {
        f(&self.index.read())
    }

    /// Take the chain read lock (`L_chain`) for the caller's scope. Template
    /// construction holds this guard across the whole call.
    pub fn read_index(&self) -> parking_lot::RwLockReadGuard<'_, BlockIndex> {
        self.index.read()
    }

    /// Run `f` under the chain write lock. Reserved for the validator and
    /// test fixtures; consensus code never mutates entries elsewhere.
    pub fn with_index_mut<R>(&self, f: impl FnOnce(&mut BlockIndex) -> R) -> R {
        f(&mut self.index.write())
    }

    /// Structural and proof validity of `block` on top of `prev`. Callers
    /// already holding the chain lock pass their own `index` view.
    pub fn validate_block(
        &self,
        index: &BlockIndex,
        block: &Block,
        prev: usize,
        check_pow: bool,
        check_merkle: bool,
    ) -> ChainResult<Hash256> {
        let consensus = &self.params.consensus;
        let header = &block.header;

        if block.txs.is_empty() || !block.txs[0].is_coinbase() {
            return Err(ChainError::InvalidBlock("first tx must be coinbase".into()));
        }
        for (i, tx) in block.txs.iter().enumerate().skip(1) {
            if tx.is_coinbase() {
                return Err(ChainError::InvalidBlock("multiple coinbases".into()));
            }
            if i > 1 && tx.is_coinstake() {
                return Err(ChainError::InvalidBlock("coinstake out of position".into()));
            }
        }
        if block.weight() > MAX_BLOCK_WEIGHT {
            return Err(ChainError::InvalidBlock("block over weight limit".into()));
        }
        if check_merkle && block_merkle_root(block) != header.merkle_root {
            return Err(ChainError::InvalidBlock("merkle root mismatch".into()));
        }

        if let Some(coinstake) = block.coinstake() {
            // The coinstake timestamp is the block timestamp.
            if !check_coinstake_timestamp(consensus, header.time as i64, coinstake.time as i64) {
                return Err(ChainError::InvalidBlock(
                    "coinstake timestamp does not meet protocol".into(),
                ));
            }
            // The coinbase carries no value in a proof-of-stake block; only
            // the zero-value commitment output may follow the empty slot.
            if block.txs[0].outputs.is_empty()
                || !block.txs[0].outputs[0].is_empty()
                || block.txs[0].outputs.iter().skip(1).any(|out| out.value != 0)
            {
                return Err(ChainError::InvalidBlock(
                    "coinbase must be empty in proof-of-stake block".into(),
                ));
            }
            if !check_pow {
                return Ok(Hash256::ZERO);
            }
            self.scripts
                .verify_block_signature(block)
                .map_err(ChainError::InvalidProofOfStake)?;
            let proof = check_proof_of_stake(
                &self.params,
                index,
                prev,
                coinstake,
                header.bits,
                coinstake.time,
                self,
                self.scripts.as_ref(),
                self.clock.adjusted_now(),
                self.print_modifier,
            )
            .map_err(|err| ChainError::InvalidProofOfStake(err.to_string()))?;
            return Ok(proof.proof_hash);
        }

        if !check_pow {
            return Ok(Hash256::ZERO);
        }
        let decoded = compact_to_target(header.bits);
        if !decoded.is_valid() || decoded.target > consensus.pow_limit(header.algo()) {
            return Err(ChainError::InvalidProofOfWork("bits out of range".into()));
        }
        let proof = header.pow_hash();
        if proof.to_biguint() > decoded.target {
            return Err(ChainError::InvalidProofOfWork("hash above target".into()));
        }
        Ok(proof)
    }
}

impl TransactionProvider for Chainstate {
    fn get_transaction(&self, txid: &Txid) -> Option<(Transaction, BlockHash)> {
        self.txs.read().get(txid).cloned()
    }
}

impl ChainManager for Chainstate {
    fn process_new_block(&self, block: &Block) -> ChainResult<()> {
        let hash = block.hash();
        let consensus = &self.params.consensus;
        let mut index = self.index.write();

        if index.get(&hash).is_some() {
            return Err(ChainError::DuplicateBlock(hash));
        }
        let prev = index
            .get(&block.header.prev_hash)
            .ok_or(ChainError::OrphanBlock(block.header.prev_hash))?;
        let extends_tip = index.active_tip() == Some(prev);
        let height = index.entry(prev).height + 1;

        let proof_hash = self.validate_block(&index, block, prev, true, true)?;

        let mut entry = IndexEntry::new(
            hash,
            Some(prev),
            block.header.version,
            block.header.time,
            block.header.bits,
        );
        entry.proof_hash = proof_hash;
        if block.is_proof_of_stake() {
            entry.flags |= BLOCK_FLAG_PROOF_OF_STAKE;
        }
        if stake_entropy_bit(consensus, block, self.print_modifier) == 1 {
            entry.flags |= BLOCK_FLAG_STAKE_ENTROPY;
        }

        let (modifier, generated) =
            compute_next_stake_modifier(&self.params, &index, Some(prev), self.print_modifier)
                .map_err(|err| ChainError::InvalidBlock(err.to_string()))?;
        entry.stake_modifier = modifier;
        if generated {
            entry.flags |= BLOCK_FLAG_GENERATED_MODIFIER;
        }

        let prev_checksum = index.entry(prev).modifier_checksum;
        entry.modifier_checksum =
            stake_modifier_checksum(Some(prev_checksum), entry.flags, &entry.proof_hash, modifier);
        if !check_stake_modifier_checkpoints(consensus, height, entry.modifier_checksum) {
            return Err(ChainError::ModifierCheckpointMismatch {
                height,
                checksum: entry.modifier_checksum,
            });
        }

        let id = index.insert(entry)?;
        if extends_tip {
            index.activate(id);
            info!(
                height,
                hash = %hash,
                pos = block.is_proof_of_stake(),
                modifier = format!("{modifier:#018x}"),
                "Connected block"
            );
        } else {
            debug!(height, hash = %hash, "Stored side-chain block");
        }
        drop(index);

        let mut txs = self.txs.write();
        for tx in &block.txs {
            txs.insert(tx.txid(), (tx.clone(), hash));
        }
        Ok(())
    }

    fn lookup(&self, hash: &BlockHash) -> Option<IndexEntry> {
        let index = self.index.read();
        index.get(hash).map(|id| index.entry(id).clone())
    }

    fn active_tip(&self) -> IndexEntry {
        let index = self.index.read();
        let id = index.active_tip().expect("index always holds genesis");
        index.entry(id).clone()
    }

    fn active_next(&self, entry: &IndexEntry) -> Option<IndexEntry> {
        let index = self.index.read();
        let id = index.get(&entry.hash)?;
        index.active_next(id).map(|next| index.entry(next).clone())
    }

    fn active_height(&self) -> u32 {
        self.index.read().active_height()
    }

    fn median_time_past(&self, hash: &BlockHash) -> Option<i64> {
        let index = self.index.read();
        index.get(hash).map(|id| index.median_time_past(id))
    }

    fn next_work_required(&self, prev: &BlockHash, algo: Algo) -> Option<u32> {
        let index = self.index.read();
        index
            .get(prev)
            .map(|id| index.next_work_required(&self.params.consensus, id, algo))
    }

    fn test_block_validity(
        &self,
        block: &Block,
        check_pow: bool,
        check_merkle: bool,
    ) -> ChainResult<()> {
        let index = self.index.read();
        let prev = index
            .get(&block.header.prev_hash)
            .ok_or(ChainError::OrphanBlock(block.header.prev_hash))?;
        self.validate_block(&index, block, prev, check_pow, check_merkle)
            .map(|_| ())
    }
}
