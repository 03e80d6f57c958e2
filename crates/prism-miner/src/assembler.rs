//! Block template construction.
//!
//! Transaction selection orders the pool by ancestor score: the better of a
//! transaction's own feerate and its feerate evaluated together with all its
//! unconfirmed ancestors. Since selected transactions stay in the pool,
//! entries whose ancestors were just included are re-scored into a modified
//! set, and each round compares the best modified entry against the next
//! pool entry.

use crate::coinstake::create_coinstake;
use crate::{
    MinerError, MinerResult, COINBASE_SIGOPS_RESERVE, COINBASE_WEIGHT_RESERVE,
    DEFAULT_BLOCK_MAX_WEIGHT, MAX_CONSECUTIVE_FAILURES,
};
use parking_lot::Mutex;
use prism_chain::Clock;
use prism_consensus::{block_subsidy, compute_block_version, fill_treasury_outputs, ChainParams};
use prism_kernel::Chainstate;
use prism_mempool::{FeeRate, Mempool, MempoolEntry, MempoolView};
use prism_primitives::{
    block_merkle_root, witness_commitment, witness_commitment_script, Algo, Amount, Block,
    BlockHeader, Hash256, OutPoint, Script, Transaction, TxIn, TxOut, Txid,
    MAX_BLOCK_SIGOPS_COST, MAX_BLOCK_WEIGHT,
};
use prism_wallet::StakingWallet;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
use std::sync::Arc;
use tracing::{debug, info};

/// Assembler configuration.
#[derive(Debug, Clone)]
pub struct AssemblerOptions {
    /// Block weight budget (`-blockmaxweight`).
    pub max_weight: u64,
    /// Floor feerate for inclusion (`-blockmintxfee`).
    pub min_fee_rate: FeeRate,
    /// Forward search window for the kernel, mask-aligned seconds.
    pub hash_drift: u32,
    /// Log per-package selection decisions (`-printpriority`).
    pub print_priority: bool,
    /// Log coinstake progress (`-printcoinstake`).
    pub print_coinstake: bool,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self {
            max_weight: DEFAULT_BLOCK_MAX_WEIGHT,
            min_fee_rate: FeeRate::from_per_kvb(0),
            hash_drift: 0,
            print_priority: false,
            print_coinstake: false,
        }
    }
}

/// One template slot: the transaction with its fee and sigop cost.
#[derive(Debug, Clone)]
pub struct TemplateEntry {
    pub tx: Transaction,
    pub txid: Txid,
    pub wtxid: Txid,
    pub fee: Amount,
    pub weight: u64,
    pub sigop_cost: u64,
}

/// An assembled block template.
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    pub block: Block,
    /// Slot metadata: `[coinbase, coinstake?, transactions...]`.
    pub entries: Vec<TemplateEntry>,
    pub total_fees: Amount,
    pub weight: u64,
    pub sigop_cost: u64,
}

/// Rolling assembler statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssemblerStats {
    pub last_block_tx_count: u64,
    pub last_block_weight: u64,
}

/// Block assembler.
pub struct BlockAssembler {
    params: Arc<ChainParams>,
    chain: Arc<Chainstate>,
    mempool: Arc<Mempool>,
    options: AssemblerOptions,
    /// Last adjusted time a coinstake search ran; searches only move forward.
    last_search_time: AtomicI64,
    stats: Mutex<AssemblerStats>,
}

/// Package aggregates of an entry whose ancestor state shifted because some
/// ancestors are already in the block.
#[derive(Debug, Clone)]
struct PackageEntry {
    txid: Txid,
    fee: Amount,
    vsize: u64,
    sequence: u64,
    count_with_ancestors: u64,
    weight_with_ancestors: u64,
    fees_with_ancestors: Amount,
    sigops_with_ancestors: u64,
}

impl PackageEntry {
    fn from_pool(entry: &MempoolEntry) -> Self {
        Self {
            txid: entry.txid,
            fee: entry.fee,
            vsize: entry.vsize,
            sequence: entry.sequence,
            count_with_ancestors: entry.count_with_ancestors,
            weight_with_ancestors: entry.weight_with_ancestors,
            fees_with_ancestors: entry.fees_with_ancestors,
            sigops_with_ancestors: entry.sigops_with_ancestors,
        }
    }

    fn vsize_with_ancestors(&self) -> u64 {
        (self.weight_with_ancestors + 3) / 4
    }

    /// Score by the higher of own and package feerate.
    fn score(&self) -> (Amount, u64) {
        let own = self.fee as i128 * self.vsize_with_ancestors() as i128;
        let package = self.fees_with_ancestors as i128 * self.vsize as i128;
        if own > package {
            (self.fee, self.vsize)
        } else {
            (self.fees_with_ancestors, self.vsize_with_ancestors())
        }
    }
}

fn compare_feerate(a: (Amount, u64), b: (Amount, u64)) -> Ordering {
    (a.0 as i128 * b.1 as i128).cmp(&(b.0 as i128 * a.1 as i128))
}

/// Best-first order over package entries.
fn package_order(a: &PackageEntry, b: &PackageEntry) -> Ordering {
    compare_feerate(b.score(), a.score())
        .then_with(|| a.sequence.cmp(&b.sequence))
        .then_with(|| a.txid.cmp(&b.txid))
}

impl BlockAssembler {
    pub fn new(
        params: Arc<ChainParams>,
        chain: Arc<Chainstate>,
        mempool: Arc<Mempool>,
        mut options: AssemblerOptions,
    ) -> Self {
        // Keep the weight budget sane regardless of configuration.
        options.max_weight = options
            .max_weight
            .clamp(COINBASE_WEIGHT_RESERVE, MAX_BLOCK_WEIGHT - COINBASE_WEIGHT_RESERVE);
        Self {
            params,
            chain,
            mempool,
            options,
            last_search_time: AtomicI64::new(0),
            stats: Mutex::new(AssemblerStats::default()),
        }
    }

    pub fn stats(&self) -> AssemblerStats {
        *self.stats.lock()
    }

    /// Build a candidate block on the active tip.
    ///
    /// With a wallet the template is proof-of-stake: a coinstake is searched
    /// for and installed at slot 1, and [`MinerError::StakeNotFound`] is
    /// returned when no kernel was found this tick.
    pub fn create_new_block(
        &self,
        script_pubkey: &Script,
        wallet: Option<&dyn StakingWallet>,
    ) -> MinerResult<BlockTemplate> {
        // Lock order: chain, then mempool; both held for the whole call.
        let index = self.chain.read_index();
        let view = self.mempool.view();
        let consensus = &self.params.consensus;
        let now = self.chain.clock().adjusted_now();

        let prev = index
            .active_tip()
            .ok_or_else(|| MinerError::TemplateFailed("block index is empty".into()))?;
        let prev_entry = index.entry(prev).clone();
        let height = prev_entry.height + 1;
        let proof_of_stake = wallet.is_some();
        let algo = if proof_of_stake { Algo::Pos } else { Algo::PowSha256d };

        let mut block_time = now.max(0) as u32;
        let mut coinbase = Transaction::new(block_time);
        coinbase.inputs.push(TxIn::new(OutPoint::null()));
        coinbase.outputs.push(TxOut::new(0, script_pubkey.clone()));
        if !proof_of_stake {
            coinbase.outputs[0].value = block_subsidy(consensus, height, false, 0);
            fill_treasury_outputs(consensus, height, &mut coinbase.outputs);
        }

        let version = compute_block_version(consensus, height, algo);
        let median_time_past = index.median_time_past(prev);
        let bits = index.next_work_required(consensus, prev, algo);
        let lock_time_cutoff = median_time_past;
        let include_witness = height >= consensus.segwit_height;

        let (mut entries, mut weight, mut sigop_cost, total_fees) =
            self.select_packages(&view, height, lock_time_cutoff, include_witness);
        entries = canonical_order(entries);

        let mut coinstake = None;
        if proof_of_stake {
            // Only one search per adjusted-time second.
            let last = self.last_search_time.swap(now, AtomicOrdering::SeqCst);
            if now <= last {
                return Err(MinerError::StakeNotFound);
            }
            let found = create_coinstake(
                &self.params,
                &index,
                wallet.expect("proof-of-stake template has a wallet"),
                height,
                prev,
                &mut block_time,
                bits,
                &self.options,
                now,
            )?;
            match found {
                Some(tx) => {
                    // The coinstake timestamp protocol binds the block time.
                    if block_time as i64 <= median_time_past
                        || block_time & consensus.stake_timestamp_mask != 0
                    {
                        return Err(MinerError::StakeNotFound);
                    }
                    coinbase.outputs[0].set_empty();
                    weight += tx.weight();
                    sigop_cost += tx.sigop_cost();
                    coinstake = Some(tx);
                }
                None => return Err(MinerError::StakeNotFound),
            }
        }

        coinbase.time = block_time;
        coinbase.inputs[0].script_sig = Script::coinbase_script_sig(height);

        let header_time = if proof_of_stake {
            block_time
        } else {
            // max(median time past + 1, adjusted now)
            block_time.max((median_time_past + 1) as u32)
        };

        let mut txs = Vec::with_capacity(entries.len() + 2);
        txs.push(coinbase);
        if let Some(tx) = coinstake.clone() {
            txs.push(tx);
        }
        txs.extend(entries.iter().map(|entry| entry.tx.clone()));

        let mut block = Block {
            header: BlockHeader {
                version,
                prev_hash: prev_entry.hash,
                merkle_root: Hash256::ZERO,
                time: header_time,
                bits,
                nonce: 0,
            },
            txs,
            signature: Vec::new(),
        };

        // Commit to the witness ids, then seal the merkle root.
        let commitment = witness_commitment(&block);
        block.txs[0]
            .outputs
            .push(TxOut::new(0, witness_commitment_script(&commitment)));
        block.header.merkle_root = block_merkle_root(&block);

        self.chain
            .validate_block(&index, &block, prev, false, false)?;

        let tx_count = block.txs.len() as u64;
        {
            let mut stats = self.stats.lock();
            stats.last_block_tx_count = tx_count;
            stats.last_block_weight = weight;
        }
        info!(
            height,
            txs = tx_count,
            weight,
            fees = total_fees,
            sigops = sigop_cost,
            pos = proof_of_stake,
            "Assembled block template"
        );

        let coinbase_entry = TemplateEntry {
            tx: block.txs[0].clone(),
            txid: block.txs[0].txid(),
            wtxid: block.txs[0].wtxid(),
            fee: -total_fees,
            weight: block.txs[0].weight(),
            sigop_cost: block.txs[0].sigop_cost(),
        };
        let mut all_entries = vec![coinbase_entry];
        if let Some(tx) = coinstake {
            all_entries.push(TemplateEntry {
                txid: tx.txid(),
                wtxid: tx.wtxid(),
                fee: 0,
                weight: tx.weight(),
                sigop_cost: tx.sigop_cost(),
                tx,
            });
        }
        all_entries.append(&mut entries);

        Ok(BlockTemplate {
            block,
            entries: all_entries,
            total_fees,
            weight,
            sigop_cost,
        })
    }

    /// Ancestor-feerate package selection.
    fn select_packages(
        &self,
        view: &MempoolView<'_>,
        height: u32,
        lock_time_cutoff: i64,
        include_witness: bool,
    ) -> (Vec<TemplateEntry>, u64, u64, Amount) {
        let mut selected: Vec<TemplateEntry> = Vec::new();
        let mut in_block: HashSet<Txid> = HashSet::new();
        let mut failed: HashSet<Txid> = HashSet::new();
        let mut modified: HashMap<Txid, PackageEntry> = HashMap::new();
        let mut weight = COINBASE_WEIGHT_RESERVE;
        let mut sigop_cost = COINBASE_SIGOPS_RESERVE;
        let mut fees: Amount = 0;
        let mut consecutive_failures = 0u32;

        let snapshot = view.by_ancestor_score();
        let mut mi = 0usize;

        while mi < snapshot.len() || !modified.is_empty() {
            // Skip pool entries that are stale: already included, already
            // failed, or superseded by a re-scored modified entry.
            if mi < snapshot.len() {
                let txid = snapshot[mi];
                if in_block.contains(&txid)
                    || failed.contains(&txid)
                    || modified.contains_key(&txid)
                {
                    mi += 1;
                    continue;
                }
            }

            let best_modified = modified.values().min_by(|a, b| package_order(a, b)).cloned();
            let mut using_modified = false;
            let current = if mi >= snapshot.len() {
                match best_modified {
                    Some(entry) => {
                        using_modified = true;
                        entry
                    }
                    None => break,
                }
            } else {
                let pool_entry =
                    PackageEntry::from_pool(view.get(&snapshot[mi]).expect("snapshot txid"));
                match best_modified {
                    Some(entry) if package_order(&entry, &pool_entry) == Ordering::Less => {
                        using_modified = true;
                        entry
                    }
                    _ => {
                        mi += 1;
                        pool_entry
                    }
                }
            };

            // Everything left scores below the floor rate.
            if current.fees_with_ancestors
                < self.options.min_fee_rate.fee(current.vsize_with_ancestors())
            {
                break;
            }

            if weight + current.weight_with_ancestors > self.options.max_weight
                || sigop_cost + current.sigops_with_ancestors > MAX_BLOCK_SIGOPS_COST
            {
                if using_modified {
                    modified.remove(&current.txid);
                    failed.insert(current.txid);
                }
                consecutive_failures += 1;
                if consecutive_failures > MAX_CONSECUTIVE_FAILURES
                    && weight > self.options.max_weight - COINBASE_WEIGHT_RESERVE
                {
                    // Close to full and repeatedly failing: stop trying.
                    break;
                }
                continue;
            }

            // The package is the entry plus its not-yet-included ancestors.
            let mut package: Vec<Txid> = view
                .ancestors_of(&current.txid)
                .into_iter()
                .filter(|ancestor| !in_block.contains(ancestor))
                .collect();
            package.push(current.txid);

            let all_final = package.iter().all(|txid| {
                let entry = view.get(txid).expect("pool entry");
                entry.tx.is_final(height, lock_time_cutoff)
                    && (include_witness || !entry.tx.has_witness())
            });
            if !all_final {
                if using_modified {
                    modified.remove(&current.txid);
                    failed.insert(current.txid);
                }
                continue;
            }

            consecutive_failures = 0;

            // Ancestors sort first: fewer in-pool ancestors means higher up
            // the dependency chain.
            package.sort_by_key(|txid| {
                let entry = view.get(txid).expect("pool entry");
                (entry.count_with_ancestors, entry.txid)
            });
            for txid in &package {
                let entry = view.get(txid).expect("pool entry");
                weight += entry.weight;
                sigop_cost += entry.sigop_cost;
                fees += entry.fee;
                in_block.insert(*txid);
                modified.remove(txid);
                selected.push(TemplateEntry {
                    tx: (*entry.tx).clone(),
                    txid: entry.txid,
                    wtxid: entry.wtxid,
                    fee: entry.fee,
                    weight: entry.weight,
                    sigop_cost: entry.sigop_cost,
                });
                if self.options.print_priority {
                    debug!(
                        fee_rate = %FeeRate::from_fee(entry.fee, entry.vsize),
                        tx = %txid,
                        "Added package transaction"
                    );
                }
            }

            // Entries depending on what was just added are re-scored with
            // those ancestors excluded.
            for txid in &package {
                let added = view.get(txid).expect("pool entry");
                for descendant in view.descendants_of(txid) {
                    if in_block.contains(&descendant) {
                        continue;
                    }
                    let entry = modified.entry(descendant).or_insert_with(|| {
                        PackageEntry::from_pool(view.get(&descendant).expect("descendant"))
                    });
                    entry.count_with_ancestors -= 1;
                    entry.weight_with_ancestors -= added.weight;
                    entry.fees_with_ancestors -= added.fee;
                    entry.sigops_with_ancestors -= added.sigop_cost;
                }
            }
        }

        (selected, weight, sigop_cost, fees)
    }
}

/// Canonical template order: topological, ties broken by ascending wtxid.
fn canonical_order(entries: Vec<TemplateEntry>) -> Vec<TemplateEntry> {
    let position: HashMap<Txid, usize> = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| (entry.txid, i))
        .collect();

    let mut indegree = vec![0usize; entries.len()];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); entries.len()];
    for (i, entry) in entries.iter().enumerate() {
        for input in &entry.tx.inputs {
            if let Some(&parent) = position.get(&input.prevout.txid) {
                indegree[i] += 1;
                children[parent].push(i);
            }
        }
    }

    let mut ready: BTreeSet<(Txid, usize)> = entries
        .iter()
        .enumerate()
        .filter(|(i, _)| indegree[*i] == 0)
        .map(|(i, entry)| (entry.wtxid, i))
        .collect();
    let mut order = Vec::with_capacity(entries.len());
    while let Some(&(wtxid, i)) = ready.iter().next() {
        ready.remove(&(wtxid, i));
        order.push(i);
        for &child in &children[i] {
            indegree[child] -= 1;
            if indegree[child] == 0 {
                ready.insert((entries[child].wtxid, child));
            }
        }
    }

    let mut slots: Vec<Option<TemplateEntry>> = entries.into_iter().map(Some).collect();
    order
        .into_iter()
        .map(|i| slots[i].take().expect("each slot taken once"))
        .collect()
}
