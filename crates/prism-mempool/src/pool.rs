//! The transaction pool.

use crate::entry::{compare_entries, MempoolEntry};
use crate::{MempoolError, MempoolResult, DEFAULT_MAX_TXS};
use parking_lot::{RwLock, RwLockReadGuard};
use prism_primitives::{Amount, OutPoint, Transaction, Txid};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
struct PoolInner {
    entries: HashMap<Txid, MempoolEntry>,
    spent_inputs: HashMap<OutPoint, Txid>,
    next_sequence: u64,
}

impl PoolInner {
    fn ancestors_of(&self, txid: &Txid) -> HashSet<Txid> {
        let mut ancestors = HashSet::new();
        let mut queue: VecDeque<Txid> = match self.entries.get(txid) {
            Some(entry) => entry.parents.iter().copied().collect(),
            None => return ancestors,
        };
        while let Some(parent) = queue.pop_front() {
            if !ancestors.insert(parent) {
                continue;
            }
            if let Some(entry) = self.entries.get(&parent) {
                queue.extend(entry.parents.iter().copied());
            }
        }
        ancestors
    }

    fn descendants_of(&self, txid: &Txid) -> HashSet<Txid> {
        let mut descendants = HashSet::new();
        let mut queue: VecDeque<Txid> = match self.entries.get(txid) {
            Some(entry) => entry.children.iter().copied().collect(),
            None => return descendants,
        };
        while let Some(child) = queue.pop_front() {
            if !descendants.insert(child) {
                continue;
            }
            if let Some(entry) = self.entries.get(&child) {
                queue.extend(entry.children.iter().copied());
            }
        }
        descendants
    }

    /// Recompute every entry's with-ancestor aggregates from the links.
    /// Called after removals; additions maintain aggregates incrementally.
    fn recompute_aggregates(&mut self) {
        let txids: Vec<Txid> = self.entries.keys().copied().collect();
        for txid in txids {
            let ancestors = self.ancestors_of(&txid);
            let base = &self.entries[&txid];
            let mut count = 1u64;
            let mut weight = base.weight;
            let mut fees = base.fee;
            let mut sigops = base.sigop_cost;
            for ancestor in &ancestors {
                let entry = &self.entries[ancestor];
                count += 1;
                weight += entry.weight;
                fees += entry.fee;
                sigops += entry.sigop_cost;
            }
            let entry = self.entries.get_mut(&txid).expect("iterated key");
            entry.count_with_ancestors = count;
            entry.weight_with_ancestors = weight;
            entry.fees_with_ancestors = fees;
            entry.sigops_with_ancestors = sigops;
        }
    }

    fn unlink_and_remove(&mut self, txid: &Txid) -> Option<MempoolEntry> {
        let entry = self.entries.remove(txid)?;
        for input in &entry.tx.inputs {
            self.spent_inputs.remove(&input.prevout);
        }
        for parent in &entry.parents {
            if let Some(parent_entry) = self.entries.get_mut(parent) {
                parent_entry.children.remove(txid);
            }
        }
        for child in &entry.children {
            if let Some(child_entry) = self.entries.get_mut(child) {
                child_entry.parents.remove(txid);
            }
        }
        Some(entry)
    }
}

/// Transaction mempool (`L_mempool`).
pub struct Mempool {
    inner: RwLock<PoolInner>,
    max_txs: usize,
}

impl Mempool {
    pub fn new(max_txs: usize) -> Self {
        Self {
            inner: RwLock::new(PoolInner::default()),
            max_txs,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_MAX_TXS)
    }

    /// Add a transaction paying `fee`. Parents already in the pool are
    /// linked and the entry's with-ancestor aggregates cached.
    pub fn add(&self, tx: Transaction, fee: Amount) -> MempoolResult<()> {
        let txid = tx.txid();
        if tx.is_coinbase() || tx.is_coinstake() {
            return Err(MempoolError::RewardTransaction(txid));
        }

        let mut inner = self.inner.write();
        if inner.entries.contains_key(&txid) {
            return Err(MempoolError::AlreadyExists(txid));
        }
        if inner.entries.len() >= self.max_txs {
            return Err(MempoolError::Full {
                count: inner.entries.len(),
                max: self.max_txs,
            });
        }
        for input in &tx.inputs {
            if inner.spent_inputs.contains_key(&input.prevout) {
                return Err(MempoolError::DoubleSpend(txid));
            }
        }

        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        let mut entry = MempoolEntry::new(Arc::new(tx), fee, sequence);

        // Link in-pool parents and fold every distinct ancestor into the
        // cached aggregates.
        for input in &entry.tx.inputs {
            if inner.entries.contains_key(&input.prevout.txid) {
                entry.parents.insert(input.prevout.txid);
            }
        }
        let mut ancestors: HashSet<Txid> = HashSet::new();
        let mut queue: VecDeque<Txid> = entry.parents.iter().copied().collect();
        while let Some(ancestor) = queue.pop_front() {
            if !ancestors.insert(ancestor) {
                continue;
            }
            queue.extend(inner.entries[&ancestor].parents.iter().copied());
        }
        for ancestor in &ancestors {
            let ancestor_entry = &inner.entries[ancestor];
            entry.count_with_ancestors += 1;
            entry.weight_with_ancestors += ancestor_entry.weight;
            entry.fees_with_ancestors += ancestor_entry.fee;
            entry.sigops_with_ancestors += ancestor_entry.sigop_cost;
        }

        for parent in entry.parents.clone() {
            inner
                .entries
                .get_mut(&parent)
                .expect("parent present")
                .children
                .insert(txid);
        }
        for input in &entry.tx.inputs {
            inner.spent_inputs.insert(input.prevout, txid);
        }
        inner.entries.insert(txid, entry);
        debug!(count = inner.entries.len(), tx = %txid, "Transaction added to mempool");
        Ok(())
    }

    /// Remove transactions confirmed in a block, anything that now double
    /// spends one of their inputs, and the descendants of the conflicts.
    pub fn remove_for_block(&self, txs: &[Transaction]) {
        let mut inner = self.inner.write();
        let mut to_remove: Vec<Txid> = Vec::new();
        for tx in txs {
            let txid = tx.txid();
            if inner.entries.contains_key(&txid) {
                to_remove.push(txid);
            }
            for input in &tx.inputs {
                if let Some(&spender) = inner.spent_inputs.get(&input.prevout) {
                    if spender != txid {
                        // Conflict: evict the spender and everything on it.
                        to_remove.push(spender);
                        to_remove.extend(inner.descendants_of(&spender));
                    }
                }
            }
        }
        let mut removed = 0usize;
        for txid in to_remove {
            if inner.unlink_and_remove(&txid).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            inner.recompute_aggregates();
            debug!(removed, remaining = inner.entries.len(), "Mempool updated for block");
        }
    }

    pub fn contains(&self, txid: &Txid) -> bool {
        self.inner.read().entries.contains_key(txid)
    }

    pub fn get(&self, txid: &Txid) -> Option<MempoolEntry> {
        self.inner.read().entries.get(txid).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take a consistent view for template construction. The read lock is
    /// held for the lifetime of the view.
    pub fn view(&self) -> MempoolView<'_> {
        MempoolView {
            inner: self.inner.read(),
        }
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Consistent read view of the pool.
pub struct MempoolView<'a> {
    inner: RwLockReadGuard<'a, PoolInner>,
}

impl MempoolView<'_> {
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub fn get(&self, txid: &Txid) -> Option<&MempoolEntry> {
        self.inner.entries.get(txid)
    }

    /// All txids in descending ancestor-score order.
    pub fn by_ancestor_score(&self) -> Vec<Txid> {
        let mut entries: Vec<&MempoolEntry> = self.inner.entries.values().collect();
        entries.sort_by(|a, b| compare_entries(a, b));
        entries.into_iter().map(|entry| entry.txid).collect()
    }

    /// All in-pool ancestors of `txid` (exclusive).
    pub fn ancestors_of(&self, txid: &Txid) -> HashSet<Txid> {
        self.inner.ancestors_of(txid)
    }

    /// All in-pool descendants of `txid` (exclusive).
    pub fn descendants_of(&self, txid: &Txid) -> HashSet<Txid> {
        self.inner.descendants_of(txid)
    }
}
