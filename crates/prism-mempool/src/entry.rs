//! Mempool entries and ancestor-score ordering.

use prism_primitives::{Amount, Transaction, Txid};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

/// A pooled transaction with cached ancestor state.
#[derive(Debug, Clone)]
pub struct MempoolEntry {
    pub tx: Arc<Transaction>,
    pub txid: Txid,
    pub wtxid: Txid,
    pub fee: Amount,
    pub weight: u64,
    pub vsize: u64,
    pub sigop_cost: u64,
    /// Pool insertion order; ties in score resolve to earlier arrivals.
    pub sequence: u64,

    /// Aggregates over this entry and all in-pool ancestors.
    pub count_with_ancestors: u64,
    pub weight_with_ancestors: u64,
    pub fees_with_ancestors: Amount,
    pub sigops_with_ancestors: u64,

    /// Direct in-pool parents and children.
    pub parents: HashSet<Txid>,
    pub children: HashSet<Txid>,
}

impl MempoolEntry {
    pub fn new(tx: Arc<Transaction>, fee: Amount, sequence: u64) -> Self {
        let txid = tx.txid();
        let wtxid = tx.wtxid();
        let weight = tx.weight();
        let vsize = tx.vsize();
        let sigop_cost = tx.sigop_cost();
        MempoolEntry {
            tx,
            txid,
            wtxid,
            fee,
            weight,
            vsize,
            sigop_cost,
            sequence,
            count_with_ancestors: 1,
            weight_with_ancestors: weight,
            fees_with_ancestors: fee,
            sigops_with_ancestors: sigop_cost,
            parents: HashSet::new(),
            children: HashSet::new(),
        }
    }

    /// Virtual size of the package formed with all in-pool ancestors.
    pub fn vsize_with_ancestors(&self) -> u64 {
        (self.weight_with_ancestors + 3) / 4
    }

    /// The (fee, vsize) pair scoring this entry: whichever of the entry
    /// alone and the entry-with-ancestors package has the higher feerate.
    pub fn score_fee_and_size(&self) -> (Amount, u64) {
        let own = self.fee as i128 * self.vsize_with_ancestors() as i128;
        let with_ancestors = self.fees_with_ancestors as i128 * self.vsize as i128;
        if own > with_ancestors {
            (self.fee, self.vsize)
        } else {
            (self.fees_with_ancestors, self.vsize_with_ancestors())
        }
    }
}

/// Compare two (fee, vsize) scores as feerates without division.
pub(crate) fn compare_score(a: (Amount, u64), b: (Amount, u64)) -> Ordering {
    let lhs = a.0 as i128 * b.1 as i128;
    let rhs = b.0 as i128 * a.1 as i128;
    lhs.cmp(&rhs)
}

/// Descending ancestor-score order with arrival/txid tie-breaks.
pub(crate) fn compare_entries(a: &MempoolEntry, b: &MempoolEntry) -> Ordering {
    compare_score(b.score_fee_and_size(), a.score_fee_and_size())
        .then_with(|| a.sequence.cmp(&b.sequence))
        .then_with(|| a.txid.cmp(&b.txid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_primitives::{hash256, OutPoint, Script, TxIn, TxOut};

    fn entry_with(fee: Amount, tag: u8, sequence: u64) -> MempoolEntry {
        let mut tx = Transaction::new(100);
        tx.inputs.push(TxIn::new(OutPoint::new(hash256(&[tag]), 0)));
        tx.outputs.push(TxOut::new(1000, Script::new()));
        MempoolEntry::new(Arc::new(tx), fee, sequence)
    }

    #[test]
    fn test_score_uses_max_of_own_and_package() {
        let mut entry = entry_with(1000, 1, 0);
        // Cheap ancestors drag the package rate down; the entry's own
        // (higher) rate keeps scoring it.
        entry.fees_with_ancestors = 1100;
        entry.weight_with_ancestors = entry.weight * 10;
        let (fee, size) = entry.score_fee_and_size();
        assert_eq!(fee, 1000);
        assert_eq!(size, entry.vsize);

        // Rich ancestors lift the package rate above the entry's own.
        let mut entry = entry_with(1000, 2, 0);
        entry.fees_with_ancestors = 100_000;
        entry.weight_with_ancestors = entry.weight + 4;
        let (fee, size) = entry.score_fee_and_size();
        assert_eq!(fee, 100_000);
        assert_eq!(size, entry.vsize_with_ancestors());
    }

    #[test]
    fn test_compare_entries_orders_by_rate() {
        let cheap = entry_with(100, 1, 0);
        let rich = entry_with(10_000, 2, 1);
        assert_eq!(compare_entries(&rich, &cheap), Ordering::Less);
        assert_eq!(compare_entries(&cheap, &rich), Ordering::Greater);
    }

    #[test]
    fn test_compare_entries_tie_breaks_by_arrival() {
        let first = entry_with(1000, 1, 0);
        let second = entry_with(1000, 2, 1);
        assert_eq!(compare_entries(&first, &second), Ordering::Less);
    }
}
