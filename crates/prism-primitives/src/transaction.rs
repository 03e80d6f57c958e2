//! Transactions.

use crate::amount::Amount;
use crate::hash::{hash256, Hash256};
use crate::script::Script;
use crate::serialize::{Encodable, Encoder};
use crate::{Txid, LOCKTIME_THRESHOLD, WITNESS_SCALE_FACTOR};

/// Reference to a transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    pub txid: Txid,
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: Txid, vout: u32) -> Self {
        OutPoint { txid, vout }
    }

    /// The null outpoint used by coinbase inputs.
    pub fn null() -> Self {
        OutPoint {
            txid: Hash256::ZERO,
            vout: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.txid.is_zero() && self.vout == u32::MAX
    }
}

/// Transaction input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Script,
    pub sequence: u32,
    pub witness: Vec<Vec<u8>>,
}

impl TxIn {
    pub fn new(prevout: OutPoint) -> Self {
        TxIn {
            prevout,
            script_sig: Script::new(),
            sequence: u32::MAX,
            witness: Vec::new(),
        }
    }
}

/// Transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub value: Amount,
    pub script_pubkey: Script,
}

impl TxOut {
    pub fn new(value: Amount, script_pubkey: Script) -> Self {
        TxOut {
            value,
            script_pubkey,
        }
    }

    /// The empty output that marks a coinstake (and zeroed coinbases).
    pub fn empty() -> Self {
        TxOut {
            value: 0,
            script_pubkey: Script::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value == 0 && self.script_pubkey.is_empty()
    }

    pub fn set_empty(&mut self) {
        self.value = 0;
        self.script_pubkey = Script::new();
    }
}

/// A transaction. Carries a timestamp: the coinstake timestamp protocol binds
/// transaction time to block time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub time: u32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn new(time: u32) -> Self {
        Transaction {
            version: 1,
            time,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
        }
    }

    /// Transaction id: hash of the encoding without witness data.
    pub fn txid(&self) -> Txid {
        hash256(&self.encode_inner(false))
    }

    /// Witness transaction id: hash of the full encoding.
    pub fn wtxid(&self) -> Txid {
        hash256(&self.encode_inner(self.has_witness()))
    }

    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(|input| !input.witness.is_empty())
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_null()
    }

    /// A coinstake spends a real output in input 0 and leaves output 0 empty.
    pub fn is_coinstake(&self) -> bool {
        !self.inputs.is_empty()
            && !self.inputs[0].prevout.is_null()
            && self.outputs.len() >= 2
            && self.outputs[0].is_empty()
    }

    pub fn value_out(&self) -> Amount {
        self.outputs.iter().map(|out| out.value).sum()
    }

    /// Finality check against the template's lock-time cutoff.
    pub fn is_final(&self, block_height: u32, cutoff_time: i64) -> bool {
        if self.lock_time == 0 {
            return true;
        }
        let threshold = if self.lock_time < LOCKTIME_THRESHOLD {
            block_height as i64
        } else {
            cutoff_time
        };
        if (self.lock_time as i64) < threshold {
            return true;
        }
        self.inputs.iter().all(|input| input.sequence == u32::MAX)
    }

    /// Block weight contribution: base size scaled, plus witness bytes.
    pub fn weight(&self) -> u64 {
        let base = self.encode_inner(false).len() as u64;
        let total = self.encode_inner(self.has_witness()).len() as u64;
        base * (WITNESS_SCALE_FACTOR - 1) + total
    }

    /// Virtual size for feerate math (weight rounded up to whole vbytes).
    pub fn vsize(&self) -> u64 {
        (self.weight() + WITNESS_SCALE_FACTOR - 1) / WITNESS_SCALE_FACTOR
    }

    /// Legacy sigop count scaled to weight units.
    pub fn sigop_cost(&self) -> u64 {
        let mut count = 0;
        for input in &self.inputs {
            count += input.script_sig.sigop_count();
        }
        for output in &self.outputs {
            count += output.script_pubkey.sigop_count();
        }
        count * WITNESS_SCALE_FACTOR
    }

    fn encode_inner(&self, with_witness: bool) -> Vec<u8> {
        let mut enc = Encoder::with_capacity(128);
        enc.put_i32(self.version);
        enc.put_u32(self.time);
        enc.put_var_int(self.inputs.len() as u64);
        for input in &self.inputs {
            enc.put_hash(&input.prevout.txid);
            enc.put_u32(input.prevout.vout);
            enc.put_var_bytes(input.script_sig.as_bytes());
            enc.put_u32(input.sequence);
        }
        enc.put_var_int(self.outputs.len() as u64);
        for output in &self.outputs {
            enc.put_i64(output.value);
            enc.put_var_bytes(output.script_pubkey.as_bytes());
        }
        if with_witness {
            for input in &self.inputs {
                enc.put_var_int(input.witness.len() as u64);
                for item in &input.witness {
                    enc.put_var_bytes(item);
                }
            }
        }
        enc.put_u32(self.lock_time);
        enc.into_bytes()
    }
}

impl Encodable for Transaction {
    fn consensus_encode(&self, enc: &mut Encoder) {
        enc.put_bytes(&self.encode_inner(self.has_witness()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coinbase(height_time: u32) -> Transaction {
        let mut tx = Transaction::new(height_time);
        tx.inputs.push(TxIn::new(OutPoint::null()));
        tx.outputs.push(TxOut::new(50, Script::new()));
        tx
    }

    #[test]
    fn test_coinbase_detection() {
        let tx = coinbase(100);
        assert!(tx.is_coinbase());
        assert!(!tx.is_coinstake());
    }

    #[test]
    fn test_coinstake_detection() {
        let mut tx = Transaction::new(100);
        tx.inputs
            .push(TxIn::new(OutPoint::new(hash256(b"prev"), 0)));
        tx.outputs.push(TxOut::empty());
        tx.outputs.push(TxOut::new(1000, Script::new()));
        assert!(tx.is_coinstake());
        assert!(!tx.is_coinbase());
    }

    #[test]
    fn test_txid_ignores_witness() {
        let mut tx = coinbase(7);
        let base_id = tx.txid();
        tx.inputs[0].witness.push(vec![1, 2, 3]);
        assert_eq!(tx.txid(), base_id);
        assert_ne!(tx.wtxid(), base_id);
    }

    #[test]
    fn test_wtxid_equals_txid_without_witness() {
        let tx = coinbase(7);
        assert_eq!(tx.txid(), tx.wtxid());
    }

    #[test]
    fn test_finality() {
        let mut tx = coinbase(0);
        assert!(tx.is_final(100, 1000));

        tx.lock_time = 101;
        tx.inputs[0].sequence = 0;
        assert!(!tx.is_final(100, 1000), "height lock not yet reached");
        assert!(tx.is_final(102, 1000));

        tx.lock_time = LOCKTIME_THRESHOLD + 50;
        assert!(!tx.is_final(100, (LOCKTIME_THRESHOLD + 10) as i64));
        assert!(tx.is_final(100, (LOCKTIME_THRESHOLD + 60) as i64));

        // Max sequences make any lock time final.
        tx.inputs[0].sequence = u32::MAX;
        assert!(tx.is_final(0, 0));
    }

    #[test]
    fn test_weight_counts_witness_once() {
        let mut tx = coinbase(7);
        let without = tx.weight();
        tx.inputs[0].witness.push(vec![0u8; 40]);
        let with = tx.weight();
        // Witness bytes are added at scale 1, so well below 4x their size.
        assert!(with > without && with < without + 4 * 45);
    }
}
