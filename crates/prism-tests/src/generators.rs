//! Transaction generators for tests.

use prism_primitives::{hash256, Amount, OutPoint, Script, Transaction, TxIn, TxOut};

/// A transaction spending a synthetic confirmed outpoint.
pub fn standalone_tx(tag: u8, value: Amount) -> Transaction {
    let mut tx = Transaction::new(100);
    tx.inputs
        .push(TxIn::new(OutPoint::new(hash256(&[tag, 0xfe, 0xed]), 0)));
    tx.outputs.push(TxOut::new(value, Script::new()));
    tx
}

/// A transaction spending output `vout` of `parent`.
pub fn child_tx(parent: &Transaction, vout: u32, value: Amount) -> Transaction {
    let mut tx = Transaction::new(101);
    tx.inputs
        .push(TxIn::new(OutPoint::new(parent.txid(), vout)));
    tx.outputs.push(TxOut::new(value, Script::new()));
    tx
}

/// The fee paying exactly `rate_per_vb` units per virtual byte of `tx`.
pub fn fee_at_rate(tx: &Transaction, rate_per_vb: Amount) -> Amount {
    rate_per_vb * tx.vsize() as Amount
}
