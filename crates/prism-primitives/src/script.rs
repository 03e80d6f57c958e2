//! Scripts.
//!
//! Only the small slice of the script system the staking paths touch:
//! classification of P2PK / P2PKH / P2WPKH outputs, builders for those forms,
//! and the coinbase height push. Full script execution is an external
//! collaborator.

use crate::hash::Hash160;
use std::fmt;

pub const OP_0: u8 = 0x00;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKMULTISIG: u8 = 0xae;

/// Recognized output script forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptType {
    /// `<pubkey> OP_CHECKSIG`
    PubKey(Vec<u8>),
    /// `OP_DUP OP_HASH160 <h160> OP_EQUALVERIFY OP_CHECKSIG`
    PubKeyHash(Hash160),
    /// `OP_0 <h160>`
    WitnessKeyHash(Hash160),
    /// Anything else.
    NonStandard,
}

/// A serialized script.
#[derive(Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Script(Vec<u8>);

impl Script {
    pub fn new() -> Self {
        Script(Vec::new())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Script(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `<pubkey> OP_CHECKSIG`
    pub fn pay_to_pubkey(pubkey: &[u8]) -> Self {
        let mut s = Script::new();
        s.push_data(pubkey);
        s.0.push(OP_CHECKSIG);
        s
    }

    /// `OP_DUP OP_HASH160 <h160> OP_EQUALVERIFY OP_CHECKSIG`
    pub fn pay_to_pubkey_hash(id: &Hash160) -> Self {
        let mut s = Script::new();
        s.0.push(OP_DUP);
        s.0.push(OP_HASH160);
        s.push_data(id.as_bytes());
        s.0.push(OP_EQUALVERIFY);
        s.0.push(OP_CHECKSIG);
        s
    }

    /// `OP_0 <h160>`
    pub fn pay_to_witness_key_hash(id: &Hash160) -> Self {
        let mut s = Script::new();
        s.0.push(OP_0);
        s.push_data(id.as_bytes());
        s
    }

    /// Coinbase input script: `<height> OP_0`.
    pub fn coinbase_script_sig(height: u32) -> Self {
        let mut s = Script::new();
        s.push_int(height as i64);
        s.0.push(OP_0);
        s
    }

    /// Append a minimal data push (direct pushes only; scripts here never
    /// carry elements above 75 bytes).
    pub fn push_data(&mut self, data: &[u8]) {
        debug_assert!(data.len() <= 75);
        self.0.push(data.len() as u8);
        self.0.extend_from_slice(data);
    }

    /// Append a number as a minimally-encoded script integer push.
    pub fn push_int(&mut self, value: i64) {
        if value == 0 {
            self.0.push(OP_0);
            return;
        }
        if (1..=16).contains(&value) {
            // OP_1 .. OP_16
            self.0.push(0x50 + value as u8);
            return;
        }
        let mut bytes = Vec::new();
        let negative = value < 0;
        let mut abs = value.unsigned_abs();
        while abs > 0 {
            bytes.push((abs & 0xff) as u8);
            abs >>= 8;
        }
        if bytes.last().map_or(false, |&b| b & 0x80 != 0) {
            bytes.push(if negative { 0x80 } else { 0 });
        } else if negative {
            let last = bytes.last_mut().expect("non-zero value");
            *last |= 0x80;
        }
        self.push_data(&bytes);
    }

    /// Classify the standard forms the staking code understands.
    pub fn classify(&self) -> ScriptType {
        let b = &self.0;
        // P2PK: push(33|65) <key> OP_CHECKSIG
        if (b.len() == 35 && b[0] == 33 || b.len() == 67 && b[0] == 65)
            && b[b.len() - 1] == OP_CHECKSIG
        {
            return ScriptType::PubKey(b[1..b.len() - 1].to_vec());
        }
        // P2PKH
        if b.len() == 25
            && b[0] == OP_DUP
            && b[1] == OP_HASH160
            && b[2] == 20
            && b[23] == OP_EQUALVERIFY
            && b[24] == OP_CHECKSIG
        {
            let mut id = [0u8; 20];
            id.copy_from_slice(&b[3..23]);
            return ScriptType::PubKeyHash(Hash160(id));
        }
        // P2WPKH
        if b.len() == 22 && b[0] == OP_0 && b[1] == 20 {
            let mut id = [0u8; 20];
            id.copy_from_slice(&b[2..22]);
            return ScriptType::WitnessKeyHash(Hash160(id));
        }
        ScriptType::NonStandard
    }

    /// Legacy sigop count: one per CHECKSIG, twenty per CHECKMULTISIG.
    pub fn sigop_count(&self) -> u64 {
        let mut count = 0;
        for &b in &self.0 {
            if b == OP_CHECKSIG {
                count += 1;
            } else if b == OP_CHECKMULTISIG {
                count += 20;
            }
        }
        count
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Script({})", hex::encode(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash160;

    #[test]
    fn test_classify_p2pk() {
        let key = [2u8; 33];
        let script = Script::pay_to_pubkey(&key);
        assert_eq!(script.classify(), ScriptType::PubKey(key.to_vec()));
    }

    #[test]
    fn test_classify_p2pkh() {
        let id = hash160(&[2u8; 33]);
        let script = Script::pay_to_pubkey_hash(&id);
        assert_eq!(script.classify(), ScriptType::PubKeyHash(id));
    }

    #[test]
    fn test_classify_p2wpkh() {
        let id = hash160(&[2u8; 33]);
        let script = Script::pay_to_witness_key_hash(&id);
        assert_eq!(script.classify(), ScriptType::WitnessKeyHash(id));
    }

    #[test]
    fn test_classify_nonstandard() {
        let script = Script::from_bytes(vec![OP_RETURN, 1, 0xaa]);
        assert_eq!(script.classify(), ScriptType::NonStandard);
    }

    #[test]
    fn test_coinbase_script_sig_heights() {
        // Small heights use the one-byte opcodes, larger ones a push.
        assert_eq!(Script::coinbase_script_sig(1).as_bytes(), &[0x51, OP_0]);
        assert_eq!(
            Script::coinbase_script_sig(1_030_000).as_bytes(),
            &[3, 0x70, 0xb7, 0x0f, OP_0]
        );
    }

    #[test]
    fn test_push_int_sign_byte() {
        let mut s = Script::new();
        s.push_int(0x80);
        // 0x80 needs a trailing zero byte so it is not read as negative.
        assert_eq!(s.as_bytes(), &[2, 0x80, 0x00]);
    }

    #[test]
    fn test_sigop_count() {
        let script = Script::pay_to_pubkey(&[2u8; 33]);
        assert_eq!(script.sigop_count(), 1);
        let multi = Script::from_bytes(vec![OP_CHECKMULTISIG]);
        assert_eq!(multi.sigop_count(), 20);
    }
}
