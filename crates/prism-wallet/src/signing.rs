//! Deterministic transaction and block signing.
//!
//! Signatures bind the signing key to a digest of the spending context. The
//! digest excludes input scripts so it is stable across signing, and commits
//! to the spent output's value and script.

use prism_kernel::ScriptVerifier;
use prism_primitives::{hash160, hash256, Block, Encoder, Hash256, ScriptType, Transaction, TxOut};
use sha2::{Digest, Sha256};

/// Sign-all sighash type.
pub const SIGHASH_ALL: u8 = 0x01;

/// Length of a transaction signature: 32 digest bytes plus the type byte.
pub const SIGNATURE_LEN: usize = 33;

/// Digest committed to by an input signature.
pub fn signature_hash(tx: &Transaction, index: usize, prev_out: &TxOut, sighash: u8) -> Hash256 {
    let mut enc = Encoder::with_capacity(256);
    enc.put_i32(tx.version);
    enc.put_u32(tx.time);
    enc.put_var_int(tx.inputs.len() as u64);
    for input in &tx.inputs {
        enc.put_hash(&input.prevout.txid);
        enc.put_u32(input.prevout.vout);
        enc.put_u32(input.sequence);
    }
    enc.put_var_int(tx.outputs.len() as u64);
    for output in &tx.outputs {
        enc.put_i64(output.value);
        enc.put_var_bytes(output.script_pubkey.as_bytes());
    }
    enc.put_u32(tx.lock_time);
    enc.put_u32(index as u32);
    enc.put_i64(prev_out.value);
    enc.put_var_bytes(prev_out.script_pubkey.as_bytes());
    enc.put_u8(sighash);
    hash256(enc.as_slice())
}

/// Public key derived from a 32-byte secret.
pub(crate) fn derive_pubkey(secret: &[u8; 32]) -> Vec<u8> {
    let mut pubkey = Vec::with_capacity(33);
    pubkey.push(0x02);
    pubkey.extend_from_slice(&Sha256::digest(secret));
    pubkey
}

/// Signature over `digest` by the key `pubkey`.
pub(crate) fn sign_digest(pubkey: &[u8], digest: &Hash256) -> Vec<u8> {
    let mut enc = Encoder::with_capacity(pubkey.len() + 32);
    enc.put_bytes(pubkey);
    enc.put_hash(digest);
    hash256(enc.as_slice()).as_bytes().to_vec()
}

fn verify_digest(pubkey: &[u8], digest: &Hash256, signature: &[u8]) -> bool {
    sign_digest(pubkey, digest) == signature
}

/// Parse a script consisting only of direct data pushes.
fn parse_pushes(bytes: &[u8]) -> Option<Vec<Vec<u8>>> {
    let mut pushes = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        let op = bytes[i] as usize;
        i += 1;
        if op == 0 {
            pushes.push(Vec::new());
            continue;
        }
        if op > 75 || i + op > bytes.len() {
            return None;
        }
        pushes.push(bytes[i..i + op].to_vec());
        i += op;
    }
    Some(pushes)
}

fn check_signature(
    tx: &Transaction,
    index: usize,
    prev_out: &TxOut,
    signature: &[u8],
    pubkey: &[u8],
) -> Result<(), String> {
    if signature.len() != SIGNATURE_LEN {
        return Err(format!("bad signature length {}", signature.len()));
    }
    let sighash = signature[32];
    let digest = signature_hash(tx, index, prev_out, sighash);
    if !verify_digest(pubkey, &digest, &signature[..32]) {
        return Err("signature mismatch".to_string());
    }
    Ok(())
}

/// Script verification matching the wallet's signing scheme.
#[derive(Debug, Default)]
pub struct WalletScriptVerifier;

impl ScriptVerifier for WalletScriptVerifier {
    fn verify_input(
        &self,
        tx: &Transaction,
        index: usize,
        prev_out: &TxOut,
    ) -> Result<(), String> {
        let input = tx
            .inputs
            .get(index)
            .ok_or_else(|| format!("input {index} out of range"))?;
        match prev_out.script_pubkey.classify() {
            ScriptType::PubKey(pubkey) => {
                let pushes = parse_pushes(input.script_sig.as_bytes())
                    .ok_or_else(|| "malformed script sig".to_string())?;
                let [signature] = pushes.as_slice() else {
                    return Err("expected one push for pay-to-pubkey".to_string());
                };
                check_signature(tx, index, prev_out, signature, &pubkey)
            }
            ScriptType::PubKeyHash(id) => {
                let pushes = parse_pushes(input.script_sig.as_bytes())
                    .ok_or_else(|| "malformed script sig".to_string())?;
                let [signature, pubkey] = pushes.as_slice() else {
                    return Err("expected two pushes for pay-to-pubkey-hash".to_string());
                };
                if hash160(pubkey) != id {
                    return Err("pubkey does not match output hash".to_string());
                }
                check_signature(tx, index, prev_out, signature, pubkey)
            }
            ScriptType::WitnessKeyHash(id) => {
                let [signature, pubkey] = input.witness.as_slice() else {
                    return Err("expected two witness items".to_string());
                };
                if hash160(pubkey) != id {
                    return Err("witness pubkey does not match output hash".to_string());
                }
                check_signature(tx, index, prev_out, signature, pubkey)
            }
            ScriptType::NonStandard => Err("unsupported output script".to_string()),
        }
    }

    fn verify_block_signature(&self, block: &Block) -> Result<(), String> {
        let Some(coinstake) = block.coinstake() else {
            // Proof-of-work blocks carry no signature.
            return if block.signature.is_empty() {
                Ok(())
            } else {
                Err("unexpected signature on proof-of-work block".to_string())
            };
        };
        let ScriptType::PubKey(pubkey) = coinstake.outputs[1].script_pubkey.classify() else {
            return Err("coinstake output is not pay-to-pubkey".to_string());
        };
        let digest = block.hash();
        if !verify_digest(&pubkey, &digest, &block.signature) {
            return Err("bad block signature".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_primitives::{OutPoint, Script, TxIn};

    fn spend(prev_script: Script) -> (Transaction, TxOut) {
        let mut tx = Transaction::new(1000);
        tx.inputs
            .push(TxIn::new(OutPoint::new(hash256(b"prev"), 0)));
        tx.outputs.push(TxOut::new(900, Script::new()));
        (tx, TxOut::new(1000, prev_script))
    }

    #[test]
    fn test_signature_hash_ignores_script_sig() {
        let (mut tx, prev_out) = spend(Script::new());
        let before = signature_hash(&tx, 0, &prev_out, SIGHASH_ALL);
        tx.inputs[0].script_sig = Script::from_bytes(vec![1, 0xaa]);
        assert_eq!(signature_hash(&tx, 0, &prev_out, SIGHASH_ALL), before);
    }

    #[test]
    fn test_signature_hash_commits_to_prevout() {
        let (tx, prev_out) = spend(Script::new());
        let a = signature_hash(&tx, 0, &prev_out, SIGHASH_ALL);
        let other = TxOut::new(prev_out.value + 1, prev_out.script_pubkey.clone());
        assert_ne!(signature_hash(&tx, 0, &other, SIGHASH_ALL), a);
    }

    #[test]
    fn test_p2pk_roundtrip() {
        let secret = [7u8; 32];
        let pubkey = derive_pubkey(&secret);
        let (mut tx, prev_out) = spend(Script::pay_to_pubkey(&pubkey));

        let digest = signature_hash(&tx, 0, &prev_out, SIGHASH_ALL);
        let mut signature = sign_digest(&pubkey, &digest);
        signature.push(SIGHASH_ALL);
        let mut script_sig = Script::new();
        script_sig.push_data(&signature);
        tx.inputs[0].script_sig = script_sig;

        WalletScriptVerifier.verify_input(&tx, 0, &prev_out).unwrap();

        // Tampering with an output invalidates the signature.
        tx.outputs[0].value += 1;
        assert!(WalletScriptVerifier.verify_input(&tx, 0, &prev_out).is_err());
    }

    #[test]
    fn test_p2pkh_requires_matching_pubkey() {
        let secret = [9u8; 32];
        let pubkey = derive_pubkey(&secret);
        let id = hash160(&pubkey);
        let (mut tx, prev_out) = spend(Script::pay_to_pubkey_hash(&id));

        let digest = signature_hash(&tx, 0, &prev_out, SIGHASH_ALL);
        let mut signature = sign_digest(&pubkey, &digest);
        signature.push(SIGHASH_ALL);
        let mut script_sig = Script::new();
        script_sig.push_data(&signature);
        script_sig.push_data(&pubkey);
        tx.inputs[0].script_sig = script_sig;
        WalletScriptVerifier.verify_input(&tx, 0, &prev_out).unwrap();

        // A different key fails the hash comparison.
        let other = derive_pubkey(&[1u8; 32]);
        let mut script_sig = Script::new();
        script_sig.push_data(&signature);
        script_sig.push_data(&other);
        tx.inputs[0].script_sig = script_sig;
        assert!(WalletScriptVerifier.verify_input(&tx, 0, &prev_out).is_err());
    }
}
