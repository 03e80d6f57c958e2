//! The staking wallet.

use crate::signing::{derive_pubkey, sign_digest, signature_hash};
use crate::{Coin, WalletError, WalletResult};
use parking_lot::Mutex;
use prism_primitives::{hash160, Block, Hash160, Script, ScriptType, Transaction, TxOut};
use std::collections::HashMap;
use tracing::debug;

/// A wallet key pair.
#[derive(Debug, Clone)]
pub struct WalletKey {
    pub secret: [u8; 32],
    pub pubkey: Vec<u8>,
}

impl WalletKey {
    pub fn from_secret(secret: [u8; 32]) -> Self {
        let pubkey = derive_pubkey(&secret);
        WalletKey { secret, pubkey }
    }

    pub fn key_id(&self) -> Hash160 {
        hash160(&self.pubkey)
    }
}

/// The wallet surface the minter and assembler use.
pub trait StakingWallet: Send + Sync {
    /// True while the wallet's keys are encrypted and unusable.
    fn is_locked(&self) -> bool;

    /// Coins the wallet is willing to stake.
    fn select_stake_coins(&self) -> Vec<Coin>;

    /// All spendable coins (sizing the minter's timeout).
    fn available_coins(&self) -> Vec<Coin>;

    /// Key lookup by key id.
    fn get_key(&self, id: &Hash160) -> Option<WalletKey>;

    /// Sign input `index` of `tx` against the output it spends.
    fn sign_input(
        &self,
        tx: &mut Transaction,
        index: usize,
        prev_out: &TxOut,
        sighash: u8,
    ) -> WalletResult<()>;

    /// Sign a proof-of-stake block with the coinstake's output key.
    fn sign_block(&self, block: &mut Block) -> WalletResult<()>;
}

#[derive(Default)]
struct WalletInner {
    keys: HashMap<Hash160, WalletKey>,
    coins: Vec<Coin>,
    locked: bool,
}

/// In-memory staking wallet (`L_wallet`: acquired after chain and mempool
/// locks, never before them).
#[derive(Default)]
pub struct MemoryWallet {
    inner: Mutex<WalletInner>,
}

impl MemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Import a key; returns its key id.
    pub fn add_key(&self, secret: [u8; 32]) -> Hash160 {
        let key = WalletKey::from_secret(secret);
        let id = key.key_id();
        self.inner.lock().keys.insert(id, key);
        id
    }

    /// Track a spendable coin.
    pub fn add_coin(&self, coin: Coin) {
        self.inner.lock().coins.push(coin);
    }

    /// Forget a spent coin.
    pub fn remove_coin(&self, coin: &Coin) {
        self.inner.lock().coins.retain(|c| c.outpoint != coin.outpoint);
    }

    pub fn set_locked(&self, locked: bool) {
        self.inner.lock().locked = locked;
    }

    fn signing_key(&self, script: &Script) -> WalletResult<WalletKey> {
        let inner = self.inner.lock();
        if inner.locked {
            return Err(WalletError::Locked);
        }
        let id = match script.classify() {
            ScriptType::PubKey(pubkey) => hash160(&pubkey),
            ScriptType::PubKeyHash(id) | ScriptType::WitnessKeyHash(id) => id,
            ScriptType::NonStandard => return Err(WalletError::UnsupportedScript),
        };
        inner
            .keys
            .get(&id)
            .cloned()
            .ok_or(WalletError::KeyNotFound(id))
    }
}

impl StakingWallet for MemoryWallet {
    fn is_locked(&self) -> bool {
        self.inner.lock().locked
    }

    fn select_stake_coins(&self) -> Vec<Coin> {
        let inner = self.inner.lock();
        if inner.locked {
            return Vec::new();
        }
        inner.coins.clone()
    }

    fn available_coins(&self) -> Vec<Coin> {
        self.inner.lock().coins.clone()
    }

    fn get_key(&self, id: &Hash160) -> Option<WalletKey> {
        let inner = self.inner.lock();
        if inner.locked {
            return None;
        }
        inner.keys.get(id).cloned()
    }

    fn sign_input(
        &self,
        tx: &mut Transaction,
        index: usize,
        prev_out: &TxOut,
        sighash: u8,
    ) -> WalletResult<()> {
        if index >= tx.inputs.len() {
            return Err(WalletError::BadInputIndex(index));
        }
        let key = self.signing_key(&prev_out.script_pubkey)?;
        let digest = signature_hash(tx, index, prev_out, sighash);
        let mut signature = sign_digest(&key.pubkey, &digest);
        signature.push(sighash);

        match prev_out.script_pubkey.classify() {
            ScriptType::PubKey(_) => {
                let mut script_sig = Script::new();
                script_sig.push_data(&signature);
                tx.inputs[index].script_sig = script_sig;
            }
            ScriptType::PubKeyHash(_) => {
                let mut script_sig = Script::new();
                script_sig.push_data(&signature);
                script_sig.push_data(&key.pubkey);
                tx.inputs[index].script_sig = script_sig;
            }
            ScriptType::WitnessKeyHash(_) => {
                tx.inputs[index].witness = vec![signature, key.pubkey.clone()];
            }
            ScriptType::NonStandard => return Err(WalletError::UnsupportedScript),
        }
        debug!(input = index, "Signed transaction input");
        Ok(())
    }

    fn sign_block(&self, block: &mut Block) -> WalletResult<()> {
        let coinstake = block.coinstake().ok_or(WalletError::NotProofOfStake)?;
        let key = self.signing_key(&coinstake.outputs[1].script_pubkey)?;
        let digest = block.hash();
        block.signature = sign_digest(&key.pubkey, &digest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::{WalletScriptVerifier, SIGHASH_ALL};
    use prism_kernel::ScriptVerifier;
    use prism_primitives::{hash256, OutPoint, TxIn};

    fn wallet_with_key() -> (MemoryWallet, WalletKey) {
        let wallet = MemoryWallet::new();
        let id = wallet.add_key([3u8; 32]);
        let key = wallet.get_key(&id).unwrap();
        (wallet, key)
    }

    #[test]
    fn test_locked_wallet_hides_keys_and_coins() {
        let (wallet, key) = wallet_with_key();
        wallet.add_coin(Coin {
            outpoint: OutPoint::new(hash256(b"c"), 0),
            value: 100,
            script_pubkey: Script::pay_to_pubkey(&key.pubkey),
            height: 1,
            time: 1000,
            is_coinbase: false,
            is_coinstake: false,
        });
        assert!(!wallet.is_locked());
        assert_eq!(wallet.select_stake_coins().len(), 1);

        wallet.set_locked(true);
        assert!(wallet.is_locked());
        assert!(wallet.select_stake_coins().is_empty());
        assert!(wallet.get_key(&key.key_id()).is_none());
        // Available coins still report for timeout sizing.
        assert_eq!(wallet.available_coins().len(), 1);
    }

    #[test]
    fn test_sign_input_verifies_for_all_supported_forms() {
        let (wallet, key) = wallet_with_key();
        let scripts = [
            Script::pay_to_pubkey(&key.pubkey),
            Script::pay_to_pubkey_hash(&key.key_id()),
            Script::pay_to_witness_key_hash(&key.key_id()),
        ];
        for script in scripts {
            let mut tx = Transaction::new(1000);
            tx.inputs
                .push(TxIn::new(OutPoint::new(hash256(b"prev"), 0)));
            tx.outputs.push(TxOut::new(900, Script::new()));
            let prev_out = TxOut::new(1000, script);
            wallet.sign_input(&mut tx, 0, &prev_out, SIGHASH_ALL).unwrap();
            WalletScriptVerifier.verify_input(&tx, 0, &prev_out).unwrap();
        }
    }

    #[test]
    fn test_sign_unknown_key_fails() {
        let wallet = MemoryWallet::new();
        let other = WalletKey::from_secret([9u8; 32]);
        let mut tx = Transaction::new(1000);
        tx.inputs
            .push(TxIn::new(OutPoint::new(hash256(b"prev"), 0)));
        tx.outputs.push(TxOut::new(900, Script::new()));
        let prev_out = TxOut::new(1000, Script::pay_to_pubkey(&other.pubkey));
        assert!(matches!(
            wallet.sign_input(&mut tx, 0, &prev_out, SIGHASH_ALL),
            Err(WalletError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_sign_block_roundtrip() {
        let (wallet, key) = wallet_with_key();
        let mut coinbase = Transaction::new(1000);
        coinbase.inputs.push(TxIn::new(OutPoint::null()));
        coinbase.outputs.push(TxOut::empty());
        let mut coinstake = Transaction::new(1000);
        coinstake
            .inputs
            .push(TxIn::new(OutPoint::new(hash256(b"kernel"), 0)));
        coinstake.outputs.push(TxOut::empty());
        coinstake
            .outputs
            .push(TxOut::new(5000, Script::pay_to_pubkey(&key.pubkey)));

        let mut block = Block {
            header: prism_primitives::BlockHeader {
                version: 9,
                prev_hash: hash256(b"prev"),
                merkle_root: hash256(b"merkle"),
                time: 1000,
                bits: 0x1e0f_ffff,
                nonce: 0,
            },
            txs: vec![coinbase, coinstake],
            signature: Vec::new(),
        };
        wallet.sign_block(&mut block).unwrap();
        WalletScriptVerifier.verify_block_signature(&block).unwrap();

        block.signature[0] ^= 1;
        assert!(WalletScriptVerifier.verify_block_signature(&block).is_err());
    }
}
