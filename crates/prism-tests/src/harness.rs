//! Test harness: a regtest chain with mock time and a staking wallet.

use prism_chain::{ChainManager, MockClock};
use prism_consensus::{compute_block_version, ChainParams, RegtestOverrides};
use prism_kernel::Chainstate;
use prism_mempool::Mempool;
use prism_miner::{AssemblerOptions, BlockAssembler, NetworkInfo};
use prism_primitives::{
    block_merkle_root, compact_to_target, Algo, Amount, Block, BlockHeader, Hash256, OutPoint,
    Script, Transaction, TxIn, TxOut,
};
use prism_wallet::{Coin, MemoryWallet, StakingWallet, WalletScriptVerifier};
use std::sync::Arc;

/// A network stub that reports a connected, synchronized node.
#[derive(Debug, Default)]
pub struct ReadyNetwork;

impl NetworkInfo for ReadyNetwork {
    fn node_count(&self) -> usize {
        1
    }

    fn is_initial_block_download(&self) -> bool {
        false
    }

    fn verification_progress(&self) -> f64 {
        1.0
    }
}

/// Chain, mempool, wallet and clock wired for one test.
pub struct StakingHarness {
    pub params: Arc<ChainParams>,
    pub clock: Arc<MockClock>,
    pub chain: Arc<Chainstate>,
    pub mempool: Arc<Mempool>,
    pub wallet: Arc<MemoryWallet>,
}

impl StakingHarness {
    /// Regtest harness; the clock starts shortly after genesis.
    pub fn regtest() -> Self {
        let params = ChainParams::regtest(&RegtestOverrides::default()).expect("regtest params");
        Self::with_params(params)
    }

    pub fn with_params(params: ChainParams) -> Self {
        let start = params.consensus.genesis_time as i64 + 1_000;
        let params = Arc::new(params);
        let clock = Arc::new(MockClock::new(start));
        let chain = Arc::new(Chainstate::new(
            params.clone(),
            Arc::new(WalletScriptVerifier),
            clock.clone(),
        ));
        Self {
            params,
            clock,
            chain,
            mempool: Arc::new(Mempool::with_defaults()),
            wallet: Arc::new(MemoryWallet::new()),
        }
    }

    pub fn now(&self) -> i64 {
        use prism_chain::Clock;
        self.clock.adjusted_now()
    }

    /// An assembler over this harness's components.
    pub fn assembler(&self, options: AssemblerOptions) -> BlockAssembler {
        BlockAssembler::new(
            self.params.clone(),
            self.chain.clone(),
            self.mempool.clone(),
            options,
        )
    }

    /// Mine and connect a proof-of-work block carrying `extra_txs`.
    pub fn mine_pow_block(&self, extra_txs: Vec<Transaction>) -> Block {
        let tip = self.chain.active_tip();
        let height = tip.height + 1;
        let time = self.now() as u32;

        let mut coinbase = Transaction::new(time);
        let mut input = TxIn::new(OutPoint::null());
        input.script_sig = Script::coinbase_script_sig(height);
        coinbase.inputs.push(input);
        coinbase.outputs.push(TxOut::new(
            prism_consensus::block_subsidy(&self.params.consensus, height, false, 0),
            Script::new(),
        ));

        let mut txs = vec![coinbase];
        txs.extend(extra_txs);

        let bits = self
            .chain
            .next_work_required(&tip.hash, Algo::PowSha256d)
            .expect("tip is indexed");
        let mut block = Block {
            header: BlockHeader {
                version: compute_block_version(&self.params.consensus, height, Algo::PowSha256d),
                prev_hash: tip.hash,
                merkle_root: Hash256::ZERO,
                time,
                bits,
                nonce: 0,
            },
            txs,
            signature: Vec::new(),
        };
        block.header.merkle_root = block_merkle_root(&block);

        let target = compact_to_target(bits).target;
        while block.header.pow_hash().to_biguint() > target {
            block.header.nonce += 1;
        }
        self.chain
            .process_new_block(&block)
            .expect("mined block connects");
        block
    }

    /// Mine a block funding the wallet with a stakable pay-to-pubkey coin of
    /// `value`, registered with the wallet. Returns the coin.
    pub fn fund_stake_coin(&self, value: Amount) -> Coin {
        let key_id = self.wallet.add_key([0x42; 32]);
        let key = self.wallet.get_key(&key_id).expect("key just added");
        let script = Script::pay_to_pubkey(&key.pubkey);

        let mut funding = Transaction::new(self.now() as u32);
        funding
            .inputs
            .push(TxIn::new(OutPoint::new(prism_primitives::hash256(b"faucet"), 0)));
        funding.outputs.push(TxOut::new(value, script.clone()));

        let block = self.mine_pow_block(vec![funding.clone()]);
        let coin = Coin {
            outpoint: OutPoint::new(funding.txid(), 0),
            value,
            script_pubkey: script,
            height: self.chain.active_height(),
            time: block.header.time,
            is_coinbase: false,
            is_coinstake: false,
        };
        self.wallet.add_coin(coin.clone());
        coin
    }

    /// Advance mock time by `secs`.
    pub fn advance(&self, secs: i64) {
        self.clock.advance(secs);
    }
}
