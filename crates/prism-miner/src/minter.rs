//! The proof-of-stake minter task.
//!
//! A single background task that periodically asks the assembler for a
//! coinstake template, signs and submits the result. Every sleep is
//! interrupt-sensitive: cancellation returns immediately and the task exits
//! cleanly without holding any lock.

use crate::{AssemblerOptions, BlockAssembler, MinerError};
use prism_chain::ChainManager;
use prism_consensus::{ChainParams, Network};
use prism_kernel::Chainstate;
use prism_mempool::Mempool;
use prism_primitives::Script;
use prism_wallet::StakingWallet;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Chain sync progress below which minting stays suspended.
const MIN_SYNC_PROGRESS: f64 = 0.996;

/// Cancellation handle shared with the network layer.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    token: CancellationToken,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal every waiter to exit.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Sleep for `duration`; returns false when interrupted.
    pub async fn sleep_for(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

/// Network-side facts the minter gates on.
pub trait NetworkInfo: Send + Sync {
    fn node_count(&self) -> usize;
    fn is_initial_block_download(&self) -> bool;
    /// Estimated verification progress in [0, 1].
    fn verification_progress(&self) -> f64;
}

/// Minter configuration.
#[derive(Debug, Clone)]
pub struct MinterConfig {
    /// Master enable (`-minting` / `-staking`).
    pub minting: bool,
    /// Baseline sleep between stake searches, ms (`-staketimio`).
    pub stake_timio_ms: u64,
}

impl Default for MinterConfig {
    fn default() -> Self {
        Self {
            minting: true,
            stake_timio_ms: 500,
        }
    }
}

/// The background stake minter.
pub struct StakeMinter {
    params: Arc<ChainParams>,
    chain: Arc<Chainstate>,
    wallet: Arc<dyn StakingWallet>,
    network: Arc<dyn NetworkInfo>,
    assembler: BlockAssembler,
    interrupt: Interrupt,
    config: MinterConfig,
    blocks_minted: AtomicU64,
}

impl StakeMinter {
    pub fn new(
        params: Arc<ChainParams>,
        chain: Arc<Chainstate>,
        mempool: Arc<Mempool>,
        wallet: Arc<dyn StakingWallet>,
        network: Arc<dyn NetworkInfo>,
        config: MinterConfig,
        options: AssemblerOptions,
    ) -> Self {
        let assembler = BlockAssembler::new(params.clone(), chain.clone(), mempool, options);
        Self {
            params,
            chain,
            wallet,
            network,
            assembler,
            interrupt: Interrupt::new(),
            config,
            blocks_minted: AtomicU64::new(0),
        }
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    pub fn blocks_minted(&self) -> u64 {
        self.blocks_minted.load(Ordering::Relaxed)
    }

    /// Run the minting loop until interrupted.
    pub async fn run(self: Arc<Self>) {
        if !self.config.minting {
            info!("Proof-of-stake minter disabled");
            return;
        }
        info!("Stake minter started");

        // Stake timeout grows with the square root of the coin count.
        let utxo_count = self.wallet.available_coins().len();
        let pos_timio = Duration::from_millis(
            self.config.stake_timio_ms + 30 * (utxo_count as f64).sqrt() as u64,
        );
        info!(timeout_ms = pos_timio.as_millis() as u64, utxos = utxo_count, "Set proof-of-stake timeout");

        loop {
            // Warm-up gates, each polled on an interrupt-sensitive sleep.
            while self.wallet.is_locked() {
                debug!("Minting suspended: wallet locked");
                if !self.interrupt.sleep_for(Duration::from_secs(3)).await {
                    info!("Stake minter exiting");
                    return;
                }
            }
            if self.params.network != Network::Regtest {
                while self.network.node_count() == 0 || self.network.is_initial_block_download() {
                    debug!("Minting suspended: waiting for network");
                    if !self.interrupt.sleep_for(Duration::from_secs(10)).await {
                        info!("Stake minter exiting");
                        return;
                    }
                }
            }
            while self.network.verification_progress() < MIN_SYNC_PROGRESS {
                debug!(
                    progress = self.network.verification_progress(),
                    "Minting suspended: synchronizing"
                );
                if !self.interrupt.sleep_for(Duration::from_secs(10)).await {
                    info!("Stake minter exiting");
                    return;
                }
            }

            match self
                .assembler
                .create_new_block(&Script::new(), Some(self.wallet.as_ref()))
            {
                Ok(template) => {
                    if self.submit_block(template.block) {
                        self.blocks_minted.fetch_add(1, Ordering::Relaxed);
                        // Rest after a successful mint; jitter keeps a fleet
                        // of minters from waking in lockstep.
                        let rest = 60 + rand::thread_rng().gen_range(0..4);
                        if !self.interrupt.sleep_for(Duration::from_secs(rest)).await {
                            info!("Stake minter exiting");
                            return;
                        }
                    } else if !self.interrupt.sleep_for(pos_timio).await {
                        info!("Stake minter exiting");
                        return;
                    }
                }
                Err(MinerError::StakeNotFound) => {
                    // No kernel this tick; try again shortly.
                    if !self.interrupt.sleep_for(pos_timio).await {
                        info!("Stake minter exiting");
                        return;
                    }
                }
                Err(err) => {
                    error!("Block creation failed: {err}");
                    return;
                }
            }
        }
    }

    /// Sign and hand the block to the chain manager. Returns true when the
    /// block was accepted.
    fn submit_block(&self, mut block: prism_primitives::Block) -> bool {
        if let Err(err) = self.wallet.sign_block(&mut block) {
            warn!("Failed to sign proof-of-stake block: {err}");
            return false;
        }
        // A new tip arrived while assembling.
        if block.header.prev_hash != self.chain.active_tip().hash {
            warn!("Generated block is stale");
            return false;
        }
        match self.chain.process_new_block(&block) {
            Ok(()) => {
                info!(hash = %block.hash(), "Proof-of-stake block found");
                true
            }
            Err(err) => {
                warn!("Generated block not accepted: {err}");
                false
            }
        }
    }
}
