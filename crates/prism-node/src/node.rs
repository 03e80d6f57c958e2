//! Node wiring.

use crate::config::NodeConfig;
use anyhow::{Context, Result};
use prism_chain::SystemClock;
use prism_consensus::{ChainParams, Network, RegtestOverrides};
use prism_kernel::Chainstate;
use prism_mempool::Mempool;
use prism_miner::{AssemblerOptions, MinterConfig, NetworkInfo, StakeMinter};
use prism_wallet::{MemoryWallet, WalletScriptVerifier};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

/// Network facts published by the (external) P2P layer.
#[derive(Debug, Default)]
pub struct NetworkStatus {
    peers: AtomicUsize,
    initial_download: AtomicBool,
}

impl NetworkStatus {
    pub fn set_peers(&self, count: usize) {
        self.peers.store(count, Ordering::Relaxed);
    }

    pub fn set_initial_download(&self, active: bool) {
        self.initial_download.store(active, Ordering::Relaxed);
    }
}

impl NetworkInfo for NetworkStatus {
    fn node_count(&self) -> usize {
        self.peers.load(Ordering::Relaxed)
    }

    fn is_initial_block_download(&self) -> bool {
        self.initial_download.load(Ordering::Relaxed)
    }

    fn verification_progress(&self) -> f64 {
        // Without headers-first sync estimation, a quiesced chain reads as
        // fully verified.
        if self.is_initial_block_download() {
            0.0
        } else {
            1.0
        }
    }
}

/// The assembled node.
pub struct Node {
    pub params: Arc<ChainParams>,
    pub chain: Arc<Chainstate>,
    pub mempool: Arc<Mempool>,
    pub wallet: Arc<MemoryWallet>,
    pub network: Arc<NetworkStatus>,
    minter: Arc<StakeMinter>,
}

impl Node {
    /// Build a node from configuration. Malformed configuration is fatal.
    pub fn new(config: &NodeConfig) -> Result<Self> {
        let network = Network::from_name(&config.network).context("Selecting network")?;
        let overrides = RegtestOverrides {
            segwit_height: config.regtest.segwitheight,
            vbparams: config.regtest.vbparams.clone(),
        };
        let params = Arc::new(
            ChainParams::select(network, &overrides).context("Building chain parameters")?,
        );
        info!(network = %params.network, "Selected chain parameters");

        let chain = Arc::new(
            Chainstate::new(
                params.clone(),
                Arc::new(WalletScriptVerifier),
                Arc::new(SystemClock),
            )
            .with_print_modifier(config.staking.printstakemodifier),
        );
        let mempool = Arc::new(Mempool::with_defaults());
        let wallet = Arc::new(MemoryWallet::new());
        let network_status = Arc::new(NetworkStatus::default());

        let options = AssemblerOptions {
            max_weight: config.staking.blockmaxweight,
            min_fee_rate: config.min_fee_rate()?,
            print_priority: config.staking.printpriority,
            print_coinstake: config.staking.printcoinstake,
            ..Default::default()
        };
        let minter_config = MinterConfig {
            minting: config.staking.minting,
            stake_timio_ms: config.staking.staketimio,
        };
        let minter = Arc::new(StakeMinter::new(
            params.clone(),
            chain.clone(),
            mempool.clone(),
            wallet.clone(),
            network_status.clone(),
            minter_config,
            options,
        ));

        Ok(Self {
            params,
            chain,
            mempool,
            wallet,
            network: network_status,
            minter,
        })
    }

    /// Run until interrupted (ctrl-c).
    pub async fn run(&self) -> Result<()> {
        let minter = self.minter.clone();
        let task = tokio::spawn(minter.run());

        tokio::signal::ctrl_c()
            .await
            .context("Waiting for shutdown signal")?;
        info!("Shutdown requested");
        self.minter.interrupt().trigger();
        task.await.context("Joining minter task")?;
        Ok(())
    }

    pub fn minter(&self) -> &Arc<StakeMinter> {
        &self.minter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_chain::ChainManager;

    #[test]
    fn test_node_builds_on_every_network() {
        for network in ["main", "testnet", "signet", "regtest"] {
            let config = NodeConfig::default_for_network(network);
            let node = Node::new(&config).unwrap();
            assert_eq!(node.chain.active_height(), 0);
        }
    }

    #[test]
    fn test_bad_network_is_fatal() {
        let config = NodeConfig::default_for_network("nonet");
        assert!(Node::new(&config).is_err());
    }

    #[test]
    fn test_network_status_gates() {
        let status = NetworkStatus::default();
        assert_eq!(status.node_count(), 0);
        status.set_peers(3);
        assert_eq!(status.node_count(), 3);
        assert!(status.verification_progress() > 0.996);
        status.set_initial_download(true);
        assert!(status.verification_progress() < 0.996);
    }
}
