//! Node configuration.

use crate::Args;
use anyhow::{bail, Context, Result};
use prism_mempool::FeeRate;
use prism_primitives::parse_money;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Network (main, testnet, signet, regtest).
    pub network: String,
    /// Verbose debug logging.
    #[serde(default)]
    pub debug: bool,
    /// Staking configuration.
    #[serde(default)]
    pub staking: StakingConfig,
    /// Regtest-only activation overrides.
    #[serde(default)]
    pub regtest: RegtestConfig,
}

/// Staking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakingConfig {
    /// Master enable for the minter.
    #[serde(default = "default_true")]
    pub minting: bool,
    /// Baseline stake search sleep, milliseconds.
    #[serde(default = "default_staketimio")]
    pub staketimio: u64,
    /// Block weight budget.
    #[serde(default = "default_blockmaxweight")]
    pub blockmaxweight: u64,
    /// Floor feerate for template inclusion, as a money string per kvB.
    #[serde(default)]
    pub blockmintxfee: Option<String>,
    /// Trace stake modifier computation.
    #[serde(default)]
    pub printstakemodifier: bool,
    /// Trace coinstake creation.
    #[serde(default)]
    pub printcoinstake: bool,
    /// Trace package selection.
    #[serde(default)]
    pub printpriority: bool,
}

fn default_true() -> bool {
    true
}

fn default_staketimio() -> u64 {
    500
}

fn default_blockmaxweight() -> u64 {
    prism_miner::DEFAULT_BLOCK_MAX_WEIGHT
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            minting: true,
            staketimio: default_staketimio(),
            blockmaxweight: default_blockmaxweight(),
            blockmintxfee: None,
            printstakemodifier: false,
            printcoinstake: false,
            printpriority: false,
        }
    }
}

/// Regtest-only activation overrides.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegtestConfig {
    /// `deployment:start:end` strings.
    #[serde(default)]
    pub vbparams: Vec<String>,
    /// Segwit activation height; -1 disables.
    #[serde(default)]
    pub segwitheight: Option<i64>,
}

impl NodeConfig {
    /// Load configuration from file, then apply CLI overrides.
    pub fn load(config_path: &Path, args: &Args) -> Result<Self> {
        let mut config = if config_path.exists() {
            let content =
                std::fs::read_to_string(config_path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            Self::default_for_network(&args.network)
        };

        config.network = args.network.clone();
        config.debug |= args.debug;

        if let Some(minting) = args.minting {
            config.staking.minting = minting;
        }
        if let Some(staketimio) = args.staketimio {
            config.staking.staketimio = staketimio;
        }
        if let Some(blockmaxweight) = args.blockmaxweight {
            config.staking.blockmaxweight = blockmaxweight;
        }
        if let Some(ref fee) = args.blockmintxfee {
            config.staking.blockmintxfee = Some(fee.clone());
        }
        config.staking.printstakemodifier |= args.printstakemodifier;
        config.staking.printcoinstake |= args.printcoinstake;
        config.staking.printpriority |= args.printpriority;

        if !args.vbparams.is_empty() {
            config.regtest.vbparams = args.vbparams.clone();
        }
        if let Some(height) = args.segwitheight {
            config.regtest.segwitheight = Some(height);
        }

        // Activation overrides are a regtest-only surface.
        if config.network != "regtest"
            && (!config.regtest.vbparams.is_empty() || config.regtest.segwitheight.is_some())
        {
            bail!("-vbparams and -segwitheight are regtest-only options");
        }

        Ok(config)
    }

    /// Default config for a network.
    pub fn default_for_network(network: &str) -> Self {
        Self {
            network: network.to_string(),
            debug: false,
            staking: StakingConfig::default(),
            regtest: RegtestConfig::default(),
        }
    }

    /// The configured template floor feerate.
    pub fn min_fee_rate(&self) -> Result<FeeRate> {
        match &self.staking.blockmintxfee {
            None => Ok(FeeRate::from_per_kvb(0)),
            Some(s) => {
                let amount = parse_money(s)
                    .with_context(|| format!("Invalid blockmintxfee: '{s}'"))?;
                Ok(FeeRate::from_per_kvb(amount))
            }
        }
    }

    /// Save configuration to file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_args(network: &str) -> Args {
        Args {
            config: "prism.toml".into(),
            network: network.to_string(),
            minting: None,
            staketimio: None,
            blockmaxweight: None,
            blockmintxfee: None,
            printstakemodifier: false,
            printcoinstake: false,
            printpriority: false,
            debug: false,
            vbparams: Vec::new(),
            segwitheight: None,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn test_defaults() {
        let config = NodeConfig::default_for_network("main");
        assert!(config.staking.minting);
        assert_eq!(config.staking.staketimio, 500);
        assert_eq!(config.staking.blockmaxweight, 4_000_000);
        assert_eq!(config.min_fee_rate().unwrap(), FeeRate::from_per_kvb(0));
    }

    #[test]
    fn test_cli_overrides() {
        let mut args = default_args("regtest");
        args.minting = Some(false);
        args.staketimio = Some(250);
        args.blockmintxfee = Some("0.0001".to_string());
        let config = NodeConfig::load(Path::new("/nonexistent"), &args).unwrap();
        assert!(!config.staking.minting);
        assert_eq!(config.staking.staketimio, 250);
        assert_eq!(config.min_fee_rate().unwrap(), FeeRate::from_per_kvb(10_000));
    }

    #[test]
    fn test_vbparams_rejected_off_regtest() {
        let mut args = default_args("main");
        args.vbparams = vec!["testdummy:0:999".to_string()];
        assert!(NodeConfig::load(Path::new("/nonexistent"), &args).is_err());
    }

    #[test]
    fn test_bad_fee_string_is_fatal() {
        let mut args = default_args("main");
        args.blockmintxfee = Some("not-money".to_string());
        let config = NodeConfig::load(Path::new("/nonexistent"), &args).unwrap();
        assert!(config.min_fee_rate().is_err());
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = NodeConfig::default_for_network("testnet");
        let tmp = tempfile::NamedTempFile::new().unwrap();
        config.save(tmp.path()).unwrap();
        let loaded = NodeConfig::load(tmp.path(), &default_args("testnet")).unwrap();
        assert_eq!(loaded.network, "testnet");
        assert_eq!(loaded.staking.staketimio, config.staking.staketimio);
    }
}
