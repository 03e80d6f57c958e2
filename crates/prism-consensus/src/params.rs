//! Per-network consensus parameters.
//!
//! `ChainParams::select` builds the frozen parameter set for one network.
//! Regtest accepts activation overrides before freezing; every other network
//! is a fixed table of verified values.

use prism_primitives::{Algo, Amount, BlockHash, Script, COIN};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Errors raised while constructing chain parameters.
#[derive(Error, Debug)]
pub enum ParamsError {
    /// Unknown network name.
    #[error("Unknown network: {0}")]
    UnknownNetwork(String),

    /// Segwit activation override out of range.
    #[error("Activation height {0} for segwit is out of valid range; use -1 to disable")]
    BadSegwitHeight(i64),

    /// Malformed `-vbparams` string.
    #[error("Version bits parameters malformed ({0}), expecting deployment:start:end")]
    BadVbParams(String),

    /// `-vbparams` named an unknown deployment.
    #[error("Invalid deployment ({0})")]
    UnknownDeployment(String),
}

/// Result type for parameter construction.
pub type ParamsResult<T> = Result<T, ParamsError>;

/// The supported networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Main,
    Testnet,
    Signet,
    Regtest,
}

impl Network {
    pub fn from_name(name: &str) -> ParamsResult<Network> {
        match name {
            "main" | "mainnet" => Ok(Network::Main),
            "test" | "testnet" => Ok(Network::Testnet),
            "signet" => Ok(Network::Signet),
            "regtest" => Ok(Network::Regtest),
            other => Err(ParamsError::UnknownNetwork(other.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Network::Main => "main",
            Network::Testnet => "testnet",
            Network::Signet => "signet",
            Network::Regtest => "regtest",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A treasury payee: destination script and its share of the payment,
/// in per-cent of the per-block treasury amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreasuryPayee {
    pub script: Script,
    pub percent: u8,
}

/// A version-bits deployment window (activation heights are read elsewhere;
/// only regtest ever rewrites these).
#[derive(Debug, Clone)]
pub struct Deployment {
    pub name: String,
    pub bit: u8,
    pub start_time: i64,
    pub timeout: i64,
}

/// The frozen consensus parameter table of one network.
#[derive(Debug, Clone)]
pub struct ConsensusParams {
    pub subsidy_halving_interval: u32,
    /// Target spacing between blocks, seconds.
    pub pow_target_spacing: u32,
    /// Difficulty averaging window, seconds.
    pub pow_target_timespan: u32,

    /// Low-bit mask granularising valid stake timestamps.
    pub stake_timestamp_mask: u32,
    /// Minimum coin age in seconds, indexed by stake era.
    pub stake_min_age: [u32; 2],
    /// Minimum coin depth in blocks, indexed by stake era.
    pub stake_min_depth: [u32; 2],
    /// Coin-age accrual cap in seconds, indexed by stake era.
    pub stake_max_age: [u32; 2],
    /// Seconds between stake modifier re-rolls.
    pub modifier_interval: u32,
    /// Weighting constant of the geometric selection sections.
    pub modifier_interval_ratio: u32,

    /// First height allowed to stake.
    pub pos_start_block: u32,
    /// Last height allowed to mine proof-of-work.
    pub last_pow_block: u32,
    /// Heights of the two mandatory protocol upgrades.
    pub mandatory_upgrade_block: [u32; 2],
    /// Minimum header versions after each upgrade.
    pub upgrade_block_version: [i32; 2],

    /// First height carrying treasury outputs.
    pub treasury_payments_start_block: u32,
    /// Blocks per treasury accounting cycle.
    pub treasury_payments_cycle_blocks: u32,
    /// Flat per-block treasury amount once payments start.
    pub treasury_payment: Amount,
    /// Payees and their per-cent shares; shares sum to at most 100.
    pub treasury_payees: Vec<TreasuryPayee>,

    /// Per-algorithm proof limits, compact encoded, indexed by `Algo::index`.
    pub pow_limit_bits: [u32; Algo::COUNT],
    pub pow_allow_min_difficulty: bool,
    pub pow_no_retargeting: bool,

    /// Mainnet window of historically mis-adjusted scrypt² difficulty;
    /// consumed by the external difficulty module.
    pub bad_scrypt_diff_start_time: i64,
    pub bad_scrypt_diff_end_time: i64,

    /// Segwit activation height (regtest may override).
    pub segwit_height: u32,
    /// Version-bits deployments (regtest may override).
    pub deployments: Vec<Deployment>,

    /// Hard checkpoints of stake modifier checksums.
    pub stake_modifier_checkpoints: BTreeMap<u32, u32>,

    /// The frozen genesis block hash.
    pub genesis_hash: BlockHash,
    pub genesis_time: u32,
    pub genesis_bits: u32,
    pub genesis_version: i32,
}

/// Regtest-only activation overrides applied before the parameters freeze.
#[derive(Debug, Clone, Default)]
pub struct RegtestOverrides {
    /// `-segwitheight <n>`; -1 disables segwit.
    pub segwit_height: Option<i64>,
    /// `-vbparams deployment:start:end` strings.
    pub vbparams: Vec<String>,
}

/// The selected parameters of the active network.
#[derive(Debug, Clone)]
pub struct ChainParams {
    pub network: Network,
    pub consensus: ConsensusParams,
}

/// The mainnet genesis hash; gates the historic pre-upgrade stake bypass so
/// it can never leak onto another network.
pub(crate) fn mainnet_genesis_hash() -> BlockHash {
    "f4bbfc518aa3622dbeb8d2818a606b82c2b8b1ac2f28553ebdb6fc04d7abaccf"
        .parse()
        .expect("static hash literal")
}

fn testdummy_deployment() -> Deployment {
    Deployment {
        name: "testdummy".to_string(),
        bit: 28,
        start_time: 1_199_145_601,
        timeout: 1_230_767_999,
    }
}

fn pay_to_script_hash(hash_hex: &str) -> Script {
    let mut bytes = vec![0xa9, 20];
    bytes.extend_from_slice(&hex::decode(hash_hex).expect("static script hash"));
    bytes.push(0x87);
    Script::from_bytes(bytes)
}

fn pay_to_pubkey(key_hex: &str) -> Script {
    Script::pay_to_pubkey(&hex::decode(key_hex).expect("static pubkey"))
}

impl ChainParams {
    /// Build the parameters for `network`. Overrides are honoured on regtest
    /// only; passing them for any other network is a caller bug and they are
    /// ignored, matching the command-line surface.
    pub fn select(network: Network, overrides: &RegtestOverrides) -> ParamsResult<ChainParams> {
        match network {
            Network::Main => Ok(ChainParams::main()),
            Network::Testnet => Ok(ChainParams::testnet()),
            Network::Signet => Ok(ChainParams::signet()),
            Network::Regtest => ChainParams::regtest(overrides),
        }
    }

    /// Main network.
    pub fn main() -> ChainParams {
        let mut checkpoints = BTreeMap::new();
        checkpoints.insert(0u32, 0xfd11_f4e7u32);

        let consensus = ConsensusParams {
            subsidy_halving_interval: 100_000,
            pow_target_spacing: 80,
            pow_target_timespan: 24 * 60 * 60,

            stake_timestamp_mask: 0xf,
            stake_min_age: [2 * 60 * 60, 12 * 60 * 60],
            stake_min_depth: [200, 600],
            stake_max_age: [14 * 24 * 60 * 60, 30 * 24 * 60 * 60],
            modifier_interval: 60,
            modifier_interval_ratio: 3,

            pos_start_block: 0,
            last_pow_block: u32::MAX,
            mandatory_upgrade_block: [1_030_000, 1_450_000],
            upgrade_block_version: [8, 9],

            treasury_payments_start_block: 1_030_000,
            treasury_payments_cycle_blocks: 24 * 60 * 60 / 80,
            treasury_payment: 2 * COIN,
            treasury_payees: vec![
                TreasuryPayee {
                    script: pay_to_pubkey(
                        "03a728481601bb6f2e1873624fe15df816b0633b4c499406843c666800fbe45d5a",
                    ),
                    percent: 25,
                },
                TreasuryPayee {
                    script: pay_to_pubkey(
                        "0254121b1cbfcb42e0d53410f0db9c1c51fc79a0a376dd3e0d3c7431915f9fed44",
                    ),
                    percent: 25,
                },
                TreasuryPayee {
                    script: pay_to_script_hash("8369e8934167c47127ce0327964309a0b13a52cc"),
                    percent: 50,
                },
            ],

            pow_limit_bits: pow_limits(
                0x1e0f_ffff, // pos
                0x1d00_ffff, // sha256d
                0x1d00_ffff, // sha1d
                0x1f00_ffff, // quark
                0x1f1f_ffff, // scrypt²
                0x1f00_ffff, // argon2d
            ),
            pow_allow_min_difficulty: true,
            pow_no_retargeting: false,

            bad_scrypt_diff_start_time: 1_573_746_979,
            bad_scrypt_diff_end_time: 1_574_121_600,

            segwit_height: 1_450_000,
            deployments: vec![testdummy_deployment()],

            stake_modifier_checkpoints: checkpoints,

            genesis_hash: mainnet_genesis_hash(),
            genesis_time: 1_517_690_700,
            genesis_bits: 0x1f00_ffff,
            genesis_version: 1,
        };

        ChainParams {
            network: Network::Main,
            consensus,
        }
    }

    /// Test network.
    pub fn testnet() -> ChainParams {
        let mut params = ChainParams::main();
        params.network = Network::Testnet;

        let c = &mut params.consensus;
        c.subsidy_halving_interval = 210_000;
        c.pow_target_spacing = 64;
        c.stake_min_age = [60 * 60, 60 * 60];
        c.stake_min_depth = [100, 100];
        c.stake_max_age = [30 * 24 * 60 * 60, 30 * 24 * 60 * 60];
        c.mandatory_upgrade_block = [0, 0];
        c.upgrade_block_version = [0, 0];
        c.treasury_payments_start_block = 1_000;
        c.treasury_payments_cycle_blocks = 24 * 6 * 60 / 64;
        c.pow_limit_bits = pow_limits(
            0x1d00_ffff, // pos
            0x1d00_ffff, // sha256d
            0x1d00_ffff, // sha1d
            0x1d00_ffff, // quark
            0x1f1f_ffff, // scrypt²
            0x1f00_ffff, // argon2d
        );
        c.bad_scrypt_diff_start_time = 0;
        c.bad_scrypt_diff_end_time = 0;
        c.segwit_height = 0;
        c.stake_modifier_checkpoints = BTreeMap::from([(0u32, 0xfd11_f4e7u32)]);
        c.genesis_hash = "64aaacff5d8b95634776c67435e50d69b295012e34883be90e0a5efdc9dc0857"
            .parse()
            .expect("static hash literal");
        c.genesis_time = 1_574_924_400;
        c.genesis_bits = 0x1d00_ffff;
        c.genesis_version = 1;

        params
    }

    /// Signet mirrors testnet consensus values under its own tag.
    pub fn signet() -> ChainParams {
        let mut params = ChainParams::testnet();
        params.network = Network::Signet;
        params
    }

    /// Regression test network with activation overrides.
    pub fn regtest(overrides: &RegtestOverrides) -> ParamsResult<ChainParams> {
        let mut params = ChainParams::testnet();
        params.network = Network::Regtest;

        let c = &mut params.consensus;
        c.subsidy_halving_interval = 150;
        c.pow_target_spacing = 32;
        c.pow_target_timespan = 20 * 60;
        c.stake_timestamp_mask = 0x3;
        c.stake_min_depth = [0, 0];
        c.treasury_payments_cycle_blocks = 24 * 6 * 60 / 32;
        c.pow_limit_bits = [0x207f_ffff; Algo::COUNT];
        c.stake_modifier_checkpoints = BTreeMap::new();
        c.genesis_hash = "5ac5f7b6f45daac7b5250f1023b6d5b5402407b49a3adb1c6834d59eabef5229"
            .parse()
            .expect("static hash literal");

        if let Some(height) = overrides.segwit_height {
            if !(-1..i64::from(u32::MAX)).contains(&height) {
                return Err(ParamsError::BadSegwitHeight(height));
            }
            c.segwit_height = if height == -1 {
                tracing::info!("Segwit disabled for testing");
                u32::MAX
            } else {
                height as u32
            };
        }

        for vbparam in &overrides.vbparams {
            let parts: Vec<&str> = vbparam.split(':').collect();
            if parts.len() != 3 {
                return Err(ParamsError::BadVbParams(vbparam.clone()));
            }
            let start_time: i64 = parts[1]
                .parse()
                .map_err(|_| ParamsError::BadVbParams(vbparam.clone()))?;
            let timeout: i64 = parts[2]
                .parse()
                .map_err(|_| ParamsError::BadVbParams(vbparam.clone()))?;
            let deployment = c
                .deployments
                .iter_mut()
                .find(|d| d.name == parts[0])
                .ok_or_else(|| ParamsError::UnknownDeployment(parts[0].to_string()))?;
            deployment.start_time = start_time;
            deployment.timeout = timeout;
            tracing::info!(
                deployment = parts[0],
                start = start_time,
                timeout,
                "Set version bits activation parameters"
            );
        }

        Ok(params)
    }
}

impl ConsensusParams {
    /// Compact proof limit of one algorithm.
    pub fn pow_limit_bits(&self, algo: Algo) -> u32 {
        self.pow_limit_bits[algo.index()]
    }

    /// Decoded proof limit of one algorithm.
    pub fn pow_limit(&self, algo: Algo) -> num_bigint::BigUint {
        prism_primitives::compact_to_target(self.pow_limit_bits(algo)).target
    }

    /// True when the pre-upgrade mainnet stake bypass applies at `height`.
    pub fn allows_historic_stake_bypass(&self, height: u32) -> bool {
        height < self.mandatory_upgrade_block[0] && self.genesis_hash == mainnet_genesis_hash()
    }
}

fn pow_limits(
    pos: u32,
    sha256d: u32,
    sha1d: u32,
    quark: u32,
    scrypt_sq: u32,
    argon2d: u32,
) -> [u32; Algo::COUNT] {
    let mut limits = [0u32; Algo::COUNT];
    limits[Algo::Pos.index()] = pos;
    limits[Algo::PowSha256d.index()] = sha256d;
    limits[Algo::PowSha1d.index()] = sha1d;
    limits[Algo::PowQuark.index()] = quark;
    limits[Algo::PowScryptSq.index()] = scrypt_sq;
    limits[Algo::PowArgon2d.index()] = argon2d;
    limits
}
