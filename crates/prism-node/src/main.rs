//! Prism node binary.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod node;

use config::NodeConfig;
use node::Node;

/// Prism blockchain node.
#[derive(Parser, Debug)]
#[command(name = "prism-node")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "prism.toml")]
    pub config: PathBuf,

    /// Network to run on (main, testnet, signet, regtest)
    #[arg(short, long, default_value = "main")]
    pub network: String,

    /// Enable or disable the proof-of-stake minter
    #[arg(long)]
    pub minting: Option<bool>,

    /// Baseline stake search sleep in milliseconds
    #[arg(long)]
    pub staketimio: Option<u64>,

    /// Block weight budget for assembled templates
    #[arg(long)]
    pub blockmaxweight: Option<u64>,

    /// Floor feerate for template inclusion (money per kvB)
    #[arg(long)]
    pub blockmintxfee: Option<String>,

    /// Trace stake modifier computation
    #[arg(long)]
    pub printstakemodifier: bool,

    /// Trace coinstake creation
    #[arg(long)]
    pub printcoinstake: bool,

    /// Trace package selection
    #[arg(long)]
    pub printpriority: bool,

    /// Verbose debug logging
    #[arg(long)]
    pub debug: bool,

    /// Version bits override, regtest only (deployment:start:end)
    #[arg(long)]
    pub vbparams: Vec<String>,

    /// Segwit activation height override, regtest only (-1 disables)
    #[arg(long)]
    pub segwitheight: Option<i64>,

    /// Log level
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { &args.log_level };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = NodeConfig::load(&args.config, &args)?;
    info!(network = config.network, "Starting prism-node");

    let node = Node::new(&config)?;
    node.run().await
}
