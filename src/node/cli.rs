use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::node::config::NodeConfig;
use crate::node::genesis::Genesis;
use crate::node::Node;
use crate::utils::logging::init_logging;

const CONFIG_FILE: &str = "config.toml";
const GENESIS_FILE: &str = "genesis.toml";

/// CLI for node control.
#[derive(Parser, Debug)]
#[command(name = "quorum-node", version, about)]
pub struct Cli {
    /// Node config file (TOML). Defaults to `<data-dir>/config.toml` when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Write a default config and an empty genesis into the data directory
    Init {
        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },
    /// Run the node
    Run {
        /// rpc bind address (host:port)
        #[arg(long)]
        rpc: Option<String>,

        /// Keep the ledger in memory
        #[arg(long)]
        ephemeral: bool,
    },
}

impl Cli {
    /// Config file (explicit or found in the data dir) with flag overrides applied.
    pub fn resolve_config(&self) -> Result<NodeConfig> {
        let data_dir = self.data_dir.clone().unwrap_or_else(|| NodeConfig::default().data_dir);
        let path = self.config.clone().or_else(|| {
            let candidate = data_dir.join(CONFIG_FILE);
            candidate.exists().then_some(candidate)
        });
        let mut config = match path {
            Some(p) => NodeConfig::load(&p).with_context(|| format!("loading {}", p.display()))?,
            None => NodeConfig::default(),
        };
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Cmd::Run { rpc, ephemeral } = &self.cmd {
            if let Some(addr) = rpc {
                config.rpc_addr = addr.clone();
            }
            config.ephemeral |= *ephemeral;
        }
        Ok(config)
    }
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;
    init_logging(&config.log_filter);

    match cli.cmd {
        Cmd::Init { force } => init_data_dir(&config, force),
        Cmd::Run { .. } => {
            let genesis = match config.genesis_path() {
                Some(path) => Genesis::load(&path)?,
                None => {
                    warn!("no genesis configured; starting with an empty allocation");
                    Genesis::default()
                }
            };
            let node = Node::build(config, &genesis).await?;
            let handle = node.start().await?;
            tokio::signal::ctrl_c().await?;
            info!("shutting down");
            handle.shutdown().await
        }
    }
}

fn init_data_dir(config: &NodeConfig, force: bool) -> Result<()> {
    fs::create_dir_all(&config.data_dir)?;
    let mut config = config.clone();
    config.genesis.get_or_insert_with(|| PathBuf::from(GENESIS_FILE));

    let files = [
        (CONFIG_FILE, toml::to_string_pretty(&config)?),
        (GENESIS_FILE, toml::to_string_pretty(&Genesis::default())?),
    ];
    for (name, body) in files {
        let path = config.data_dir.join(name);
        if path.exists() && !force {
            warn!(path = %path.display(), "exists, keeping it");
            continue;
        }
        fs::write(&path, body)?;
        info!(path = %path.display(), "written");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_path = dir.path().join("node.toml");
        fs::write(&cfg_path, "rpc_addr = \"127.0.0.1:1\"\nlog_filter = \"debug\"\n").unwrap();

        let cli = Cli::parse_from([
            "quorum-node",
            "--config",
            cfg_path.to_str().unwrap(),
            "run",
            "--rpc",
            "127.0.0.1:2",
            "--ephemeral",
        ]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.rpc_addr, "127.0.0.1:2");
        assert_eq!(config.log_filter, "debug");
        assert!(config.ephemeral);
    }

    #[test]
    fn test_init_writes_loadable_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = NodeConfig { data_dir: dir.path().to_path_buf(), ..NodeConfig::default() };
        init_data_dir(&config, false).unwrap();

        let written = NodeConfig::load(dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(written.protocol, config.protocol);
        let genesis_path = written.genesis_path().unwrap();
        assert_eq!(Genesis::load(genesis_path).unwrap(), Genesis::default());
    }
}
