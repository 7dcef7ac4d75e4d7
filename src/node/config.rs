//! Node configuration loaded from TOML. Every field has a default so a partial file
//! (or no file at all) yields a runnable devnet node.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ledger::DEFAULT_OUTCOME_RETENTION;
use crate::transaction::types::TransactionType;
use crate::utils::errors::{NodeError, Result};

/// Smallest units per coin.
pub const COIN: u64 = 100_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    pub transfer: u64,
    pub second_signature: u64,
    pub delegate: u64,
    pub vote: u64,
    /// Charged per keysgroup member plus one for the sender.
    pub multisignature: u64,
    pub dapp: u64,
    pub in_transfer: u64,
    pub out_transfer: u64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            transfer: COIN / 10,
            second_signature: 5 * COIN,
            delegate: 25 * COIN,
            vote: COIN,
            multisignature: 5 * COIN,
            dapp: 25 * COIN,
            in_transfer: COIN / 10,
            out_transfer: COIN / 10,
        }
    }
}

impl FeeSchedule {
    /// `keysgroup_len` only matters for multisignature registrations.
    pub fn fee_for(&self, kind: TransactionType, keysgroup_len: usize) -> u64 {
        match kind {
            TransactionType::Transfer => self.transfer,
            TransactionType::SecondSignature => self.second_signature,
            TransactionType::Delegate => self.delegate,
            TransactionType::Vote => self.vote,
            TransactionType::Multisignature => {
                self.multisignature.saturating_mul(keysgroup_len as u64 + 1)
            }
            TransactionType::Dapp => self.dapp,
            TransactionType::InTransfer => self.in_transfer,
            TransactionType::OutTransfer => self.out_transfer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub minimum: i64,
    pub maximum: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultisigConstraints {
    pub keysgroup_min_items: usize,
    pub keysgroup_max_items: usize,
    pub min: Bounds,
    /// Hours a pending multisignature transaction may wait for approvals.
    pub lifetime: Bounds,
}

impl Default for MultisigConstraints {
    fn default() -> Self {
        Self {
            keysgroup_min_items: 1,
            keysgroup_max_items: 15,
            min: Bounds { minimum: 1, maximum: 15 },
            lifetime: Bounds { minimum: 1, maximum: 72 },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_size: usize,
    /// Seconds an admitted, non-multisig transaction may wait for a block.
    pub unconfirmed_ttl_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_size: 10_000, unconfirmed_ttl_secs: 3 * 60 * 60 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockConfig {
    pub interval_secs: u64,
    pub max_transactions: usize,
    /// Blocks a rejected or expired outcome stays queryable.
    pub outcome_retention: u64,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self { interval_secs: 10, max_transactions: 25, outcome_retention: DEFAULT_OUTCOME_RETENTION }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub fees: FeeSchedule,
    pub multisig: MultisigConstraints,
    pub pool: PoolConfig,
    pub block: BlockConfig,
    pub max_votes_per_transaction: usize,
    pub max_votes_per_account: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            fees: FeeSchedule::default(),
            multisig: MultisigConstraints::default(),
            pool: PoolConfig::default(),
            block: BlockConfig::default(),
            max_votes_per_transaction: 33,
            max_votes_per_account: 101,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub rpc_addr: String,
    /// Genesis allocation file; relative paths resolve against `data_dir`.
    pub genesis: Option<PathBuf>,
    pub log_filter: String,
    /// Keep blocks in memory only (tests, throwaway devnets).
    pub ephemeral: bool,
    pub protocol: ProtocolConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            rpc_addr: "127.0.0.1:4000".into(),
            genesis: None,
            log_filter: "info".into(),
            ephemeral: false,
            protocol: ProtocolConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load node config from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref())
            .map_err(|e| NodeError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_toml(&data)
    }

    pub fn from_toml(data: &str) -> Result<Self> {
        toml::from_str(data).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn genesis_path(&self) -> Option<PathBuf> {
        self.genesis.as_ref().map(|p| {
            if p.is_absolute() { p.clone() } else { self.data_dir.join(p) }
        })
    }
}
