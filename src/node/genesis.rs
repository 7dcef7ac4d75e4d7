use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::crypto::{Address, Keypair};
use crate::state::{Account, StateDiff};
use crate::utils::errors::{NodeError, Result};

/// One funded account. Either `address` or `passphrase` identifies it; a passphrase
/// also records the public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
    /// Smallest units.
    pub balance: u64,
}

/// Initial allocation loaded from `genesis.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genesis {
    #[serde(default)]
    pub accounts: Vec<GenesisAccount>,
}

impl Genesis {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref())
            .map_err(|e| NodeError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_toml(&data)
    }

    pub fn from_toml(data: &str) -> Result<Self> {
        toml::from_str(data).map_err(|e| NodeError::Config(format!("genesis: {}", e)))
    }

    pub fn to_diff(&self) -> Result<StateDiff> {
        let mut diff = StateDiff::default();
        for entry in &self.accounts {
            let account = match (&entry.passphrase, entry.address) {
                (Some(phrase), _) => {
                    let kp = Keypair::from_passphrase(phrase).map_err(|e| NodeError::Crypto(e.to_string()))?;
                    let mut acc = Account::with_balance(kp.address(), entry.balance);
                    acc.public_key = Some(kp.public());
                    acc
                }
                (None, Some(address)) => Account::with_balance(address, entry.balance),
                (None, None) => {
                    return Err(NodeError::Config("genesis account needs an address or a passphrase".into()))
                }
            };
            diff.put_account(account);
        }
        Ok(diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::config::COIN;

    #[test]
    fn test_address_and_passphrase_entries() {
        let genesis = Genesis::from_toml(
            r#"
            [[accounts]]
            address = "16313739661670634666L"
            balance = 100000000

            [[accounts]]
            passphrase = "genesis holder"
            balance = 500000000
            "#,
        )
        .unwrap();
        let diff = genesis.to_diff().unwrap();
        assert_eq!(diff.accounts.len(), 2);
        let fixed = &diff.accounts[&Address(16313739661670634666)];
        assert_eq!(fixed.balance, COIN);
        assert!(fixed.public_key.is_none());

        let kp = Keypair::from_passphrase("genesis holder").unwrap();
        assert_eq!(diff.accounts[&kp.address()].public_key, Some(kp.public()));
    }

    #[test]
    fn test_anonymous_entry_is_rejected() {
        let genesis = Genesis::from_toml("[[accounts]]\nbalance = 1\n").unwrap();
        assert!(matches!(genesis.to_diff(), Err(NodeError::Config(_))));
    }
}
