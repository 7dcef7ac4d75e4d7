//! Account records and the pluggable persistence engine behind them.
//! - Account: balance, keys, multisignature profile, delegate/vote state
//! - AccountStore trait (pluggable persistence engine)
//! - InMemAccountStore (HashMap behind a RwLock)

use anyhow::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::crypto::{Address, PublicKey};

/// Confirmed multisignature configuration of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultisigProfile {
    /// Member signatures required for a gated transaction.
    pub min: u32,
    /// Hours a pending gated transaction may wait for approvals.
    pub lifetime: u32,
    pub keysgroup: Vec<PublicKey>,
}

impl MultisigProfile {
    pub fn is_member(&self, key: &PublicKey) -> bool {
        self.keysgroup.contains(key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub address: Address,
    /// Unknown until the account sends its first transaction.
    pub public_key: Option<PublicKey>,
    pub balance: u64,
    pub second_public_key: Option<PublicKey>,
    pub multisignature: Option<MultisigProfile>,
    pub username: Option<String>,
    pub is_delegate: bool,
    /// Delegates this account votes for.
    pub votes: Vec<PublicKey>,
}

impl Account {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            public_key: None,
            balance: 0,
            second_public_key: None,
            multisignature: None,
            username: None,
            is_delegate: false,
            votes: Vec::new(),
        }
    }

    pub fn with_balance(address: Address, balance: u64) -> Self {
        Self { balance, ..Self::new(address) }
    }

    pub fn is_multisig(&self) -> bool {
        self.multisignature.is_some()
    }
}

/// Trait for an account persistence engine.
pub trait AccountStore: Send + Sync + 'static {
    fn get(&self, address: &Address) -> Result<Option<Account>>;
    fn insert(&self, account: Account) -> Result<()>;
}

/// In-memory account store (state is rebuilt from blocks on start)
#[derive(Debug, Default, Clone)]
pub struct InMemAccountStore {
    inner: Arc<RwLock<HashMap<Address, Account>>>,
}

impl InMemAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountStore for InMemAccountStore {
    fn get(&self, address: &Address) -> Result<Option<Account>> {
        Ok(self.inner.read().get(address).cloned())
    }

    fn insert(&self, account: Account) -> Result<()> {
        self.inner.write().insert(account.address, account);
        Ok(())
    }
}
