//! Confirmed chain state and the block-local overlay built on top of it.
//!
//! Readers take `ChainState::read()` and see the last committed block. The confirmation
//! pipeline accumulates changes in a `BlockOverlay` and hands the resulting `StateDiff`
//! to `commit`, which applies it under the write side of the same barrier, so no reader
//! ever observes a partially applied block.

use anyhow::Result;
use dashmap::{DashMap, DashSet};
use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::crypto::Address;
use crate::state::account_cache::AccountCache;
use crate::state::account_db::{Account, AccountStore};
use crate::transaction::types::TxId;

/// Confirmed dapp registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DappRecord {
    /// Id of the registering transaction.
    pub id: TxId,
    pub name: String,
    pub link: String,
    pub owner: Address,
}

/// Read access to account-level state.
pub trait StateView {
    fn account(&self, address: &Address) -> Option<Account>;
    fn username_owner(&self, username: &str) -> Option<Address>;
    fn dapp(&self, id: &TxId) -> Option<DappRecord>;
    fn dapp_name_owner(&self, name: &str) -> Option<TxId>;
    /// Whether an out-transfer already paid out for the given source transaction.
    fn out_transfer_processed(&self, source: &TxId) -> bool;

    fn account_or_default(&self, address: &Address) -> Account {
        self.account(address).unwrap_or_else(|| Account::new(*address))
    }
}

/// Post-images produced by applying one or more transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateDiff {
    pub accounts: BTreeMap<Address, Account>,
    pub usernames: BTreeMap<String, Address>,
    pub dapps: BTreeMap<TxId, DappRecord>,
    pub out_transfers: BTreeSet<TxId>,
}

impl StateDiff {
    pub fn put_account(&mut self, account: Account) {
        self.accounts.insert(account.address, account);
    }

    /// Later writes win.
    pub fn merge(&mut self, other: StateDiff) {
        self.accounts.extend(other.accounts);
        self.usernames.extend(other.usernames);
        self.dapps.extend(other.dapps);
        self.out_transfers.extend(other.out_transfers);
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
            && self.usernames.is_empty()
            && self.dapps.is_empty()
            && self.out_transfers.is_empty()
    }
}

pub struct ChainState {
    accounts: AccountCache,
    usernames: DashMap<String, Address>,
    dapps: DashMap<TxId, DappRecord>,
    dapp_names: DashMap<String, TxId>,
    out_transfers: DashSet<TxId>,
    barrier: RwLock<()>,
}

impl ChainState {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self {
            accounts: AccountCache::new(store),
            usernames: DashMap::new(),
            dapps: DashMap::new(),
            dapp_names: DashMap::new(),
            out_transfers: DashSet::new(),
            barrier: RwLock::new(()),
        }
    }

    /// Consistent view of the last committed state.
    pub fn read(&self) -> StateReadGuard<'_> {
        StateReadGuard { state: self, _guard: self.barrier.read() }
    }

    /// Apply a diff atomically with respect to `read()` views.
    pub fn commit(&self, diff: StateDiff) {
        let _w = self.barrier.write();
        let accounts = diff.accounts.len();
        for (_, account) in diff.accounts {
            self.accounts.insert(account);
        }
        for (name, owner) in diff.usernames {
            self.usernames.insert(name, owner);
        }
        for (id, dapp) in diff.dapps {
            self.dapp_names.insert(dapp.name.to_lowercase(), id);
            self.dapps.insert(id, dapp);
        }
        for source in diff.out_transfers {
            self.out_transfers.insert(source);
        }
        debug!(accounts, "state diff committed");
    }

    /// Write dirty accounts to the backing store.
    pub fn flush(&self) -> Result<usize> {
        let _r = self.barrier.read();
        self.accounts.flush()
    }

    pub fn account(&self, address: &Address) -> Option<Account> {
        self.read().account(address)
    }

    fn load_account(&self, address: &Address) -> Option<Account> {
        match self.accounts.get(address) {
            Ok(acc) => acc,
            Err(e) => {
                warn!(%address, error = %e, "account store read failed");
                None
            }
        }
    }
}

/// Read guard over `ChainState`; commits wait until it is dropped.
pub struct StateReadGuard<'a> {
    state: &'a ChainState,
    _guard: RwLockReadGuard<'a, ()>,
}

impl StateView for StateReadGuard<'_> {
    fn account(&self, address: &Address) -> Option<Account> {
        self.state.load_account(address)
    }

    fn username_owner(&self, username: &str) -> Option<Address> {
        self.state.usernames.get(username).map(|r| *r)
    }

    fn dapp(&self, id: &TxId) -> Option<DappRecord> {
        self.state.dapps.get(id).map(|r| r.clone())
    }

    fn dapp_name_owner(&self, name: &str) -> Option<TxId> {
        self.state.dapp_names.get(&name.to_lowercase()).map(|r| *r)
    }

    fn out_transfer_processed(&self, source: &TxId) -> bool {
        self.state.out_transfers.contains(source)
    }
}

/// Block-local working state: pending writes shadow the base view.
pub struct BlockOverlay<'a> {
    base: &'a dyn StateView,
    diff: StateDiff,
}

impl<'a> BlockOverlay<'a> {
    pub fn new(base: &'a dyn StateView) -> Self {
        Self { base, diff: StateDiff::default() }
    }

    /// State as it was before any transaction of this block.
    pub fn base(&self) -> &dyn StateView {
        self.base
    }

    pub fn apply(&mut self, diff: StateDiff) {
        self.diff.merge(diff);
    }

    pub fn into_diff(self) -> StateDiff {
        self.diff
    }
}

impl StateView for BlockOverlay<'_> {
    fn account(&self, address: &Address) -> Option<Account> {
        self.diff
            .accounts
            .get(address)
            .cloned()
            .or_else(|| self.base.account(address))
    }

    fn username_owner(&self, username: &str) -> Option<Address> {
        self.diff
            .usernames
            .get(username)
            .copied()
            .or_else(|| self.base.username_owner(username))
    }

    fn dapp(&self, id: &TxId) -> Option<DappRecord> {
        self.diff.dapps.get(id).cloned().or_else(|| self.base.dapp(id))
    }

    fn dapp_name_owner(&self, name: &str) -> Option<TxId> {
        let lowered = name.to_lowercase();
        self.diff
            .dapps
            .values()
            .find(|d| d.name.to_lowercase() == lowered)
            .map(|d| d.id)
            .or_else(|| self.base.dapp_name_owner(name))
    }

    fn out_transfer_processed(&self, source: &TxId) -> bool {
        self.diff.out_transfers.contains(source) || self.base.out_transfer_processed(source)
    }
}
