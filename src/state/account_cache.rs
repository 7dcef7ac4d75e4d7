//! In-memory account cache with write-back to an `AccountStore`.
//! - Uses DashMap for concurrent access
//! - Dirty entries are written back on `flush`

use anyhow::Result;
use dashmap::DashMap;
use std::sync::Arc;

use crate::crypto::Address;
use crate::state::account_db::{Account, AccountStore};

/// Cache entry holds Account plus dirty flag
#[derive(Debug, Clone)]
struct CacheEntry {
    account: Account,
    dirty: bool,
}

#[derive(Clone)]
pub struct AccountCache {
    map: Arc<DashMap<Address, CacheEntry>>,
    store: Arc<dyn AccountStore>,
}

impl AccountCache {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { map: Arc::new(DashMap::new()), store }
    }

    /// Load account from cache or backing store
    pub fn get(&self, address: &Address) -> Result<Option<Account>> {
        if let Some(e) = self.map.get(address) {
            return Ok(Some(e.account.clone()));
        }
        match self.store.get(address)? {
            Some(acc) => {
                self.map
                    .insert(*address, CacheEntry { account: acc.clone(), dirty: false });
                Ok(Some(acc))
            }
            None => Ok(None),
        }
    }

    /// Insert or overwrite an account (marked dirty)
    pub fn insert(&self, account: Account) {
        self.map
            .insert(account.address, CacheEntry { account, dirty: true });
    }

    /// Flush dirty entries back to the backing store
    pub fn flush(&self) -> Result<usize> {
        let mut written = 0;
        for mut r in self.map.iter_mut() {
            if r.dirty {
                self.store.insert(r.account.clone())?;
                r.dirty = false;
                written += 1;
            }
        }
        Ok(written)
    }
}
