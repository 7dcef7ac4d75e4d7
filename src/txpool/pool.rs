//! TxPool: unconfirmed transactions keyed by id, with dedup, capacity and TTL.
//!
//! Data model:
//! - one `PoolEntry` per transaction id (`DashMap`, insertion via the entry API so two
//!   concurrent submissions of the same id cannot both succeed)
//! - `PoolState` tells the confirmation pipeline whether the entry may go into a block
//! - `list_eligible` returns an owned snapshot sorted by ascending id, the order in
//!   which a block applies transactions

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;

use crate::transaction::types::{MemberSignature, Transaction, TxId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PoolState {
    /// Waiting for multisignature approvals.
    PendingMultisig,
    /// May be included in the next block.
    Eligible,
}

/// Metadata tracked for each tx in pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolMeta {
    pub id: TxId,
    pub state: PoolState,
    /// Unix seconds.
    pub inserted_at: u64,
    pub expires_at: u64,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TxPoolError {
    #[error("Transaction is already in unconfirmed state: {0}")]
    Duplicate(TxId),
    #[error("Transaction pool is full")]
    PoolFull,
    #[error("Transaction not found in pool: {0}")]
    NotFound(TxId),
}

#[derive(Debug, Clone)]
struct PoolEntry {
    tx: Transaction,
    meta: PoolMeta,
}

pub struct TxPool {
    entries: DashMap<TxId, PoolEntry>,
    pub max_size: usize,
    /// Seconds a non-multisig entry may stay unconfirmed.
    pub ttl_secs: u64,
}

impl TxPool {
    pub fn new(max_size: usize, ttl_secs: u64) -> Self {
        Self { entries: DashMap::new(), max_size, ttl_secs }
    }

    /// Insert a validated transaction. `expires_at` defaults to `now + ttl_secs`.
    pub fn insert(
        &self,
        tx: Transaction,
        state: PoolState,
        now: u64,
        expires_at: Option<u64>,
    ) -> Result<PoolMeta, TxPoolError> {
        // soft bound: concurrent inserts may overshoot by the number of racing callers
        if self.entries.len() >= self.max_size {
            return Err(TxPoolError::PoolFull);
        }
        match self.entries.entry(tx.id) {
            Entry::Occupied(_) => Err(TxPoolError::Duplicate(tx.id)),
            Entry::Vacant(v) => {
                let meta = PoolMeta {
                    id: tx.id,
                    state,
                    inserted_at: now,
                    expires_at: expires_at.unwrap_or_else(|| now.saturating_add(self.ttl_secs)),
                };
                v.insert(PoolEntry { tx, meta: meta.clone() });
                Ok(meta)
            }
        }
    }

    /// Attach collected approvals and mark the entry eligible.
    pub fn promote(&self, id: &TxId, signatures: Vec<MemberSignature>) -> Result<(), TxPoolError> {
        let mut entry = self.entries.get_mut(id).ok_or(TxPoolError::NotFound(*id))?;
        entry.tx.signatures = signatures;
        entry.meta.state = PoolState::Eligible;
        Ok(())
    }

    pub fn get(&self, id: &TxId) -> Option<Transaction> {
        self.entries.get(id).map(|e| e.tx.clone())
    }

    pub fn meta(&self, id: &TxId) -> Option<PoolMeta> {
        self.entries.get(id).map(|e| e.meta.clone())
    }

    pub fn contains(&self, id: &TxId) -> bool {
        self.entries.contains_key(id)
    }

    /// Remove a transaction (included in a block, rejected or expired).
    pub fn remove(&self, id: &TxId) -> Option<Transaction> {
        self.entries.remove(id).map(|(_, e)| e.tx)
    }

    /// Eligible transactions sorted by ascending id.
    pub fn list_eligible(&self) -> Vec<Transaction> {
        let mut out: Vec<Transaction> = self
            .entries
            .iter()
            .filter(|e| e.meta.state == PoolState::Eligible)
            .map(|e| e.tx.clone())
            .collect();
        out.sort_by_key(|tx| tx.id);
        out
    }

    pub fn eligible_ids(&self) -> Vec<TxId> {
        self.list_eligible().into_iter().map(|tx| tx.id).collect()
    }

    /// Remove entries whose expiry has passed; returns them.
    pub fn gc_ttl(&self, now: u64) -> Vec<Transaction> {
        let expired: Vec<TxId> = self
            .entries
            .iter()
            .filter(|e| e.meta.expires_at <= now)
            .map(|e| e.meta.id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| self.entries.remove(&id).map(|(_, e)| e.tx))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
