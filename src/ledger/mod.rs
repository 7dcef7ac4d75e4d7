//! Ledger: confirmed blocks, the confirmed-transaction index and the outcome log of
//! transactions that were rejected or expired instead.

pub mod block;
pub mod blockstore;
pub mod index;
pub mod waiter;

pub use block::{Block, BlockId};
pub use blockstore::{BlockStore, OutcomeRecord, TxOutcome};
pub use index::BlockIndex;
pub use waiter::{wait_for_confirmation, wait_for_confirmations};

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::storage::KvStore;
use crate::transaction::types::{Transaction, TxId};
use crate::utils::errors::NodeError;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("storage: {0}")]
    Storage(#[from] anyhow::Error),
    #[error("block {got} does not extend tip {expected}")]
    HeightMismatch { expected: u64, got: u64 },
    #[error("block {height} has the wrong parent")]
    ParentMismatch { height: u64 },
    #[error("block {height} id does not match its contents")]
    InvalidBlockId { height: u64 },
    #[error("transaction {id} not confirmed after {intervals} intervals")]
    Timeout { id: TxId, intervals: u32 },
}

impl From<LedgerError> for NodeError {
    fn from(e: LedgerError) -> Self {
        NodeError::Ledger(e.to_string())
    }
}

/// Blocks an outcome stays queryable after it was recorded.
pub const DEFAULT_OUTCOME_RETENTION: u64 = 8_640;

/// Ledger service that stores confirmed blocks and provides access APIs
pub struct Ledger {
    store: BlockStore,
    index: RwLock<BlockIndex>,
    tip: RwLock<Option<Block>>,
    outcomes: DashMap<TxId, OutcomeRecord>,
    outcome_retention: u64,
}

impl Ledger {
    /// Open the ledger and rebuild the in-memory index from stored blocks.
    pub async fn open(kv: Arc<dyn KvStore>) -> Result<Self, LedgerError> {
        let store = BlockStore::new(kv);
        let mut index = BlockIndex::new();
        let mut tip = None;
        for block in store.read_all().await? {
            index.add(block.height, block.transaction_ids());
            tip = Some(block);
        }
        let outcomes = DashMap::new();
        for (id, record) in store.read_outcomes().await? {
            outcomes.insert(id, record);
        }
        info!(height = index.latest().unwrap_or(0), txs = index.tx_count(), "ledger opened");
        Ok(Self {
            store,
            index: RwLock::new(index),
            tip: RwLock::new(tip),
            outcomes,
            outcome_retention: DEFAULT_OUTCOME_RETENTION,
        })
    }

    pub fn with_outcome_retention(mut self, blocks: u64) -> Self {
        self.outcome_retention = blocks;
        self
    }

    pub fn height(&self) -> u64 {
        self.index.read().latest().unwrap_or(0)
    }

    pub fn tip(&self) -> Option<Block> {
        self.tip.read().clone()
    }

    /// Check that `block` extends the current tip.
    pub fn check_extends_tip(&self, block: &Block) -> Result<(), LedgerError> {
        let tip = self.tip.read();
        let expected = tip.as_ref().map_or(1, |t| t.height + 1);
        if block.height != expected {
            return Err(LedgerError::HeightMismatch { expected, got: block.height });
        }
        if block.previous_id != tip.as_ref().map(|t| t.id) {
            return Err(LedgerError::ParentMismatch { height: block.height });
        }
        if !block.verify_id() {
            return Err(LedgerError::InvalidBlockId { height: block.height });
        }
        Ok(())
    }

    pub async fn append_block(&self, block: Block) -> Result<(), LedgerError> {
        self.check_extends_tip(&block)?;
        self.store.write_block(&block).await?;
        let height = block.height;
        self.index.write().add(height, block.transaction_ids());
        *self.tip.write() = Some(block);
        self.prune_outcomes(height).await
    }

    /// Forget outcomes recorded more than `outcome_retention` blocks before `height`.
    async fn prune_outcomes(&self, height: u64) -> Result<(), LedgerError> {
        let Some(cutoff) = height.checked_sub(self.outcome_retention) else {
            return Ok(());
        };
        let stale: Vec<TxId> = self
            .outcomes
            .iter()
            .filter(|r| r.height < cutoff)
            .map(|r| *r.key())
            .collect();
        if stale.is_empty() {
            return Ok(());
        }
        self.store.delete_outcomes(&stale).await?;
        for id in &stale {
            self.outcomes.remove(id);
        }
        debug!(height, pruned = stale.len(), "outcome log pruned");
        Ok(())
    }

    pub async fn blocks(&self) -> Result<Vec<Block>, LedgerError> {
        Ok(self.store.read_all().await?)
    }

    pub fn confirmed_height(&self, id: &TxId) -> Option<u64> {
        self.index.read().tx_height(id)
    }

    pub fn is_confirmed(&self, id: &TxId) -> bool {
        self.confirmed_height(id).is_some()
    }

    /// The transaction as stored in its confirming block.
    pub async fn confirmed_transaction(&self, id: &TxId) -> Result<Option<(Transaction, u64)>, LedgerError> {
        let Some(height) = self.confirmed_height(id) else {
            return Ok(None);
        };
        let block = self.store.read_block(height).await?;
        Ok(block.and_then(|b| b.find(id).cloned()).map(|tx| (tx, height)))
    }

    pub async fn record_outcome(&self, id: TxId, outcome: TxOutcome) -> Result<(), LedgerError> {
        let record = OutcomeRecord { height: self.height(), outcome };
        self.store.write_outcome(&id, &record).await?;
        self.outcomes.insert(id, record);
        Ok(())
    }

    pub fn outcome(&self, id: &TxId) -> Option<TxOutcome> {
        self.outcomes.get(id).map(|r| r.outcome.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Address, Keypair};
    use crate::storage::{FsKvStore, MemKvStore};
    use crate::transaction::types::{Asset, TransactionType, UnsignedTransaction};
    use std::time::Duration;

    fn tx() -> Transaction {
        let kp = Keypair::from_passphrase("ledger").unwrap();
        UnsignedTransaction {
            kind: TransactionType::Transfer,
            timestamp: 0,
            sender_public_key: kp.public(),
            recipient_id: Some(Address(1)),
            amount: 1,
            fee: 10_000_000,
            asset: Asset::Transfer { data: None },
        }
        .sign(&kp, None)
    }

    #[tokio::test]
    async fn test_append_rejects_gaps_and_wrong_parent() {
        let ledger = Ledger::open(Arc::new(MemKvStore::new())).await.unwrap();
        let b1 = Block::new(1, None, 10, Vec::new());
        ledger.append_block(b1.clone()).await.unwrap();

        let gap = Block::new(3, Some(b1.id), 20, Vec::new());
        assert!(matches!(
            ledger.append_block(gap).await,
            Err(LedgerError::HeightMismatch { expected: 2, got: 3 })
        ));
        let orphan = Block::new(2, None, 20, Vec::new());
        assert!(matches!(ledger.append_block(orphan).await, Err(LedgerError::ParentMismatch { .. })));
        assert_eq!(ledger.height(), 1);
    }

    #[tokio::test]
    async fn test_reopen_rebuilds_index() {
        let dir = tempfile::tempdir().unwrap();
        let t = tx();
        {
            let kv = Arc::new(FsKvStore::open(dir.path()).unwrap());
            let ledger = Ledger::open(kv).await.unwrap();
            ledger.append_block(Block::new(1, None, 10, vec![t.clone()])).await.unwrap();
            ledger.record_outcome(TxId(42), TxOutcome::Expired).await.unwrap();
        }
        let ledger = Ledger::open(Arc::new(FsKvStore::open(dir.path()).unwrap())).await.unwrap();
        assert_eq!(ledger.height(), 1);
        assert_eq!(ledger.confirmed_height(&t.id), Some(1));
        let (stored, height) = ledger.confirmed_transaction(&t.id).await.unwrap().unwrap();
        assert_eq!((stored, height), (t, 1));
        assert_eq!(ledger.outcome(&TxId(42)), Some(TxOutcome::Expired));
    }

    #[tokio::test]
    async fn test_outcomes_pruned_after_retention() {
        let ledger = Ledger::open(Arc::new(MemKvStore::new())).await.unwrap().with_outcome_retention(2);
        ledger.record_outcome(TxId(7), TxOutcome::Expired).await.unwrap();

        let mut parent = None;
        for height in 1..=2 {
            let block = Block::new(height, parent, height * 10, Vec::new());
            parent = Some(block.id);
            ledger.append_block(block).await.unwrap();
        }
        assert_eq!(ledger.outcome(&TxId(7)), Some(TxOutcome::Expired));

        ledger.append_block(Block::new(3, parent, 30, Vec::new())).await.unwrap();
        assert_eq!(ledger.outcome(&TxId(7)), None);
        assert!(ledger.store.read_outcomes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_confirmation() {
        let ledger = Arc::new(Ledger::open(Arc::new(MemKvStore::new())).await.unwrap());
        let t = tx();
        let err = wait_for_confirmation(&ledger, t.id, Duration::from_millis(1), 2).await.unwrap_err();
        assert!(matches!(err, LedgerError::Timeout { intervals: 2, .. }));

        let writer = ledger.clone();
        let block = Block::new(1, None, 10, vec![t.clone()]);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.append_block(block).await.unwrap();
        });
        let height = wait_for_confirmation(&ledger, t.id, Duration::from_millis(10), 50).await.unwrap();
        assert_eq!(height, 1);
        assert_eq!(
            wait_for_confirmations(&ledger, &[t.id], Duration::from_millis(1), 0).await.unwrap(),
            vec![1]
        );
    }
}
