use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::ledger::block::Block;
use crate::storage::{KvStore, WriteBatch};
use crate::transaction::types::TxId;

const BLOCK_PREFIX: &[u8] = b"block/";
const TX_PREFIX: &[u8] = b"tx/";
const OUTCOME_PREFIX: &[u8] = b"outcome/";

/// Terminal state of a transaction that never made it into a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxOutcome {
    Rejected { reason: String },
    Expired,
}

/// Outcome plus the chain height at which it was observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub height: u64,
    pub outcome: TxOutcome,
}

fn key(prefix: &[u8], n: u64) -> Vec<u8> {
    let mut k = prefix.to_vec();
    k.extend_from_slice(&n.to_be_bytes());
    k
}

/// Blocks, the transaction -> height index and the outcome log over a `KvStore`.
/// Values are bincode encoded; heights are big-endian so prefix scans come back in order.
pub struct BlockStore {
    kv: Arc<dyn KvStore>,
}

impl BlockStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Persist a block and index its transactions in one batch.
    pub async fn write_block(&self, block: &Block) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(key(BLOCK_PREFIX, block.height), bincode::serialize(block)?);
        for tx in &block.transactions {
            batch.put(key(TX_PREFIX, tx.id.0), block.height.to_be_bytes().to_vec());
        }
        self.kv.write_batch(batch).await
    }

    pub async fn read_block(&self, height: u64) -> Result<Option<Block>> {
        match self.kv.get(&key(BLOCK_PREFIX, height)).await? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every stored block in ascending height.
    pub async fn read_all(&self) -> Result<Vec<Block>> {
        self.kv
            .scan_prefix(BLOCK_PREFIX)
            .await?
            .into_iter()
            .map(|(_, v)| bincode::deserialize::<Block>(&v).map_err(Into::into))
            .collect()
    }

    pub async fn tx_height(&self, id: &TxId) -> Result<Option<u64>> {
        match self.kv.get(&key(TX_PREFIX, id.0)).await? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| anyhow::anyhow!("corrupt tx index entry for {}", id))?;
                Ok(Some(u64::from_be_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    pub async fn write_outcome(&self, id: &TxId, record: &OutcomeRecord) -> Result<()> {
        self.kv.put(&key(OUTCOME_PREFIX, id.0), &bincode::serialize(record)?).await
    }

    pub async fn delete_outcomes(&self, ids: &[TxId]) -> Result<()> {
        let mut batch = WriteBatch::new();
        for id in ids {
            batch.delete(key(OUTCOME_PREFIX, id.0));
        }
        if batch.is_empty() {
            return Ok(());
        }
        self.kv.write_batch(batch).await
    }

    pub async fn read_outcomes(&self) -> Result<Vec<(TxId, OutcomeRecord)>> {
        self.kv
            .scan_prefix(OUTCOME_PREFIX)
            .await?
            .into_iter()
            .map(|(k, v)| -> Result<(TxId, OutcomeRecord)> {
                let raw: [u8; 8] = k[OUTCOME_PREFIX.len()..]
                    .try_into()
                    .map_err(|_| anyhow::anyhow!("corrupt outcome key"))?;
                Ok((TxId(u64::from_be_bytes(raw)), bincode::deserialize(&v)?))
            })
            .collect()
    }
}
