use serde::{Deserialize, Serialize};
use std::fmt;

use crate::transaction::types::{Transaction, TxId};
use crate::utils::serde_helpers::{as_hex, from_hex_array};

/// blake3 digest identifying a block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(
    #[serde(serialize_with = "as_hex", deserialize_with = "from_hex_array")] pub [u8; 32],
);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", &hex::encode(self.0)[..12])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub height: u64,
    pub id: BlockId,
    pub previous_id: Option<BlockId>,
    /// Unix seconds.
    pub timestamp: u64,
    /// In application order (ascending id).
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(height: u64, previous_id: Option<BlockId>, timestamp: u64, transactions: Vec<Transaction>) -> Self {
        let id = Self::compute_id(height, previous_id.as_ref(), timestamp, &transactions);
        Self { height, id, previous_id, timestamp, transactions }
    }

    pub fn compute_id(
        height: u64,
        previous_id: Option<&BlockId>,
        timestamp: u64,
        transactions: &[Transaction],
    ) -> BlockId {
        let mut h = blake3::Hasher::new();
        h.update(&height.to_le_bytes());
        h.update(&previous_id.map(|p| p.0).unwrap_or([0u8; 32]));
        h.update(&timestamp.to_le_bytes());
        for tx in transactions {
            h.update(&tx.id.0.to_le_bytes());
        }
        BlockId(*h.finalize().as_bytes())
    }

    pub fn verify_id(&self) -> bool {
        self.id == Self::compute_id(self.height, self.previous_id.as_ref(), self.timestamp, &self.transactions)
    }

    pub fn transaction_ids(&self) -> Vec<TxId> {
        self.transactions.iter().map(|tx| tx.id).collect()
    }

    pub fn find(&self, id: &TxId) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| tx.id == *id)
    }
}
