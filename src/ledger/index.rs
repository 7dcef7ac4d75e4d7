use std::collections::{BTreeSet, HashMap};

use crate::transaction::types::TxId;

/// In-memory view of what the block store holds: heights and the confirming height
/// of every transaction. Rebuilt from the store on open.
#[derive(Debug, Default)]
pub struct BlockIndex {
    heights: BTreeSet<u64>,
    tx_heights: HashMap<TxId, u64>,
}

impl BlockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, height: u64, txs: impl IntoIterator<Item = TxId>) {
        self.heights.insert(height);
        for id in txs {
            self.tx_heights.insert(id, height);
        }
    }

    pub fn contains(&self, height: u64) -> bool {
        self.heights.contains(&height)
    }

    pub fn latest(&self) -> Option<u64> {
        self.heights.iter().next_back().copied()
    }

    pub fn tx_height(&self, id: &TxId) -> Option<u64> {
        self.tx_heights.get(id).copied()
    }

    pub fn tx_count(&self) -> usize {
        self.tx_heights.len()
    }
}
