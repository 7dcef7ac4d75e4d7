use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::storage::traits::{BatchOp, KvStore, WriteBatch};

/// Ordered in-memory engine for tests and ephemeral nodes.
#[derive(Default)]
pub struct MemKvStore {
    inner: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemKvStore {
    fn name(&self) -> String {
        "memory".into()
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.inner.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.read().get(key).cloned())
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        self.inner.write().remove(key);
        Ok(())
    }

    async fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        let mut map = self.inner.write();
        for op in batch.ops {
            match op {
                BatchOp::Put(k, v) => {
                    map.insert(k, v);
                }
                BatchOp::Delete(k) => {
                    map.remove(&k);
                }
            }
        }
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let map = self.inner.read();
        Ok(map
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn path(&self) -> Option<PathBuf> {
        None
    }
}
