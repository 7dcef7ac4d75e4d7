use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;

/// A single batched mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Mutations applied together by `KvStore::write_batch`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    pub ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put(key.into(), value.into()));
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Delete(key.into()));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Core key-value store trait
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    fn name(&self) -> String;

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    async fn delete(&self, key: &[u8]) -> Result<()>;

    async fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Apply every op of the batch; readers never see part of it.
    async fn write_batch(&self, batch: WriteBatch) -> Result<()>;

    /// All pairs whose key starts with `prefix`, sorted by key.
    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Path where the engine stores data (None for in-memory engines)
    fn path(&self) -> Option<PathBuf>;
}
