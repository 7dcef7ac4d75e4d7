use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

use crate::storage::traits::{BatchOp, KvStore, WriteBatch};

/// One file per key under `dir`, named by the hex of the key. Writes go through a
/// temp file and a rename so a crash never leaves a torn value behind.
pub struct FsKvStore {
    dir: PathBuf,
    /// Serializes batches against each other.
    write_lock: Mutex<()>,
}

impl FsKvStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, write_lock: Mutex::new(()) })
    }

    fn key_path(&self, key: &[u8]) -> PathBuf {
        self.dir.join(hex::encode(key))
    }

    async fn put_unlocked(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let p = self.key_path(key);
        let tmp = p.with_extension("tmp");
        fs::write(&tmp, value).await?;
        fs::rename(&tmp, &p).await?;
        Ok(())
    }

    async fn delete_unlocked(&self, key: &[u8]) -> Result<()> {
        match fs::remove_file(self.key_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl KvStore for FsKvStore {
    fn name(&self) -> String {
        "fs".into()
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let _g = self.write_lock.lock().await;
        self.put_unlocked(key, value).await
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match fs::read(self.key_path(key)).await {
            Ok(buf) => Ok(Some(buf)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        let _g = self.write_lock.lock().await;
        self.delete_unlocked(key).await
    }

    async fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        let _g = self.write_lock.lock().await;
        for op in batch.ops {
            match op {
                BatchOp::Put(k, v) => self.put_unlocked(&k, &v).await?,
                BatchOp::Delete(k) => self.delete_unlocked(&k).await?,
            }
        }
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut items = Vec::new();
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().into_string().unwrap_or_default();
            let key = match hex::decode(&name) {
                Ok(k) => k,
                Err(_) => continue,
            };
            if key.starts_with(prefix) {
                items.push((key, fs::read(entry.path()).await?));
            }
        }
        items.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(items)
    }

    fn path(&self) -> Option<PathBuf> {
        Some(self.dir.clone())
    }
}
