//! Storage module: abstraction over persistent key-value backends.
//!
//! Engines: in-memory (tests, ephemeral devnets) and a file-per-key FS engine.
//! Use `storage::open(path, engine)` to create an `Arc<dyn KvStore>` to pass to other modules.

pub mod fs_store;
pub mod memory_store;
pub mod traits;

pub use fs_store::FsKvStore;
pub use memory_store::MemKvStore;
pub use traits::{BatchOp, KvStore, WriteBatch};

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

/// Engine selection enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageEngine {
    Memory,
    Fs,
}

pub fn open(path: impl AsRef<Path>, engine: StorageEngine) -> Result<Arc<dyn KvStore>> {
    match engine {
        StorageEngine::Memory => Ok(Arc::new(MemKvStore::new())),
        StorageEngine::Fs => Ok(Arc::new(FsKvStore::open(path)?)),
    }
}
