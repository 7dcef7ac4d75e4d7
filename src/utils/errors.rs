use thiserror::Error;

use crate::transaction::error::TransactionError;

/// Unified error type for the node
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<bincode::Error> for NodeError {
    fn from(e: bincode::Error) -> Self {
        NodeError::Storage(format!("codec: {}", e))
    }
}

impl From<std::io::Error> for NodeError {
    fn from(e: std::io::Error) -> Self {
        NodeError::Storage(e.to_string())
    }
}

/// Convenience alias
pub type Result<T> = std::result::Result<T, NodeError>;
