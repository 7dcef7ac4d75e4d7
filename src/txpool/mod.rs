pub mod ingest;
pub mod pool;

pub use ingest::{Admission, SignatureOutcome, SignatureRequest, TransactionService, TxStatus};
pub use pool::{PoolMeta, PoolState, TxPool, TxPoolError};
