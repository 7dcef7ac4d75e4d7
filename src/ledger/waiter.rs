//! Polling for confirmation: callers that need to know a transaction landed check the
//! ledger once per interval until it shows up or they run out of intervals.

use std::time::Duration;
use tracing::debug;

use crate::ledger::{Ledger, LedgerError};
use crate::transaction::types::TxId;

/// Height of the confirming block, or `LedgerError::Timeout`.
pub async fn wait_for_confirmation(
    ledger: &Ledger,
    id: TxId,
    interval: Duration,
    max_intervals: u32,
) -> Result<u64, LedgerError> {
    for attempt in 0..=max_intervals {
        if let Some(height) = ledger.confirmed_height(&id) {
            debug!(tx_id = %id, height, attempt, "transaction confirmed");
            return Ok(height);
        }
        if attempt < max_intervals {
            tokio::time::sleep(interval).await;
        }
    }
    Err(LedgerError::Timeout { id, intervals: max_intervals })
}

/// Wait for several transactions; fails on the first one that times out.
pub async fn wait_for_confirmations(
    ledger: &Ledger,
    ids: &[TxId],
    interval: Duration,
    max_intervals: u32,
) -> Result<Vec<u64>, LedgerError> {
    let waits = ids
        .iter()
        .map(|id| wait_for_confirmation(ledger, *id, interval, max_intervals));
    futures::future::try_join_all(waits).await
}
