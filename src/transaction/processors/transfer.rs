use crate::state::{Account, StateDiff, StateView};
use crate::transaction::error::TransactionError;
use crate::transaction::types::{Transaction, TransactionType};

use super::{transfer_diff, TransactionProcessor};

/// Type 0: move `amount` from sender to recipient.
pub struct TransferProcessor;

impl TransactionProcessor for TransferProcessor {
    fn kind(&self) -> TransactionType {
        TransactionType::Transfer
    }

    fn validate(&self, tx: &Transaction, _sender: &Account, _view: &dyn StateView) -> Result<(), TransactionError> {
        if tx.recipient_id.is_none() {
            return Err(TransactionError::rule("Invalid recipient"));
        }
        Ok(())
    }

    fn apply_to(&self, tx: &Transaction, sender: Account, view: &dyn StateView) -> Result<StateDiff, TransactionError> {
        let to = tx
            .recipient_id
            .ok_or_else(|| TransactionError::rule("Invalid recipient"))?;
        Ok(transfer_diff(sender, view, to, tx.amount))
    }
}
