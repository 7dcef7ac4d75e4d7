use crate::state::{Account, DappRecord, StateDiff, StateView};
use crate::transaction::error::TransactionError;
use crate::transaction::types::{Asset, Transaction, TransactionType};

use super::{transfer_diff, TransactionProcessor};

/// Type 6: fund a confirmed application; the amount is credited to its owner.
pub struct InTransferProcessor;

fn target(tx: &Transaction, view: &dyn StateView) -> Result<DappRecord, TransactionError> {
    let Asset::InTransfer { dapp_id } = &tx.asset else {
        return Err(TransactionError::rule("Invalid transaction asset"));
    };
    view.dapp(dapp_id)
        .ok_or_else(|| TransactionError::rule(format!("Application not found: {}", dapp_id)))
}

impl TransactionProcessor for InTransferProcessor {
    fn kind(&self) -> TransactionType {
        TransactionType::InTransfer
    }

    fn validate(&self, tx: &Transaction, _sender: &Account, view: &dyn StateView) -> Result<(), TransactionError> {
        target(tx, view).map(|_| ())
    }

    fn apply_to(&self, tx: &Transaction, sender: Account, view: &dyn StateView) -> Result<StateDiff, TransactionError> {
        let dapp = target(tx, view)?;
        Ok(transfer_diff(sender, view, dapp.owner, tx.amount))
    }
}
