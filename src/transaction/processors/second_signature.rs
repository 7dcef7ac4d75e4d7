use crate::state::{Account, StateDiff, StateView};
use crate::transaction::error::TransactionError;
use crate::transaction::types::{Asset, Transaction, TransactionType};

use super::TransactionProcessor;

/// Type 1: register a second public key.
pub struct SecondSignatureProcessor;

impl TransactionProcessor for SecondSignatureProcessor {
    fn kind(&self) -> TransactionType {
        TransactionType::SecondSignature
    }

    fn validate(&self, _tx: &Transaction, sender: &Account, _view: &dyn StateView) -> Result<(), TransactionError> {
        if sender.second_public_key.is_some() {
            return Err(TransactionError::rule("Second signature already enabled"));
        }
        Ok(())
    }

    fn apply_to(&self, tx: &Transaction, mut sender: Account, _view: &dyn StateView) -> Result<StateDiff, TransactionError> {
        let Asset::SecondSignature { public_key } = &tx.asset else {
            return Err(TransactionError::rule("Invalid transaction asset"));
        };
        sender.second_public_key = Some(*public_key);
        let mut diff = StateDiff::default();
        diff.put_account(sender);
        Ok(diff)
    }
}
