use crate::state::{Account, MultisigProfile, StateDiff, StateView};
use crate::transaction::error::{TransactionError, ALREADY_MULTISIG};
use crate::transaction::types::{Transaction, TransactionType};

use super::TransactionProcessor;

/// Type 4: turn the sender into a multisignature account.
pub struct MultisignatureProcessor;

impl TransactionProcessor for MultisignatureProcessor {
    fn kind(&self) -> TransactionType {
        TransactionType::Multisignature
    }

    fn precheck(&self, _tx: &Transaction, sender: &Account) -> Result<(), TransactionError> {
        if sender.is_multisig() {
            return Err(TransactionError::rule(ALREADY_MULTISIG));
        }
        Ok(())
    }

    fn validate(&self, _tx: &Transaction, _sender: &Account, _view: &dyn StateView) -> Result<(), TransactionError> {
        Ok(())
    }

    fn apply_to(&self, tx: &Transaction, mut sender: Account, _view: &dyn StateView) -> Result<StateDiff, TransactionError> {
        let asset = tx
            .multisig_asset()
            .ok_or_else(|| TransactionError::rule("Invalid transaction asset"))?;
        sender.multisignature = Some(MultisigProfile {
            min: asset.min,
            lifetime: asset.lifetime,
            keysgroup: asset.members(),
        });
        let mut diff = StateDiff::default();
        diff.put_account(sender);
        Ok(diff)
    }
}
