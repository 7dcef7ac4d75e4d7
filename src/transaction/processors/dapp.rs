use crate::state::{Account, DappRecord, StateDiff, StateView};
use crate::transaction::error::TransactionError;
use crate::transaction::types::{Asset, DappAsset, Transaction, TransactionType};

use super::TransactionProcessor;

/// Type 5: register an application; the transaction id becomes the dapp id.
pub struct DappProcessor;

fn dapp_asset(tx: &Transaction) -> Result<&DappAsset, TransactionError> {
    match &tx.asset {
        Asset::Dapp(d) => Ok(d),
        _ => Err(TransactionError::rule("Invalid transaction asset")),
    }
}

impl TransactionProcessor for DappProcessor {
    fn kind(&self) -> TransactionType {
        TransactionType::Dapp
    }

    fn validate(&self, tx: &Transaction, _sender: &Account, view: &dyn StateView) -> Result<(), TransactionError> {
        let dapp = dapp_asset(tx)?;
        if view.dapp_name_owner(dapp.name.trim()).is_some() {
            return Err(TransactionError::rule("Application name already exists"));
        }
        Ok(())
    }

    fn apply_to(&self, tx: &Transaction, sender: Account, _view: &dyn StateView) -> Result<StateDiff, TransactionError> {
        let dapp = dapp_asset(tx)?;
        let mut diff = StateDiff::default();
        diff.dapps.insert(
            tx.id,
            DappRecord {
                id: tx.id,
                name: dapp.name.trim().to_string(),
                link: dapp.link.clone(),
                owner: sender.address,
            },
        );
        diff.put_account(sender);
        Ok(diff)
    }
}
