use crate::crypto::Address;
use crate::state::{Account, StateDiff, StateView};
use crate::transaction::error::TransactionError;
use crate::transaction::types::{Asset, Transaction, TransactionType, TxId};

use super::{transfer_diff, TransactionProcessor};

/// Type 7: pay out of an application, at most once per source transaction.
pub struct OutTransferProcessor;

fn check(tx: &Transaction, view: &dyn StateView) -> Result<(TxId, Address), TransactionError> {
    let Asset::OutTransfer { dapp_id, transaction_id } = &tx.asset else {
        return Err(TransactionError::rule("Invalid transaction asset"));
    };
    let recipient = tx
        .recipient_id
        .ok_or_else(|| TransactionError::rule("Invalid recipient"))?;
    if view.dapp(dapp_id).is_none() {
        return Err(TransactionError::rule(format!("Application not found: {}", dapp_id)));
    }
    if view.out_transfer_processed(transaction_id) {
        return Err(TransactionError::rule(format!(
            "Transaction is already processed: {}",
            transaction_id
        )));
    }
    Ok((*transaction_id, recipient))
}

impl TransactionProcessor for OutTransferProcessor {
    fn kind(&self) -> TransactionType {
        TransactionType::OutTransfer
    }

    fn validate(&self, tx: &Transaction, _sender: &Account, view: &dyn StateView) -> Result<(), TransactionError> {
        check(tx, view).map(|_| ())
    }

    fn apply_to(&self, tx: &Transaction, sender: Account, view: &dyn StateView) -> Result<StateDiff, TransactionError> {
        let (source, recipient) = check(tx, view)?;
        let mut diff = transfer_diff(sender, view, recipient, tx.amount);
        diff.out_transfers.insert(source);
        Ok(diff)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::ProcessorRegistry;
    use crate::crypto::Address;
    use crate::node::config::{ProtocolConfig, COIN};
    use crate::state::{BlockOverlay, StateView};
    use crate::transaction::types::{Asset, DappAsset, TxId};

    #[test]
    fn test_dapp_transfers_require_confirmed_dapp() {
        let alice = kp("alice");
        let bob = kp("bob");
        let chain = funded_state(&[(&alice, 100), (&bob, 100)]);
        let registry = ProcessorRegistry::new(&ProtocolConfig::default());

        let dapp = signed(
            &alice,
            Asset::Dapp(DappAsset {
                name: "Chess".into(),
                description: None,
                tags: None,
                kind: 0,
                category: 1,
                link: "https://example.org/chess.zip".into(),
                icon: None,
            }),
            None,
            0,
        );
        let fund = signed(&bob, Asset::InTransfer { dapp_id: dapp.id }, None, 10 * COIN);
        let payout = signed(
            &alice,
            Asset::OutTransfer { dapp_id: dapp.id, transaction_id: fund.id },
            Some(Address(77)),
            COIN,
        );

        let base = chain.read();
        let mut overlay = BlockOverlay::new(&base);
        assert_eq!(
            registry.validate(&fund, &overlay).unwrap_err().to_string(),
            format!("Application not found: {}", dapp.id)
        );

        for tx in [&dapp, &fund, &payout] {
            let diff = registry.apply(tx, &overlay).unwrap();
            overlay.apply(diff);
        }
        // owner received the in-transfer, paid fees for registration and payout
        let owner = overlay.account(&alice.address()).unwrap();
        assert_eq!(owner.balance, 100 * COIN - 25 * COIN + 10 * COIN - COIN - COIN / 10);
        assert_eq!(overlay.account(&Address(77)).unwrap().balance, COIN);
        assert_eq!(
            registry.validate(&payout, &overlay).unwrap_err().to_string(),
            format!("Transaction is already processed: {}", fund.id)
        );

        let copycat = signed(
            &bob,
            Asset::Dapp(DappAsset {
                name: "chess".into(),
                description: None,
                tags: None,
                kind: 0,
                category: 2,
                link: "https://example.org/other.zip".into(),
                icon: None,
            }),
            None,
            0,
        );
        assert_eq!(
            registry.validate(&copycat, &overlay).unwrap_err().to_string(),
            "Application name already exists"
        );
        assert!(overlay.dapp(&TxId(0)).is_none());
    }
}
