use crate::state::{Account, StateDiff, StateView};
use crate::transaction::error::TransactionError;
use crate::transaction::types::{Asset, Transaction, TransactionType};

use super::TransactionProcessor;

/// Type 2: register the sender as a delegate under a unique username.
pub struct DelegateProcessor;

fn username(tx: &Transaction) -> Result<&str, TransactionError> {
    match &tx.asset {
        Asset::Delegate { username } => Ok(username),
        _ => Err(TransactionError::rule("Invalid transaction asset")),
    }
}

impl TransactionProcessor for DelegateProcessor {
    fn kind(&self) -> TransactionType {
        TransactionType::Delegate
    }

    fn validate(&self, tx: &Transaction, sender: &Account, view: &dyn StateView) -> Result<(), TransactionError> {
        if sender.is_delegate {
            return Err(TransactionError::rule("Account is already a delegate"));
        }
        if view.username_owner(username(tx)?).is_some() {
            return Err(TransactionError::rule("Username already exists"));
        }
        Ok(())
    }

    fn apply_to(&self, tx: &Transaction, mut sender: Account, _view: &dyn StateView) -> Result<StateDiff, TransactionError> {
        let name = username(tx)?.to_string();
        sender.is_delegate = true;
        sender.username = Some(name.clone());
        let mut diff = StateDiff::default();
        diff.usernames.insert(name, sender.address);
        diff.put_account(sender);
        Ok(diff)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::ProcessorRegistry;
    use crate::node::config::ProtocolConfig;
    use crate::state::{BlockOverlay, StateView};
    use crate::transaction::types::Asset;

    #[test]
    fn test_username_is_unique_and_registration_once() {
        let alice = kp("alice");
        let bob = kp("bob");
        let chain = funded_state(&[(&alice, 100), (&bob, 100)]);
        let registry = ProcessorRegistry::new(&ProtocolConfig::default());
        let delegate = |k, name: &str| signed(k, Asset::Delegate { username: name.into() }, None, 0);

        let base = chain.read();
        let mut overlay = BlockOverlay::new(&base);
        let diff = registry.apply(&delegate(&alice, "alice"), &overlay).unwrap();
        overlay.apply(diff);

        assert_eq!(
            registry.validate(&delegate(&bob, "alice"), &overlay).unwrap_err().to_string(),
            "Username already exists"
        );
        assert_eq!(
            registry.validate(&delegate(&alice, "other"), &overlay).unwrap_err().to_string(),
            "Account is already a delegate"
        );
        assert!(overlay.account(&alice.address()).unwrap().is_delegate);
    }
}
