//! Type processors: one implementation per transaction type, selected by the type tag.
//!
//! `ProcessorRegistry` runs the checks every type shares (declared fee, sender balance)
//! around the type-specific `precheck`/`validate`/`apply_to`. Processors never
//! mutate state directly; they return the post-images as a `StateDiff`.

mod dapp;
mod delegate;
mod in_transfer;
mod multisignature;
mod out_transfer;
mod second_signature;
mod transfer;
mod vote;

pub use dapp::DappProcessor;
pub use delegate::DelegateProcessor;
pub use in_transfer::InTransferProcessor;
pub use multisignature::MultisignatureProcessor;
pub use out_transfer::OutTransferProcessor;
pub use second_signature::SecondSignatureProcessor;
pub use transfer::TransferProcessor;
pub use vote::VoteProcessor;

use std::collections::HashMap;

use crate::crypto::Address;
use crate::node::config::{FeeSchedule, ProtocolConfig};
use crate::state::{Account, StateDiff, StateView};
use crate::transaction::error::{insufficient_funds, TransactionError};
use crate::transaction::types::{Transaction, TransactionType};

pub trait TransactionProcessor: Send + Sync {
    fn kind(&self) -> TransactionType;

    /// Account-state rules reported ahead of the balance check.
    fn precheck(&self, _tx: &Transaction, _sender: &Account) -> Result<(), TransactionError> {
        Ok(())
    }

    /// Type-specific checks against `view`. `sender` is the sender's current record.
    fn validate(&self, tx: &Transaction, sender: &Account, view: &dyn StateView) -> Result<(), TransactionError>;

    /// Produce the post-images. `sender` has already been charged `amount + fee`.
    fn apply_to(&self, tx: &Transaction, sender: Account, view: &dyn StateView) -> Result<StateDiff, TransactionError>;
}

pub struct ProcessorRegistry {
    processors: HashMap<TransactionType, Box<dyn TransactionProcessor>>,
    fees: FeeSchedule,
}

impl ProcessorRegistry {
    pub fn new(protocol: &ProtocolConfig) -> Self {
        let list: Vec<Box<dyn TransactionProcessor>> = vec![
            Box::new(TransferProcessor),
            Box::new(SecondSignatureProcessor),
            Box::new(DelegateProcessor),
            Box::new(VoteProcessor::new(protocol.max_votes_per_account)),
            Box::new(MultisignatureProcessor),
            Box::new(DappProcessor),
            Box::new(InTransferProcessor),
            Box::new(OutTransferProcessor),
        ];
        let processors = list.into_iter().map(|p| (p.kind(), p)).collect();
        Self { processors, fees: protocol.fees.clone() }
    }

    fn processor(&self, kind: TransactionType) -> Result<&dyn TransactionProcessor, TransactionError> {
        self.processors
            .get(&kind)
            .map(|p| p.as_ref())
            .ok_or_else(|| TransactionError::rule(format!("Unknown transaction type {}", kind.as_u8())))
    }

    pub fn expected_fee(&self, tx: &Transaction) -> u64 {
        let keysgroup = tx.multisig_asset().map_or(0, |m| m.keysgroup.len());
        self.fees.fee_for(tx.kind, keysgroup)
    }

    /// Fee, type prechecks, balance, then type-specific checks.
    pub fn validate(&self, tx: &Transaction, view: &dyn StateView) -> Result<(), TransactionError> {
        if tx.fee != self.expected_fee(tx) {
            return Err(TransactionError::rule("Invalid transaction fee"));
        }
        let processor = self.processor(tx.kind)?;
        let sender = view.account_or_default(&tx.sender());
        processor.precheck(tx, &sender)?;
        let total = tx
            .amount
            .checked_add(tx.fee)
            .ok_or_else(|| TransactionError::rule("Invalid transaction amount"))?;
        if sender.balance < total {
            return Err(insufficient_funds(&sender.address, sender.balance));
        }
        processor.validate(tx, &sender, view)
    }

    /// Validate, charge the sender and return the resulting diff.
    pub fn apply(&self, tx: &Transaction, view: &dyn StateView) -> Result<StateDiff, TransactionError> {
        self.validate(tx, view)?;
        let mut sender = view.account_or_default(&tx.sender());
        sender.balance -= tx.amount + tx.fee;
        sender.public_key.get_or_insert(tx.sender_public_key);
        self.processor(tx.kind)?.apply_to(tx, sender, view)
    }
}

/// Credit `amount` to `to`. Returns the recipient's post-image unless it is the sender.
pub(crate) fn credit(sender: &mut Account, view: &dyn StateView, to: Address, amount: u64) -> Option<Account> {
    if to == sender.address {
        sender.balance = sender.balance.saturating_add(amount);
        return None;
    }
    let mut recipient = view.account_or_default(&to);
    recipient.balance = recipient.balance.saturating_add(amount);
    Some(recipient)
}

/// Diff holding the sender and, when distinct, a credited recipient.
pub(crate) fn transfer_diff(mut sender: Account, view: &dyn StateView, to: Address, amount: u64) -> StateDiff {
    let recipient = credit(&mut sender, view, to, amount);
    let mut diff = StateDiff::default();
    diff.put_account(sender);
    if let Some(r) = recipient {
        diff.put_account(r);
    }
    diff
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::node::config::COIN;
    use crate::state::BlockOverlay;

    #[test]
    fn test_fee_must_match_schedule() {
        let alice = kp("alice");
        let chain = funded_state(&[(&alice, 10)]);
        let registry = ProcessorRegistry::new(&ProtocolConfig::default());
        let mut tx = transfer(&alice, Address(1), COIN);
        tx.fee += 1;
        let err = registry.validate(&tx, &chain.read()).unwrap_err();
        assert_eq!(err.to_string(), "Invalid transaction fee");
    }

    #[test]
    fn test_zero_balance_is_insufficient() {
        let poor = kp("poor");
        let chain = funded_state(&[]);
        let registry = ProcessorRegistry::new(&ProtocolConfig::default());
        let tx = transfer(&poor, Address(1), 1);
        let err = registry.validate(&tx, &chain.read()).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Account does not have enough LSK: {} balance: 0", poor.address())
        );
    }

    #[test]
    fn test_apply_charges_sender_and_credits_recipient() {
        let alice = kp("alice");
        let bob = kp("bob");
        let chain = funded_state(&[(&alice, 10)]);
        let registry = ProcessorRegistry::new(&ProtocolConfig::default());
        let tx = transfer(&alice, bob.address(), 2 * COIN);

        let base = chain.read();
        let mut overlay = BlockOverlay::new(&base);
        let diff = registry.apply(&tx, &overlay).unwrap();
        overlay.apply(diff);
        let a = overlay.account(&alice.address()).unwrap();
        assert_eq!(a.balance, 10 * COIN - 2 * COIN - COIN / 10);
        assert_eq!(a.public_key, Some(alice.public()));
        assert_eq!(overlay.account(&bob.address()).unwrap().balance, 2 * COIN);
    }

    #[test]
    fn test_self_transfer_only_costs_fee() {
        let alice = kp("alice");
        let chain = funded_state(&[(&alice, 1)]);
        let registry = ProcessorRegistry::new(&ProtocolConfig::default());
        let tx = transfer(&alice, alice.address(), COIN / 2);
        let diff = registry.apply(&tx, &chain.read()).unwrap();
        assert_eq!(diff.accounts.len(), 1);
        assert_eq!(diff.accounts[&alice.address()].balance, COIN - COIN / 10);
    }
}
