//! Signature requirements of a transaction given its sender's confirmed account.
//!
//! The sender signature admits a transaction. When the sender has a confirmed
//! multisignature profile, `min` member approvals are needed on top of it. A
//! multisignature registration needs an approval from every member of the new keysgroup.

use std::collections::HashSet;

use crate::crypto::PublicKey;
use crate::state::{Account, StateView};
use crate::transaction::error::{TransactionError, FAILED_TO_VERIFY_MULTISIG, FAILED_TO_VERIFY_SIGNATURE};
use crate::transaction::types::Transaction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRequirement {
    pub members: Vec<PublicKey>,
    pub required: usize,
    /// Hours the transaction may wait for approvals.
    pub lifetime_hours: u32,
}

impl SignatureRequirement {
    pub fn is_member(&self, key: &PublicKey) -> bool {
        self.members.contains(key)
    }
}

pub fn signature_requirement(tx: &Transaction, sender: Option<&Account>) -> Option<SignatureRequirement> {
    if let Some(asset) = tx.multisig_asset() {
        let members = asset.members();
        return Some(SignatureRequirement {
            required: members.len(),
            members,
            lifetime_hours: asset.lifetime,
        });
    }
    sender.and_then(|a| a.multisignature.as_ref()).map(|profile| SignatureRequirement {
        members: profile.keysgroup.clone(),
        required: profile.min as usize,
        lifetime_hours: profile.lifetime,
    })
}

/// Sender signature and, when the account has one, the second signature.
pub fn verify_sender(tx: &Transaction, sender: Option<&Account>) -> Result<(), TransactionError> {
    if !tx.verify_signature() {
        return Err(TransactionError::rule(FAILED_TO_VERIFY_SIGNATURE));
    }
    match (sender.and_then(|a| a.second_public_key), tx.sign_signature.is_some()) {
        (Some(_), false) => Err(TransactionError::rule("Missing sender second signature")),
        (Some(second), true) if !tx.verify_second_signature(&second) => {
            Err(TransactionError::rule("Failed to verify second signature"))
        }
        (None, true) => Err(TransactionError::rule("Sender does not have a second signature")),
        _ => Ok(()),
    }
}

/// Number of attached member approvals. Any approval that is not from a member, repeats
/// a member or fails to verify rejects the whole transaction.
pub fn verify_member_signatures(tx: &Transaction, req: &SignatureRequirement) -> Result<usize, TransactionError> {
    let mut seen = HashSet::with_capacity(tx.signatures.len());
    for sig in &tx.signatures {
        if !req.is_member(&sig.public_key) || !seen.insert(sig.public_key) || !tx.verify_member_signature(sig) {
            return Err(TransactionError::rule(FAILED_TO_VERIFY_MULTISIG));
        }
    }
    Ok(seen.len())
}

/// Every signature rule, checked against `view`.
pub fn verify_authorization(tx: &Transaction, view: &dyn StateView) -> Result<(), TransactionError> {
    let sender = view.account(&tx.sender());
    verify_sender(tx, sender.as_ref())?;
    if let Some(req) = signature_requirement(tx, sender.as_ref()) {
        if verify_member_signatures(tx, &req)? < req.required {
            return Err(TransactionError::rule(FAILED_TO_VERIFY_MULTISIG));
        }
    }
    Ok(())
}
