//! Multisignature registry.
//!
//! Two maps, both `DashMap` so every operation is atomic per key:
//! - `reservations`: accounts with a multisignature registration admitted but not yet
//!   confirmed. Reserving is what stops a second concurrent registration.
//! - `pending`: collected approvals per gated transaction. `collect_signature` runs
//!   under the entry's shard lock, so two callers can never both take the last slot.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::crypto::{Address, Hash32, PublicKey, Signature, Verifier};
use crate::transaction::error::{SignatureRejection, TransactionError, ALREADY_MULTISIG};
use crate::transaction::types::{MemberSignature, TxId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMultisigEntry {
    pub tx_id: TxId,
    pub sender: Address,
    pub signing_hash: Hash32,
    pub members: Vec<PublicKey>,
    pub required: usize,
    pub signatures: Vec<MemberSignature>,
    /// Unix seconds after which the entry is discarded.
    pub expires_at: u64,
}

impl PendingMultisigEntry {
    pub fn collected(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.signatures.len() >= self.required
    }

    fn has_signed(&self, key: &PublicKey) -> bool {
        self.signatures.iter().any(|s| s.public_key == *key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectOutcome {
    Recorded { collected: usize, required: usize },
    /// Threshold reached; carries every collected approval.
    Ready(Vec<MemberSignature>),
}

#[derive(Default)]
pub struct MultisigRegistry {
    reservations: DashMap<Address, TxId>,
    pending: DashMap<TxId, PendingMultisigEntry>,
}

impl MultisigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the one-time multisignature transition of `account` for `tx_id`.
    /// Fails when the account already has a confirmed profile or another registration
    /// holds the reservation.
    pub fn register_profile(&self, account: Address, tx_id: TxId, confirmed: bool) -> Result<(), TransactionError> {
        if confirmed {
            return Err(TransactionError::rule(ALREADY_MULTISIG));
        }
        match self.reservations.entry(account) {
            Entry::Occupied(e) => {
                debug!(%account, holder = %e.get(), rejected = %tx_id, "multisignature registration already pending");
                Err(TransactionError::conflict(ALREADY_MULTISIG))
            }
            Entry::Vacant(e) => {
                e.insert(tx_id);
                Ok(())
            }
        }
    }

    pub fn reservation(&self, account: &Address) -> Option<TxId> {
        self.reservations.get(account).map(|r| *r)
    }

    /// Drop the reservation if `tx_id` still holds it.
    pub fn release(&self, account: &Address, tx_id: TxId) -> bool {
        self.reservations.remove_if(account, |_, holder| *holder == tx_id).is_some()
    }

    /// Start collecting approvals for a gated transaction.
    pub fn track(&self, entry: PendingMultisigEntry) {
        info!(
            tx_id = %entry.tx_id,
            sender = %entry.sender,
            collected = entry.collected(),
            required = entry.required,
            "awaiting multisignature approvals"
        );
        self.pending.insert(entry.tx_id, entry);
    }

    pub fn collect_signature(
        &self,
        tx_id: TxId,
        signer: PublicKey,
        signature: Signature,
    ) -> Result<CollectOutcome, SignatureRejection> {
        let mut entry = self
            .pending
            .get_mut(&tx_id)
            .ok_or(SignatureRejection::TransactionNotFound)?;
        if entry.is_complete() || entry.has_signed(&signer) {
            return Err(SignatureRejection::PermissionDenied);
        }
        if !entry.members.contains(&signer) {
            return Err(SignatureRejection::NotAMember);
        }
        signer
            .verify(&entry.signing_hash, &signature)
            .map_err(|_| SignatureRejection::VerificationFailed)?;

        entry.signatures.push(MemberSignature { public_key: signer, signature });
        let (collected, required) = (entry.collected(), entry.required);
        debug!(%tx_id, signer = %signer, collected, required, "multisignature approval recorded");
        if entry.is_complete() {
            Ok(CollectOutcome::Ready(entry.signatures.clone()))
        } else {
            Ok(CollectOutcome::Recorded { collected, required })
        }
    }

    /// `(collected, required)` for a tracked transaction.
    pub fn progress(&self, tx_id: &TxId) -> Option<(usize, usize)> {
        self.pending.get(tx_id).map(|e| (e.collected(), e.required))
    }

    pub fn is_tracked(&self, tx_id: &TxId) -> bool {
        self.pending.contains_key(tx_id)
    }

    pub fn discard(&self, tx_id: &TxId) -> Option<PendingMultisigEntry> {
        self.pending.remove(tx_id).map(|(_, e)| e)
    }

    /// Remove incomplete entries whose lifetime has elapsed.
    pub fn expire(&self, now: u64) -> Vec<PendingMultisigEntry> {
        let expired: Vec<TxId> = self
            .pending
            .iter()
            .filter(|e| !e.is_complete() && e.expires_at <= now)
            .map(|e| e.tx_id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| self.pending.remove_if(&id, |_, e| !e.is_complete()).map(|(_, e)| e))
            .collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
