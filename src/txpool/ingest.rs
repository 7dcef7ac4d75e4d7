//! Ingest: the admission path for transactions and multisignature approvals.
//!
//! `TransactionService::submit` runs schema validation, signature checks and the type
//! processor's business rules against the last confirmed state, reserves one-time
//! transitions, then inserts into the pool either as eligible or as pending approvals.
//! `submit_signature` feeds the multisignature registry and promotes the pool entry
//! once the threshold is met.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::crypto::{Address, PublicKey, Signature};
use crate::ledger::{Ledger, TxOutcome};
use crate::multisig::{CollectOutcome, MultisigRegistry, PendingMultisigEntry};
use crate::state::{Account, ChainState, StateView};
use crate::transaction::authorization::{signature_requirement, verify_member_signatures, verify_sender};
use crate::transaction::error::{SignatureRejection, TransactionError};
use crate::transaction::processors::ProcessorRegistry;
use crate::transaction::schema::SchemaValidator;
use crate::transaction::types::{Transaction, TxId};
use crate::txpool::pool::{PoolState, TxPool, TxPoolError};
use crate::utils::metrics::{self, METRICS};

const SECS_PER_HOUR: u64 = 3600;

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Eligible(TxId),
    PendingMultisig { id: TxId, collected: usize, required: usize },
}

impl Admission {
    pub fn id(&self) -> TxId {
        match self {
            Admission::Eligible(id) => *id,
            Admission::PendingMultisig { id, .. } => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureRequest {
    pub transaction_id: TxId,
    pub public_key: PublicKey,
    pub signature: Signature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureOutcome {
    Recorded { collected: usize, required: usize },
    /// Threshold met; the transaction is now eligible.
    Ready,
}

/// Lifecycle state reported by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum TxStatus {
    PendingMultisig { collected: usize, required: usize },
    Eligible,
    Confirmed { height: u64 },
    Rejected { reason: String },
    Expired,
}

pub struct TransactionService {
    schema: SchemaValidator,
    processors: Arc<ProcessorRegistry>,
    state: Arc<ChainState>,
    registry: Arc<MultisigRegistry>,
    pool: Arc<TxPool>,
    ledger: Arc<Ledger>,
}

impl TransactionService {
    pub fn new(
        schema: SchemaValidator,
        processors: Arc<ProcessorRegistry>,
        state: Arc<ChainState>,
        registry: Arc<MultisigRegistry>,
        pool: Arc<TxPool>,
        ledger: Arc<Ledger>,
    ) -> Self {
        Self { schema, processors, state, registry, pool, ledger }
    }

    /// Submit a raw JSON transaction body.
    pub fn submit_raw(&self, raw: &Value, now: u64) -> Result<Admission, TransactionError> {
        let tx = self.schema.normalize(raw).map_err(|e| self.rejected(None, e.into()))?;
        self.admit(tx, now)
    }

    /// Submit an already typed transaction.
    pub fn submit(&self, tx: Transaction, now: u64) -> Result<Admission, TransactionError> {
        if tx.id != tx.compute_id() {
            return Err(self.rejected(Some(tx.id), TransactionError::rule("Invalid transaction id")));
        }
        self.schema
            .validate_transaction(&tx)
            .map_err(|e| self.rejected(Some(tx.id), e.into()))?;
        self.admit(tx, now)
    }

    fn admit(&self, tx: Transaction, now: u64) -> Result<Admission, TransactionError> {
        let id = tx.id;
        match self.try_admit(tx, now) {
            Ok(admission) => {
                METRICS.inc_counter(metrics::TX_ACCEPTED);
                METRICS.set_gauge(metrics::POOL_SIZE, self.pool.len() as f64);
                Ok(admission)
            }
            Err(e) => Err(self.rejected(Some(id), e)),
        }
    }

    fn rejected(&self, id: Option<TxId>, err: TransactionError) -> TransactionError {
        METRICS.inc_counter(metrics::TX_REJECTED);
        debug!(tx_id = ?id, reason = %err, "transaction rejected");
        err
    }

    fn try_admit(&self, tx: Transaction, now: u64) -> Result<Admission, TransactionError> {
        if self.ledger.is_confirmed(&tx.id) {
            return Err(TransactionError::rule(format!("Transaction is already confirmed: {}", tx.id)));
        }
        if self.pool.contains(&tx.id) {
            return Err(TxPoolError::Duplicate(tx.id).into());
        }
        let sender_address = tx.sender();
        let registration = tx.multisig_asset().is_some();

        // `commit` waits for the view and reservations are released only after it, so
        // a registration sees either the confirmed profile or the pending reservation.
        let (requirement, collected) = {
            let view = self.state.read();
            let sender = view.account(&sender_address);
            verify_sender(&tx, sender.as_ref())?;
            let requirement = signature_requirement(&tx, sender.as_ref());
            let collected = match &requirement {
                Some(req) => verify_member_signatures(&tx, req)?,
                None => 0,
            };
            if registration {
                let confirmed = sender.as_ref().map_or(false, Account::is_multisig);
                self.registry.register_profile(sender_address, tx.id, confirmed)?;
            }
            if let Err(e) = self.processors.validate(&tx, &view) {
                if registration {
                    self.registry.release(&sender_address, tx.id);
                }
                return Err(e);
            }
            (requirement, collected)
        };

        let pending = requirement.as_ref().filter(|req| collected < req.required);
        let (state, expires_at) = match pending {
            Some(req) => (
                PoolState::PendingMultisig,
                Some(now.saturating_add(u64::from(req.lifetime_hours) * SECS_PER_HOUR)),
            ),
            None => (PoolState::Eligible, None),
        };

        let signing_hash = tx.signing_hash();
        let signatures = tx.signatures.clone();
        let id = tx.id;
        if let Err(e) = self.pool.insert(tx, state, now, expires_at) {
            if registration {
                self.registry.release(&sender_address, id);
            }
            return Err(e.into());
        }

        match pending {
            Some(req) => {
                self.registry.track(PendingMultisigEntry {
                    tx_id: id,
                    sender: sender_address,
                    signing_hash,
                    members: req.members.clone(),
                    required: req.required,
                    signatures,
                    expires_at: expires_at.unwrap_or(now),
                });
                Ok(Admission::PendingMultisig { id, collected, required: req.required })
            }
            None => {
                info!(tx_id = %id, sender = %sender_address, "transaction admitted");
                Ok(Admission::Eligible(id))
            }
        }
    }

    /// Record one member approval.
    pub fn submit_signature(&self, req: SignatureRequest) -> Result<SignatureOutcome, SignatureRejection> {
        let result = self.collect(&req);
        match &result {
            Ok(outcome) => {
                METRICS.inc_counter(metrics::SIG_ACCEPTED);
                debug!(tx_id = %req.transaction_id, signer = %req.public_key, ?outcome, "signature accepted");
            }
            Err(reason) => {
                METRICS.inc_counter(metrics::SIG_REJECTED);
                debug!(tx_id = %req.transaction_id, signer = %req.public_key, %reason, "signature rejected");
            }
        }
        result
    }

    fn collect(&self, req: &SignatureRequest) -> Result<SignatureOutcome, SignatureRejection> {
        if self.ledger.is_confirmed(&req.transaction_id) {
            return Err(SignatureRejection::PermissionDenied);
        }
        match self
            .registry
            .collect_signature(req.transaction_id, req.public_key, req.signature)
        {
            Ok(CollectOutcome::Recorded { collected, required }) => {
                Ok(SignatureOutcome::Recorded { collected, required })
            }
            Ok(CollectOutcome::Ready(signatures)) => {
                self.pool
                    .promote(&req.transaction_id, signatures)
                    .map_err(|_| SignatureRejection::TransactionNotFound)?;
                info!(tx_id = %req.transaction_id, "multisignature threshold reached");
                Ok(SignatureOutcome::Ready)
            }
            // pool entries that never needed approvals cannot be signed
            Err(SignatureRejection::TransactionNotFound) if self.pool.contains(&req.transaction_id) => {
                Err(SignatureRejection::PermissionDenied)
            }
            Err(e) => Err(e),
        }
    }

    /// Pool entry first, then the confirmed record.
    pub async fn get_transaction(&self, id: &TxId) -> Result<Option<Transaction>, TransactionError> {
        if let Some(tx) = self.pool.get(id) {
            return Ok(Some(tx));
        }
        self.confirmed_transaction(id).await.map(|found| found.map(|(tx, _)| tx))
    }

    pub async fn confirmed_transaction(&self, id: &TxId) -> Result<Option<(Transaction, u64)>, TransactionError> {
        self.ledger
            .confirmed_transaction(id)
            .await
            .map_err(|e| TransactionError::Storage(e.to_string()))
    }

    pub fn status(&self, id: &TxId) -> Option<TxStatus> {
        if let Some(height) = self.ledger.confirmed_height(id) {
            return Some(TxStatus::Confirmed { height });
        }
        if let Some(meta) = self.pool.meta(id) {
            return Some(match meta.state {
                PoolState::Eligible => TxStatus::Eligible,
                PoolState::PendingMultisig => {
                    let (collected, required) = self.registry.progress(id).unwrap_or((0, 0));
                    TxStatus::PendingMultisig { collected, required }
                }
            });
        }
        self.ledger.outcome(id).map(|o| match o {
            TxOutcome::Rejected { reason } => TxStatus::Rejected { reason },
            TxOutcome::Expired => TxStatus::Expired,
        })
    }

    /// Ids the next block would consider, in application order.
    pub fn list_eligible(&self) -> Vec<TxId> {
        self.pool.eligible_ids()
    }

    pub fn account(&self, address: &Address) -> Option<Account> {
        self.state.account(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::node::config::{ProtocolConfig, COIN};
    use crate::state::{InMemAccountStore, MultisigProfile, StateDiff};
    use crate::storage::MemKvStore;
    use crate::transaction::types::{Asset, MultisigAsset, TransactionType, UnsignedTransaction};

    fn kp(s: &str) -> Keypair {
        Keypair::from_passphrase(s).unwrap()
    }

    async fn service(accounts: Vec<Account>) -> TransactionService {
        let protocol = ProtocolConfig::default();
        let state = Arc::new(ChainState::new(Arc::new(InMemAccountStore::new())));
        let mut diff = StateDiff::default();
        for a in accounts {
            diff.put_account(a);
        }
        state.commit(diff);
        let ledger = Arc::new(Ledger::open(Arc::new(MemKvStore::new())).await.unwrap());
        TransactionService::new(
            SchemaValidator::new(&protocol),
            Arc::new(ProcessorRegistry::new(&protocol)),
            state,
            Arc::new(MultisigRegistry::new()),
            Arc::new(TxPool::new(100, 3600)),
            ledger,
        )
    }

    fn transfer(sender: &Keypair, amount: u64) -> Transaction {
        UnsignedTransaction {
            kind: TransactionType::Transfer,
            timestamp: 1,
            sender_public_key: sender.public(),
            recipient_id: Some(kp("bob").address()),
            amount,
            fee: COIN / 10,
            asset: Asset::Transfer { data: None },
        }
        .sign(sender, None)
    }

    fn registration(sender: &Keypair, members: &[&Keypair], min: u32) -> Transaction {
        UnsignedTransaction {
            kind: TransactionType::Multisignature,
            timestamp: 1,
            sender_public_key: sender.public(),
            recipient_id: None,
            amount: 0,
            fee: 5 * COIN * (members.len() as u64 + 1),
            asset: Asset::Multisignature(MultisigAsset {
                min,
                lifetime: 1,
                keysgroup: members.iter().map(|m| format!("+{}", m.public().to_hex())).collect(),
            }),
        }
        .sign(sender, None)
    }

    #[tokio::test]
    async fn test_plain_transfer_is_eligible() {
        let alice = kp("alice");
        let svc = service(vec![Account::with_balance(alice.address(), 10 * COIN)]).await;
        let tx = transfer(&alice, COIN);
        assert_eq!(svc.submit(tx.clone(), 0).unwrap(), Admission::Eligible(tx.id));
        assert_eq!(svc.status(&tx.id), Some(TxStatus::Eligible));
        assert_eq!(svc.list_eligible(), vec![tx.id]);
        assert!(matches!(
            svc.submit(tx.clone(), 0).unwrap_err(),
            TransactionError::Pool(TxPoolError::Duplicate(_))
        ));
        assert_eq!(
            svc.submit_signature(SignatureRequest {
                transaction_id: tx.id,
                public_key: alice.public(),
                signature: tx.member_sign(&alice).signature,
            })
            .unwrap_err(),
            SignatureRejection::PermissionDenied
        );
    }

    #[tokio::test]
    async fn test_registration_collects_every_member() {
        let alice = kp("alice");
        let (m1, m2) = (kp("m1"), kp("m2"));
        let svc = service(vec![Account::with_balance(alice.address(), 100 * COIN)]).await;
        let tx = registration(&alice, &[&m1, &m2], 1);

        let admission = svc.submit(tx.clone(), 0).unwrap();
        assert_eq!(admission, Admission::PendingMultisig { id: tx.id, collected: 0, required: 2 });
        assert!(svc.list_eligible().is_empty());

        let second = registration(&alice, &[&m1], 1);
        assert_eq!(
            svc.submit(second, 0).unwrap_err().to_string(),
            "Account already has multisignatures enabled"
        );

        let sign = |m: &Keypair| SignatureRequest {
            transaction_id: tx.id,
            public_key: m.public(),
            signature: tx.member_sign(m).signature,
        };
        assert_eq!(
            svc.submit_signature(sign(&m1)).unwrap(),
            SignatureOutcome::Recorded { collected: 1, required: 2 }
        );
        assert_eq!(svc.status(&tx.id), Some(TxStatus::PendingMultisig { collected: 1, required: 2 }));
        assert_eq!(svc.submit_signature(sign(&m2)).unwrap(), SignatureOutcome::Ready);
        assert_eq!(svc.list_eligible(), vec![tx.id]);
        assert_eq!(svc.submit_signature(sign(&m1)).unwrap_err(), SignatureRejection::PermissionDenied);
    }

    #[tokio::test]
    async fn test_gated_transfer_waits_for_min() {
        let alice = kp("alice");
        let members = [kp("m1"), kp("m2"), kp("m3")];
        let mut acc = Account::with_balance(alice.address(), 10 * COIN);
        acc.multisignature = Some(MultisigProfile {
            min: 2,
            lifetime: 1,
            keysgroup: members.iter().map(|m| m.public()).collect(),
        });
        let svc = service(vec![acc]).await;

        let mut tx = transfer(&alice, COIN);
        let first = tx.member_sign(&members[1]);
        tx.signatures.push(first);
        let admission = svc.submit(tx.clone(), 0).unwrap();
        assert_eq!(admission, Admission::PendingMultisig { id: tx.id, collected: 1, required: 2 });

        let outsider = kp("outsider");
        let err = svc
            .submit_signature(SignatureRequest {
                transaction_id: tx.id,
                public_key: outsider.public(),
                signature: tx.member_sign(&outsider).signature,
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to verify signature");

        let done = svc
            .submit_signature(SignatureRequest {
                transaction_id: tx.id,
                public_key: members[2].public(),
                signature: tx.member_sign(&members[2]).signature,
            })
            .unwrap();
        assert_eq!(done, SignatureOutcome::Ready);
        let pooled = svc.get_transaction(&tx.id).await.unwrap().unwrap();
        assert_eq!(pooled.signatures.len(), 2);
        assert_eq!(pooled.id, tx.id);
    }

    #[tokio::test]
    async fn test_drained_multisig_account_cannot_register_again() {
        let alice = kp("alice");
        let mut acc = Account::with_balance(alice.address(), 0);
        acc.multisignature = Some(MultisigProfile { min: 1, lifetime: 1, keysgroup: vec![kp("m1").public()] });
        let svc = service(vec![acc]).await;

        let err = svc.submit(registration(&alice, &[&kp("m2")], 1), 0).unwrap_err();
        assert_eq!(err.to_string(), "Account already has multisignatures enabled");
        assert_eq!(err.http_status(), 400);
        assert!(svc.registry.reservation(&alice.address()).is_none());
    }

    #[tokio::test]
    async fn test_pending_registration_outranks_balance() {
        let alice = kp("alice");
        // enough for exactly one registration fee
        let svc = service(vec![Account::with_balance(alice.address(), 10 * COIN)]).await;
        let first = registration(&alice, &[&kp("m1")], 1);
        svc.submit(first.clone(), 0).unwrap();

        let err = svc.submit(registration(&alice, &[&kp("m1"), &kp("m2")], 1), 0).unwrap_err();
        assert!(matches!(err, TransactionError::StateConflict(_)));
        assert_eq!(err.to_string(), "Account already has multisignatures enabled");
        assert_eq!(svc.registry.reservation(&alice.address()), Some(first.id));
    }

    #[tokio::test]
    async fn test_rejections_carry_reason() {
        let poor = kp("poor");
        let svc = service(Vec::new()).await;
        let err = svc.submit(registration(&poor, &[&kp("m1")], 1), 0).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Account does not have enough LSK: {} balance: 0", poor.address())
        );
        // a failed registration must not hold the reservation
        assert!(svc.registry.reservation(&poor.address()).is_none());

        let err = svc.submit_raw(&serde_json::json!({"type": 0}), 0).unwrap_err();
        assert_eq!(err.http_status(), 400);
        assert!(svc.status(&TxId(1)).is_none());
        assert_eq!(
            svc.submit_signature(SignatureRequest {
                transaction_id: TxId(1),
                public_key: poor.public(),
                signature: Signature([0u8; 64]),
            })
            .unwrap_err(),
            SignatureRejection::TransactionNotFound
        );
    }
}
