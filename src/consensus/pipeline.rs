//! Block confirmation pipeline.
//!
//! A single writer (guarded by a `tokio::sync::Mutex`) turns the pool's eligible
//! snapshot into a block. Transactions are applied in ascending id order against a
//! `BlockOverlay`; each one either contributes its diff or is rejected with its own
//! reason. Signature requirements are checked against the state confirmed before the
//! block, balances and one-time transitions against the overlay.
//!
//! Order inside `forge_block`: expire, apply, persist the block, commit the state diff,
//! then settle the pool and the multisignature registry.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::ledger::{Block, Ledger, LedgerError, TxOutcome};
use crate::multisig::MultisigRegistry;
use crate::state::{BlockOverlay, ChainState, StateDiff};
use crate::transaction::authorization::verify_authorization;
use crate::transaction::error::TransactionError;
use crate::transaction::processors::ProcessorRegistry;
use crate::transaction::schema::SchemaValidator;
use crate::transaction::types::{Transaction, TxId};
use crate::txpool::TxPool;
use crate::utils::metrics::{self, METRICS};
use crate::utils::unix_now;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("block {height}: transaction {id} is invalid: {reason}")]
    InvalidTransaction { height: u64, id: TxId, reason: String },
    #[error("state: {0}")]
    State(#[from] anyhow::Error),
}

/// What a forged block did.
#[derive(Debug, Clone)]
pub struct BlockReport {
    pub block: Block,
    pub rejected: Vec<(TxId, String)>,
    pub expired: Vec<TxId>,
}

impl BlockReport {
    pub fn height(&self) -> u64 {
        self.block.height
    }

    pub fn confirmed(&self) -> Vec<TxId> {
        self.block.transaction_ids()
    }
}

struct BatchResult {
    applied: Vec<Transaction>,
    rejected: Vec<(Transaction, String)>,
    diff: StateDiff,
}

pub struct ConfirmationPipeline {
    schema: SchemaValidator,
    processors: Arc<ProcessorRegistry>,
    state: Arc<ChainState>,
    registry: Arc<MultisigRegistry>,
    pool: Arc<TxPool>,
    ledger: Arc<Ledger>,
    max_transactions: usize,
    writer: Mutex<()>,
}

impl ConfirmationPipeline {
    pub fn new(
        schema: SchemaValidator,
        processors: Arc<ProcessorRegistry>,
        state: Arc<ChainState>,
        registry: Arc<MultisigRegistry>,
        pool: Arc<TxPool>,
        ledger: Arc<Ledger>,
        max_transactions: usize,
    ) -> Self {
        Self {
            schema,
            processors,
            state,
            registry,
            pool,
            ledger,
            max_transactions,
            writer: Mutex::new(()),
        }
    }

    /// Forge the next block from the pool. Empty blocks are forged as well.
    pub async fn forge_block(&self, timestamp: u64) -> Result<BlockReport, PipelineError> {
        let _writer = self.writer.lock().await;

        let expired = self.expire(timestamp).await?;

        let mut candidates = Vec::new();
        let mut stale = Vec::new();
        for tx in self.pool.list_eligible() {
            if candidates.len() >= self.max_transactions {
                break;
            }
            if self.ledger.is_confirmed(&tx.id) {
                stale.push(tx);
            } else {
                candidates.push(tx);
            }
        }
        // confirmed through an external block while still pooled
        for tx in stale {
            self.settle(&tx);
        }

        let batch = self.apply_batch(&candidates);
        let mut rejected = Vec::with_capacity(batch.rejected.len());
        for (tx, reason) in batch.rejected {
            self.settle(&tx);
            self.ledger
                .record_outcome(tx.id, TxOutcome::Rejected { reason: reason.clone() })
                .await?;
            rejected.push((tx.id, reason));
        }

        let block = self.next_block(timestamp, batch.applied);
        self.persist(block.clone(), batch.diff).await?;

        METRICS.add_counter(metrics::TX_CONFIRMED, block.transactions.len() as u64);
        METRICS.inc_counter(metrics::BLOCKS_FORGED);
        info!(
            height = block.height,
            id = %block.id,
            confirmed = block.transactions.len(),
            rejected = rejected.len(),
            expired = expired.len(),
            "block forged"
        );
        Ok(BlockReport { block, rejected, expired })
    }

    /// Apply a block produced elsewhere. Every transaction must apply cleanly.
    pub async fn apply_external_block(&self, block: Block) -> Result<(), PipelineError> {
        let _writer = self.writer.lock().await;
        self.ledger.check_extends_tip(&block)?;
        if let Some(tx) = block.transactions.iter().find(|tx| self.ledger.is_confirmed(&tx.id)) {
            return Err(PipelineError::InvalidTransaction {
                height: block.height,
                id: tx.id,
                reason: format!("Transaction is already confirmed: {}", tx.id),
            });
        }
        let diff = self.apply_strict(&block)?;
        let height = block.height;
        self.persist(block, diff).await?;
        info!(height, "external block applied");
        Ok(())
    }

    /// Rebuild state from the blocks already in the ledger. Returns the replayed height.
    pub async fn replay(&self) -> Result<u64, PipelineError> {
        let _writer = self.writer.lock().await;
        let blocks = self.ledger.blocks().await?;
        let mut height = 0;
        for block in blocks {
            let diff = self.apply_strict(&block)?;
            self.state.commit(diff);
            height = block.height;
        }
        self.state.flush()?;
        METRICS.set_gauge(metrics::CHAIN_HEIGHT, height as f64);
        info!(height, "ledger replayed");
        Ok(height)
    }

    fn apply_strict(&self, block: &Block) -> Result<StateDiff, PipelineError> {
        let batch = self.apply_batch(&block.transactions);
        if let Some((tx, reason)) = batch.rejected.into_iter().next() {
            return Err(PipelineError::InvalidTransaction { height: block.height, id: tx.id, reason });
        }
        Ok(batch.diff)
    }

    /// Apply `txs` in ascending id order on top of the confirmed state.
    fn apply_batch(&self, txs: &[Transaction]) -> BatchResult {
        let mut ordered: Vec<&Transaction> = txs.iter().collect();
        ordered.sort_by_key(|tx| tx.id);

        let base = self.state.read();
        let mut overlay = BlockOverlay::new(&base);
        let mut seen = HashSet::with_capacity(ordered.len());
        let mut applied = Vec::with_capacity(ordered.len());
        let mut rejected = Vec::new();

        for tx in ordered {
            if !seen.insert(tx.id) {
                rejected.push((tx.clone(), format!("Transaction is already confirmed: {}", tx.id)));
                continue;
            }
            match self.apply_one(tx, &overlay) {
                Ok(diff) => {
                    overlay.apply(diff);
                    applied.push(tx.clone());
                }
                Err(e) => {
                    debug!(tx_id = %tx.id, reason = %e, "transaction failed block application");
                    rejected.push((tx.clone(), e.to_string()));
                }
            }
        }
        BatchResult { applied, rejected, diff: overlay.into_diff() }
    }

    fn apply_one(&self, tx: &Transaction, overlay: &BlockOverlay<'_>) -> Result<StateDiff, TransactionError> {
        verify_authorization(tx, overlay.base())?;
        self.schema.validate_transaction(tx)?;
        self.processors.apply(tx, overlay)
    }

    fn next_block(&self, timestamp: u64, transactions: Vec<Transaction>) -> Block {
        let tip = self.ledger.tip();
        let height = tip.as_ref().map_or(1, |t| t.height + 1);
        Block::new(height, tip.map(|t| t.id), timestamp, transactions)
    }

    /// Persist the block, then make its state visible and clear its transactions.
    async fn persist(&self, block: Block, diff: StateDiff) -> Result<(), PipelineError> {
        let height = block.height;
        let confirmed = block.transactions.clone();
        self.ledger.append_block(block).await?;
        self.state.commit(diff);
        if let Err(e) = self.state.flush() {
            warn!(height, error = %e, "account flush failed");
        }
        for tx in &confirmed {
            self.settle(tx);
        }
        METRICS.set_gauge(metrics::CHAIN_HEIGHT, height as f64);
        METRICS.set_gauge(metrics::POOL_SIZE, self.pool.len() as f64);
        Ok(())
    }

    /// Drop every trace of `tx` from the pool and the registry.
    fn settle(&self, tx: &Transaction) {
        self.pool.remove(&tx.id);
        self.registry.discard(&tx.id);
        self.registry.release(&tx.sender(), tx.id);
    }

    async fn expire(&self, now: u64) -> Result<Vec<TxId>, PipelineError> {
        let mut expired = Vec::new();
        for entry in self.registry.expire(now) {
            self.pool.remove(&entry.tx_id);
            self.registry.release(&entry.sender, entry.tx_id);
            expired.push(entry.tx_id);
        }
        for tx in self.pool.gc_ttl(now) {
            self.settle(&tx);
            expired.push(tx.id);
        }
        for id in &expired {
            self.ledger.record_outcome(*id, TxOutcome::Expired).await?;
            debug!(tx_id = %id, "transaction expired");
        }
        METRICS.add_counter(metrics::TX_EXPIRED, expired.len() as u64);
        Ok(expired)
    }
}

/// Forge a block every `interval` until the shutdown channel flips.
pub fn spawn_forger(
    pipeline: Arc<ConfirmationPipeline>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = pipeline.forge_block(unix_now()).await {
                        error!(error = %e, "block forging failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("forger stopped");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::node::config::{ProtocolConfig, COIN};
    use crate::state::{Account, InMemAccountStore, StateView};
    use crate::storage::{KvStore, MemKvStore};
    use crate::transaction::error::insufficient_funds;
    use crate::transaction::processors::test_support::{kp, signed, transfer};
    use crate::transaction::types::{Asset, MultisigAsset};
    use crate::transaction::error::ALREADY_MULTISIG;
    use crate::txpool::{PoolState, SignatureRequest, TransactionService, TxStatus};

    struct Harness {
        service: TransactionService,
        pipeline: ConfirmationPipeline,
        state: Arc<ChainState>,
        ledger: Arc<Ledger>,
        pool: Arc<TxPool>,
        kv: Arc<dyn KvStore>,
    }

    async fn harness_on(kv: Arc<dyn KvStore>, funded: &[(&Keypair, u64)]) -> Harness {
        let protocol = ProtocolConfig::default();
        let state = Arc::new(ChainState::new(Arc::new(InMemAccountStore::new())));
        let mut genesis = StateDiff::default();
        for (k, coins) in funded {
            genesis.put_account(Account::with_balance(k.address(), coins * COIN));
        }
        state.commit(genesis);
        let ledger = Arc::new(Ledger::open(kv.clone()).await.unwrap());
        let processors = Arc::new(ProcessorRegistry::new(&protocol));
        let registry = Arc::new(MultisigRegistry::new());
        let pool = Arc::new(TxPool::new(100, 3600));
        let service = TransactionService::new(
            SchemaValidator::new(&protocol),
            processors.clone(),
            state.clone(),
            registry.clone(),
            pool.clone(),
            ledger.clone(),
        );
        let pipeline = ConfirmationPipeline::new(
            SchemaValidator::new(&protocol),
            processors,
            state.clone(),
            registry,
            pool.clone(),
            ledger.clone(),
            protocol.block.max_transactions,
        );
        Harness { service, pipeline, state, ledger, pool, kv }
    }

    async fn harness(funded: &[(&Keypair, u64)]) -> Harness {
        harness_on(Arc::new(MemKvStore::new()), funded).await
    }

    fn balance(h: &Harness, k: &Keypair) -> u64 {
        h.state.account(&k.address()).map_or(0, |a| a.balance)
    }

    fn register(sender: &Keypair, members: &[&Keypair], min: u32) -> Transaction {
        let keysgroup = members.iter().map(|m| format!("+{}", m.public().to_hex())).collect();
        signed(sender, Asset::Multisignature(MultisigAsset { min, lifetime: 1, keysgroup }), None, 0)
    }

    fn approve(h: &Harness, tx: &Transaction, member: &Keypair) {
        h.service
            .submit_signature(SignatureRequest {
                transaction_id: tx.id,
                public_key: member.public(),
                signature: tx.member_sign(member).signature,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_transfer_confirms_in_next_block() {
        let (alice, bob) = (kp("alice"), kp("bob"));
        let h = harness(&[(&alice, 10)]).await;
        let tx = transfer(&alice, bob.address(), 2 * COIN);
        h.service.submit(tx.clone(), 0).unwrap();

        let report = h.pipeline.forge_block(10).await.unwrap();
        assert_eq!(report.height(), 1);
        assert_eq!(report.confirmed(), vec![tx.id]);
        assert_eq!(balance(&h, &bob), 2 * COIN);
        assert_eq!(balance(&h, &alice), 8 * COIN - COIN / 10);
        assert_eq!(h.service.status(&tx.id), Some(TxStatus::Confirmed { height: 1 }));
        assert!(h.service.list_eligible().is_empty());

        let again = h.pipeline.forge_block(20).await.unwrap();
        assert_eq!(again.height(), 2);
        assert!(again.block.transactions.is_empty());
        assert_eq!(again.block.previous_id, Some(report.block.id));
    }

    #[tokio::test]
    async fn test_lowest_id_wins_conflict() {
        let (alice, bob) = (kp("alice"), kp("bob"));
        let h = harness(&[(&alice, 10)]).await;
        let a = transfer(&alice, bob.address(), 6 * COIN);
        let b = transfer(&alice, bob.address(), 6 * COIN + 1);
        h.service.submit(a.clone(), 0).unwrap();
        h.service.submit(b.clone(), 0).unwrap();
        let (winner, loser) = if a.id < b.id { (a, b) } else { (b, a) };

        let report = h.pipeline.forge_block(10).await.unwrap();
        assert_eq!(report.confirmed(), vec![winner.id]);
        let remaining = 10 * COIN - winner.amount - winner.fee;
        let reason = insufficient_funds(&alice.address(), remaining).to_string();
        assert_eq!(report.rejected, vec![(loser.id, reason.clone())]);
        assert_eq!(h.service.status(&loser.id), Some(TxStatus::Rejected { reason }));
        assert_eq!(balance(&h, &alice), remaining);
    }

    #[tokio::test]
    async fn test_registration_then_gated_transfer() {
        let (alice, bob) = (kp("alice"), kp("bob"));
        let members = [kp("m1"), kp("m2"), kp("m3")];
        let refs: Vec<&Keypair> = members.iter().collect();
        let h = harness(&[(&alice, 100)]).await;

        let reg = register(&alice, &refs, 2);
        h.service.submit(reg.clone(), 0).unwrap();
        // still collecting: not part of the block
        assert!(h.pipeline.forge_block(1).await.unwrap().block.transactions.is_empty());
        for m in &members {
            approve(&h, &reg, m);
        }
        assert_eq!(h.pipeline.forge_block(2).await.unwrap().confirmed(), vec![reg.id]);
        let profile = h.state.account(&alice.address()).unwrap().multisignature.unwrap();
        assert_eq!(profile.min, 2);
        assert_eq!(profile.keysgroup.len(), 3);

        let gated = transfer(&alice, bob.address(), COIN);
        h.service.submit(gated.clone(), 3).unwrap();
        approve(&h, &gated, &members[2]);
        assert_eq!(h.service.status(&gated.id), Some(TxStatus::PendingMultisig { collected: 1, required: 2 }));
        assert!(h.pipeline.forge_block(4).await.unwrap().block.transactions.is_empty());
        approve(&h, &gated, &members[0]);
        assert_eq!(h.pipeline.forge_block(5).await.unwrap().confirmed(), vec![gated.id]);
        assert_eq!(balance(&h, &bob), COIN);
    }

    #[tokio::test]
    async fn test_same_block_registrations_lowest_id_wins() {
        let alice = kp("alice");
        let (m1, m2) = (kp("m1"), kp("m2"));
        let h = harness(&[(&alice, 100)]).await;

        // both fully approved and eligible: only the block can decide between them
        let mut first = register(&alice, &[&m1], 1);
        let approval = first.member_sign(&m1);
        first.signatures.push(approval);
        let mut second = register(&alice, &[&m2], 1);
        let approval = second.member_sign(&m2);
        second.signatures.push(approval);
        for tx in [&first, &second] {
            h.pool.insert(tx.clone(), PoolState::Eligible, 0, None).unwrap();
        }
        let (winner, loser) = if first.id < second.id { (first, second) } else { (second, first) };

        let report = h.pipeline.forge_block(10).await.unwrap();
        assert_eq!(report.confirmed(), vec![winner.id]);
        assert_eq!(report.rejected, vec![(loser.id, ALREADY_MULTISIG.to_string())]);
        assert_eq!(
            h.service.status(&loser.id),
            Some(TxStatus::Rejected { reason: ALREADY_MULTISIG.to_string() })
        );
        let profile = h.state.account(&alice.address()).unwrap().multisignature.unwrap();
        assert_eq!(profile.keysgroup, vec![winner.signatures[0].public_key]);
        assert_eq!(balance(&h, &alice), 100 * COIN - winner.fee);
        assert!(h.pool.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_registration_racing_confirmation_is_rejected() {
        let alice = kp("alice");
        let (m1, m2) = (kp("m1"), kp("m2"));
        for round in 0..20u64 {
            let h = Arc::new(harness(&[(&alice, 100)]).await);
            let first = register(&alice, &[&m1], 1);
            h.service.submit(first.clone(), 0).unwrap();
            approve(&h, &first, &m1);

            let forger = h.clone();
            let forge = tokio::spawn(async move { forger.pipeline.forge_block(round + 1).await });
            let submitter = h.clone();
            let retry = register(&alice, &[&m1, &m2], 1);
            let submit = tokio::spawn(async move { submitter.service.submit(retry, round) });
            let (forged, submitted) = tokio::join!(forge, submit);

            assert_eq!(forged.unwrap().unwrap().confirmed(), vec![first.id]);
            let err = submitted.unwrap().unwrap_err();
            assert_eq!(err.to_string(), ALREADY_MULTISIG);
            assert!(h.pool.is_empty());
        }
    }

    #[tokio::test]
    async fn test_pending_multisig_expires() {
        let alice = kp("alice");
        let m1 = kp("m1");
        let h = harness(&[(&alice, 100)]).await;
        let reg = register(&alice, &[&m1], 1);
        h.service.submit(reg.clone(), 0).unwrap();

        let report = h.pipeline.forge_block(3599).await.unwrap();
        assert!(report.expired.is_empty());
        let report = h.pipeline.forge_block(3600).await.unwrap();
        assert_eq!(report.expired, vec![reg.id]);
        assert_eq!(h.service.status(&reg.id), Some(TxStatus::Expired));

        // the reservation went with it
        let retry = register(&alice, &[&m1, &kp("m2")], 1);
        assert!(h.service.submit(retry, 3600).is_ok());
    }

    #[tokio::test]
    async fn test_external_block_and_replay_rebuild_state() {
        let (alice, bob) = (kp("alice"), kp("bob"));
        let producer = harness(&[(&alice, 10)]).await;
        let tx = transfer(&alice, bob.address(), 3 * COIN);
        producer.service.submit(tx.clone(), 0).unwrap();
        let block = producer.pipeline.forge_block(10).await.unwrap().block;

        let follower = harness(&[(&alice, 10)]).await;
        let mut forged = block.clone();
        forged.timestamp += 1;
        assert!(follower.pipeline.apply_external_block(forged).await.is_err());
        follower.pipeline.apply_external_block(block.clone()).await.unwrap();
        assert_eq!(balance(&follower, &bob), 3 * COIN);
        assert!(follower.ledger.is_confirmed(&tx.id));
        let err = follower.pipeline.apply_external_block(block).await.unwrap_err();
        assert!(matches!(err, PipelineError::Ledger(LedgerError::HeightMismatch { .. })));

        let restarted = harness_on(producer.kv.clone(), &[(&alice, 10)]).await;
        assert_eq!(restarted.pipeline.replay().await.unwrap(), 1);
        assert_eq!(balance(&restarted, &bob), 3 * COIN);
        assert_eq!(
            restarted.state.read().account(&alice.address()),
            producer.state.read().account(&alice.address())
        );
    }

    #[tokio::test]
    async fn test_forger_stops_on_shutdown() {
        let h = Arc::new(harness(&[]).await.pipeline);
        let (tx, rx) = watch::channel(false);
        let handle = spawn_forger(h, Duration::from_millis(5), rx);
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
