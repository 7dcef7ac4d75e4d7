//! Node orchestration: storage, ledger, chain state, pool, registry, pipeline and RPC.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::consensus::{spawn_forger, ConfirmationPipeline};
use crate::crypto::Address;
use crate::ledger::Ledger;
use crate::multisig::MultisigRegistry;
use crate::node::config::NodeConfig;
use crate::node::genesis::Genesis;
use crate::node::service_handle::ServiceHandle;
use crate::rpc::{RpcDeps, RpcServer};
use crate::state::{Account, ChainState, InMemAccountStore};
use crate::storage::{self, StorageEngine};
use crate::transaction::error::{SignatureRejection, TransactionError};
use crate::transaction::processors::ProcessorRegistry;
use crate::transaction::schema::SchemaValidator;
use crate::transaction::types::{Transaction, TxId};
use crate::txpool::{SignatureOutcome, SignatureRequest, TransactionService, TxPool, TxStatus};
use crate::utils::unix_now;

/// Main Node object
pub struct Node {
    config: NodeConfig,
    pub service: Arc<TransactionService>,
    pub pipeline: Arc<ConfirmationPipeline>,
    pub state: Arc<ChainState>,
    pub ledger: Arc<Ledger>,
}

impl Node {
    /// Open storage, apply genesis and replay persisted blocks.
    pub async fn build(config: NodeConfig, genesis: &Genesis) -> Result<Self> {
        let engine = if config.ephemeral { StorageEngine::Memory } else { StorageEngine::Fs };
        let kv = storage::open(config.data_dir.join("ledger"), engine)?;
        let ledger = Arc::new(
            Ledger::open(kv)
                .await?
                .with_outcome_retention(config.protocol.block.outcome_retention),
        );

        let state = Arc::new(ChainState::new(Arc::new(InMemAccountStore::new())));
        state.commit(genesis.to_diff()?);

        let protocol = &config.protocol;
        let processors = Arc::new(ProcessorRegistry::new(protocol));
        let registry = Arc::new(MultisigRegistry::new());
        let pool = Arc::new(TxPool::new(protocol.pool.max_size, protocol.pool.unconfirmed_ttl_secs));

        let service = Arc::new(TransactionService::new(
            SchemaValidator::new(protocol),
            processors.clone(),
            state.clone(),
            registry.clone(),
            pool.clone(),
            ledger.clone(),
        ));
        let pipeline = Arc::new(ConfirmationPipeline::new(
            SchemaValidator::new(protocol),
            processors,
            state.clone(),
            registry,
            pool,
            ledger.clone(),
            protocol.block.max_transactions,
        ));
        let height = pipeline.replay().await?;
        info!(height, accounts = genesis.accounts.len(), "node state ready");

        Ok(Self { config, service, pipeline, state, ledger })
    }

    /// Spawn the forger and the RPC server.
    pub async fn start(self) -> Result<ServiceHandle> {
        let (mut handle, shutdown_rx) = ServiceHandle::new();

        let interval = Duration::from_secs(self.config.protocol.block.interval_secs.max(1));
        handle.attach("forger", spawn_forger(self.pipeline.clone(), interval, shutdown_rx.clone()));

        let addr: SocketAddr = self.config.rpc_addr.parse()?;
        let server = RpcServer::new(addr, self.service.clone());
        handle.attach("rpc", tokio::spawn(server.start(shutdown_rx)));

        info!(rpc = %addr, interval_secs = interval.as_secs(), "node started");
        Ok(handle)
    }
}

#[async_trait]
impl RpcDeps for TransactionService {
    fn submit_transaction(&self, raw: &Value) -> Result<TxId, TransactionError> {
        self.submit_raw(raw, unix_now()).map(|admission| admission.id())
    }

    fn submit_signature(&self, req: SignatureRequest) -> Result<SignatureOutcome, SignatureRejection> {
        TransactionService::submit_signature(self, req)
    }

    async fn confirmed_transaction(&self, id: &TxId) -> Result<Option<(Transaction, u64)>, TransactionError> {
        TransactionService::confirmed_transaction(self, id).await
    }

    fn transaction_status(&self, id: &TxId) -> Option<TxStatus> {
        self.status(id)
    }

    fn account(&self, address: &Address) -> Option<Account> {
        TransactionService::account(self, address)
    }
}
