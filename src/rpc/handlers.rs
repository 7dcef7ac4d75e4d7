//! JSON facade over the transaction service. Each call returns an `ApiResponse`
//! (status code + JSON body) so the HTTP layer stays a thin mapping.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::crypto::Address;
use crate::state::Account;
use crate::transaction::error::{SignatureRejection, TransactionError};
use crate::transaction::types::{Transaction, TxId};
use crate::txpool::{SignatureOutcome, SignatureRequest, TxStatus};

pub const TRANSACTIONS_ACCEPTED: &str = "Transaction(s) accepted";
pub const SIGNATURE_ACCEPTED: &str = "Signature Accepted";

/// Trait describing dependencies the RPC handlers require.
/// The node wiring implements it over the transaction service.
#[async_trait]
pub trait RpcDeps: Send + Sync + 'static {
    fn submit_transaction(&self, raw: &Value) -> Result<TxId, TransactionError>;

    fn submit_signature(&self, req: SignatureRequest) -> Result<SignatureOutcome, SignatureRejection>;

    /// Confirmed transaction with its block height.
    async fn confirmed_transaction(&self, id: &TxId) -> Result<Option<(Transaction, u64)>, TransactionError>;

    fn transaction_status(&self, id: &TxId) -> Option<TxStatus>;

    fn account(&self, address: &Address) -> Option<Account>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self { status, body: json!({ "message": message.into() }) }
    }
}

pub struct RpcHandler<D: RpcDeps> {
    deps: Arc<D>,
}

impl<D: RpcDeps> Clone for RpcHandler<D> {
    fn clone(&self) -> Self {
        Self { deps: self.deps.clone() }
    }
}

impl<D: RpcDeps> RpcHandler<D> {
    pub fn new(deps: Arc<D>) -> Self {
        Self { deps }
    }

    pub fn submit_transaction(&self, raw: &Value) -> ApiResponse {
        match self.deps.submit_transaction(raw) {
            Ok(id) => ApiResponse::ok(json!({
                "status": TRANSACTIONS_ACCEPTED,
                "transactionId": id,
            })),
            Err(e) => ApiResponse::error(e.http_status(), e.to_string()),
        }
    }

    pub fn submit_signature(&self, raw: Value) -> ApiResponse {
        let req: SignatureRequest = match serde_json::from_value(raw) {
            Ok(r) => r,
            Err(e) => return ApiResponse::error(400, format!("Invalid signature body - {}", e)),
        };
        match self.deps.submit_signature(req) {
            Ok(_) => ApiResponse::ok(json!({ "status": SIGNATURE_ACCEPTED })),
            Err(reason) => ApiResponse::error(500, format!("Error processing signature: {}", reason)),
        }
    }

    /// Confirmed transactions matching `id`; unknown or unconfirmed ids yield an empty list.
    pub async fn get_transactions(&self, id: Option<&str>) -> ApiResponse {
        let Some(raw) = id else {
            return ApiResponse::ok(json!({ "transactions": [] }));
        };
        let Ok(id) = raw.parse::<TxId>() else {
            return ApiResponse::error(400, format!("Invalid transaction id: {}", raw));
        };
        match self.deps.confirmed_transaction(&id).await {
            Ok(Some((tx, height))) => {
                let mut v = json!(tx);
                v["height"] = json!(height);
                ApiResponse::ok(json!({ "transactions": [v] }))
            }
            Ok(None) => ApiResponse::ok(json!({ "transactions": [] })),
            Err(e) => ApiResponse::error(e.http_status(), e.to_string()),
        }
    }

    pub fn transaction_status(&self, raw: &str) -> ApiResponse {
        let Ok(id) = raw.parse::<TxId>() else {
            return ApiResponse::error(400, format!("Invalid transaction id: {}", raw));
        };
        match self.deps.transaction_status(&id) {
            Some(status) => {
                let mut v = json!(status);
                v["id"] = json!(id);
                ApiResponse::ok(v)
            }
            None => ApiResponse::error(404, "Transaction not found"),
        }
    }

    pub fn account(&self, raw: &str) -> ApiResponse {
        let Ok(address) = raw.parse::<Address>() else {
            return ApiResponse::error(400, format!("Invalid address: {}", raw));
        };
        match self.deps.account(&address) {
            Some(acc) => ApiResponse::ok(json!({ "account": acc })),
            None => ApiResponse::error(404, "Account not found"),
        }
    }
}
