use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::rpc::handlers::{ApiResponse, RpcDeps, RpcHandler};
use crate::utils::metrics::METRICS;

#[derive(Debug, Deserialize)]
struct TransactionQuery {
    id: Option<String>,
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.body)).into_response()
    }
}

/// RpcServer ties together the HTTP server and handler implementations.
pub struct RpcServer<D: RpcDeps> {
    addr: SocketAddr,
    handler: RpcHandler<D>,
}

impl<D: RpcDeps> RpcServer<D> {
    pub fn new(addr: SocketAddr, deps: Arc<D>) -> Self {
        Self { addr, handler: RpcHandler::new(deps) }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(|| async { "ok" }))
            .route("/metrics", get(metrics_handler))
            .route("/api/transactions", post(submit_transaction::<D>).get(get_transactions::<D>))
            .route("/api/transactions/status/{id}", get(transaction_status::<D>))
            .route("/api/signatures", post(submit_signature::<D>))
            .route("/api/accounts/{address}", get(get_account::<D>))
            .layer(TraceLayer::new_for_http())
            .with_state(self.handler.clone())
    }

    /// Serve until the shutdown channel flips.
    pub async fn start(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!(addr = %listener.local_addr()?, "RPC server listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                while shutdown.changed().await.is_ok() {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            })
            .await?;
        info!("RPC server stopped");
        Ok(())
    }
}

async fn metrics_handler() -> String {
    METRICS.render()
}

async fn submit_transaction<D: RpcDeps>(State(h): State<RpcHandler<D>>, Json(raw): Json<Value>) -> ApiResponse {
    h.submit_transaction(&raw)
}

async fn submit_signature<D: RpcDeps>(State(h): State<RpcHandler<D>>, Json(raw): Json<Value>) -> ApiResponse {
    h.submit_signature(raw)
}

async fn get_transactions<D: RpcDeps>(
    State(h): State<RpcHandler<D>>,
    Query(q): Query<TransactionQuery>,
) -> ApiResponse {
    h.get_transactions(q.id.as_deref()).await
}

async fn transaction_status<D: RpcDeps>(State(h): State<RpcHandler<D>>, Path(id): Path<String>) -> ApiResponse {
    h.transaction_status(&id)
}

async fn get_account<D: RpcDeps>(State(h): State<RpcHandler<D>>, Path(address): Path<String>) -> ApiResponse {
    h.account(&address)
}
