//! RPC module
//!
//! - Transaction API under /api: submit, signatures, confirmed lookup, status, accounts
//! - Diagnostic endpoints: /health, /metrics
//!
//! To integrate: implement the `RpcDeps` trait in the node wiring layer and pass it
//! to `RpcServer::new()`.

pub mod handlers;
pub mod server;

pub use handlers::{ApiResponse, RpcDeps, RpcHandler};
pub use server::RpcServer;
