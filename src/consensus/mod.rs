//! Consensus module: the block confirmation pipeline and its forging ticker.
//!
//! Public surface:
//! - ConfirmationPipeline: expires, orders, applies and commits pool transactions
//! - spawn_forger: interval-driven block production bound to the node's shutdown channel

pub mod pipeline;

pub use pipeline::{spawn_forger, BlockReport, ConfirmationPipeline, PipelineError};
