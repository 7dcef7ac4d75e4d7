//! Transaction admission, multisignature collection and block confirmation for an
//! account-based ledger.

pub mod consensus;
pub mod crypto;
pub mod ledger;
pub mod multisig;
pub mod node;
pub mod rpc;
pub mod state;
pub mod storage;
pub mod transaction;
pub mod txpool;
pub mod utils;
