//! Transactions: model and ids, schema validation, signature rules and the
//! per-type processors that turn a transaction into a state diff.

pub mod authorization;
pub mod error;
pub mod processors;
pub mod schema;
pub mod types;

pub use authorization::{signature_requirement, verify_authorization, SignatureRequirement};
pub use error::{SignatureRejection, TransactionError};
pub use processors::{ProcessorRegistry, TransactionProcessor};
pub use schema::{SchemaError, SchemaValidator, Violation};
pub use types::{
    Asset, DappAsset, MemberSignature, MultisigAsset, Transaction, TransactionType, TxId,
    UnsignedTransaction,
};
