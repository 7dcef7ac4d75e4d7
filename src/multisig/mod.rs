pub mod registry;

pub use registry::{CollectOutcome, MultisigRegistry, PendingMultisigEntry};
