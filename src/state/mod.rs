pub mod account_db;
pub mod account_cache;
pub mod chain_state;

pub use account_db::{Account, AccountStore, InMemAccountStore, MultisigProfile};
pub use account_cache::AccountCache;
pub use chain_state::{BlockOverlay, ChainState, DappRecord, StateDiff, StateReadGuard, StateView};
