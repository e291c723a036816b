//! Abstract ledger store traits for the Coda chain mirror.
//!
//! Every storage backend (SQLite, in-memory for testing) implements these
//! traits. The indexer depends only on the traits.
//!
//! All mutating operations are individually atomic: a backend must either
//! apply the whole operation (block row, child rows, counter adjustments) or
//! none of it.

pub mod account;
pub mod block;
pub mod counters;
pub mod error;
pub mod status;

pub use account::AccountStore;
pub use block::BlockStore;
pub use counters::{AccountCounters, CounterDirection};
pub use error::StoreError;
pub use status::StatusStore;

/// The full set of relations the indexer reads and writes.
pub trait LedgerStore: BlockStore + AccountStore + StatusStore + Send + Sync {}

impl<T> LedgerStore for T where T: BlockStore + AccountStore + StatusStore + Send + Sync {}
