//! SQLite ledger store backend for the Coda chain mirror.
//!
//! Implements all storage traits from `coda-store` on a single `rusqlite`
//! connection. Every mutating operation runs inside its own immediate
//! transaction; dropping a transaction without committing rolls it back.

pub mod account;
pub mod block;
pub mod environment;
pub mod error;
pub mod schema;
pub mod status;

pub use environment::SqliteStore;
pub use error::SqliteError;
