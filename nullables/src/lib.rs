//! Nullable infrastructure for deterministic testing.
//!
//! The indexer reaches the outside world through two seams: the upstream
//! node (`NodeClient`) and the ledger store (`LedgerStore`). This crate
//! provides test-friendly implementations of both that:
//! - Return deterministic values
//! - Can be scripted and inspected programmatically
//! - Never touch the filesystem or network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod node;
pub mod store;

pub use node::NullNodeClient;
pub use store::NullStore;
