//! Chain mirror indexer.
//!
//! Keeps a relational mirror of a Coda node's canonical chain up to date.
//! The [`Reconciler`] compares the node's recent tail with the local store,
//! imports missing blocks through the [`Exporter`] and flips canonical flags
//! so that account counters always reflect exactly the canonical blocks.
//! The [`Scheduler`] decides when passes run.

pub mod config;
pub mod error;
pub mod exporter;
pub mod logging;
pub mod metrics;
pub mod reconciler;
pub mod scheduler;
pub mod shutdown;
pub mod spans;

pub use config::IndexerConfig;
pub use error::IndexerError;
pub use exporter::{ExportOutcome, ExportSource, Exporter};
pub use logging::{init_logging, LogFormat};
pub use metrics::IndexerMetrics;
pub use reconciler::{PassReport, Reconciler};
pub use scheduler::{ChainCursor, Scheduler};
pub use shutdown::{ShutdownController, ShutdownSignal};
