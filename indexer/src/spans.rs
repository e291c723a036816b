//! Pre-built [`tracing::Span`] constructors for indexer operations.
//!
//! Consistent span names and field sets make passes easy to filter and
//! correlate in log output.

use tracing::{debug_span, info_span, Span};

/// Span covering one reconciliation pass.
pub fn pass_span(trigger: &str, lookback: usize) -> Span {
    info_span!("reconcile", trigger = %trigger, lookback = lookback)
}

/// Span covering the export of a single block.
pub fn export_span(state_hash: &str) -> Span {
    debug_span!("export", state_hash = %state_hash)
}

/// Span covering the physical removal of a block.
pub fn rollback_span(state_hash: &str) -> Span {
    info_span!("rollback", state_hash = %state_hash)
}
