use thiserror::Error;

/// Failures surfaced by any ledger store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A block transition or lookup named a state hash the mirror lacks.
    #[error("block not in mirror: {0}")]
    NotFound(String),

    #[error("ledger store backend failed: {0}")]
    Backend(String),

    /// A JSON column (snark job ids, peer list) could not be encoded or
    /// decoded.
    #[error("column encoding failed: {0}")]
    Serialization(String),

    /// The on-disk schema is unknown to this build.
    #[error("mirror is corrupted: {0}")]
    Corruption(String),
}
