//! Fundamental types for the Coda chain mirror.
//!
//! This crate defines the shapes shared by every other crate in the
//! workspace: block and account identifiers, timestamps, the mirrored
//! block/account/status records and the thin block summary the reconciler
//! walks. Nothing in here knows about the node's wire format or the
//! database schema.

pub mod account;
pub mod address;
pub mod block;
pub mod error;
pub mod hash;
pub mod status;
pub mod time;

pub use account::Account;
pub use address::PublicKey;
pub use block::{Block, BlockSummary, FeeTransfer, SnarkJob, UserJob};
pub use error::{parse_u64, ParseError};
pub use hash::StateHash;
pub use status::DaemonStatus;
pub use time::Timestamp;
