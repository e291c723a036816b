//! Timestamp type used throughout the mirror.
//!
//! Timestamps are Unix epoch seconds (UTC). The node reports block dates as
//! JavaScript millisecond timestamps encoded as strings; those are truncated
//! to whole seconds on the way in.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::ParseError;

/// A Unix timestamp in seconds since epoch (UTC).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch (time zero).
    pub const EPOCH: Self = Self(0);

    pub fn new(secs: u64) -> Self {
        Self(secs)
    }

    /// Get the current system time as a `Timestamp`.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self(secs)
    }

    /// Parse a JavaScript millisecond timestamp (e.g. `"1586881020000"`).
    pub fn from_js_millis(raw: &str) -> Result<Self, ParseError> {
        raw.trim()
            .parse::<u64>()
            .map(|ms| Self(ms / 1000))
            .map_err(|_| ParseError::InvalidTimestamp(raw.to_string()))
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}
