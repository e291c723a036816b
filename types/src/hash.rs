//! Block identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque content hash identifying a block (base58 on the wire).
///
/// Ordering is lexicographic on the encoded form; it carries no chain
/// meaning and is only used to make iteration deterministic.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateHash(String);

impl StateHash {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for StateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short: String = self.0.chars().take(12).collect();
        if short.len() < self.0.len() {
            write!(f, "StateHash({short}\u{2026})")
        } else {
            write!(f, "StateHash({short})")
        }
    }
}

impl fmt::Display for StateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StateHash {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StateHash {
    fn from(s: String) -> Self {
        Self(s)
    }
}
