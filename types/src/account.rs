//! Mirrored account records.

use serde::{Deserialize, Serialize};

use crate::{PublicKey, Timestamp};

/// An account as stored in the mirror.
///
/// `balance`, `nonce`, `receipt_chain_hash`, `delegate` and `voting_for` are
/// copied from the node on every upsert. The four counters are owned by the
/// store and only ever adjusted by canonical transitions; a freshly fetched
/// account always carries zeros in them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub public_key: PublicKey,
    pub balance: u64,
    pub nonce: u64,
    pub receipt_chain_hash: String,
    pub delegate: Option<PublicKey>,
    pub voting_for: String,
    pub tx_sent: u64,
    pub tx_received: u64,
    pub blocks_proposed: u64,
    pub snark_jobs: u64,
    pub first_seen: Timestamp,
    pub last_seen: Timestamp,
}

impl Account {
    /// An account with only its key set, as seen before any node data.
    pub fn empty(public_key: PublicKey) -> Self {
        Self {
            public_key,
            balance: 0,
            nonce: 0,
            receipt_chain_hash: String::new(),
            delegate: None,
            voting_for: String::new(),
            tx_sent: 0,
            tx_received: 0,
            blocks_proposed: 0,
            snark_jobs: 0,
            first_seen: Timestamp::EPOCH,
            last_seen: Timestamp::EPOCH,
        }
    }

    /// Mark this snapshot as observed in a block at `ts`.
    pub fn seen_at(mut self, ts: Timestamp) -> Self {
        self.first_seen = ts;
        self.last_seen = ts;
        self
    }
}
