//! Daemon status snapshots.

use serde::{Deserialize, Serialize};

use crate::{StateHash, Timestamp};

/// A point-in-time snapshot of the upstream daemon, keyed by `ts`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub ts: Timestamp,
    pub blockchain_length: u64,
    pub commit_id: String,
    pub epoch_duration: u64,
    pub slot_duration: u64,
    pub slots_per_epoch: u64,
    pub consensus_mechanism: String,
    pub highest_block_length_received: u64,
    pub ledger_merkle_root: String,
    pub num_accounts: u64,
    pub peers: Vec<String>,
    pub peers_count: u32,
    pub state_hash: Option<StateHash>,
    pub sync_status: String,
    pub uptime_secs: u64,
}
