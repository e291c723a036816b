//! SQLite implementation of StatusStore.

use rusqlite::{params, OptionalExtension};

use coda_store::{StatusStore, StoreError};
use coda_types::{DaemonStatus, StateHash, Timestamp};

use crate::environment::SqliteStore;
use crate::SqliteError;

impl StatusStore for SqliteStore {
    fn save_daemon_status(&self, status: &DaemonStatus) -> Result<(), StoreError> {
        let peers = serde_json::to_string(&status.peers).map_err(SqliteError::from)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO daemonstatus (ts, blockchain_length, commit_id, \
             epoch_duration, slot_duration, slots_per_epoch, consensus_mechanism, \
             highest_block_length_received, ledger_merkle_root, num_accounts, peers, \
             peers_count, state_hash, sync_status, uptime_secs) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                status.ts.as_secs(),
                status.blockchain_length,
                status.commit_id,
                status.epoch_duration,
                status.slot_duration,
                status.slots_per_epoch,
                status.consensus_mechanism,
                status.highest_block_length_received,
                status.ledger_merkle_root,
                status.num_accounts,
                peers,
                status.peers_count,
                status.state_hash.as_ref().map(|h| h.as_str()),
                status.sync_status,
                status.uptime_secs,
            ],
        )
        .map_err(SqliteError::from)?;
        Ok(())
    }

    fn latest_daemon_status(&self) -> Result<Option<DaemonStatus>, StoreError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT ts, blockchain_length, commit_id, epoch_duration, slot_duration, \
                 slots_per_epoch, consensus_mechanism, highest_block_length_received, \
                 ledger_merkle_root, num_accounts, peers, peers_count, state_hash, \
                 sync_status, uptime_secs \
                 FROM daemonstatus ORDER BY ts DESC LIMIT 1",
                [],
                |row| {
                    let status = DaemonStatus {
                        ts: Timestamp::new(row.get(0)?),
                        blockchain_length: row.get(1)?,
                        commit_id: row.get(2)?,
                        epoch_duration: row.get(3)?,
                        slot_duration: row.get(4)?,
                        slots_per_epoch: row.get(5)?,
                        consensus_mechanism: row.get(6)?,
                        highest_block_length_received: row.get(7)?,
                        ledger_merkle_root: row.get(8)?,
                        num_accounts: row.get(9)?,
                        peers: Vec::new(),
                        peers_count: row.get(11)?,
                        state_hash: row.get::<_, Option<String>>(12)?.map(StateHash::new),
                        sync_status: row.get(13)?,
                        uptime_secs: row.get(14)?,
                    };
                    Ok((status, row.get::<_, String>(10)?))
                },
            )
            .optional()
            .map_err(SqliteError::from)?;

        match row {
            Some((mut status, peers)) => {
                status.peers = serde_json::from_str(&peers).map_err(SqliteError::from)?;
                Ok(Some(status))
            }
            None => Ok(None),
        }
    }
}
