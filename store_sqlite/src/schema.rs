//! Database schema migration engine.
//!
//! Tracks a monotonically increasing schema version in SQLite's
//! `user_version` pragma and runs sequential migrations to bring an older
//! database up to date.

use rusqlite::Connection;

use crate::SqliteError;

/// The schema version that the current code expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

const SCHEMA_V1: &str = r#"
    CREATE TABLE IF NOT EXISTS blocks (
        state_hash          TEXT PRIMARY KEY,
        canonical           INTEGER NOT NULL DEFAULT 0,
        previous_state_hash TEXT NOT NULL,
        snarked_ledger_hash TEXT NOT NULL DEFAULT '',
        staged_ledger_hash  TEXT NOT NULL DEFAULT '',
        coinbase            INTEGER NOT NULL,
        creator             TEXT NOT NULL,
        slot                INTEGER NOT NULL,
        height              INTEGER NOT NULL,
        epoch               INTEGER NOT NULL,
        ts                  INTEGER NOT NULL,
        total_currency      INTEGER NOT NULL,
        user_commands_count INTEGER NOT NULL DEFAULT 0,
        snark_jobs_count    INTEGER NOT NULL DEFAULT 0,
        fee_transfer_count  INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_blocks_height ON blocks(height);
    CREATE INDEX IF NOT EXISTS idx_blocks_canonical_height ON blocks(canonical, height);
    CREATE INDEX IF NOT EXISTS idx_blocks_creator ON blocks(creator);

    CREATE TABLE IF NOT EXISTS userjobs (
        block_state_hash TEXT NOT NULL REFERENCES blocks(state_hash),
        idx              INTEGER NOT NULL,
        id               TEXT NOT NULL,
        sender           TEXT NOT NULL,
        recipient        TEXT NOT NULL,
        memo             TEXT NOT NULL DEFAULT '',
        fee              INTEGER NOT NULL,
        amount           INTEGER NOT NULL,
        nonce            INTEGER NOT NULL,
        delegation       INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (block_state_hash, idx)
    );

    CREATE INDEX IF NOT EXISTS idx_userjobs_sender ON userjobs(sender);
    CREATE INDEX IF NOT EXISTS idx_userjobs_recipient ON userjobs(recipient);

    CREATE TABLE IF NOT EXISTS snarkjobs (
        block_state_hash TEXT NOT NULL REFERENCES blocks(state_hash),
        idx              INTEGER NOT NULL,
        job_ids          TEXT NOT NULL DEFAULT '[]',
        prover           TEXT NOT NULL,
        fee              INTEGER NOT NULL,
        PRIMARY KEY (block_state_hash, idx)
    );

    CREATE INDEX IF NOT EXISTS idx_snarkjobs_prover ON snarkjobs(prover);

    CREATE TABLE IF NOT EXISTS feetransfers (
        block_state_hash TEXT NOT NULL REFERENCES blocks(state_hash),
        idx              INTEGER NOT NULL,
        recipient        TEXT NOT NULL,
        fee              INTEGER NOT NULL,
        PRIMARY KEY (block_state_hash, idx)
    );

    CREATE TABLE IF NOT EXISTS accounts (
        public_key         TEXT PRIMARY KEY,
        balance            INTEGER NOT NULL DEFAULT 0,
        nonce              INTEGER NOT NULL DEFAULT 0,
        receipt_chain_hash TEXT NOT NULL DEFAULT '',
        delegate           TEXT,
        voting_for         TEXT NOT NULL DEFAULT '',
        tx_sent            INTEGER NOT NULL DEFAULT 0,
        tx_received        INTEGER NOT NULL DEFAULT 0,
        blocks_proposed    INTEGER NOT NULL DEFAULT 0,
        snark_jobs         INTEGER NOT NULL DEFAULT 0,
        first_seen         INTEGER NOT NULL,
        last_seen          INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS daemonstatus (
        ts                            INTEGER PRIMARY KEY,
        blockchain_length             INTEGER NOT NULL,
        commit_id                     TEXT NOT NULL,
        epoch_duration                INTEGER NOT NULL,
        slot_duration                 INTEGER NOT NULL,
        slots_per_epoch               INTEGER NOT NULL,
        consensus_mechanism           TEXT NOT NULL,
        highest_block_length_received INTEGER NOT NULL,
        ledger_merkle_root            TEXT NOT NULL,
        num_accounts                  INTEGER NOT NULL,
        peers                         TEXT NOT NULL DEFAULT '[]',
        peers_count                   INTEGER NOT NULL,
        state_hash                    TEXT,
        sync_status                   TEXT NOT NULL,
        uptime_secs                   INTEGER NOT NULL
    );
"#;

/// Runs database migrations to bring the schema up to date.
pub struct Migrator;

impl Migrator {
    /// Check the stored schema version and run any needed migrations.
    ///
    /// - Version 0 means a fresh database.
    /// - If the stored version matches `CURRENT_SCHEMA_VERSION`, this is a no-op.
    /// - If the stored version is higher than what this code supports, the
    ///   database was written by a newer indexer and we refuse to open it.
    pub fn run(conn: &Connection) -> Result<(), SqliteError> {
        let current: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if current == CURRENT_SCHEMA_VERSION {
            tracing::debug!(version = current, "database schema is up to date");
            return Ok(());
        }

        if current > CURRENT_SCHEMA_VERSION {
            return Err(SqliteError::Schema(format!(
                "database schema version {} is newer than supported version {}",
                current, CURRENT_SCHEMA_VERSION
            )));
        }

        for version in current..CURRENT_SCHEMA_VERSION {
            tracing::info!(from = version, to = version + 1, "running migration");
            run_migration(conn, version, version + 1)?;
        }

        conn.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;
        tracing::info!(version = CURRENT_SCHEMA_VERSION, "migration complete");
        Ok(())
    }
}

fn run_migration(conn: &Connection, from: u32, to: u32) -> Result<(), SqliteError> {
    match (from, to) {
        (0, 1) => {
            conn.execute_batch(SCHEMA_V1)?;
            Ok(())
        }
        _ => Err(SqliteError::Schema(format!(
            "unknown migration: {} -> {}",
            from, to
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_is_migrated_to_current() {
        let conn = Connection::open_in_memory().unwrap();
        Migrator::run(&conn).unwrap();
        let version: u32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn migration_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        Migrator::run(&conn).unwrap();
        Migrator::run(&conn).unwrap();
    }

    #[test]
    fn newer_schema_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION + 1)
            .unwrap();
        assert!(matches!(Migrator::run(&conn), Err(SqliteError::Schema(_))));
    }
}
