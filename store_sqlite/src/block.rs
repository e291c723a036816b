//! SQLite implementation of BlockStore.

use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use coda_store::{AccountCounters, BlockStore, CounterDirection, StoreError};
use coda_types::{
    Block, BlockSummary, FeeTransfer, PublicKey, SnarkJob, StateHash, Timestamp, UserJob,
};

use crate::environment::SqliteStore;
use crate::SqliteError;

const BLOCK_COLUMNS: &str = "state_hash, canonical, previous_state_hash, snarked_ledger_hash, \
     staged_ledger_hash, coinbase, creator, slot, height, epoch, ts, total_currency, \
     user_commands_count, snark_jobs_count, fee_transfer_count";

const SUMMARY_COLUMNS: &str = "state_hash, previous_state_hash, height, canonical";

fn block_from_row(row: &Row<'_>) -> rusqlite::Result<Block> {
    Ok(Block {
        state_hash: StateHash::new(row.get::<_, String>(0)?),
        canonical: row.get(1)?,
        previous_state_hash: StateHash::new(row.get::<_, String>(2)?),
        snarked_ledger_hash: row.get(3)?,
        staged_ledger_hash: row.get(4)?,
        coinbase: row.get(5)?,
        creator: PublicKey::new(row.get::<_, String>(6)?),
        slot: row.get(7)?,
        height: row.get(8)?,
        epoch: row.get(9)?,
        ts: Timestamp::new(row.get(10)?),
        total_currency: row.get(11)?,
        user_commands_count: row.get(12)?,
        snark_jobs_count: row.get(13)?,
        fee_transfer_count: row.get(14)?,
        user_jobs: Vec::new(),
        snark_jobs: Vec::new(),
        fee_transfers: Vec::new(),
    })
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<BlockSummary> {
    Ok(BlockSummary {
        state_hash: StateHash::new(row.get::<_, String>(0)?),
        previous_state_hash: StateHash::new(row.get::<_, String>(1)?),
        height: row.get(2)?,
        canonical: row.get(3)?,
    })
}

/// Load a block row plus its child rows. Works on a plain connection or
/// inside a transaction.
fn load_block(conn: &Connection, hash: &StateHash) -> Result<Option<Block>, SqliteError> {
    let sql = format!("SELECT {BLOCK_COLUMNS} FROM blocks WHERE state_hash = ?1");
    let Some(mut block) = conn
        .query_row(&sql, params![hash.as_str()], block_from_row)
        .optional()?
    else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT idx, id, sender, recipient, memo, fee, amount, nonce, delegation \
         FROM userjobs WHERE block_state_hash = ?1 ORDER BY idx",
    )?;
    block.user_jobs = stmt
        .query_map(params![hash.as_str()], |row| {
            Ok(UserJob {
                block_state_hash: hash.clone(),
                index: row.get(0)?,
                id: row.get(1)?,
                sender: PublicKey::new(row.get::<_, String>(2)?),
                recipient: PublicKey::new(row.get::<_, String>(3)?),
                memo: row.get(4)?,
                fee: row.get(5)?,
                amount: row.get(6)?,
                nonce: row.get(7)?,
                delegation: row.get(8)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(
        "SELECT idx, job_ids, prover, fee FROM snarkjobs \
         WHERE block_state_hash = ?1 ORDER BY idx",
    )?;
    let raw_snark_jobs = stmt
        .query_map(params![hash.as_str()], |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u64>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    block.snark_jobs = raw_snark_jobs
        .into_iter()
        .map(|(index, job_ids, prover, fee)| {
            Ok(SnarkJob {
                block_state_hash: hash.clone(),
                index,
                job_ids: serde_json::from_str(&job_ids)?,
                prover: PublicKey::new(prover),
                fee: fee,
            })
        })
        .collect::<Result<Vec<_>, SqliteError>>()?;

    let mut stmt = conn.prepare(
        "SELECT idx, recipient, fee FROM feetransfers \
         WHERE block_state_hash = ?1 ORDER BY idx",
    )?;
    block.fee_transfers = stmt
        .query_map(params![hash.as_str()], |row| {
            Ok(FeeTransfer {
                block_state_hash: hash.clone(),
                index: row.get(0)?,
                recipient: PublicKey::new(row.get::<_, String>(1)?),
                fee: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Some(block))
}

/// Insert the block row and every child row, ignoring rows that already
/// exist. Returns whether the block row was new.
fn insert_block(conn: &Connection, block: &Block) -> Result<bool, SqliteError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO blocks (state_hash, canonical, previous_state_hash, \
         snarked_ledger_hash, staged_ledger_hash, coinbase, creator, slot, height, epoch, ts, \
         total_currency, user_commands_count, snark_jobs_count, fee_transfer_count) \
         VALUES (?1, 0, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            block.state_hash.as_str(),
            block.previous_state_hash.as_str(),
            block.snarked_ledger_hash,
            block.staged_ledger_hash,
            block.coinbase,
            block.creator.as_str(),
            block.slot,
            block.height,
            block.epoch,
            block.ts.as_secs(),
            block.total_currency,
            block.user_jobs.len() as u32,
            block.snark_jobs.len() as u32,
            block.fee_transfers.len() as u32,
        ],
    )?;

    for sj in &block.snark_jobs {
        conn.execute(
            "INSERT OR IGNORE INTO snarkjobs (block_state_hash, idx, job_ids, prover, fee) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                block.state_hash.as_str(),
                sj.index,
                serde_json::to_string(&sj.job_ids)?,
                sj.prover.as_str(),
                sj.fee,
            ],
        )?;
    }

    for ft in &block.fee_transfers {
        conn.execute(
            "INSERT OR IGNORE INTO feetransfers (block_state_hash, idx, recipient, fee) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                block.state_hash.as_str(),
                ft.index,
                ft.recipient.as_str(),
                ft.fee,
            ],
        )?;
    }

    for uj in &block.user_jobs {
        conn.execute(
            "INSERT OR IGNORE INTO userjobs (block_state_hash, idx, id, sender, recipient, \
             memo, fee, amount, nonce, delegation) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                block.state_hash.as_str(),
                uj.index,
                uj.id,
                uj.sender.as_str(),
                uj.recipient.as_str(),
                uj.memo,
                uj.fee,
                uj.amount,
                uj.nonce,
                uj.delegation,
            ],
        )?;
    }

    Ok(inserted == 1)
}

/// Credit or debit every account the block references.
fn apply_counters(
    conn: &Connection,
    block: &Block,
    direction: CounterDirection,
) -> Result<(), SqliteError> {
    let sql = match direction {
        CounterDirection::Credit => {
            "UPDATE accounts SET tx_sent = tx_sent + ?2, tx_received = tx_received + ?3, \
             blocks_proposed = blocks_proposed + ?4, snark_jobs = snark_jobs + ?5 \
             WHERE public_key = ?1"
        }
        CounterDirection::Debit => {
            "UPDATE accounts SET tx_sent = MAX(tx_sent - ?2, 0), \
             tx_received = MAX(tx_received - ?3, 0), \
             blocks_proposed = MAX(blocks_proposed - ?4, 0), \
             snark_jobs = MAX(snark_jobs - ?5, 0) \
             WHERE public_key = ?1"
        }
    };
    let mut seed = conn.prepare(
        "INSERT OR IGNORE INTO accounts (public_key, first_seen, last_seen) VALUES (?1, ?2, ?2)",
    )?;
    let mut stmt = conn.prepare(sql)?;
    for (public_key, counters) in AccountCounters::for_block(block) {
        // A credit must land even if the account snapshot never got saved.
        if direction == CounterDirection::Credit {
            seed.execute(params![public_key.as_str(), block.ts.as_secs()])?;
        }
        stmt.execute(params![
            public_key.as_str(),
            counters.tx_sent,
            counters.tx_received,
            counters.blocks_proposed,
            counters.snark_jobs,
        ])?;
    }
    Ok(())
}

impl SqliteStore {
    fn set_canonical(&self, hash: &StateHash, canonical: bool) -> Result<bool, SqliteError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let block =
            load_block(&tx, hash)?.ok_or_else(|| SqliteError::NotFound(hash.to_string()))?;
        if block.canonical == canonical {
            return Ok(false);
        }

        tx.execute(
            "UPDATE blocks SET canonical = ?2 WHERE state_hash = ?1",
            params![hash.as_str(), canonical],
        )?;
        let direction = if canonical {
            CounterDirection::Credit
        } else {
            CounterDirection::Debit
        };
        apply_counters(&tx, &block, direction)?;

        tx.commit()?;
        Ok(true)
    }

    fn remove_block(&self, hash: &StateHash) -> Result<bool, SqliteError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(block) = load_block(&tx, hash)? else {
            return Ok(false);
        };
        if block.canonical {
            tracing::warn!(state_hash = %hash, height = block.height, "rolling back a canonical block, demoting first");
            apply_counters(&tx, &block, CounterDirection::Debit)?;
        }

        for table in ["snarkjobs", "feetransfers", "userjobs"] {
            tx.execute(
                &format!("DELETE FROM {table} WHERE block_state_hash = ?1"),
                params![hash.as_str()],
            )?;
        }
        tx.execute(
            "DELETE FROM blocks WHERE state_hash = ?1",
            params![hash.as_str()],
        )?;

        tx.commit()?;
        Ok(true)
    }

    fn query_summaries(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<BlockSummary>, SqliteError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, summary_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

impl BlockStore for SqliteStore {
    fn block_exists(&self, hash: &StateHash) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM blocks WHERE state_hash = ?1",
                params![hash.as_str()],
                |_| Ok(()),
            )
            .optional()
            .map_err(SqliteError::from)?;
        Ok(found.is_some())
    }

    fn save_block(&self, block: &Block) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(SqliteError::from)?;
        let inserted = insert_block(&tx, block)?;
        tx.commit().map_err(SqliteError::from)?;
        Ok(inserted)
    }

    fn get_block(&self, hash: &StateHash) -> Result<Option<Block>, StoreError> {
        let conn = self.conn()?;
        Ok(load_block(&conn, hash)?)
    }

    fn recent_blocks(&self, limit: usize) -> Result<Vec<BlockSummary>, StoreError> {
        let sql = format!(
            "SELECT {SUMMARY_COLUMNS} FROM blocks ORDER BY height DESC, state_hash ASC LIMIT ?1"
        );
        Ok(self.query_summaries(&sql, params![limit])?)
    }

    fn blocks_from_height(&self, height: u64) -> Result<Vec<BlockSummary>, StoreError> {
        let sql = format!(
            "SELECT {SUMMARY_COLUMNS} FROM blocks WHERE height >= ?1 \
             ORDER BY height DESC, state_hash ASC"
        );
        Ok(self.query_summaries(&sql, params![height])?)
    }

    fn canonical_block_at(&self, height: u64) -> Result<Option<Block>, StoreError> {
        let conn = self.conn()?;
        let hash: Option<String> = conn
            .query_row(
                "SELECT state_hash FROM blocks WHERE canonical = 1 AND height = ?1 \
                 ORDER BY state_hash LIMIT 1",
                params![height],
                |row| row.get(0),
            )
            .optional()
            .map_err(SqliteError::from)?;
        match hash {
            Some(hash) => Ok(load_block(&conn, &StateHash::new(hash))?),
            None => Ok(None),
        }
    }

    fn max_height(&self) -> Result<Option<u64>, StoreError> {
        let conn = self.conn()?;
        let height: Option<u64> = conn
            .query_row("SELECT MAX(height) FROM blocks", [], |row| row.get(0))
            .map_err(SqliteError::from)?;
        Ok(height)
    }

    fn mark_canonical(&self, hash: &StateHash) -> Result<bool, StoreError> {
        Ok(self.set_canonical(hash, true)?)
    }

    fn mark_orphaned(&self, hash: &StateHash) -> Result<bool, StoreError> {
        Ok(self.set_canonical(hash, false)?)
    }

    fn rollback_block(&self, hash: &StateHash) -> Result<bool, StoreError> {
        Ok(self.remove_block(hash)?)
    }

    fn orphaned_below(&self, height: u64, limit: usize) -> Result<Vec<BlockSummary>, StoreError> {
        let sql = format!(
            "SELECT {SUMMARY_COLUMNS} FROM blocks b WHERE b.canonical = 0 AND b.height < ?1 \
             AND EXISTS (SELECT 1 FROM blocks c WHERE c.height = b.height AND c.canonical = 1) \
             ORDER BY b.height ASC, b.state_hash ASC LIMIT ?2"
        );
        Ok(self.query_summaries(&sql, params![height, limit])?)
    }

    fn block_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let count: u64 = conn
            .query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))
            .map_err(SqliteError::from)?;
        Ok(count)
    }
}
