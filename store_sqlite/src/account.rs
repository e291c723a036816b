//! SQLite implementation of AccountStore.

use rusqlite::{params, OptionalExtension};

use coda_store::{AccountStore, StoreError};
use coda_types::{Account, PublicKey, Timestamp};

use crate::environment::SqliteStore;
use crate::SqliteError;

impl AccountStore for SqliteStore {
    fn save_account(&self, account: &Account) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO accounts (public_key, balance, nonce, receipt_chain_hash, delegate, \
             voting_for, first_seen, last_seen) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             ON CONFLICT(public_key) DO UPDATE SET \
                 balance = excluded.balance, \
                 nonce = excluded.nonce, \
                 receipt_chain_hash = excluded.receipt_chain_hash, \
                 delegate = excluded.delegate, \
                 voting_for = excluded.voting_for, \
                 first_seen = MIN(accounts.first_seen, excluded.first_seen), \
                 last_seen = MAX(accounts.last_seen, excluded.last_seen)",
            params![
                account.public_key.as_str(),
                account.balance,
                account.nonce,
                account.receipt_chain_hash,
                account.delegate.as_ref().map(|d| d.as_str()),
                account.voting_for,
                account.first_seen.as_secs(),
                account.last_seen.as_secs(),
            ],
        )
        .map_err(SqliteError::from)?;
        Ok(())
    }

    fn get_account(&self, public_key: &PublicKey) -> Result<Option<Account>, StoreError> {
        let conn = self.conn()?;
        let account = conn
            .query_row(
                "SELECT public_key, balance, nonce, receipt_chain_hash, delegate, voting_for, \
                 tx_sent, tx_received, blocks_proposed, snark_jobs, first_seen, last_seen \
                 FROM accounts WHERE public_key = ?1",
                params![public_key.as_str()],
                |row| {
                    Ok(Account {
                        public_key: PublicKey::new(row.get::<_, String>(0)?),
                        balance: row.get(1)?,
                        nonce: row.get(2)?,
                        receipt_chain_hash: row.get(3)?,
                        delegate: row.get::<_, Option<String>>(4)?.map(PublicKey::new),
                        voting_for: row.get(5)?,
                        tx_sent: row.get(6)?,
                        tx_received: row.get(7)?,
                        blocks_proposed: row.get(8)?,
                        snark_jobs: row.get(9)?,
                        first_seen: Timestamp::new(row.get(10)?),
                        last_seen: Timestamp::new(row.get(11)?),
                    })
                },
            )
            .optional()
            .map_err(SqliteError::from)?;
        Ok(account)
    }

    fn account_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let count: u64 = conn
            .query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))
            .map_err(SqliteError::from)?;
        Ok(count)
    }
}
