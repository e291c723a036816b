//! SQLite connection setup.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use crate::schema::Migrator;
use crate::SqliteError;

/// Wraps the SQLite connection shared by all store traits.
///
/// The connection sits behind a mutex so the store can be shared across
/// tokio tasks; SQLite serializes writers anyway.
///
/// Unsigned fields bind and read through rusqlite's checked `u64`
/// conversions: a value above `i64::MAX` fails the write instead of
/// wrapping, and a negative column fails the read.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database file at `path` and bring its schema up to
    /// date.
    pub fn open(path: &Path) -> Result<Self, SqliteError> {
        let conn = Connection::open(path)?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        Self::init(conn)
    }

    /// Open a private in-memory database (tests and one-shot tools).
    pub fn open_in_memory() -> Result<Self, SqliteError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, SqliteError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Migrator::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>, SqliteError> {
        self.conn.lock().map_err(|_| SqliteError::Poisoned)
    }
}
