use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqliteError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("connection lock poisoned")]
    Poisoned,

    #[error("schema error: {0}")]
    Schema(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<SqliteError> for coda_store::StoreError {
    fn from(e: SqliteError) -> Self {
        match e {
            SqliteError::Serialization(e) => coda_store::StoreError::Serialization(e.to_string()),
            SqliteError::NotFound(key) => coda_store::StoreError::NotFound(key),
            SqliteError::Schema(msg) => coda_store::StoreError::Corruption(msg),
            other => coda_store::StoreError::Backend(other.to_string()),
        }
    }
}
