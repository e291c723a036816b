use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("node client error: {0}")]
    Client(#[from] coda_rpc::ClientError),

    #[error("store error: {0}")]
    Store(#[from] coda_store::StoreError),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl From<prometheus::Error> for IndexerError {
    fn from(e: prometheus::Error) -> Self {
        IndexerError::Other(format!("metrics error: {e}"))
    }
}
