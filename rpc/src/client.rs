//! The node client seam.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;

use coda_types::{Account, Block, DaemonStatus, PublicKey, StateHash};

use crate::ClientError;

/// Default request timeout for GraphQL queries.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default TCP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for a node client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// GraphQL HTTP endpoint, e.g. `http://localhost:3085/graphql`. The
    /// subscription endpoint is derived from it.
    pub node_url: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Capacity of the notification queue handed to the scheduler.
    pub notification_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            node_url: "http://localhost:3085/graphql".to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            notification_capacity: 16,
        }
    }
}

/// Everything the indexer needs from the upstream node.
///
/// Implementations own their transport retry and reconnect policy; callers
/// treat every error as "this pass failed".
pub trait NodeClient: Send + Sync {
    /// The `n` most recent blocks known to the node, complete with their
    /// child collections, ascending by height.
    fn fetch_recent_blocks(
        &self,
        n: usize,
    ) -> impl Future<Output = Result<Vec<Block>, ClientError>> + Send;

    /// A single block by state hash. `ClientError::NotFound` if the node
    /// does not know it.
    fn fetch_block(
        &self,
        hash: &StateHash,
    ) -> impl Future<Output = Result<Block, ClientError>> + Send;

    /// Current account state. Counters and seen timestamps are zero.
    fn fetch_account(
        &self,
        public_key: &PublicKey,
    ) -> impl Future<Output = Result<Account, ClientError>> + Send;

    fn fetch_daemon_status(&self) -> impl Future<Output = Result<DaemonStatus, ClientError>> + Send;

    /// Start the new-block subscription. Each received state hash is pushed
    /// into the returned bounded queue; the subscription stops once the
    /// receiver is dropped. Must be called from within a tokio runtime.
    fn subscribe_new_blocks(&self) -> Result<mpsc::Receiver<StateHash>, ClientError>;
}
