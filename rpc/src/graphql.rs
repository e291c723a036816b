//! HTTP GraphQL implementation of [`NodeClient`].

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use coda_types::{Account, Block, DaemonStatus, PublicKey, StateHash, Timestamp};

use crate::client::{ClientConfig, NodeClient};
use crate::queries;
use crate::response::{
    AccountData, BlockData, DaemonStatusData, GraphQlResponse, RecentBlocksData,
};
use crate::subscription::{self, Backoff};
use crate::ClientError;

/// Client for a Coda daemon's GraphQL API.
///
/// Queries are sent as `POST {node_url}` with a JSON body
/// `{"query": ..., "variables": ...}`. The subscription endpoint is the same
/// URL with the scheme switched to `ws`/`wss`.
pub struct GraphQlClient {
    /// HTTP client (reusable connection pool).
    http_client: reqwest::Client,
    node_url: String,
    ws_url: String,
    notification_capacity: usize,
}

impl GraphQlClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ClientError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http_client,
            node_url: config.node_url.clone(),
            ws_url: subscription::ws_url(&config.node_url),
            notification_capacity: config.notification_capacity.max(1),
        })
    }

    pub fn node_url(&self) -> &str {
        &self.node_url
    }

    /// Run one query and return the `data` member. A response that carries
    /// no data is malformed; GraphQL error messages are folded into the
    /// error.
    async fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> Result<T, ClientError> {
        let body = json!({ "query": query, "variables": variables });
        let response = self
            .http_client
            .post(&self.node_url)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()));
        }

        let text = response.text().await?;
        let envelope: GraphQlResponse<T> = serde_json::from_str(&text)?;
        match envelope.data {
            Some(data) => {
                for err in &envelope.errors {
                    tracing::debug!(error = %err.message, "graphql partial error");
                }
                Ok(data)
            }
            None => {
                let messages: Vec<String> =
                    envelope.errors.into_iter().map(|e| e.message).collect();
                if messages.is_empty() {
                    Err(ClientError::Malformed("response carried no data".into()))
                } else {
                    Err(ClientError::Malformed(messages.join("; ")))
                }
            }
        }
    }
}

impl NodeClient for GraphQlClient {
    async fn fetch_recent_blocks(&self, n: usize) -> Result<Vec<Block>, ClientError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let data: RecentBlocksData = self
            .execute(&queries::recent_blocks(), json!({ "last": n }))
            .await?;

        let mut blocks = data
            .blocks
            .nodes
            .into_iter()
            .map(|node| node.into_block())
            .collect::<Result<Vec<_>, _>>()?;
        blocks.sort_by(|a, b| {
            a.height
                .cmp(&b.height)
                .then_with(|| a.state_hash.cmp(&b.state_hash))
        });
        tracing::debug!(requested = n, received = blocks.len(), "fetched recent blocks");
        Ok(blocks)
    }

    async fn fetch_block(&self, hash: &StateHash) -> Result<Block, ClientError> {
        let data: BlockData = self
            .execute(&queries::block(), json!({ "stateHash": hash.as_str() }))
            .await?;
        let node = data
            .block
            .ok_or_else(|| ClientError::NotFound(format!("block {hash}")))?;
        let block = node.into_block()?;
        if block.state_hash != *hash {
            return Err(ClientError::Malformed(format!(
                "asked for block {hash}, node returned {}",
                block.state_hash
            )));
        }
        Ok(block)
    }

    async fn fetch_account(&self, public_key: &PublicKey) -> Result<Account, ClientError> {
        let data: AccountData = self
            .execute(queries::ACCOUNT, json!({ "publicKey": public_key.as_str() }))
            .await?;
        let node = data
            .account
            .ok_or_else(|| ClientError::NotFound(format!("account {public_key}")))?;
        Ok(node.into_account(public_key)?)
    }

    async fn fetch_daemon_status(&self) -> Result<DaemonStatus, ClientError> {
        let data: DaemonStatusData = self.execute(queries::DAEMON_STATUS, json!({})).await?;
        Ok(data.daemon_status.into_status(Timestamp::now()))
    }

    fn subscribe_new_blocks(&self) -> Result<mpsc::Receiver<StateHash>, ClientError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| ClientError::Subscription(format!("no tokio runtime: {e}")))?;
        let (tx, rx) = mpsc::channel(self.notification_capacity);
        let url = self.ws_url.clone();
        handle.spawn(subscription::run(url, tx, Backoff::default()));
        Ok(rx)
    }
}
