//! `newBlock` push subscription over the `graphql-ws` WebSocket protocol.
//!
//! The reader task reconnects forever with exponential backoff and stops
//! only when the receiving side of the notification queue is dropped.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;

use coda_types::StateHash;

use crate::queries;
use crate::ClientError;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Reconnect delay doubling from 1 s up to 30 s, reset once a subscription
/// is established.
#[derive(Clone, Debug)]
pub struct Backoff {
    current: Duration,
    initial: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial,
            initial,
            max,
        }
    }

    /// The delay to wait now; the following call returns double.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(INITIAL_BACKOFF, MAX_BACKOFF)
    }
}

/// Derive the WebSocket endpoint from the GraphQL HTTP endpoint.
pub fn ws_url(http_url: &str) -> String {
    if let Some(rest) = http_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = http_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if http_url.starts_with("ws://") || http_url.starts_with("wss://") {
        http_url.to_string()
    } else {
        format!("ws://{http_url}")
    }
}

/// One frame of the `graphql-ws` protocol, reduced to what we read.
#[derive(Debug, Deserialize)]
struct ServerMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct DataPayload {
    data: Option<NewBlockData>,
}

#[derive(Debug, Deserialize)]
struct NewBlockData {
    #[serde(rename = "newBlock")]
    new_block: Option<NewBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewBlock {
    state_hash: String,
}

/// Extract the announced state hash from a server frame. Acks and
/// keep-alives yield `None`.
pub fn parse_notification(text: &str) -> Result<Option<StateHash>, ClientError> {
    let msg: ServerMessage = serde_json::from_str(text)?;
    match msg.kind.as_str() {
        "data" => {
            let payload = msg
                .payload
                .ok_or_else(|| ClientError::Malformed("data frame without payload".into()))?;
            let payload: DataPayload = serde_json::from_value(payload)?;
            let hash = payload
                .data
                .and_then(|d| d.new_block)
                .map(|b| b.state_hash)
                .filter(|h| !h.trim().is_empty())
                .ok_or_else(|| ClientError::Malformed("newBlock without stateHash".into()))?;
            Ok(Some(StateHash::new(hash)))
        }
        "error" | "connection_error" => Err(ClientError::Subscription(format!(
            "server rejected subscription: {}",
            msg.payload.map(|p| p.to_string()).unwrap_or_default()
        ))),
        _ => Ok(None),
    }
}

/// Queue a hash without stalling the reader. A full queue already holds a
/// pending trigger for the scheduler, so the hash is dropped. Returns
/// `false` once the receiver is gone.
fn forward(tx: &mpsc::Sender<StateHash>, hash: StateHash) -> bool {
    match tx.try_send(hash) {
        Ok(()) => true,
        Err(TrySendError::Full(hash)) => {
            tracing::debug!(state_hash = %hash, "notification queue full, dropping");
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

/// Reader loop. Runs until `tx` is closed.
pub async fn run(url: String, tx: mpsc::Sender<StateHash>, mut backoff: Backoff) {
    loop {
        match subscribe_once(&url, &tx, &mut backoff).await {
            Ok(()) => tracing::info!(url = %url, "newBlock subscription ended"),
            Err(e) => tracing::warn!(url = %url, error = %e, "newBlock subscription failed"),
        }
        if tx.is_closed() {
            tracing::debug!("notification receiver dropped, stopping subscription");
            return;
        }
        let delay = backoff.next_delay();
        tracing::debug!(delay_secs = delay.as_secs(), "reconnecting newBlock subscription");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = tx.closed() => return,
        }
    }
}

async fn subscribe_once(
    url: &str,
    tx: &mpsc::Sender<StateHash>,
    backoff: &mut Backoff,
) -> Result<(), ClientError> {
    let mut request = url.into_client_request()?;
    request
        .headers_mut()
        .insert("Sec-WebSocket-Protocol", HeaderValue::from_static("graphql-ws"));

    let (mut ws, _response) = connect_async(request).await?;

    let init = json!({ "type": "connection_init", "payload": {} });
    ws.send(Message::Text(init.to_string())).await?;
    let start = json!({
        "id": "1",
        "type": "start",
        "payload": {
            "variables": {},
            "extensions": {},
            "operationName": null,
            "query": queries::NEW_BLOCK_SUBSCRIPTION,
        }
    });
    ws.send(Message::Text(start.to_string())).await?;

    backoff.reset();
    tracing::info!(url = %url, "subscribed to newBlock events");

    while let Some(frame) = ws.next().await {
        match frame? {
            Message::Text(text) => match parse_notification(&text) {
                Ok(Some(hash)) => {
                    tracing::debug!(state_hash = %hash, "new block notification");
                    if !forward(tx, hash) {
                        let _ = ws.close(None).await;
                        return Ok(());
                    }
                }
                Ok(None) => {}
                Err(ClientError::Malformed(reason)) => {
                    tracing::warn!(%reason, "ignoring malformed notification");
                }
                Err(e) => return Err(e),
            },
            Message::Close(_) => return Ok(()),
            _ => {} // binary, ping and pong frames carry nothing for us
        }
    }
    Ok(())
}
