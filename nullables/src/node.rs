//! Nullable node client: a scripted upstream daemon.
//!
//! Tests describe the node's view of the chain (`set_tail`), the blocks it
//! can serve by hash, and its account and status answers. Failures can be
//! injected per account or for the whole node.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use coda_rpc::{ClientError, NodeClient};
use coda_types::{Account, Block, DaemonStatus, PublicKey, StateHash};

#[derive(Default)]
struct NodeState {
    /// Every block the node can serve by hash.
    blocks: HashMap<StateHash, Block>,
    /// The node's current best tail, ascending by height.
    tail: Vec<StateHash>,
    accounts: HashMap<PublicKey, Account>,
    failing_accounts: HashSet<PublicKey>,
    status: Option<DaemonStatus>,
    unreachable: bool,
    requests: u64,
}

/// A deterministic `NodeClient` for tests.
pub struct NullNodeClient {
    state: Mutex<NodeState>,
    subscriber: Mutex<Option<mpsc::Sender<StateHash>>>,
    notification_capacity: usize,
}

impl NullNodeClient {
    pub fn new() -> Self {
        Self::with_capacity(16)
    }

    /// A client whose notification queue holds `capacity` hashes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(NodeState::default()),
            subscriber: Mutex::new(None),
            notification_capacity: capacity.max(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the node's best tail. The blocks also become fetchable by
    /// hash.
    pub fn set_tail(&self, blocks: Vec<Block>) {
        let mut state = self.state();
        let mut blocks = blocks;
        blocks.sort_by(|a, b| {
            a.height
                .cmp(&b.height)
                .then_with(|| a.state_hash.cmp(&b.state_hash))
        });
        state.tail = blocks.iter().map(|b| b.state_hash.clone()).collect();
        for block in blocks {
            state.blocks.insert(block.state_hash.clone(), block);
        }
    }

    /// Make a block fetchable by hash without putting it on the tail.
    pub fn insert_block(&self, block: Block) {
        self.state().blocks.insert(block.state_hash.clone(), block);
    }

    pub fn set_account(&self, account: Account) {
        self.state()
            .accounts
            .insert(account.public_key.clone(), account);
    }

    /// Make `fetch_account` fail for one key.
    pub fn fail_account(&self, public_key: PublicKey) {
        self.state().failing_accounts.insert(public_key);
    }

    pub fn clear_account_failures(&self) {
        self.state().failing_accounts.clear();
    }

    /// Make every query fail with a transport error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    pub fn set_daemon_status(&self, status: DaemonStatus) {
        self.state().status = Some(status);
    }

    /// Number of queries answered or refused so far.
    pub fn request_count(&self) -> u64 {
        self.state().requests
    }

    /// Push a new-block notification to the subscriber, if any. Returns
    /// whether it was queued.
    pub fn notify(&self, hash: StateHash) -> bool {
        let subscriber = self
            .subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match subscriber.as_ref() {
            Some(tx) => tx.try_send(hash).is_ok(),
            None => false,
        }
    }

    /// Drop the subscription sender, as if the node went away for good.
    pub fn close_subscription(&self) {
        self.subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn begin_request(&self) -> Result<MutexGuard<'_, NodeState>, ClientError> {
        let mut state = self.state();
        state.requests += 1;
        if state.unreachable {
            return Err(ClientError::Transport("node unreachable".into()));
        }
        Ok(state)
    }
}

impl Default for NullNodeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeClient for NullNodeClient {
    async fn fetch_recent_blocks(&self, n: usize) -> Result<Vec<Block>, ClientError> {
        let state = self.begin_request()?;
        let skip = state.tail.len().saturating_sub(n);
        Ok(state.tail[skip..]
            .iter()
            .filter_map(|hash| state.blocks.get(hash).cloned())
            .collect())
    }

    async fn fetch_block(&self, hash: &StateHash) -> Result<Block, ClientError> {
        let state = self.begin_request()?;
        state
            .blocks
            .get(hash)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("block {hash}")))
    }

    async fn fetch_account(&self, public_key: &PublicKey) -> Result<Account, ClientError> {
        let state = self.begin_request()?;
        if state.failing_accounts.contains(public_key) {
            return Err(ClientError::Timeout);
        }
        Ok(state
            .accounts
            .get(public_key)
            .cloned()
            .unwrap_or_else(|| Account::empty(public_key.clone())))
    }

    async fn fetch_daemon_status(&self) -> Result<DaemonStatus, ClientError> {
        let state = self.begin_request()?;
        state
            .status
            .clone()
            .ok_or_else(|| ClientError::NotFound("daemon status".into()))
    }

    fn subscribe_new_blocks(&self) -> Result<mpsc::Receiver<StateHash>, ClientError> {
        let (tx, rx) = mpsc::channel(self.notification_capacity);
        *self
            .subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coda_types::Timestamp;

    fn block(hash: &str, height: u64) -> Block {
        Block {
            state_hash: StateHash::from(hash),
            previous_state_hash: StateHash::from("parent"),
            canonical: false,
            snarked_ledger_hash: String::new(),
            staged_ledger_hash: String::new(),
            coinbase: 0,
            creator: "erin".into(),
            slot: height,
            height,
            epoch: 0,
            ts: Timestamp::new(height),
            total_currency: 0,
            user_commands_count: 0,
            snark_jobs_count: 0,
            fee_transfer_count: 0,
            user_jobs: vec![],
            snark_jobs: vec![],
            fee_transfers: vec![],
        }
    }

    #[tokio::test]
    async fn recent_blocks_returns_top_of_tail_ascending() {
        let node = NullNodeClient::new();
        node.set_tail(vec![block("c", 3), block("a", 1), block("b", 2)]);
        let hashes: Vec<String> = node
            .fetch_recent_blocks(2)
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.state_hash.to_string())
            .collect();
        assert_eq!(hashes, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn unreachable_node_refuses_everything() {
        let node = NullNodeClient::new();
        node.set_unreachable(true);
        assert!(matches!(
            node.fetch_recent_blocks(5).await,
            Err(ClientError::Transport(_))
        ));
        assert_eq!(node.request_count(), 1);
    }

    #[tokio::test]
    async fn notifications_reach_the_subscriber() {
        let node = NullNodeClient::with_capacity(1);
        assert!(!node.notify(StateHash::from("x")));
        let mut rx = node.subscribe_new_blocks().unwrap();
        assert!(node.notify(StateHash::from("x")));
        assert!(!node.notify(StateHash::from("y")));
        assert_eq!(rx.recv().await, Some(StateHash::from("x")));
    }
}
