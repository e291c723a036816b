//! Block exporter: copies one block and the accounts it touches from the
//! node into the store.

use std::sync::Arc;

use tracing::Instrument;

use coda_rpc::NodeClient;
use coda_store::LedgerStore;
use coda_types::{Block, StateHash};

use crate::spans;
use crate::IndexerError;

/// Where the block to export comes from.
#[derive(Clone, Debug)]
pub enum ExportSource {
    /// Full block already fetched (bulk tail sync).
    Payload(Block),
    /// Only the hash is known (notification path); fetched via `fetch_block`.
    Hash(StateHash),
}

impl ExportSource {
    pub fn state_hash(&self) -> &StateHash {
        match self {
            ExportSource::Payload(block) => &block.state_hash,
            ExportSource::Hash(hash) => hash,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportOutcome {
    Exported,
    AlreadyPresent,
}

pub struct Exporter<C, S> {
    client: Arc<C>,
    store: Arc<S>,
}

impl<C: NodeClient, S: LedgerStore> Exporter<C, S> {
    pub fn new(client: Arc<C>, store: Arc<S>) -> Self {
        Self { client, store }
    }

    /// Export a block unless the store already has it.
    ///
    /// Touched accounts are upserted before the block row, so a failure
    /// part-way leaves only idempotent account writes behind and a retry
    /// converges. The block is always stored non-canonical; the reconciler
    /// decides its status.
    pub async fn export(&self, source: ExportSource) -> Result<ExportOutcome, IndexerError> {
        let span = spans::export_span(source.state_hash().as_str());
        self.export_inner(source).instrument(span).await
    }

    async fn export_inner(&self, source: ExportSource) -> Result<ExportOutcome, IndexerError> {
        if self.store.block_exists(source.state_hash())? {
            tracing::trace!("block already present");
            return Ok(ExportOutcome::AlreadyPresent);
        }

        let block = match source {
            ExportSource::Payload(block) => block,
            ExportSource::Hash(hash) => self.client.fetch_block(&hash).await?,
        };

        for public_key in block.touched_accounts() {
            let mut account = self.client.fetch_account(&public_key).await?;
            account.public_key = public_key;
            self.store.save_account(&account.seen_at(block.ts))?;
        }

        if self.store.save_block(&block)? {
            tracing::debug!(
                height = block.height,
                user_jobs = block.user_jobs.len(),
                snark_jobs = block.snark_jobs.len(),
                fee_transfers = block.fee_transfers.len(),
                "block exported"
            );
            Ok(ExportOutcome::Exported)
        } else {
            Ok(ExportOutcome::AlreadyPresent)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coda_nullables::{NullNodeClient, NullStore};
    use coda_store::{AccountStore, BlockStore};
    use coda_types::{Account, FeeTransfer, PublicKey, Timestamp};

    fn block(hash: &str) -> Block {
        let state_hash = StateHash::from(hash);
        Block {
            state_hash: state_hash.clone(),
            previous_state_hash: StateHash::from("parent"),
            canonical: true,
            snarked_ledger_hash: String::new(),
            staged_ledger_hash: String::new(),
            coinbase: 0,
            creator: "erin".into(),
            slot: 5,
            height: 5,
            epoch: 0,
            ts: Timestamp::new(500),
            total_currency: 0,
            user_commands_count: 0,
            snark_jobs_count: 0,
            fee_transfer_count: 1,
            user_jobs: vec![],
            snark_jobs: vec![],
            fee_transfers: vec![FeeTransfer {
                block_state_hash: state_hash,
                index: 0,
                recipient: "dave".into(),
                fee: 3,
            }],
        }
    }

    fn setup() -> (Arc<NullNodeClient>, Arc<NullStore>, Exporter<NullNodeClient, NullStore>) {
        let client = Arc::new(NullNodeClient::new());
        let store = Arc::new(NullStore::new());
        let exporter = Exporter::new(Arc::clone(&client), Arc::clone(&store));
        (client, store, exporter)
    }

    #[tokio::test]
    async fn payload_export_saves_block_and_accounts() {
        let (client, store, exporter) = setup();
        client.set_account(Account {
            balance: 42,
            ..Account::empty(PublicKey::from("dave"))
        });

        let outcome = exporter.export(ExportSource::Payload(block("A"))).await.unwrap();
        assert_eq!(outcome, ExportOutcome::Exported);

        let stored = store.get_block(&StateHash::from("A")).unwrap().unwrap();
        assert!(!stored.canonical);
        let dave = store.get_account(&PublicKey::from("dave")).unwrap().unwrap();
        assert_eq!(dave.balance, 42);
        assert_eq!(dave.first_seen, Timestamp::new(500));
        assert_eq!(dave.last_seen, Timestamp::new(500));
        assert!(store.get_account(&PublicKey::from("erin")).unwrap().is_some());
    }

    #[tokio::test]
    async fn present_block_is_not_refetched() {
        let (client, _store, exporter) = setup();
        exporter.export(ExportSource::Payload(block("A"))).await.unwrap();
        let requests = client.request_count();

        let outcome = exporter
            .export(ExportSource::Hash(StateHash::from("A")))
            .await
            .unwrap();
        assert_eq!(outcome, ExportOutcome::AlreadyPresent);
        assert_eq!(client.request_count(), requests);
    }

    #[tokio::test]
    async fn hash_export_fetches_from_node() {
        let (client, store, exporter) = setup();
        client.insert_block(block("B"));
        let outcome = exporter
            .export(ExportSource::Hash(StateHash::from("B")))
            .await
            .unwrap();
        assert_eq!(outcome, ExportOutcome::Exported);
        assert!(store.block_exists(&StateHash::from("B")).unwrap());
    }

    #[tokio::test]
    async fn unknown_hash_fails_without_writes() {
        let (_client, store, exporter) = setup();
        let err = exporter
            .export(ExportSource::Hash(StateHash::from("nope")))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::Client(_)));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn account_failure_aborts_before_block_insert() {
        let (client, store, exporter) = setup();
        client.fail_account(PublicKey::from("dave"));
        assert!(exporter.export(ExportSource::Payload(block("A"))).await.is_err());
        assert!(!store.block_exists(&StateHash::from("A")).unwrap());

        client.clear_account_failures();
        let outcome = exporter.export(ExportSource::Payload(block("A"))).await.unwrap();
        assert_eq!(outcome, ExportOutcome::Exported);
    }
}
