use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use proptest::prelude::*;
use proptest::sample::Index;

use coda_indexer::{IndexerMetrics, Reconciler};
use coda_nullables::{NullNodeClient, NullStore};
use coda_store::{AccountStore, BlockStore, LedgerStore};
use coda_store_sqlite::SqliteStore;
use coda_types::{Block, PublicKey, StateHash, Timestamp, UserJob};

const KEYS: [&str; 4] = ["alice", "bob", "carol", "dave"];

/// A block tree: `parents[i]` is the parent index of block `i` (block 0 is
/// the root).
struct Tree {
    blocks: Vec<Block>,
    parents: Vec<Option<usize>>,
}

impl Tree {
    fn build(shape: &[(Index, usize)]) -> Self {
        let mut blocks: Vec<Block> = Vec::with_capacity(shape.len());
        let mut parents = Vec::with_capacity(shape.len());
        for (i, (parent_idx, creator)) in shape.iter().enumerate() {
            let parent = (i > 0).then(|| parent_idx.index(i));
            let (parent_hash, height) = match parent {
                Some(p) => (blocks[p].state_hash.clone(), blocks[p].height + 1),
                None => (StateHash::from("genesis"), 1),
            };
            blocks.push(make_block(i, parent_hash, height, *creator));
            parents.push(parent);
        }
        Self { blocks, parents }
    }

    /// Blocks from the root down to `tip`.
    fn path_to(&self, tip: usize) -> Vec<Block> {
        let mut path = vec![];
        let mut cursor = Some(tip);
        while let Some(i) = cursor {
            path.push(self.blocks[i].clone());
            cursor = self.parents[i];
        }
        path.reverse();
        path
    }
}

fn make_block(i: usize, parent: StateHash, height: u64, creator: usize) -> Block {
    let state_hash = StateHash::new(format!("b{i:02}"));
    let mut block = Block {
        state_hash: state_hash.clone(),
        previous_state_hash: parent,
        canonical: false,
        snarked_ledger_hash: String::new(),
        staged_ledger_hash: String::new(),
        coinbase: 20,
        creator: PublicKey::from(KEYS[creator]),
        slot: height,
        height,
        epoch: 0,
        ts: Timestamp::new(1_000 + height),
        total_currency: 0,
        user_commands_count: 0,
        snark_jobs_count: 0,
        fee_transfer_count: 0,
        user_jobs: vec![UserJob {
            block_state_hash: state_hash,
            index: 0,
            id: format!("tx{i}"),
            sender: PublicKey::from(KEYS[creator]),
            recipient: PublicKey::from(KEYS[(creator + 1) % KEYS.len()]),
            memo: String::new(),
            fee: 1,
            amount: 1,
            nonce: 0,
            delegation: false,
        }],
        snark_jobs: vec![],
        fee_transfers: vec![],
    };
    block.sync_counts();
    block
}

/// Feed each view to the reconciler and check the mirror after every pass.
fn check_convergence<S: LedgerStore + 'static>(
    store: Arc<S>,
    shape: &[(Index, usize)],
    views: &[Index],
    lookback: usize,
) -> Result<(), TestCaseError> {
    let tree = Tree::build(shape);
    let client = Arc::new(NullNodeClient::new());
    let metrics = Arc::new(IndexerMetrics::new().unwrap());
    let reconciler = Reconciler::new(Arc::clone(&client), Arc::clone(&store), metrics);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    for view in views {
        let path = tree.path_to(view.index(tree.blocks.len()));
        // The node only reports its top `lookback` blocks.
        let node_tail = path[path.len().saturating_sub(lookback)..].to_vec();
        let floor = node_tail[0].height;
        client.set_tail(node_tail.clone());
        runtime.block_on(reconciler.reconcile(lookback)).unwrap();

        // Within the node tail's span the canonical set is exactly its chain.
        let expected: BTreeSet<StateHash> =
            node_tail.iter().map(|b| b.state_hash.clone()).collect();
        let mut canonical = BTreeSet::new();
        let mut heights = BTreeSet::new();
        let mut sums: BTreeMap<&str, (u64, u64, u64)> = BTreeMap::new();
        for block in &tree.blocks {
            let Some(stored) = store.get_block(&block.state_hash).unwrap() else {
                continue;
            };
            if !stored.canonical {
                continue;
            }
            // At most one canonical block per height.
            prop_assert!(heights.insert(stored.height));
            if stored.height >= floor {
                canonical.insert(stored.state_hash.clone());
            }

            let creator = KEYS.iter().position(|k| *k == stored.creator.as_str()).unwrap();
            sums.entry(KEYS[creator]).or_default().2 += 1;
            sums.entry(KEYS[creator]).or_default().0 += 1;
            sums.entry(KEYS[(creator + 1) % KEYS.len()]).or_default().1 += 1;
        }
        prop_assert_eq!(&canonical, &expected);

        // Counters equal the sums over canonical blocks.
        for key in KEYS {
            let actual = store
                .get_account(&PublicKey::from(key))
                .unwrap()
                .map(|a| (a.tx_sent, a.tx_received, a.blocks_proposed))
                .unwrap_or_default();
            prop_assert_eq!(actual, sums.get(key).copied().unwrap_or_default(), "{}", key);
        }
    }
    Ok(())
}

fn tree_strategy() -> impl Strategy<Value = Vec<(Index, usize)>> {
    prop::collection::vec((any::<Index>(), 0usize..KEYS.len()), 1..12)
}

fn views_strategy() -> impl Strategy<Value = Vec<Index>> {
    prop::collection::vec(any::<Index>(), 1..6)
}

proptest! {
    /// Whatever sequence of forks the node reports, and however short the
    /// lookback, the mirror's canonical chain follows the node's tail and
    /// counters track exactly the canonical blocks.
    #[test]
    fn mirror_follows_any_fork_sequence(
        shape in tree_strategy(),
        views in views_strategy(),
        lookback in 1usize..=13,
    ) {
        check_convergence(Arc::new(NullStore::new()), &shape, &views, lookback)?;
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Same walk against the SQLite store.
    #[test]
    fn sqlite_mirror_follows_any_fork_sequence(
        shape in tree_strategy(),
        views in views_strategy(),
        lookback in 1usize..=13,
    ) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        check_convergence(store, &shape, &views, lookback)?;
    }
}
