//! Nullable store: thread-safe in-memory ledger store for testing.
//!
//! Mirrors the SQLite backend's semantics: blocks are saved non-canonical,
//! canonical transitions move counters, rollback removes a block with its
//! children. Every operation holds one lock for its whole duration, so each
//! is atomic like a database transaction.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use coda_store::{
    AccountCounters, AccountStore, BlockStore, CounterDirection, StatusStore, StoreError,
};
use coda_types::{Account, Block, BlockSummary, DaemonStatus, PublicKey, StateHash, Timestamp};

#[derive(Default)]
struct State {
    blocks: HashMap<StateHash, Block>,
    accounts: BTreeMap<PublicKey, Account>,
    statuses: BTreeMap<Timestamp, DaemonStatus>,
    fail_writes: bool,
    writes: u64,
}

impl State {
    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes {
            Err(StoreError::Backend("injected write failure".into()))
        } else {
            Ok(())
        }
    }

    fn apply_counters(&mut self, block: &Block, direction: CounterDirection) {
        for (public_key, counters) in AccountCounters::for_block(block) {
            let account = match direction {
                CounterDirection::Credit => Some(
                    self.accounts
                        .entry(public_key.clone())
                        .or_insert_with(|| Account::empty(public_key).seen_at(block.ts)),
                ),
                CounterDirection::Debit => self.accounts.get_mut(&public_key),
            };
            if let Some(account) = account {
                counters.apply_to(account, direction);
            }
        }
    }

    fn set_canonical(&mut self, hash: &StateHash, canonical: bool) -> Result<bool, StoreError> {
        self.check_writable()?;
        let block = self
            .blocks
            .get(hash)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(hash.to_string()))?;
        if block.canonical == canonical {
            return Ok(false);
        }
        let direction = if canonical {
            CounterDirection::Credit
        } else {
            CounterDirection::Debit
        };
        self.apply_counters(&block, direction);
        if let Some(stored) = self.blocks.get_mut(hash) {
            stored.canonical = canonical;
        }
        self.writes += 1;
        Ok(true)
    }
}

fn summaries<'a>(blocks: impl Iterator<Item = &'a Block>) -> Vec<BlockSummary> {
    let mut out: Vec<BlockSummary> = blocks.map(Block::summary).collect();
    out.sort_by(|a, b| {
        b.height
            .cmp(&a.height)
            .then_with(|| a.state_hash.cmp(&b.state_hash))
    });
    out
}

/// An in-memory ledger store for testing.
/// Thread-safe for use with tokio's multi-threaded runtime.
#[derive(Default)]
pub struct NullStore {
    state: Mutex<State>,
}

impl NullStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every mutating operation fail with `StoreError::Backend`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    /// Number of successful block writes (saves, transitions, rollbacks).
    pub fn write_count(&self) -> u64 {
        self.state().writes
    }

    /// Seed a block directly, keeping its `canonical` flag and crediting
    /// counters if it is canonical. For building a pre-existing mirror.
    pub fn seed_block(&self, block: Block) {
        let mut state = self.state();
        if block.canonical {
            state.apply_counters(&block, CounterDirection::Credit);
        }
        state.blocks.insert(block.state_hash.clone(), block);
    }

    /// Every stored block, height descending.
    pub fn all_blocks(&self) -> Vec<Block> {
        let mut blocks: Vec<Block> = self.state().blocks.values().cloned().collect();
        blocks.sort_by(|a, b| {
            b.height
                .cmp(&a.height)
                .then_with(|| a.state_hash.cmp(&b.state_hash))
        });
        blocks
    }

    pub fn all_accounts(&self) -> Vec<Account> {
        self.state().accounts.values().cloned().collect()
    }
}

impl BlockStore for NullStore {
    fn block_exists(&self, hash: &StateHash) -> Result<bool, StoreError> {
        Ok(self.state().blocks.contains_key(hash))
    }

    fn save_block(&self, block: &Block) -> Result<bool, StoreError> {
        let mut state = self.state();
        state.check_writable()?;
        if state.blocks.contains_key(&block.state_hash) {
            return Ok(false);
        }
        let mut stored = block.clone();
        stored.canonical = false;
        stored.sync_counts();
        state.blocks.insert(stored.state_hash.clone(), stored);
        state.writes += 1;
        Ok(true)
    }

    fn get_block(&self, hash: &StateHash) -> Result<Option<Block>, StoreError> {
        Ok(self.state().blocks.get(hash).cloned())
    }

    fn recent_blocks(&self, limit: usize) -> Result<Vec<BlockSummary>, StoreError> {
        let state = self.state();
        let mut out = summaries(state.blocks.values());
        out.truncate(limit);
        Ok(out)
    }

    fn blocks_from_height(&self, height: u64) -> Result<Vec<BlockSummary>, StoreError> {
        let state = self.state();
        Ok(summaries(state.blocks.values().filter(|b| b.height >= height)))
    }

    fn canonical_block_at(&self, height: u64) -> Result<Option<Block>, StoreError> {
        Ok(self
            .state()
            .blocks
            .values()
            .filter(|b| b.canonical && b.height == height)
            .min_by(|a, b| a.state_hash.cmp(&b.state_hash))
            .cloned())
    }

    fn max_height(&self) -> Result<Option<u64>, StoreError> {
        Ok(self.state().blocks.values().map(|b| b.height).max())
    }

    fn mark_canonical(&self, hash: &StateHash) -> Result<bool, StoreError> {
        self.state().set_canonical(hash, true)
    }

    fn mark_orphaned(&self, hash: &StateHash) -> Result<bool, StoreError> {
        self.state().set_canonical(hash, false)
    }

    fn rollback_block(&self, hash: &StateHash) -> Result<bool, StoreError> {
        let mut state = self.state();
        state.check_writable()?;
        let Some(block) = state.blocks.remove(hash) else {
            return Ok(false);
        };
        if block.canonical {
            state.apply_counters(&block, CounterDirection::Debit);
        }
        state.writes += 1;
        Ok(true)
    }

    fn orphaned_below(&self, height: u64, limit: usize) -> Result<Vec<BlockSummary>, StoreError> {
        let state = self.state();
        let settled: HashSet<u64> = state
            .blocks
            .values()
            .filter(|b| b.canonical)
            .map(|b| b.height)
            .collect();
        let mut out = summaries(
            state
                .blocks
                .values()
                .filter(|b| !b.canonical && b.height < height && settled.contains(&b.height)),
        );
        out.sort_by(|a, b| {
            a.height
                .cmp(&b.height)
                .then_with(|| a.state_hash.cmp(&b.state_hash))
        });
        out.truncate(limit);
        Ok(out)
    }

    fn block_count(&self) -> Result<u64, StoreError> {
        Ok(self.state().blocks.len() as u64)
    }
}

impl AccountStore for NullStore {
    fn save_account(&self, account: &Account) -> Result<(), StoreError> {
        let mut state = self.state();
        state.check_writable()?;
        match state.accounts.get_mut(&account.public_key) {
            Some(existing) => {
                existing.balance = account.balance;
                existing.nonce = account.nonce;
                existing.receipt_chain_hash = account.receipt_chain_hash.clone();
                existing.delegate = account.delegate.clone();
                existing.voting_for = account.voting_for.clone();
                existing.first_seen = existing.first_seen.min(account.first_seen);
                existing.last_seen = existing.last_seen.max(account.last_seen);
            }
            None => {
                let mut fresh = account.clone();
                fresh.tx_sent = 0;
                fresh.tx_received = 0;
                fresh.blocks_proposed = 0;
                fresh.snark_jobs = 0;
                state.accounts.insert(fresh.public_key.clone(), fresh);
            }
        }
        Ok(())
    }

    fn get_account(&self, public_key: &PublicKey) -> Result<Option<Account>, StoreError> {
        Ok(self.state().accounts.get(public_key).cloned())
    }

    fn account_count(&self) -> Result<u64, StoreError> {
        Ok(self.state().accounts.len() as u64)
    }
}

impl StatusStore for NullStore {
    fn save_daemon_status(&self, status: &DaemonStatus) -> Result<(), StoreError> {
        let mut state = self.state();
        state.check_writable()?;
        state
            .statuses
            .entry(status.ts)
            .or_insert_with(|| status.clone());
        Ok(())
    }

    fn latest_daemon_status(&self) -> Result<Option<DaemonStatus>, StoreError> {
        Ok(self.state().statuses.values().next_back().cloned())
    }
}
