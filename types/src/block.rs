//! Mirrored block records and their child collections.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{PublicKey, StateHash, Timestamp};

/// A user command (payment or delegation) included in a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserJob {
    pub block_state_hash: StateHash,
    pub index: u32,
    pub id: String,
    pub sender: PublicKey,
    pub recipient: PublicKey,
    pub memo: String,
    pub fee: u64,
    pub amount: u64,
    pub nonce: u64,
    pub delegation: bool,
}

/// A completed snark work bundle bought by the block producer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnarkJob {
    pub block_state_hash: StateHash,
    pub index: u32,
    pub job_ids: Vec<i64>,
    pub prover: PublicKey,
    pub fee: u64,
}

/// A fee transfer paid out by the block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeTransfer {
    pub block_state_hash: StateHash,
    pub index: u32,
    pub recipient: PublicKey,
    pub fee: u64,
}

/// A block as stored in the mirror, with its child collections attached.
///
/// The core fields never change after the block is first exported; only
/// `canonical` is flipped by the reconciler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub state_hash: StateHash,
    pub previous_state_hash: StateHash,
    pub canonical: bool,
    pub snarked_ledger_hash: String,
    pub staged_ledger_hash: String,
    pub coinbase: u64,
    pub creator: PublicKey,
    pub slot: u64,
    pub height: u64,
    pub epoch: u64,
    pub ts: Timestamp,
    pub total_currency: u64,
    pub user_commands_count: u32,
    pub snark_jobs_count: u32,
    pub fee_transfer_count: u32,

    #[serde(default)]
    pub user_jobs: Vec<UserJob>,
    #[serde(default)]
    pub snark_jobs: Vec<SnarkJob>,
    #[serde(default)]
    pub fee_transfers: Vec<FeeTransfer>,
}

impl Block {
    /// Every account referenced by this block as creator, sender, recipient,
    /// prover or fee-transfer recipient, deduplicated and sorted.
    pub fn touched_accounts(&self) -> BTreeSet<PublicKey> {
        let mut accounts = BTreeSet::new();
        accounts.insert(self.creator.clone());
        for uj in &self.user_jobs {
            accounts.insert(uj.sender.clone());
            accounts.insert(uj.recipient.clone());
        }
        for sj in &self.snark_jobs {
            accounts.insert(sj.prover.clone());
        }
        for ft in &self.fee_transfers {
            accounts.insert(ft.recipient.clone());
        }
        accounts.retain(PublicKey::is_valid);
        accounts
    }

    /// Recompute the child counters from the attached collections.
    pub fn sync_counts(&mut self) {
        self.user_commands_count = self.user_jobs.len() as u32;
        self.snark_jobs_count = self.snark_jobs.len() as u32;
        self.fee_transfer_count = self.fee_transfers.len() as u32;
    }

    pub fn summary(&self) -> BlockSummary {
        BlockSummary {
            state_hash: self.state_hash.clone(),
            previous_state_hash: self.previous_state_hash.clone(),
            height: self.height,
            canonical: self.canonical,
        }
    }
}

/// The thin projection of a block used to walk the chain tail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub state_hash: StateHash,
    pub previous_state_hash: StateHash,
    pub height: u64,
    pub canonical: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> Block {
        let hash = StateHash::from("B1");
        Block {
            state_hash: hash.clone(),
            previous_state_hash: StateHash::from("B0"),
            canonical: false,
            snarked_ledger_hash: String::new(),
            staged_ledger_hash: String::new(),
            coinbase: 20,
            creator: "producer".into(),
            slot: 3,
            height: 2,
            epoch: 0,
            ts: Timestamp::new(100),
            total_currency: 1000,
            user_commands_count: 0,
            snark_jobs_count: 0,
            fee_transfer_count: 0,
            user_jobs: vec![UserJob {
                block_state_hash: hash.clone(),
                index: 0,
                id: "tx0".into(),
                sender: "alice".into(),
                recipient: "bob".into(),
                memo: String::new(),
                fee: 1,
                amount: 5,
                nonce: 0,
                delegation: false,
            }],
            snark_jobs: vec![SnarkJob {
                block_state_hash: hash.clone(),
                index: 0,
                job_ids: vec![1, 2],
                prover: "alice".into(),
                fee: 2,
            }],
            fee_transfers: vec![FeeTransfer {
                block_state_hash: hash,
                index: 0,
                recipient: "carol".into(),
                fee: 2,
            }],
        }
    }

    #[test]
    fn touched_accounts_are_deduplicated() {
        let touched: Vec<_> = block()
            .touched_accounts()
            .into_iter()
            .map(|k| k.to_string())
            .collect();
        assert_eq!(touched, vec!["alice", "bob", "carol", "producer"]);
    }

    #[test]
    fn touched_accounts_skip_empty_keys() {
        let mut b = block();
        b.fee_transfers[0].recipient = PublicKey::new("");
        assert!(!b.touched_accounts().contains(&PublicKey::new("")));
    }

    #[test]
    fn sync_counts_matches_collections() {
        let mut b = block();
        b.sync_counts();
        assert_eq!(
            (b.user_commands_count, b.snark_jobs_count, b.fee_transfer_count),
            (1, 1, 1)
        );
    }
}
