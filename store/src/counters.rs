//! Per-account counter contributions of a block.
//!
//! Backends use this to credit or debit the accounts a block references when
//! its canonical status flips, so every backend agrees on which role feeds
//! which counter.

use std::collections::BTreeMap;

use coda_types::{Account, Block, PublicKey};

/// Which way a canonical transition moves the counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CounterDirection {
    /// The block became canonical.
    Credit,
    /// The block stopped being canonical.
    Debit,
}

/// How much one block contributes to one account's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccountCounters {
    pub tx_sent: u64,
    pub tx_received: u64,
    pub blocks_proposed: u64,
    pub snark_jobs: u64,
}

impl AccountCounters {
    /// Contributions of `block`, grouped by account. Fee-transfer recipients
    /// have no counter and are not listed, nor are empty keys.
    pub fn for_block(block: &Block) -> BTreeMap<PublicKey, AccountCounters> {
        let mut out: BTreeMap<PublicKey, AccountCounters> = BTreeMap::new();
        out.entry(block.creator.clone()).or_default().blocks_proposed += 1;
        for sj in &block.snark_jobs {
            out.entry(sj.prover.clone()).or_default().snark_jobs += 1;
        }
        for uj in &block.user_jobs {
            out.entry(uj.sender.clone()).or_default().tx_sent += 1;
            out.entry(uj.recipient.clone()).or_default().tx_received += 1;
        }
        out.retain(|pk, _| pk.is_valid());
        out
    }

    /// Apply this contribution to an account row. Debits saturate at zero.
    pub fn apply_to(&self, account: &mut Account, direction: CounterDirection) {
        match direction {
            CounterDirection::Credit => {
                account.tx_sent += self.tx_sent;
                account.tx_received += self.tx_received;
                account.blocks_proposed += self.blocks_proposed;
                account.snark_jobs += self.snark_jobs;
            }
            CounterDirection::Debit => {
                account.tx_sent = account.tx_sent.saturating_sub(self.tx_sent);
                account.tx_received = account.tx_received.saturating_sub(self.tx_received);
                account.blocks_proposed = account.blocks_proposed.saturating_sub(self.blocks_proposed);
                account.snark_jobs = account.snark_jobs.saturating_sub(self.snark_jobs);
            }
        }
    }
}
