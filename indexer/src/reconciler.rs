//! Canonical-chain reconciliation.
//!
//! A pass compares the node's recent tail with the mirror's, imports the
//! blocks the mirror lacks, then walks the mirror's tail from the top down
//! following `previous_state_hash` links from the node's tip. Blocks on that
//! path become canonical; canonical blocks off it become orphans. Each flag
//! flip is one atomic store operation that also moves the account counters,
//! so the counters always equal the sum over canonical blocks.
//!
//! Passes never interleave: every entry point takes the same async lock.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::Instrument;

use coda_rpc::NodeClient;
use coda_store::LedgerStore;
use coda_types::{BlockSummary, StateHash};

use crate::exporter::{ExportOutcome, ExportSource, Exporter};
use crate::metrics::IndexerMetrics;
use crate::spans;
use crate::IndexerError;

/// Orphans removed per pruning round.
const PRUNE_BATCH: usize = 500;

/// What one reconciliation pass changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    pub imported: u64,
    pub promoted: u64,
    pub orphaned: u64,
    /// Highest block height in the mirror after the pass.
    pub tip_height: Option<u64>,
}

impl PassReport {
    /// True when the pass wrote nothing.
    pub fn is_noop(&self) -> bool {
        self.imported == 0 && self.promoted == 0 && self.orphaned == 0
    }
}

pub struct Reconciler<C, S> {
    client: Arc<C>,
    store: Arc<S>,
    exporter: Exporter<C, S>,
    metrics: Arc<IndexerMetrics>,
    lock: Mutex<()>,
}

impl<C: NodeClient, S: LedgerStore> Reconciler<C, S> {
    pub fn new(client: Arc<C>, store: Arc<S>, metrics: Arc<IndexerMetrics>) -> Self {
        let exporter = Exporter::new(Arc::clone(&client), Arc::clone(&store));
        Self {
            client,
            store,
            exporter,
            metrics,
            lock: Mutex::new(()),
        }
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<IndexerMetrics> {
        &self.metrics
    }

    /// Run one pass over the node's top `lookback` blocks. The walk covers
    /// every stored block from the lowest of those heights up, so fork
    /// siblings never push a node block out of view.
    ///
    /// Waits for any running pass to finish first, then works on fresh data.
    /// An error leaves every already-applied step in place; each step is
    /// atomic and idempotent, so the next pass picks up where this one
    /// stopped.
    pub async fn reconcile(&self, lookback: usize) -> Result<PassReport, IndexerError> {
        self.reconcile_with_trigger(lookback, "manual").await
    }

    /// Same as [`reconcile`](Self::reconcile), labelling the pass span with
    /// what caused it.
    pub async fn reconcile_with_trigger(
        &self,
        lookback: usize,
        trigger: &str,
    ) -> Result<PassReport, IndexerError> {
        let _guard = self.lock.lock().await;
        let started = Instant::now();

        let result = self
            .run_pass(lookback)
            .instrument(spans::pass_span(trigger, lookback))
            .await;

        self.metrics
            .pass_duration_ms
            .observe(started.elapsed().as_secs_f64() * 1000.0);
        match &result {
            Ok(report) => {
                self.metrics.passes.inc();
                self.metrics.blocks_imported.inc_by(report.imported);
                self.metrics.blocks_promoted.inc_by(report.promoted);
                self.metrics.blocks_orphaned.inc_by(report.orphaned);
                if let Some(height) = report.tip_height {
                    self.metrics.tip_height.set(height as i64);
                }
            }
            Err(_) => self.metrics.pass_failures.inc(),
        }
        result
    }

    async fn run_pass(&self, lookback: usize) -> Result<PassReport, IndexerError> {
        let mut report = PassReport::default();

        let node_tail = self.client.fetch_recent_blocks(lookback).await?;
        let floor = match node_tail.first() {
            Some(lowest) => Some(lowest.height),
            None => self
                .store
                .max_height()?
                .map(|top| top.saturating_sub(lookback as u64)),
        };
        let Some(floor) = floor else {
            tracing::debug!("node and mirror are both empty");
            return Ok(report);
        };

        // Every stored block in the node tail's height span, forks included.
        let known: HashSet<StateHash> = self
            .store
            .blocks_from_height(floor)?
            .into_iter()
            .map(|summary| summary.state_hash)
            .collect();

        let node_tip = node_tail.last().map(|block| block.state_hash.clone());

        // Ascending, so parents land before children.
        for block in node_tail {
            if known.contains(&block.state_hash) {
                continue;
            }
            let hash = block.state_hash.clone();
            let height = block.height;
            match self.exporter.export(ExportSource::Payload(block)).await {
                Ok(ExportOutcome::Exported) => report.imported += 1,
                Ok(ExportOutcome::AlreadyPresent) => {}
                Err(e) => {
                    tracing::warn!(state_hash = %hash, height, error = %e, "import failed, abandoning pass");
                    return Err(e);
                }
            }
        }

        let local_tail = self.store.blocks_from_height(floor)?;
        let expected = node_tip.or_else(|| local_tail.first().map(|s| s.state_hash.clone()));
        self.walk(&local_tail, expected, &mut report)?;

        report.tip_height = self.store.max_height()?;
        if report.is_noop() {
            tracing::debug!(tip_height = ?report.tip_height, "mirror already in sync");
        } else {
            tracing::info!(
                imported = report.imported,
                promoted = report.promoted,
                orphaned = report.orphaned,
                tip_height = ?report.tip_height,
                "reconciliation pass applied changes"
            );
        }
        Ok(report)
    }

    /// Canonical walk over `tail` (height descending, ties by hash).
    fn walk(
        &self,
        tail: &[BlockSummary],
        mut expected: Option<StateHash>,
        report: &mut PassReport,
    ) -> Result<(), IndexerError> {
        for summary in tail {
            let on_chain = expected.as_ref() == Some(&summary.state_hash);
            match (on_chain, summary.canonical) {
                (true, false) => {
                    if self.store.mark_canonical(&summary.state_hash)? {
                        tracing::debug!(state_hash = %summary.state_hash, height = summary.height, "promoted");
                        report.promoted += 1;
                    }
                    expected = Some(summary.previous_state_hash.clone());
                }
                (true, true) => expected = Some(summary.previous_state_hash.clone()),
                (false, true) => {
                    if self.store.mark_orphaned(&summary.state_hash)? {
                        tracing::info!(state_hash = %summary.state_hash, height = summary.height, "orphaned");
                        report.orphaned += 1;
                    }
                }
                (false, false) => {}
            }
        }
        Ok(())
    }

    /// Export a single block by hash, e.g. one announced by a notification
    /// or requested by an operator. Its canonical status is settled by the
    /// next pass.
    pub async fn export_block(&self, hash: &StateHash) -> Result<ExportOutcome, IndexerError> {
        let _guard = self.lock.lock().await;
        let outcome = self.exporter.export(ExportSource::Hash(hash.clone())).await?;
        if outcome == ExportOutcome::Exported {
            self.metrics.blocks_imported.inc();
        }
        Ok(outcome)
    }

    /// Physically remove a block. A canonical block is demoted first, so its
    /// counters are decremented exactly once. Returns whether a block was
    /// removed.
    pub async fn rollback(&self, hash: &StateHash) -> Result<bool, IndexerError> {
        let _guard = self.lock.lock().await;
        spans::rollback_span(hash.as_str()).in_scope(|| -> Result<bool, IndexerError> {
            let removed = self.store.rollback_block(hash)?;
            if removed {
                self.metrics.blocks_rolled_back.inc();
                tracing::info!("block rolled back");
            } else {
                tracing::debug!("nothing to roll back");
            }
            Ok(removed)
        })
    }

    /// Remove orphans lying more than `retention` heights below the mirror's
    /// tip. Canonical blocks are never touched. Returns how many blocks were
    /// removed.
    pub async fn prune_orphans(&self, retention: u64) -> Result<usize, IndexerError> {
        let _guard = self.lock.lock().await;
        let Some(tip) = self.store.max_height()? else {
            return Ok(0);
        };
        let cutoff = tip.saturating_sub(retention);

        let mut removed = 0;
        for summary in self.store.orphaned_below(cutoff, PRUNE_BATCH)? {
            if self.store.rollback_block(&summary.state_hash)? {
                removed += 1;
            }
        }
        if removed > 0 {
            self.metrics.blocks_rolled_back.inc_by(removed as u64);
            tracing::info!(removed, cutoff, "pruned orphaned blocks");
        }
        Ok(removed)
    }
}
