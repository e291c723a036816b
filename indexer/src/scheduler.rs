//! Drives the reconciler.
//!
//! After a deep startup pass the scheduler runs three long-lived tasks:
//! - reconciliation on a fixed timer and on new-block notifications
//!   (a burst of notifications is drained and served by a single pass);
//! - daemon status refresh;
//! - orphan pruning, only when `orphan_retention` is configured.
//!
//! Every pass goes through the reconciler's lock, so timer and
//! notification passes never overlap.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use coda_rpc::NodeClient;
use coda_store::LedgerStore;
use coda_types::StateHash;

use crate::config::IndexerConfig;
use crate::reconciler::Reconciler;
use crate::shutdown::{ShutdownController, ShutdownSignal};
use crate::IndexerError;

/// Last known tip height of the mirror.
///
/// Initialized from the store at startup and advanced after every
/// successful pass. Readers can `subscribe` to wait for changes.
pub struct ChainCursor {
    tx: watch::Sender<Option<u64>>,
}

impl ChainCursor {
    pub fn new(height: Option<u64>) -> Self {
        let (tx, _) = watch::channel(height);
        Self { tx }
    }

    pub fn height(&self) -> Option<u64> {
        *self.tx.borrow()
    }

    pub fn update(&self, height: Option<u64>) {
        self.tx.send_if_modified(|current| {
            if *current == height {
                false
            } else {
                *current = height;
                true
            }
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<u64>> {
        self.tx.subscribe()
    }
}

pub struct Scheduler<C, S> {
    reconciler: Arc<Reconciler<C, S>>,
    config: IndexerConfig,
    cursor: Arc<ChainCursor>,
    task_handles: Vec<JoinHandle<()>>,
}

impl<C, S> Scheduler<C, S>
where
    C: NodeClient + 'static,
    S: LedgerStore + 'static,
{
    pub fn new(
        reconciler: Arc<Reconciler<C, S>>,
        config: IndexerConfig,
    ) -> Result<Self, IndexerError> {
        let height = reconciler.store().max_height()?;
        Ok(Self {
            reconciler,
            config,
            cursor: Arc::new(ChainCursor::new(height)),
            task_handles: Vec::new(),
        })
    }

    pub fn cursor(&self) -> Arc<ChainCursor> {
        Arc::clone(&self.cursor)
    }

    /// Run the startup pass, then spawn the background tasks. Returns once
    /// the tasks are running; they stop when `shutdown` fires.
    pub async fn start(&mut self, shutdown: &ShutdownController) {
        tracing::info!(
            lookback = self.config.startup_lookback,
            tip_height = ?self.cursor.height(),
            "running startup pass"
        );
        run_pass(
            &self.reconciler,
            &self.cursor,
            self.config.startup_lookback,
            "startup",
        )
        .await;

        let notifications = match self.reconciler.client().subscribe_new_blocks() {
            Ok(rx) => Some(rx),
            Err(e) => {
                tracing::warn!(error = %e, "new-block subscription unavailable, timer passes only");
                None
            }
        };

        self.task_handles.push(tokio::spawn(reconcile_loop(
            Arc::clone(&self.reconciler),
            Arc::clone(&self.cursor),
            self.config.lookback,
            self.config.reconcile_interval(),
            notifications,
            shutdown.subscribe(),
        )));

        self.task_handles.push(tokio::spawn(status_loop(
            Arc::clone(&self.reconciler),
            self.config.status_interval(),
            shutdown.subscribe(),
        )));

        if let Some(retention) = self.config.orphan_retention {
            self.task_handles.push(tokio::spawn(prune_loop(
                Arc::clone(&self.reconciler),
                retention,
                self.config.prune_interval(),
                shutdown.subscribe(),
            )));
        } else {
            tracing::debug!("orphan pruning disabled");
        }
    }

    /// Wait for every background task to finish. Call after triggering
    /// shutdown.
    pub async fn stop(&mut self) {
        for handle in self.task_handles.drain(..) {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "scheduler task ended abnormally");
            }
        }
        tracing::info!("scheduler stopped");
    }
}

/// Run one pass, log its outcome and advance the cursor. Failures are
/// logged only; the next trigger retries from scratch.
async fn run_pass<C: NodeClient, S: LedgerStore>(
    reconciler: &Reconciler<C, S>,
    cursor: &ChainCursor,
    lookback: usize,
    trigger: &str,
) {
    match reconciler.reconcile_with_trigger(lookback, trigger).await {
        Ok(report) => cursor.update(report.tip_height),
        Err(e) => tracing::warn!(trigger, error = %e, "reconciliation pass failed"),
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn reconcile_loop<C: NodeClient, S: LedgerStore>(
    reconciler: Arc<Reconciler<C, S>>,
    cursor: Arc<ChainCursor>,
    lookback: usize,
    period: Duration,
    mut notifications: Option<mpsc::Receiver<StateHash>>,
    mut shutdown: ShutdownSignal,
) {
    let mut interval = ticker(period);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.triggered() => {
                tracing::info!("reconcile task shutting down");
                break;
            }
            received = recv_notification(&mut notifications) => {
                let Some(hash) = received else {
                    tracing::warn!("new-block subscription closed, timer passes only");
                    notifications = None;
                    continue;
                };
                let mut burst = 1u64;
                if let Some(rx) = notifications.as_mut() {
                    while rx.try_recv().is_ok() {
                        burst += 1;
                    }
                }
                reconciler.metrics().notifications.inc_by(burst);
                tracing::debug!(state_hash = %hash, burst, "new block announced");
                run_pass(&reconciler, &cursor, lookback, "notification").await;
            }
            _ = interval.tick() => {
                run_pass(&reconciler, &cursor, lookback, "timer").await;
            }
        }
    }
}

/// Next notification, or pending forever when there is no subscription.
async fn recv_notification(rx: &mut Option<mpsc::Receiver<StateHash>>) -> Option<StateHash> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn status_loop<C: NodeClient, S: LedgerStore>(
    reconciler: Arc<Reconciler<C, S>>,
    period: Duration,
    mut shutdown: ShutdownSignal,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.triggered() => {
                tracing::info!("status task shutting down");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = refresh_daemon_status(&reconciler).await {
                    tracing::warn!(error = %e, "daemon status refresh failed");
                }
            }
        }
    }
}

/// Fetch the daemon's status and append it to the store.
pub async fn refresh_daemon_status<C: NodeClient, S: LedgerStore>(
    reconciler: &Reconciler<C, S>,
) -> Result<(), IndexerError> {
    let status = reconciler.client().fetch_daemon_status().await?;
    reconciler.store().save_daemon_status(&status)?;
    tracing::debug!(
        blockchain_length = status.blockchain_length,
        peers = status.peers_count,
        sync_status = %status.sync_status,
        "daemon status saved"
    );
    Ok(())
}

async fn prune_loop<C: NodeClient, S: LedgerStore>(
    reconciler: Arc<Reconciler<C, S>>,
    retention: u64,
    period: Duration,
    mut shutdown: ShutdownSignal,
) {
    let mut interval = ticker(period);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.triggered() => {
                tracing::info!("pruning task shutting down");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = reconciler.prune_orphans(retention).await {
                    tracing::warn!(error = %e, "orphan pruning failed");
                }
            }
        }
    }
}
