//! Prometheus metrics for the indexer.
//!
//! [`IndexerMetrics`] owns a dedicated [`Registry`]. There is no HTTP
//! surface; callers take a text snapshot with [`IndexerMetrics::encode`].

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge,
    Opts, Registry, TextEncoder,
};

use crate::IndexerError;

pub struct IndexerMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Reconciliation passes that completed.
    pub passes: IntCounter,
    /// Reconciliation passes abandoned on a client or store error.
    pub pass_failures: IntCounter,
    pub blocks_imported: IntCounter,
    pub blocks_promoted: IntCounter,
    pub blocks_orphaned: IntCounter,
    pub blocks_rolled_back: IntCounter,
    /// New-block notifications received from the subscription.
    pub notifications: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Height of the highest block in the mirror after the last pass.
    pub tip_height: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    pub pass_duration_ms: Histogram,
}

impl IndexerMetrics {
    /// Create a fresh set of metrics, all registered under a new
    /// [`Registry`].
    pub fn new() -> Result<Self, IndexerError> {
        let registry = Registry::new();

        let passes = register_int_counter_with_registry!(
            Opts::new("coda_indexer_passes_total", "Completed reconciliation passes"),
            registry
        )?;
        let pass_failures = register_int_counter_with_registry!(
            Opts::new(
                "coda_indexer_pass_failures_total",
                "Reconciliation passes abandoned on error"
            ),
            registry
        )?;
        let blocks_imported = register_int_counter_with_registry!(
            Opts::new("coda_indexer_blocks_imported_total", "Blocks exported into the mirror"),
            registry
        )?;
        let blocks_promoted = register_int_counter_with_registry!(
            Opts::new("coda_indexer_blocks_promoted_total", "Blocks marked canonical"),
            registry
        )?;
        let blocks_orphaned = register_int_counter_with_registry!(
            Opts::new("coda_indexer_blocks_orphaned_total", "Blocks marked orphaned"),
            registry
        )?;
        let blocks_rolled_back = register_int_counter_with_registry!(
            Opts::new(
                "coda_indexer_blocks_rolled_back_total",
                "Blocks physically removed from the mirror"
            ),
            registry
        )?;
        let notifications = register_int_counter_with_registry!(
            Opts::new(
                "coda_indexer_notifications_total",
                "New-block notifications received"
            ),
            registry
        )?;

        let tip_height = register_int_gauge_with_registry!(
            Opts::new("coda_indexer_tip_height", "Highest block height in the mirror"),
            registry
        )?;

        // 1 ms → ~16 s
        let pass_duration_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "coda_indexer_pass_duration_ms",
                "Reconciliation pass duration in milliseconds"
            )
            .buckets(prometheus::exponential_buckets(1.0, 2.0, 15)?),
            registry
        )?;

        Ok(Self {
            registry,
            passes,
            pass_failures,
            blocks_imported,
            blocks_promoted,
            blocks_orphaned,
            blocks_rolled_back,
            notifications,
            tip_height,
            pass_duration_ms,
        })
    }

    /// Prometheus text exposition of every registered metric.
    pub fn encode(&self) -> Result<String, IndexerError> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| IndexerError::Other(e.to_string()))
    }
}
