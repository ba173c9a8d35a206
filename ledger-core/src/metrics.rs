//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `ledger_recalculations_total` - Balance recalculations performed
//! - `ledger_recalculation_duration_seconds` - Recalculation latency
//! - `ledger_transactions_created_total` - Transactions created
//! - `ledger_transactions_deleted_total` - Transactions deleted
//! - `ledger_import_rows_total{outcome}` - Import rows by outcome
//!
//! Counters are registered against a per-instance registry rather than
//! the process-global one, so independent `Ledger` instances (and
//! parallel tests) never collide on metric names.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Balance recalculations performed
    pub recalculations_total: IntCounter,

    /// Recalculation latency histogram
    pub recalculation_duration: Histogram,

    /// Transactions created
    pub transactions_created_total: IntCounter,

    /// Transactions deleted
    pub transactions_deleted_total: IntCounter,

    /// Import rows by outcome (created/updated/skipped)
    pub import_rows_total: IntCounterVec,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let recalculations_total = IntCounter::with_opts(Opts::new(
            "ledger_recalculations_total",
            "Balance recalculations performed",
        ))?;
        registry.register(Box::new(recalculations_total.clone()))?;

        let recalculation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_recalculation_duration_seconds",
                "Balance recalculation latency",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(recalculation_duration.clone()))?;

        let transactions_created_total = IntCounter::with_opts(Opts::new(
            "ledger_transactions_created_total",
            "Transactions created",
        ))?;
        registry.register(Box::new(transactions_created_total.clone()))?;

        let transactions_deleted_total = IntCounter::with_opts(Opts::new(
            "ledger_transactions_deleted_total",
            "Transactions deleted",
        ))?;
        registry.register(Box::new(transactions_deleted_total.clone()))?;

        let import_rows_total = IntCounterVec::new(
            Opts::new("ledger_import_rows_total", "Import rows by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(import_rows_total.clone()))?;

        Ok(Self {
            recalculations_total,
            recalculation_duration,
            transactions_created_total,
            transactions_deleted_total,
            import_rows_total,
            registry,
        })
    }

    /// Record a completed recalculation
    pub fn record_recalculation(&self, duration_seconds: f64) {
        self.recalculations_total.inc();
        self.recalculation_duration.observe(duration_seconds);
    }

    /// Record an import row outcome
    pub fn record_import_row(&self, outcome: &str) {
        self.import_rows_total.with_label_values(&[outcome]).inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}
