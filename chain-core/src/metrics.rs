//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the chain.
//!
//! # Metrics
//!
//! - `chain_transactions_submitted_total` - Transactions entering the pool
//! - `chain_transactions_rejected_total` - Pool admissions refused
//! - `chain_blocks_sealed_total` - Blocks sealed locally
//! - `chain_blocks_committed_total` - Blocks committed (local + peer)
//! - `chain_pool_size` - Current pending transaction count
//! - `chain_height` - Current chain height

use prometheus::{IntCounter, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Transactions that entered the pool
    pub transactions_submitted: IntCounter,

    /// Transactions refused at pool admission
    pub transactions_rejected: IntCounter,

    /// Blocks sealed locally
    pub blocks_sealed: IntCounter,

    /// Blocks committed, locally sealed or peer-ingested
    pub blocks_committed: IntCounter,

    /// Current pool size
    pub pool_size: IntGauge,

    /// Current chain height
    pub height: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("transactions_submitted", &self.transactions_submitted.get())
            .field("blocks_committed", &self.blocks_committed.get())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transactions_submitted = IntCounter::with_opts(Opts::new(
            "chain_transactions_submitted_total",
            "Transactions that entered the pool",
        ))?;
        registry.register(Box::new(transactions_submitted.clone()))?;

        let transactions_rejected = IntCounter::with_opts(Opts::new(
            "chain_transactions_rejected_total",
            "Transactions refused at pool admission",
        ))?;
        registry.register(Box::new(transactions_rejected.clone()))?;

        let blocks_sealed = IntCounter::with_opts(Opts::new(
            "chain_blocks_sealed_total",
            "Blocks sealed locally",
        ))?;
        registry.register(Box::new(blocks_sealed.clone()))?;

        let blocks_committed = IntCounter::with_opts(Opts::new(
            "chain_blocks_committed_total",
            "Blocks committed, locally sealed or peer-ingested",
        ))?;
        registry.register(Box::new(blocks_committed.clone()))?;

        let pool_size = IntGauge::with_opts(Opts::new(
            "chain_pool_size",
            "Current pending transaction count",
        ))?;
        registry.register(Box::new(pool_size.clone()))?;

        let height = IntGauge::with_opts(Opts::new("chain_height", "Current chain height"))?;
        registry.register(Box::new(height.clone()))?;

        Ok(Self {
            transactions_submitted,
            transactions_rejected,
            blocks_sealed,
            blocks_committed,
            pool_size,
            height,
            registry,
        })
    }

    /// Record a transaction entering the pool
    pub fn record_transaction_submitted(&self) {
        self.transactions_submitted.inc();
    }

    /// Record a refused pool admission
    pub fn record_transaction_rejected(&self) {
        self.transactions_rejected.inc();
    }

    /// Record a locally sealed block
    pub fn record_block_sealed(&self) {
        self.blocks_sealed.inc();
        self.blocks_committed.inc();
    }

    /// Record a committed peer block
    pub fn record_block_committed(&self) {
        self.blocks_committed.inc();
    }

    /// Update the pool size gauge
    pub fn update_pool_size(&self, size: usize) {
        self.pool_size.set(size as i64);
    }

    /// Update the height gauge
    pub fn update_height(&self, height: u64) {
        self.height.set(height as i64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.transactions_submitted.get(), 0);
        assert_eq!(metrics.blocks_committed.get(), 0);
    }

    #[test]
    fn test_record_transaction_submitted() {
        let metrics = Metrics::new().unwrap();
        metrics.record_transaction_submitted();
        metrics.record_transaction_submitted();
        assert_eq!(metrics.transactions_submitted.get(), 2);
    }

    #[test]
    fn test_sealed_counts_as_committed() {
        let metrics = Metrics::new().unwrap();
        metrics.record_block_sealed();
        metrics.record_block_committed();
        assert_eq!(metrics.blocks_sealed.get(), 1);
        assert_eq!(metrics.blocks_committed.get(), 2);
    }

    #[test]
    fn test_gauges() {
        let metrics = Metrics::new().unwrap();
        metrics.update_pool_size(42);
        metrics.update_height(7);
        assert_eq!(metrics.pool_size.get(), 42);
        assert_eq!(metrics.height.get(), 7);
    }
}
