//! Main ledger orchestration layer
//!
//! This module ties together storage, the chain state machine, and the
//! actor into a high-level API used by the p2p service and the node binary.
//!
//! # Example
//!
//! ```no_run
//! use chain_core::{Config, Ledger, Transaction};
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() -> chain_core::Result<()> {
//!     let config = Config::default();
//!     let ledger = Ledger::open(config).await?;
//!
//!     ledger.submit(Transaction::new("tx-1", Decimal::ONE)).await?;
//!     let block = ledger.seal_block().await?;
//!     println!("sealed {} transactions", block.transactions.len());
//!
//!     Ok(())
//! }
//! ```

use crate::{
    actor::{spawn_chain_actor, ChainHandle},
    chain::Chain,
    metrics::Metrics,
    storage::Storage,
    types::{Block, Transaction},
    Config, Error, Result,
};
use std::sync::Arc;

/// Main chain interface
#[derive(Clone, Debug)]
pub struct Ledger {
    /// Actor handle for all chain operations
    handle: ChainHandle,

    /// Metrics collector
    metrics: Metrics,
}

impl Ledger {
    /// Open the ledger: load or bootstrap the chain and spawn its actor
    pub async fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let chain = Chain::load(storage, &config)?;
        let metrics =
            Metrics::new().map_err(|e| Error::Config(format!("Metrics setup failed: {}", e)))?;
        metrics.update_height(chain.height());

        let handle = spawn_chain_actor(chain);

        Ok(Self { handle, metrics })
    }

    /// Append a locally originated transaction to the pool
    pub async fn submit(&self, tx: Transaction) -> Result<()> {
        self.handle.submit(tx).await?;
        self.metrics.record_transaction_submitted();
        self.refresh_pool_gauge().await;
        Ok(())
    }

    /// Admit a transaction into the pool with field and capacity checks.
    /// The ingress path for gossiped transactions.
    pub async fn accept_transaction(&self, tx: Transaction) -> Result<()> {
        match self.handle.accept(tx).await {
            Ok(()) => {
                self.metrics.record_transaction_submitted();
                self.refresh_pool_gauge().await;
                Ok(())
            }
            Err(e) => {
                self.metrics.record_transaction_rejected();
                Err(e)
            }
        }
    }

    /// Seal all pending transactions into a block at the tip
    pub async fn seal_block(&self) -> Result<Block> {
        let block = self.handle.seal().await?;
        self.metrics.record_block_sealed();
        self.refresh_gauges().await;
        Ok(block)
    }

    /// Validate a gossiped block against the tip and commit it
    pub async fn apply_block(&self, block: Block) -> Result<()> {
        self.handle.apply(block).await?;
        self.metrics.record_block_committed();
        self.refresh_gauges().await;
        Ok(())
    }

    /// Commit a sync block after integrity checks only
    pub async fn adopt_block(&self, block: Block) -> Result<()> {
        self.handle.adopt(block).await?;
        self.metrics.record_block_committed();
        self.refresh_gauges().await;
        Ok(())
    }

    /// Fetch the tip block
    pub async fn tip(&self) -> Result<Block> {
        self.handle.tip().await
    }

    /// Current chain height
    pub async fn height(&self) -> Result<u64> {
        self.handle.height().await
    }

    /// Current pool size
    pub async fn pool_size(&self) -> Result<usize> {
        self.handle.pool_size().await
    }

    /// Drop pool entries already committed near the tip
    pub async fn cleanup_pool(&self) -> Result<()> {
        self.handle.cleanup_pool().await?;
        self.refresh_pool_gauge().await;
        Ok(())
    }

    /// Metrics collector, for exposition
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Shutdown the chain actor
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }

    async fn refresh_pool_gauge(&self) {
        if let Ok(size) = self.handle.pool_size().await {
            self.metrics.update_pool_size(size);
        }
    }

    async fn refresh_gauges(&self) {
        self.refresh_pool_gauge().await;
        if let Ok(height) = self.handle.height().await {
            self.metrics.update_height(height);
        }
    }
}
