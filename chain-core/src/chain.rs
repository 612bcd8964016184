//! Chain state machine: tip, block construction/validation, and the
//! transaction pool.
//!
//! `Chain` is a plain synchronous struct; concurrency discipline lives in
//! the actor that owns the single instance (see `actor`).

use crate::{
    error::{Error, Result},
    storage::Storage,
    types::{Block, Transaction},
    Config,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Chain tip plus the pending-transaction pool
pub struct Chain {
    storage: Arc<Storage>,
    last_hash: Vec<u8>,
    height: u64,
    pool: Vec<Transaction>,
    max_pool_size: usize,
    cleanup_lookback: usize,
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("last_hash", &hex::encode(&self.last_hash))
            .field("height", &self.height)
            .field("pool_size", &self.pool.len())
            .finish()
    }
}

impl Chain {
    /// Load chain state from storage, creating and committing a genesis
    /// block when the store holds no tip yet.
    pub fn load(storage: Arc<Storage>, config: &Config) -> Result<Self> {
        let mut chain = Self {
            storage,
            last_hash: Vec::new(),
            height: 0,
            pool: Vec::with_capacity(config.max_pool_size),
            max_pool_size: config.max_pool_size,
            cleanup_lookback: config.cleanup_lookback,
        };

        match chain.storage.tip_hash()? {
            Some(tip) => {
                chain.last_hash = tip;
                chain.height = chain.storage.height()?;
                tracing::info!(
                    tip = %hex::encode(&chain.last_hash),
                    height = chain.height,
                    "Loaded existing chain"
                );
            }
            None => {
                chain.commit(Block::genesis())?;
                tracing::info!(tip = %hex::encode(&chain.last_hash), "Created genesis block");
            }
        }

        Ok(chain)
    }

    /// Append a locally originated transaction, backfilling a zero
    /// timestamp with the current time. No capacity check.
    pub fn submit(&mut self, mut tx: Transaction) {
        if tx.timestamp == 0 {
            tx.timestamp = chrono::Utc::now().timestamp();
        }
        self.pool.push(tx);
    }

    /// Admit a transaction into the pool, enforcing field rules and the
    /// capacity bound. At capacity the pool is cleaned first; a pool that
    /// is still full afterwards rejects with `PoolFull`.
    pub fn accept_into_pool(&mut self, tx: Transaction) -> Result<()> {
        validate_transaction(&tx)?;

        if self.pool.len() >= self.max_pool_size {
            self.cleanup_pool()?;
            if self.pool.len() >= self.max_pool_size {
                return Err(Error::PoolFull);
            }
        }

        self.pool.push(tx);
        Ok(())
    }

    /// Seal the entire pool into a block extending the tip and commit it.
    /// The pool is emptied only once the commit succeeds; a failed write
    /// leaves every pending transaction in place.
    pub fn seal_block(&mut self) -> Result<Block> {
        if self.pool.is_empty() {
            return Err(Error::EmptyPool);
        }

        tracing::debug!(tx_count = self.pool.len(), "Sealing block from pool");

        let block = Block::seal(
            self.pool.clone(),
            self.last_hash.clone(),
            chrono::Utc::now().timestamp(),
        );

        self.commit(block.clone())?;
        self.pool.clear();

        Ok(block)
    }

    /// Persist a block and advance the in-memory tip and height. Used for
    /// locally sealed blocks and for peer blocks that passed validation.
    pub fn commit(&mut self, block: Block) -> Result<()> {
        let height = self.height + 1;
        self.storage.commit_block(&block, height)?;
        self.last_hash = block.hash;
        self.height = height;
        Ok(())
    }

    /// Validate a block against the current tip:
    /// - `InvalidPrevHash` unless it extends the tip (no reorg support)
    /// - `InvalidHash` unless the digest recomputation matches
    /// - `InvalidTransaction` if any contained transaction is malformed
    pub fn validate(&self, block: &Block) -> Result<()> {
        if block.prev_hash != self.last_hash {
            return Err(Error::InvalidPrevHash);
        }
        self.check_integrity(block)
    }

    /// Validate then commit: the ingress path for gossiped blocks.
    pub fn apply(&mut self, block: Block) -> Result<()> {
        self.validate(&block)?;
        self.commit(block)
    }

    /// Sync ingress: verify the block's own integrity but not its linkage
    /// to our tip, then commit. Reconciliation with a diverged peer is only
    /// possible because the prev-hash check is skipped here.
    pub fn adopt(&mut self, block: Block) -> Result<()> {
        self.check_integrity(&block)?;
        self.commit(block)
    }

    fn check_integrity(&self, block: &Block) -> Result<()> {
        if !block.hash_is_consistent() {
            return Err(Error::InvalidHash);
        }
        for tx in &block.transactions {
            validate_transaction(tx)?;
        }
        Ok(())
    }

    /// Fetch the tip block
    pub fn tip(&self) -> Result<Block> {
        if self.last_hash.is_empty() {
            return Err(Error::EmptyChain);
        }
        self.storage.get_block(&self.last_hash)
    }

    /// Chain height (1 after genesis)
    pub fn height(&self) -> u64 {
        self.height
    }

    /// Number of pending transactions
    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    /// Drop pool entries whose id appears in one of the last
    /// `cleanup_lookback` blocks, walking backward from the tip. The walk
    /// stops early when a lookup fails (the genesis sentinel does not
    /// resolve to a stored block). Pool order is preserved.
    pub fn cleanup_pool(&mut self) -> Result<()> {
        let mut pending: HashSet<String> = self.pool.iter().map(|tx| tx.id.clone()).collect();

        let mut current = self.last_hash.clone();
        for _ in 0..self.cleanup_lookback {
            let block = match self.storage.get_block(&current) {
                Ok(block) => block,
                Err(_) => break,
            };

            for tx in &block.transactions {
                pending.remove(&tx.id);
            }

            current = block.prev_hash;
        }

        let before = self.pool.len();
        self.pool.retain(|tx| pending.contains(&tx.id));

        if before != self.pool.len() {
            tracing::debug!(
                removed = before - self.pool.len(),
                remaining = self.pool.len(),
                "Pool cleanup dropped committed transactions"
            );
        }

        Ok(())
    }
}

/// Transaction field rules shared by pool admission and block validation
pub fn validate_transaction(tx: &Transaction) -> Result<()> {
    if !tx.is_well_formed() {
        return Err(Error::InvalidTransaction(format!(
            "id {:?}, timestamp {}",
            tx.id, tx.timestamp
        )));
    }
    Ok(())
}
