//! Actor-based concurrency for the chain
//!
//! This module implements the single-writer pattern using Tokio actors:
//! - One logical writer task owns the `Chain`, eliminating race conditions
//!   between sealing, pool admission, and peer block ingestion
//! - Async message passing with backpressure (bounded mailbox)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │        Gossip handlers / sync / periodic tasks        │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ ChainHandle (Clone)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              mpsc::channel (bounded)                  │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              ChainActor (Single Task)                 │
//! │        owns Chain { tip, height, pool }               │
//! │                       │                               │
//! │                       ▼                               │
//! │            Storage::commit_block()                    │
//! │           (atomic write to RocksDB)                   │
//! └───────────────────────────────────────────────────────┘
//! ```

use crate::{
    chain::Chain,
    types::{Block, Transaction},
    Error, Result,
};
use tokio::sync::{mpsc, oneshot};

/// Message sent to the chain actor
pub enum ChainMessage {
    /// Append a locally originated transaction (no capacity check)
    Submit {
        tx: Transaction,
        response: oneshot::Sender<Result<()>>,
    },

    /// Admit a transaction into the pool with field and capacity checks
    Accept {
        tx: Transaction,
        response: oneshot::Sender<Result<()>>,
    },

    /// Seal the pool into a new block at the tip
    Seal {
        response: oneshot::Sender<Result<Block>>,
    },

    /// Validate a gossiped block against the tip and commit it
    Apply {
        block: Block,
        response: oneshot::Sender<Result<()>>,
    },

    /// Commit a sync block after integrity checks only
    Adopt {
        block: Block,
        response: oneshot::Sender<Result<()>>,
    },

    /// Fetch the tip block
    Tip {
        response: oneshot::Sender<Result<Block>>,
    },

    /// Current chain height
    Height {
        response: oneshot::Sender<u64>,
    },

    /// Current pool size
    PoolSize {
        response: oneshot::Sender<usize>,
    },

    /// Drop pool entries already committed near the tip
    CleanupPool {
        response: oneshot::Sender<Result<()>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that processes chain messages
pub struct ChainActor {
    /// The single mutable chain instance
    chain: Chain,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<ChainMessage>,
}

impl std::fmt::Debug for ChainActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainActor").field("chain", &self.chain).finish()
    }
}

impl ChainActor {
    /// Create new actor
    pub fn new(chain: Chain, mailbox: mpsc::Receiver<ChainMessage>) -> Self {
        Self { chain, mailbox }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                ChainMessage::Shutdown => break,
                _ => self.handle_message(msg),
            }
        }
        tracing::debug!("Chain actor stopped");
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: ChainMessage) {
        match msg {
            ChainMessage::Submit { tx, response } => {
                self.chain.submit(tx);
                let _ = response.send(Ok(()));
            }

            ChainMessage::Accept { tx, response } => {
                let _ = response.send(self.chain.accept_into_pool(tx));
            }

            ChainMessage::Seal { response } => {
                let _ = response.send(self.chain.seal_block());
            }

            ChainMessage::Apply { block, response } => {
                let _ = response.send(self.chain.apply(block));
            }

            ChainMessage::Adopt { block, response } => {
                let _ = response.send(self.chain.adopt(block));
            }

            ChainMessage::Tip { response } => {
                let _ = response.send(self.chain.tip());
            }

            ChainMessage::Height { response } => {
                let _ = response.send(self.chain.height());
            }

            ChainMessage::PoolSize { response } => {
                let _ = response.send(self.chain.pool_size());
            }

            ChainMessage::CleanupPool { response } => {
                let _ = response.send(self.chain.cleanup_pool());
            }

            ChainMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct ChainHandle {
    sender: mpsc::Sender<ChainMessage>,
}

impl std::fmt::Debug for ChainMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChainMessage::Submit { .. } => "Submit",
            ChainMessage::Accept { .. } => "Accept",
            ChainMessage::Seal { .. } => "Seal",
            ChainMessage::Apply { .. } => "Apply",
            ChainMessage::Adopt { .. } => "Adopt",
            ChainMessage::Tip { .. } => "Tip",
            ChainMessage::Height { .. } => "Height",
            ChainMessage::PoolSize { .. } => "PoolSize",
            ChainMessage::CleanupPool { .. } => "CleanupPool",
            ChainMessage::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

impl ChainHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<ChainMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        msg: ChainMessage,
        rx: oneshot::Receiver<T>,
    ) -> Result<T> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Append a locally originated transaction
    pub async fn submit(&self, tx: Transaction) -> Result<()> {
        let (tx_resp, rx) = oneshot::channel();
        self.request(ChainMessage::Submit { tx, response: tx_resp }, rx)
            .await?
    }

    /// Admit a transaction into the pool
    pub async fn accept(&self, tx: Transaction) -> Result<()> {
        let (tx_resp, rx) = oneshot::channel();
        self.request(ChainMessage::Accept { tx, response: tx_resp }, rx)
            .await?
    }

    /// Seal the pool into a block
    pub async fn seal(&self) -> Result<Block> {
        let (tx_resp, rx) = oneshot::channel();
        self.request(ChainMessage::Seal { response: tx_resp }, rx).await?
    }

    /// Validate and commit a gossiped block
    pub async fn apply(&self, block: Block) -> Result<()> {
        let (tx_resp, rx) = oneshot::channel();
        self.request(ChainMessage::Apply { block, response: tx_resp }, rx)
            .await?
    }

    /// Commit a sync block (integrity checks only)
    pub async fn adopt(&self, block: Block) -> Result<()> {
        let (tx_resp, rx) = oneshot::channel();
        self.request(ChainMessage::Adopt { block, response: tx_resp }, rx)
            .await?
    }

    /// Fetch the tip block
    pub async fn tip(&self) -> Result<Block> {
        let (tx_resp, rx) = oneshot::channel();
        self.request(ChainMessage::Tip { response: tx_resp }, rx).await?
    }

    /// Current chain height
    pub async fn height(&self) -> Result<u64> {
        let (tx_resp, rx) = oneshot::channel();
        self.request(ChainMessage::Height { response: tx_resp }, rx).await
    }

    /// Current pool size
    pub async fn pool_size(&self) -> Result<usize> {
        let (tx_resp, rx) = oneshot::channel();
        self.request(ChainMessage::PoolSize { response: tx_resp }, rx).await
    }

    /// Drop pool entries already committed near the tip
    pub async fn cleanup_pool(&self) -> Result<()> {
        let (tx_resp, rx) = oneshot::channel();
        self.request(ChainMessage::CleanupPool { response: tx_resp }, rx)
            .await?
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(ChainMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the chain actor
pub fn spawn_chain_actor(chain: Chain) -> ChainHandle {
    let (tx, rx) = mpsc::channel(1000); // Bounded channel for backpressure
    let actor = ChainActor::new(chain, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    ChainHandle::new(tx)
}
