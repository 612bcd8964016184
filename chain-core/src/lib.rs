//! MeshLedger Chain Core
//!
//! Hash-chained block ledger with a bounded transaction pool.
//!
//! # Architecture
//!
//! - **Single Writer**: all chain/pool mutation flows through one actor task
//! - **Tip Extension Only**: blocks are only accepted at the current tip
//! - **Durable Tip**: block records and the tip pointer commit atomically
//!
//! # Invariants
//!
//! - `last_hash` always names the most recently committed block, and that
//!   block is retrievable from storage under that hash
//! - A block's hash equals the digest over `{prev_hash, transactions,
//!   timestamp, nonce}` with transaction order preserved bit-for-bit
//! - The pool never exceeds its configured capacity via `accept_into_pool`

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod chain;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use types::{Block, Transaction, GENESIS_PREV_HASH};
