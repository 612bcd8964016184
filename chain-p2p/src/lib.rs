//! MeshLedger peer-to-peer layer
//!
//! Gossip relay for blocks and transactions plus a pull-based sync
//! protocol, running over one-shot streams labelled with a protocol id.
//!
//! # Protocols
//!
//! - `/ledger/blocks/1.0.0` - one block per stream, validate-and-relay
//! - `/ledger/tx/1.0.0` - one transaction per stream, admit-and-relay
//! - `/ledger/sync/1.0.0` - request/response height and tip exchange
//!
//! All payloads are newline-delimited JSON.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;

// Re-exports
pub use error::{Error, Result};
pub use protocol::SyncMessage;
pub use service::Service;
pub use transport::{PeerAddr, PeerId, PeerTransport, TcpTransport};
