//! Error types for the p2p layer

use thiserror::Error;

/// Result type for p2p operations
pub type Result<T> = std::result::Result<T, Error>;

/// P2p errors
#[derive(Error, Debug)]
pub enum Error {
    /// Peer address could not be parsed
    #[error("Invalid peer address: {0}")]
    InvalidAddress(String),

    /// Peer is not in the peer table
    #[error("Unknown peer: {0}")]
    UnknownPeer(String),

    /// Outbound connection failed
    #[error("Connect failed: {0}")]
    Connect(String),

    /// Stream IO error
    #[error("Stream error: {0}")]
    Stream(#[from] std::io::Error),

    /// Wire encoding or decoding failed
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Peer closed the stream before a full message arrived
    #[error("Stream closed mid-message")]
    UnexpectedEof,

    /// Broadcast reached no peer
    #[error("No peers reachable")]
    NoPeersReachable,

    /// Peer sent a message that does not fit the protocol state
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// IO deadline expired
    #[error("Operation timed out")]
    Timeout,

    /// Chain operation failed
    #[error(transparent)]
    Ledger(#[from] chain_core::Error),
}
