//! Error types for the chain core

use thiserror::Error;

/// Result type for chain operations
pub type Result<T> = std::result::Result<T, Error>;

/// Chain errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error (stored records)
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Block does not extend the current tip
    #[error("Invalid previous hash")]
    InvalidPrevHash,

    /// Block hash does not match a recomputation of the digest
    #[error("Invalid block hash")]
    InvalidHash,

    /// Transaction violates the field rules
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    /// Transaction pool is at capacity after cleanup
    #[error("Transaction pool full")]
    PoolFull,

    /// No pending transactions to seal into a block
    #[error("No transactions to create block")]
    EmptyPool,

    /// Block not found in storage
    #[error("Block not found: {0}")]
    BlockNotFound(String),

    /// Chain has no tip (store never initialized)
    #[error("Chain is empty")]
    EmptyChain,

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl Error {
    /// True for block validation failures that inbound handlers drop silently
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidPrevHash | Error::InvalidHash | Error::InvalidTransaction(_)
        )
    }
}
