//! Configuration for the chain core

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Chain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Transaction pool capacity
    pub max_pool_size: usize,

    /// How many blocks the pool cleanup walks back from the tip.
    /// A transaction committed further back than this is not detected as a
    /// duplicate when resubmitted; this is a documented approximation.
    pub cleanup_lookback: usize,

    /// RocksDB tuning
    pub rocksdb: RocksDbConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/chain"),
            max_pool_size: 1000,
            cleanup_lookback: 10,
            rocksdb: RocksDbConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            max_background_jobs: 2,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(size) = std::env::var("LEDGER_MAX_POOL_SIZE") {
            config.max_pool_size = size
                .parse()
                .map_err(|e| crate::Error::Config(format!("Bad LEDGER_MAX_POOL_SIZE: {}", e)))?;
        }

        if let Ok(lookback) = std::env::var("LEDGER_CLEANUP_LOOKBACK") {
            config.cleanup_lookback = lookback
                .parse()
                .map_err(|e| crate::Error::Config(format!("Bad LEDGER_CLEANUP_LOOKBACK: {}", e)))?;
        }

        Ok(config)
    }
}
