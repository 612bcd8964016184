//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `blocks` - Committed blocks (key: block hash)
//! - `meta` - Chain metadata (`"lh"`: tip hash, `"height"`: u64 BE)

use crate::{
    error::{Error, Result},
    types::Block,
    Config,
};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Options, WriteBatch, DB};
use std::sync::Arc;

/// Column family names
const CF_BLOCKS: &str = "blocks";
const CF_META: &str = "meta";

/// Fixed key holding the current tip hash
const KEY_TIP: &[u8] = b"lh";
/// Fixed key holding the chain height
const KEY_HEIGHT: &[u8] = b"height";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

impl Storage {
    /// Open or create the database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_BLOCKS, Self::cf_options_blocks()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB at {:?}", path);

        Ok(Self { db: Arc::new(db) })
    }

    /// Open an existing database without write access. Reads behave
    /// normally; any write returns a storage error.
    #[cfg(test)]
    pub(crate) fn open_read_only(config: &Config) -> Result<Self> {
        let db = DB::open_cf_for_read_only(
            &Options::default(),
            &config.data_dir,
            [CF_BLOCKS, CF_META],
            false,
        )?;
        Ok(Self { db: Arc::new(db) })
    }

    fn cf_options_blocks() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    /// Get a block by its hash
    pub fn get_block(&self, hash: &[u8]) -> Result<Block> {
        let cf = self.cf_handle(CF_BLOCKS)?;

        let value = self
            .db
            .get_cf(cf, hash)?
            .ok_or_else(|| Error::BlockNotFound(hex::encode(hash)))?;

        let block: Block = bincode::deserialize(&value)?;
        Ok(block)
    }

    /// Read the current tip hash, if the chain has been initialized
    pub fn tip_hash(&self) -> Result<Option<Vec<u8>>> {
        let cf = self.cf_handle(CF_META)?;
        Ok(self.db.get_cf(cf, KEY_TIP)?)
    }

    /// Read the chain height (0 when uninitialized)
    pub fn height(&self) -> Result<u64> {
        let cf = self.cf_handle(CF_META)?;
        match self.db.get_cf(cf, KEY_HEIGHT)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage("Corrupt height entry".to_string()))?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }

    /// Commit a block: the block record, the tip pointer and the height
    /// update apply in one atomic write batch, or not at all.
    pub fn commit_block(&self, block: &Block, height: u64) -> Result<()> {
        let cf_blocks = self.cf_handle(CF_BLOCKS)?;
        let cf_meta = self.cf_handle(CF_META)?;

        let value = bincode::serialize(block)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(cf_blocks, &block.hash, &value);
        batch.put_cf(cf_meta, KEY_TIP, &block.hash);
        batch.put_cf(cf_meta, KEY_HEIGHT, height.to_be_bytes());

        self.db.write(batch)?;

        tracing::debug!(
            hash = %hex::encode(&block.hash),
            height,
            tx_count = block.transactions.len(),
            "Block committed"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Transaction, GENESIS_PREV_HASH};
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn test_block() -> Block {
        Block::seal(
            vec![Transaction {
                id: "tx-1".to_string(),
                timestamp: 1000,
                amount: Decimal::ONE,
            }],
            GENESIS_PREV_HASH.to_vec(),
            1001,
        )
    }

    #[test]
    fn test_open_fresh_store_has_no_tip() {
        let (storage, _temp) = test_storage();
        assert!(storage.tip_hash().unwrap().is_none());
        assert_eq!(storage.height().unwrap(), 0);
    }

    #[test]
    fn test_commit_and_get_block() {
        let (storage, _temp) = test_storage();
        let block = test_block();

        storage.commit_block(&block, 1).unwrap();

        let loaded = storage.get_block(&block.hash).unwrap();
        assert_eq!(loaded, block);
        assert_eq!(storage.tip_hash().unwrap().unwrap(), block.hash);
        assert_eq!(storage.height().unwrap(), 1);
    }

    #[test]
    fn test_get_missing_block() {
        let (storage, _temp) = test_storage();
        let err = storage.get_block(b"nope").unwrap_err();
        assert!(matches!(err, Error::BlockNotFound(_)));
    }

    #[test]
    fn test_commit_advances_tip() {
        let (storage, _temp) = test_storage();
        let first = test_block();
        storage.commit_block(&first, 1).unwrap();

        let second = Block::seal(Vec::new(), first.hash.clone(), 1002);
        storage.commit_block(&second, 2).unwrap();

        assert_eq!(storage.tip_hash().unwrap().unwrap(), second.hash);
        assert_eq!(storage.height().unwrap(), 2);
        // Both blocks remain retrievable
        assert_eq!(storage.get_block(&first.hash).unwrap(), first);
        assert_eq!(storage.get_block(&second.hash).unwrap(), second);
    }
}
