//! Core types for the chain
//!
//! All types are designed for:
//! - Self-describing wire serialization (serde_json, field names preserved)
//! - Deterministic digest input (field order fixed, transaction order kept)
//! - Exact arithmetic (Decimal for amounts)

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Sentinel `prev_hash` of the genesis block. Never resolves to a stored
/// block, which is what terminates backward chain walks.
pub const GENESIS_PREV_HASH: &[u8] = b"0";

/// A single transaction awaiting (or included in) a block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Caller-supplied identity; non-empty, unique within the pool
    pub id: String,

    /// Creation time (unix seconds); non-zero once accepted
    pub timestamp: i64,

    /// Transferred amount (exact decimal)
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
}

impl Transaction {
    /// Create a new transaction stamped with the current time
    pub fn new(id: impl Into<String>, amount: Decimal) -> Self {
        Self {
            id: id.into(),
            timestamp: chrono::Utc::now().timestamp(),
            amount,
        }
    }

    /// Basic field rules: non-empty id, non-zero timestamp
    pub fn is_well_formed(&self) -> bool {
        !self.id.is_empty() && self.timestamp != 0
    }
}

/// A block in the hash chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Digest over `{prev_hash, transactions, timestamp, nonce}`; the
    /// block's identity and its storage key
    pub hash: Vec<u8>,

    /// Contained transactions, in insertion order
    pub transactions: Vec<Transaction>,

    /// Hash of the preceding block (`b"0"` for genesis)
    pub prev_hash: Vec<u8>,

    /// Sealing time (unix seconds)
    pub timestamp: i64,

    /// Reserved for mining; always 0 here
    pub nonce: u64,
}

/// Digest input. Field order is part of the format and must not change.
#[derive(Serialize)]
struct DigestInput<'a> {
    prev_hash: &'a [u8],
    transactions: &'a [Transaction],
    timestamp: i64,
    nonce: u64,
}

impl Block {
    /// Build a block over `transactions` extending `prev_hash`, with the
    /// hash already computed
    pub fn seal(transactions: Vec<Transaction>, prev_hash: Vec<u8>, timestamp: i64) -> Self {
        let mut block = Self {
            hash: Vec::new(),
            transactions,
            prev_hash,
            timestamp,
            nonce: 0,
        };
        block.hash = block.compute_hash();
        block
    }

    /// The genesis block: no transactions, sentinel previous hash, fixed
    /// timestamp. Every field is constant so independent nodes agree on
    /// the genesis hash, which is what lets a fresh node accept the first
    /// gossiped block from another fresh node.
    pub fn genesis() -> Self {
        Self::seal(Vec::new(), GENESIS_PREV_HASH.to_vec(), 0)
    }

    /// Compute the block digest.
    ///
    /// SHA-256 over the JSON serialization of `{prev_hash, transactions,
    /// timestamp, nonce}`. The same function is used when sealing and when
    /// validating; transaction order is preserved bit-for-bit.
    pub fn compute_hash(&self) -> Vec<u8> {
        let input = DigestInput {
            prev_hash: &self.prev_hash,
            transactions: &self.transactions,
            timestamp: self.timestamp,
            nonce: self.nonce,
        };
        let bytes = serde_json::to_vec(&input).expect("digest input cannot fail to serialize");
        Sha256::digest(&bytes).to_vec()
    }

    /// True when the stored hash matches a recomputation of the digest
    pub fn hash_is_consistent(&self) -> bool {
        self.hash == self.compute_hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(id: &str, ts: i64) -> Transaction {
        Transaction {
            id: id.to_string(),
            timestamp: ts,
            amount: Decimal::ONE,
        }
    }

    #[test]
    fn test_transaction_well_formed() {
        assert!(tx("a", 1).is_well_formed());
        assert!(!tx("", 1).is_well_formed());
        assert!(!tx("a", 0).is_well_formed());
    }

    #[test]
    fn test_transaction_new_stamps_time() {
        let t = Transaction::new("tx-1", Decimal::ONE);
        assert_ne!(t.timestamp, 0);
        assert!(t.is_well_formed());
    }

    #[test]
    fn test_hash_deterministic() {
        let block = Block::seal(vec![tx("a", 1), tx("b", 2)], GENESIS_PREV_HASH.to_vec(), 1000);
        assert_eq!(block.hash, block.compute_hash());
        assert_eq!(block.compute_hash(), block.compute_hash());
        assert_eq!(block.hash.len(), 32);
    }

    #[test]
    fn test_hash_covers_transaction_order() {
        let forward = Block::seal(vec![tx("a", 1), tx("b", 2)], GENESIS_PREV_HASH.to_vec(), 1000);
        let reversed = Block::seal(vec![tx("b", 2), tx("a", 1)], GENESIS_PREV_HASH.to_vec(), 1000);
        assert_ne!(forward.hash, reversed.hash);
    }

    #[test]
    fn test_hash_covers_prev_hash() {
        let a = Block::seal(vec![tx("a", 1)], GENESIS_PREV_HASH.to_vec(), 1000);
        let b = Block::seal(vec![tx("a", 1)], vec![9u8; 32], 1000);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_json_round_trip_preserves_hash() {
        let block = Block::seal(
            vec![Transaction {
                id: "tx-42".to_string(),
                timestamp: 1_700_000_000,
                amount: Decimal::new(105, 2),
            }],
            GENESIS_PREV_HASH.to_vec(),
            1_700_000_001,
        );

        let bytes = serde_json::to_vec(&block).unwrap();
        let decoded: Block = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(decoded, block);
        assert!(decoded.hash_is_consistent());
    }

    #[test]
    fn test_genesis_shape() {
        let genesis = Block::genesis();
        assert!(genesis.transactions.is_empty());
        assert_eq!(genesis.prev_hash, GENESIS_PREV_HASH);
        assert_eq!(genesis.nonce, 0);
        assert!(genesis.hash_is_consistent());

        // Identical on every node
        assert_eq!(genesis, Block::genesis());
    }

    #[test]
    fn test_tampering_breaks_consistency() {
        let mut block = Block::genesis();
        block.timestamp += 1;
        assert!(!block.hash_is_consistent());
    }
}
