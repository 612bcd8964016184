//! Wire protocol: stream labels, sync messages, and NDJSON framing
//!
//! Every payload is one JSON document terminated by `\n`. The framing is
//! self-delimiting, so no length prefix is needed and a reader can pull
//! messages off a stream one at a time.

use crate::error::{Error, Result};
use chain_core::{Block, Transaction};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Stream label for block gossip
pub const PROTOCOL_BLOCKS: &str = "/ledger/blocks/1.0.0";
/// Stream label for transaction gossip
pub const PROTOCOL_TX: &str = "/ledger/tx/1.0.0";
/// Stream label for pull-based sync
pub const PROTOCOL_SYNC: &str = "/ledger/sync/1.0.0";
/// Stream label for the connection handshake
pub const PROTOCOL_HELLO: &str = "/ledger/hello/1.0.0";

/// Maximum accepted frame length. A block of 1000 pool-capacity
/// transactions stays well under this.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Messages exchanged on a sync stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncMessage {
    /// Ask a peer for its chain height and tip hash
    HeightReq,

    /// Answer to `HeightReq`
    HeightResp {
        /// Responder's chain height
        height: u64,
        /// Responder's tip hash
        #[serde(with = "hex_bytes")]
        tip_hash: Vec<u8>,
    },

    /// Ask a peer for its tip block, naming our own tip
    BlockReq {
        /// Requester's tip hash
        #[serde(with = "hex_bytes")]
        tip_hash: Vec<u8>,
    },

    /// Answer to `BlockReq`
    BlockResp {
        /// Responder's tip block
        block: Block,
    },
}

/// Hex encoding for hash fields on the wire
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// A block gossip payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockAnnounce {
    /// The gossiped block
    pub block: Block,
}

/// A transaction gossip payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxAnnounce {
    /// The gossiped transaction
    pub transaction: Transaction,
}

/// Write one message as a JSON line and flush
pub async fn write_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut frame = serde_json::to_vec(msg)?;
    frame.push(b'\n');
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one JSON line and decode it. Returns `Ok(None)` on a clean EOF
/// before any bytes; a stream that dies mid-line is an error.
pub async fn read_message<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = String::new();
    let n = reader
        .take(MAX_FRAME_BYTES as u64)
        .read_line(&mut line)
        .await?;

    if n == 0 {
        return Ok(None);
    }
    if !line.ends_with('\n') {
        return Err(Error::UnexpectedEof);
    }

    let msg = serde_json::from_str(&line)?;
    Ok(Some(msg))
}
