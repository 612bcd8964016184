//! Gossip and sync service
//!
//! One `Service` sits between the ledger and the transport:
//!
//! - inbound block streams are validated, committed, and relayed
//! - inbound transaction streams are admitted to the pool and relayed
//! - inbound sync streams answer height and tip-block requests
//! - outbound: broadcast of locally sealed blocks and submitted
//!   transactions, and pull-based reconciliation against one peer
//!
//! A bounded seen-cache on block hashes and transaction ids keeps gossip
//! relay from looping payloads back through the mesh forever.

use crate::{
    error::{Error, Result},
    protocol::{
        read_message, write_message, BlockAnnounce, SyncMessage, TxAnnounce, PROTOCOL_BLOCKS,
        PROTOCOL_SYNC, PROTOCOL_TX,
    },
    transport::{InboundStream, PeerAddr, PeerId, PeerStream, PeerTransport},
};
use chain_core::{Block, Ledger, Transaction};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

/// Deadline on every outbound stream interaction
const IO_TIMEOUT: Duration = Duration::from_secs(10);

/// How many recently relayed keys to remember per direction
const SEEN_CACHE_CAPACITY: usize = 4096;

/// Bounded set of recently seen gossip keys with FIFO eviction
struct SeenCache {
    set: HashSet<Vec<u8>>,
    order: VecDeque<Vec<u8>>,
    capacity: usize,
}

impl SeenCache {
    fn new(capacity: usize) -> Self {
        Self {
            set: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a key. Returns false when it was already present.
    fn insert(&mut self, key: Vec<u8>) -> bool {
        if !self.set.insert(key.clone()) {
            return false;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.set.remove(&evicted);
            }
        }
        true
    }
}

/// Gossip and sync service over a [`PeerTransport`]
pub struct Service {
    ledger: Ledger,
    transport: Arc<dyn PeerTransport>,
    seen_blocks: Mutex<SeenCache>,
    seen_txs: Mutex<SeenCache>,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("local_id", self.transport.local_id())
            .finish_non_exhaustive()
    }
}

impl Service {
    /// Wire a ledger to a transport
    pub fn new(ledger: Ledger, transport: Arc<dyn PeerTransport>) -> Arc<Self> {
        Arc::new(Self {
            ledger,
            transport,
            seen_blocks: Mutex::new(SeenCache::new(SEEN_CACHE_CAPACITY)),
            seen_txs: Mutex::new(SeenCache::new(SEEN_CACHE_CAPACITY)),
        })
    }

    /// The ledger this service feeds
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Peers currently known to the transport
    pub fn peers(&self) -> Vec<PeerId> {
        self.transport.peers()
    }

    /// Dial a peer and add it to the peer table
    pub async fn connect_to_peer(&self, addr: &PeerAddr) -> Result<PeerId> {
        self.transport.connect(addr).await
    }

    /// Spawn the inbound dispatch loop
    pub fn spawn(self: &Arc<Self>, mut inbound: mpsc::Receiver<InboundStream>) {
        let service = self.clone();
        tokio::spawn(async move {
            while let Some(stream) = inbound.recv().await {
                let service = service.clone();
                tokio::spawn(async move {
                    service.dispatch(stream).await;
                });
            }
            tracing::debug!("Inbound channel closed, dispatch loop stopped");
        });
    }

    async fn dispatch(&self, inbound: InboundStream) {
        let InboundStream {
            peer,
            protocol,
            stream,
        } = inbound;

        let result = match protocol.as_str() {
            PROTOCOL_BLOCKS => self.handle_block_stream(&peer, stream).await,
            PROTOCOL_TX => self.handle_tx_stream(&peer, stream).await,
            PROTOCOL_SYNC => self.handle_sync_stream(&peer, stream).await,
            other => Err(Error::Protocol(format!("Unknown protocol {:?}", other))),
        };

        if let Err(e) = result {
            tracing::debug!(%peer, %protocol, "Stream handler ended with error: {}", e);
        }
    }

    /// Inbound block: de-dup, validate against the tip, commit, relay
    async fn handle_block_stream(&self, peer: &PeerId, stream: Box<dyn PeerStream>) -> Result<()> {
        let mut reader = BufReader::new(stream);
        let announce: BlockAnnounce = match read_message(&mut reader).await? {
            Some(msg) => msg,
            None => return Ok(()),
        };

        let block = announce.block;
        if !self.seen_blocks.lock().insert(block.hash.clone()) {
            return Ok(());
        }

        match self.ledger.apply_block(block.clone()).await {
            Ok(()) => {
                tracing::info!(
                    %peer,
                    hash = %hex::encode(&block.hash),
                    tx_count = block.transactions.len(),
                    "Accepted gossiped block"
                );
                self.relay_block(&block, Some(peer)).await;
                Ok(())
            }
            Err(chain_core::Error::InvalidPrevHash)
            | Err(chain_core::Error::InvalidHash)
            | Err(chain_core::Error::InvalidTransaction(_)) => {
                // Stale or corrupt gossip is dropped, not relayed
                tracing::debug!(%peer, hash = %hex::encode(&block.hash), "Rejected gossiped block");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Inbound transaction: de-dup, admit to the pool, relay
    async fn handle_tx_stream(&self, peer: &PeerId, stream: Box<dyn PeerStream>) -> Result<()> {
        let mut reader = BufReader::new(stream);
        let announce: TxAnnounce = match read_message(&mut reader).await? {
            Some(msg) => msg,
            None => return Ok(()),
        };

        let tx = announce.transaction;
        if !self.seen_txs.lock().insert(tx.id.clone().into_bytes()) {
            return Ok(());
        }

        match self.ledger.accept_transaction(tx.clone()).await {
            Ok(()) => {
                tracing::debug!(%peer, tx_id = %tx.id, "Accepted gossiped transaction");
                self.relay_tx(&tx, Some(peer)).await;
                Ok(())
            }
            Err(chain_core::Error::PoolFull) | Err(chain_core::Error::InvalidTransaction(_)) => {
                tracing::debug!(%peer, tx_id = %tx.id, "Rejected gossiped transaction");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Inbound sync: answer height and tip-block requests until EOF
    async fn handle_sync_stream(&self, peer: &PeerId, stream: Box<dyn PeerStream>) -> Result<()> {
        let mut stream = BufReader::new(stream);

        loop {
            let msg: SyncMessage = match read_message(&mut stream).await? {
                Some(msg) => msg,
                None => return Ok(()),
            };

            match msg {
                SyncMessage::HeightReq => {
                    let height = self.ledger.height().await?;
                    let tip = self.ledger.tip().await?;
                    write_message(
                        stream.get_mut(),
                        &SyncMessage::HeightResp {
                            height,
                            tip_hash: tip.hash,
                        },
                    )
                    .await?;
                }
                SyncMessage::BlockReq { tip_hash } => {
                    let tip = self.ledger.tip().await?;
                    tracing::debug!(
                        %peer,
                        behind = %hex::encode(&tip_hash),
                        "Serving tip block"
                    );
                    write_message(stream.get_mut(), &SyncMessage::BlockResp { block: tip }).await?;
                }
                other => {
                    return Err(Error::Protocol(format!(
                        "Unexpected {:?} from {} on sync stream",
                        other, peer
                    )));
                }
            }
        }
    }

    /// Announce a locally sealed block to every peer.
    /// Errors only when not a single peer received it.
    pub async fn broadcast_block(&self, block: &Block) -> Result<usize> {
        self.seen_blocks.lock().insert(block.hash.clone());
        let sent = self.relay_block(block, None).await;
        if sent == 0 {
            return Err(Error::NoPeersReachable);
        }
        Ok(sent)
    }

    /// Admit a transaction to the local pool, then best-effort gossip it.
    /// Fails fast on local rejection; individual peer failures only
    /// reduce the returned send count.
    pub async fn broadcast_transaction(&self, tx: Transaction) -> Result<usize> {
        self.ledger.accept_transaction(tx.clone()).await?;
        self.seen_txs.lock().insert(tx.id.clone().into_bytes());
        Ok(self.relay_tx(&tx, None).await)
    }

    async fn relay_block(&self, block: &Block, skip: Option<&PeerId>) -> usize {
        let announce = BlockAnnounce {
            block: block.clone(),
        };
        self.fan_out(PROTOCOL_BLOCKS, &announce, skip).await
    }

    async fn relay_tx(&self, tx: &Transaction, skip: Option<&PeerId>) -> usize {
        let announce = TxAnnounce {
            transaction: tx.clone(),
        };
        self.fan_out(PROTOCOL_TX, &announce, skip).await
    }

    /// Send one message to every known peer except `skip`. Per-peer
    /// failures are logged and counted, never fatal.
    async fn fan_out<T: serde::Serialize>(
        &self,
        protocol: &'static str,
        msg: &T,
        skip: Option<&PeerId>,
    ) -> usize {
        let mut sent = 0;
        for peer in self.transport.peers() {
            if Some(&peer) == skip {
                continue;
            }
            match self.send_to(&peer, protocol, msg).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    tracing::warn!(%peer, %protocol, "Send failed: {}", e);
                }
            }
        }
        sent
    }

    async fn send_to<T: serde::Serialize>(
        &self,
        peer: &PeerId,
        protocol: &'static str,
        msg: &T,
    ) -> Result<()> {
        let mut stream = timeout(IO_TIMEOUT, self.transport.open_stream(peer, protocol))
            .await
            .map_err(|_| Error::Timeout)??;
        timeout(IO_TIMEOUT, write_message(&mut stream, msg))
            .await
            .map_err(|_| Error::Timeout)??;
        Ok(())
    }

    /// Pull-based reconciliation against one peer: compare heights, and
    /// adopt the peer's tip when it is ahead of us on a different hash.
    /// Returns true when a block was adopted.
    pub async fn sync_with_peer(&self, peer: &PeerId) -> Result<bool> {
        let stream = timeout(IO_TIMEOUT, self.transport.open_stream(peer, PROTOCOL_SYNC))
            .await
            .map_err(|_| Error::Timeout)??;
        let mut stream = BufReader::new(stream);

        write_message(stream.get_mut(), &SyncMessage::HeightReq).await?;
        let resp = timeout(IO_TIMEOUT, read_message::<_, SyncMessage>(&mut stream))
            .await
            .map_err(|_| Error::Timeout)??;

        let (peer_height, peer_tip) = match resp {
            Some(SyncMessage::HeightResp { height, tip_hash }) => (height, tip_hash),
            Some(other) => {
                return Err(Error::Protocol(format!(
                    "Expected HEIGHT_RESP, got {:?}",
                    other
                )))
            }
            None => return Err(Error::UnexpectedEof),
        };

        let local_height = self.ledger.height().await?;
        let local_tip = self.ledger.tip().await?;
        if peer_height <= local_height || peer_tip == local_tip.hash {
            return Ok(false);
        }

        tracing::info!(
            %peer,
            local_height,
            peer_height,
            "Peer is ahead, requesting tip block"
        );

        write_message(
            stream.get_mut(),
            &SyncMessage::BlockReq {
                tip_hash: local_tip.hash,
            },
        )
        .await?;
        let resp = timeout(IO_TIMEOUT, read_message::<_, SyncMessage>(&mut stream))
            .await
            .map_err(|_| Error::Timeout)??;

        let block = match resp {
            Some(SyncMessage::BlockResp { block }) => block,
            Some(other) => {
                return Err(Error::Protocol(format!(
                    "Expected BLOCK_RESP, got {:?}",
                    other
                )))
            }
            None => return Err(Error::UnexpectedEof),
        };

        self.ledger.adopt_block(block.clone()).await?;
        self.seen_blocks.lock().insert(block.hash.clone());

        tracing::info!(
            %peer,
            hash = %hex::encode(&block.hash),
            "Adopted peer tip"
        );

        Ok(true)
    }

    /// Run one sync round against every known peer
    pub async fn sync_round(&self) {
        for peer in self.transport.peers() {
            if let Err(e) = self.sync_with_peer(&peer).await {
                tracing::warn!(%peer, "Sync failed: {}", e);
            }
        }
    }
}
