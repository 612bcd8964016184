//! Peer transport: connection handshake, peer table, and stream opening
//!
//! The gossip and sync services are written against the [`PeerTransport`]
//! trait. [`TcpTransport`] is the production implementation: every TCP
//! connection starts with one JSON hello line naming the protocol the
//! stream speaks, the dialer's id, and the dialer's listen address. A
//! hello-protocol connection registers the peer and closes; any other
//! protocol hands the remainder of the stream to the service.
//!
//! [`memory::MemoryNetwork`] wires transports together in-process for
//! tests.

use crate::error::{Error, Result};
use crate::protocol::PROTOCOL_HELLO;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Maximum accepted hello line length
const MAX_HELLO_BYTES: usize = 4096;

/// Opaque peer identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    /// Wrap an identity string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identity as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A dialable peer: identity plus listen address, written `id@host:port`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddr {
    /// Peer identity
    pub id: PeerId,
    /// Listen address, `host:port`
    pub addr: String,
}

impl FromStr for PeerAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (id, addr) = s
            .split_once('@')
            .ok_or_else(|| Error::InvalidAddress(format!("Expected id@host:port, got {:?}", s)))?;
        if id.is_empty() || addr.is_empty() {
            return Err(Error::InvalidAddress(format!(
                "Expected id@host:port, got {:?}",
                s
            )));
        }
        Ok(Self {
            id: PeerId::new(id),
            addr: addr.to_string(),
        })
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.addr)
    }
}

/// Byte stream to a peer
pub trait PeerStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> PeerStream for T {}

impl fmt::Debug for dyn PeerStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PeerStream")
    }
}

/// A stream opened by a remote peer, labelled with its protocol
pub struct InboundStream {
    /// The dialing peer
    pub peer: PeerId,
    /// Protocol the stream speaks
    pub protocol: String,
    /// The stream itself, positioned after the hello line
    pub stream: Box<dyn PeerStream>,
}

impl fmt::Debug for InboundStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundStream")
            .field("peer", &self.peer)
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

/// Transport seam between the p2p service and the network
#[async_trait::async_trait]
pub trait PeerTransport: Send + Sync {
    /// Our own identity
    fn local_id(&self) -> &PeerId;

    /// Dial a peer, exchange hellos, and add it to the peer table
    async fn connect(&self, addr: &PeerAddr) -> Result<PeerId>;

    /// Peers currently in the table
    fn peers(&self) -> Vec<PeerId>;

    /// Open a fresh stream to a known peer for the given protocol
    async fn open_stream(&self, peer: &PeerId, protocol: &'static str)
        -> Result<Box<dyn PeerStream>>;
}

/// Connection header, one JSON line at stream start
#[derive(Debug, Serialize, Deserialize)]
struct Hello {
    protocol: String,
    peer_id: String,
    listen_addr: String,
}

/// TCP implementation of [`PeerTransport`]
pub struct TcpTransport {
    local_id: PeerId,
    /// Address advertised to peers in hellos
    listen_addr: String,
    /// Known peers: id -> listen address
    peers: DashMap<PeerId, String>,
}

impl fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpTransport")
            .field("local_id", &self.local_id)
            .field("listen_addr", &self.listen_addr)
            .field("peer_count", &self.peers.len())
            .finish()
    }
}

impl TcpTransport {
    /// Bind a listener and spawn the accept loop. Returns the transport
    /// and the channel inbound streams arrive on.
    pub async fn bind(
        local_id: PeerId,
        listen_addr: &str,
    ) -> Result<(Arc<Self>, mpsc::Receiver<InboundStream>)> {
        let listener = TcpListener::bind(listen_addr)
            .await
            .map_err(|e| Error::Connect(format!("Bind {} failed: {}", listen_addr, e)))?;
        let bound = listener
            .local_addr()
            .map_err(|e| Error::Connect(format!("No local addr: {}", e)))?;

        let transport = Arc::new(Self {
            local_id,
            listen_addr: bound.to_string(),
            peers: DashMap::new(),
        });

        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let accept = transport.clone();
        tokio::spawn(async move {
            accept.accept_loop(listener, inbound_tx).await;
        });

        tracing::info!(peer_id = %transport.local_id, addr = %transport.listen_addr, "Listening");

        Ok((transport, inbound_rx))
    }

    /// The address the listener actually bound (port resolved)
    pub fn listen_addr(&self) -> &str {
        &self.listen_addr
    }

    async fn accept_loop(&self, listener: TcpListener, inbound_tx: mpsc::Sender<InboundStream>) {
        loop {
            let (stream, remote) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    continue;
                }
            };

            match self.handle_connection(stream).await {
                Ok(Some(inbound)) => {
                    if inbound_tx.send(inbound).await.is_err() {
                        // Service stopped consuming; shut the loop down
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(%remote, "Dropped inbound connection: {}", e);
                }
            }
        }
    }

    /// Read the hello, register the peer, and decide what the stream is for
    async fn handle_connection(&self, mut stream: TcpStream) -> Result<Option<InboundStream>> {
        let hello = read_hello(&mut stream).await?;
        let peer = PeerId::new(hello.peer_id);

        self.peers.insert(peer.clone(), hello.listen_addr);

        if hello.protocol == PROTOCOL_HELLO {
            // Pure handshake: answer with our own hello and close
            write_hello(
                &mut stream,
                &Hello {
                    protocol: PROTOCOL_HELLO.to_string(),
                    peer_id: self.local_id.0.clone(),
                    listen_addr: self.listen_addr.clone(),
                },
            )
            .await?;
            tracing::info!(%peer, "Peer connected");
            return Ok(None);
        }

        Ok(Some(InboundStream {
            peer,
            protocol: hello.protocol,
            stream: Box::new(stream),
        }))
    }

    async fn dial(&self, addr: &str, protocol: &str) -> Result<TcpStream> {
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|e| Error::Connect(format!("Dial {} failed: {}", addr, e)))?;

        write_hello(
            &mut stream,
            &Hello {
                protocol: protocol.to_string(),
                peer_id: self.local_id.0.clone(),
                listen_addr: self.listen_addr.clone(),
            },
        )
        .await?;

        Ok(stream)
    }
}

#[async_trait::async_trait]
impl PeerTransport for TcpTransport {
    fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    async fn connect(&self, addr: &PeerAddr) -> Result<PeerId> {
        let mut stream = self.dial(&addr.addr, PROTOCOL_HELLO).await?;
        let hello = read_hello(&mut stream).await?;

        let peer = PeerId::new(hello.peer_id);
        if peer != addr.id {
            return Err(Error::Connect(format!(
                "Peer at {} identifies as {}, expected {}",
                addr.addr, peer, addr.id
            )));
        }

        self.peers.insert(peer.clone(), hello.listen_addr);
        tracing::info!(%peer, addr = %addr.addr, "Connected to peer");
        Ok(peer)
    }

    fn peers(&self) -> Vec<PeerId> {
        self.peers.iter().map(|entry| entry.key().clone()).collect()
    }

    async fn open_stream(
        &self,
        peer: &PeerId,
        protocol: &'static str,
    ) -> Result<Box<dyn PeerStream>> {
        let addr = self
            .peers
            .get(peer)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::UnknownPeer(peer.to_string()))?;

        let stream = self.dial(&addr, protocol).await?;
        Ok(Box::new(stream))
    }
}

/// Read the hello line byte by byte so nothing past it is consumed
async fn read_hello<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Hello> {
    let mut line = Vec::with_capacity(256);
    let mut byte = [0u8; 1];

    loop {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(Error::UnexpectedEof);
        }
        if byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
        if line.len() > MAX_HELLO_BYTES {
            return Err(Error::Protocol("Hello line too long".to_string()));
        }
    }

    Ok(serde_json::from_slice(&line)?)
}

async fn write_hello<S: AsyncWrite + Unpin>(stream: &mut S, hello: &Hello) -> Result<()> {
    let mut frame = serde_json::to_vec(hello)?;
    frame.push(b'\n');
    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}

/// In-process transport for tests: streams are `tokio::io::duplex` pipes
pub mod memory {
    use super::*;

    const STREAM_BUF: usize = 256 * 1024;

    struct MemoryNode {
        inbound: mpsc::Sender<InboundStream>,
        peers: Arc<DashMap<PeerId, ()>>,
    }

    /// Registry wiring in-process transports together
    #[derive(Clone, Default)]
    pub struct MemoryNetwork {
        nodes: Arc<DashMap<PeerId, MemoryNode>>,
    }

    impl fmt::Debug for MemoryNetwork {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("MemoryNetwork")
                .field("node_count", &self.nodes.len())
                .finish()
        }
    }

    impl MemoryNetwork {
        /// Fresh empty network
        pub fn new() -> Self {
            Self::default()
        }

        /// Register a node and get its transport plus inbound channel
        pub fn node(&self, id: impl Into<String>) -> (Arc<MemoryTransport>, mpsc::Receiver<InboundStream>) {
            let local_id = PeerId::new(id);
            let (inbound_tx, inbound_rx) = mpsc::channel(64);
            let peers = Arc::new(DashMap::new());

            self.nodes.insert(
                local_id.clone(),
                MemoryNode {
                    inbound: inbound_tx,
                    peers: peers.clone(),
                },
            );

            let transport = Arc::new(MemoryTransport {
                local_id,
                nodes: self.nodes.clone(),
                peers,
            });

            (transport, inbound_rx)
        }
    }

    /// In-process implementation of [`PeerTransport`]
    pub struct MemoryTransport {
        local_id: PeerId,
        nodes: Arc<DashMap<PeerId, MemoryNode>>,
        peers: Arc<DashMap<PeerId, ()>>,
    }

    impl fmt::Debug for MemoryTransport {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("MemoryTransport")
                .field("local_id", &self.local_id)
                .field("peer_count", &self.peers.len())
                .finish()
        }
    }

    #[async_trait::async_trait]
    impl PeerTransport for MemoryTransport {
        fn local_id(&self) -> &PeerId {
            &self.local_id
        }

        async fn connect(&self, addr: &PeerAddr) -> Result<PeerId> {
            let remote = self
                .nodes
                .get(&addr.id)
                .ok_or_else(|| Error::UnknownPeer(addr.id.to_string()))?;

            // Hello registration runs both ways, like the TCP handshake
            self.peers.insert(addr.id.clone(), ());
            remote.peers.insert(self.local_id.clone(), ());

            Ok(addr.id.clone())
        }

        fn peers(&self) -> Vec<PeerId> {
            self.peers.iter().map(|entry| entry.key().clone()).collect()
        }

        async fn open_stream(
            &self,
            peer: &PeerId,
            protocol: &'static str,
        ) -> Result<Box<dyn PeerStream>> {
            let remote = self
                .nodes
                .get(peer)
                .ok_or_else(|| Error::UnknownPeer(peer.to_string()))?;

            let (local_end, remote_end) = tokio::io::duplex(STREAM_BUF);
            remote
                .inbound
                .send(InboundStream {
                    peer: self.local_id.clone(),
                    protocol: protocol.to_string(),
                    stream: Box::new(remote_end),
                })
                .await
                .map_err(|_| Error::Connect(format!("Peer {} stopped accepting", peer)))?;

            Ok(Box::new(local_end))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PROTOCOL_BLOCKS;

    #[test]
    fn test_peer_addr_parse() {
        let addr: PeerAddr = "node-a@127.0.0.1:9000".parse().unwrap();
        assert_eq!(addr.id, PeerId::new("node-a"));
        assert_eq!(addr.addr, "127.0.0.1:9000");
        assert_eq!(addr.to_string(), "node-a@127.0.0.1:9000");

        assert!("no-at-sign".parse::<PeerAddr>().is_err());
        assert!("@127.0.0.1:9000".parse::<PeerAddr>().is_err());
        assert!("node-a@".parse::<PeerAddr>().is_err());
    }

    #[tokio::test]
    async fn test_tcp_handshake_registers_both_sides() {
        let (a, _rx_a) = TcpTransport::bind(PeerId::new("a"), "127.0.0.1:0").await.unwrap();
        let (b, _rx_b) = TcpTransport::bind(PeerId::new("b"), "127.0.0.1:0").await.unwrap();

        let addr = PeerAddr {
            id: PeerId::new("b"),
            addr: b.listen_addr().to_string(),
        };
        let peer = a.connect(&addr).await.unwrap();
        assert_eq!(peer, PeerId::new("b"));
        assert_eq!(a.peers(), vec![PeerId::new("b")]);

        // The accept loop on b registers a asynchronously
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(b.peers(), vec![PeerId::new("a")]);
    }

    #[tokio::test]
    async fn test_tcp_stream_carries_protocol_and_bytes() {
        let (a, _rx_a) = TcpTransport::bind(PeerId::new("a"), "127.0.0.1:0").await.unwrap();
        let (b, mut rx_b) = TcpTransport::bind(PeerId::new("b"), "127.0.0.1:0").await.unwrap();

        let addr = PeerAddr {
            id: PeerId::new("b"),
            addr: b.listen_addr().to_string(),
        };
        a.connect(&addr).await.unwrap();

        let mut stream = a.open_stream(&PeerId::new("b"), PROTOCOL_BLOCKS).await.unwrap();
        stream.write_all(b"payload\n").await.unwrap();
        stream.flush().await.unwrap();

        let mut inbound = rx_b.recv().await.unwrap();
        assert_eq!(inbound.peer, PeerId::new("a"));
        assert_eq!(inbound.protocol, PROTOCOL_BLOCKS);

        let mut buf = vec![0u8; 8];
        inbound.stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"payload\n");
    }

    #[tokio::test]
    async fn test_open_stream_to_unknown_peer() {
        let (a, _rx_a) = TcpTransport::bind(PeerId::new("a"), "127.0.0.1:0").await.unwrap();
        let err = a.open_stream(&PeerId::new("ghost"), PROTOCOL_BLOCKS).await.unwrap_err();
        assert!(matches!(err, Error::UnknownPeer(_)));
    }

    #[tokio::test]
    async fn test_memory_network_round_trip() {
        let network = memory::MemoryNetwork::new();
        let (a, _rx_a) = network.node("a");
        let (b, mut rx_b) = network.node("b");

        a.connect(&PeerAddr {
            id: PeerId::new("b"),
            addr: String::new(),
        })
        .await
        .unwrap();
        assert_eq!(a.peers(), vec![PeerId::new("b")]);
        assert_eq!(b.peers(), vec![PeerId::new("a")]);

        let mut stream = a.open_stream(&PeerId::new("b"), PROTOCOL_BLOCKS).await.unwrap();
        stream.write_all(b"hi\n").await.unwrap();

        let mut inbound = rx_b.recv().await.unwrap();
        assert_eq!(inbound.protocol, PROTOCOL_BLOCKS);
        let mut buf = vec![0u8; 3];
        inbound.stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi\n");
    }
}
