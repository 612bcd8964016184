//! Multi-node gossip and sync tests over the in-process transport

use chain_core::{Config, Ledger, Transaction};
use chain_p2p::transport::memory::MemoryNetwork;
use chain_p2p::{PeerAddr, PeerId, Service};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

async fn node(network: &MemoryNetwork, id: &str) -> (Arc<Service>, tempfile::TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();

    let ledger = Ledger::open(config).await.unwrap();
    let (transport, inbound) = network.node(id);
    let service = Service::new(ledger, transport);
    service.spawn(inbound);

    (service, temp_dir)
}

fn peer(id: &str) -> PeerAddr {
    PeerAddr {
        id: PeerId::new(id),
        addr: String::new(),
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn test_block_gossip_converges_tips() {
    let network = MemoryNetwork::new();
    let (a, _ta) = node(&network, "a").await;
    let (b, _tb) = node(&network, "b").await;

    a.connect_to_peer(&peer("b")).await.unwrap();

    a.ledger()
        .submit(Transaction::new("tx-1", Decimal::ONE))
        .await
        .unwrap();
    let block = a.ledger().seal_block().await.unwrap();
    a.broadcast_block(&block).await.unwrap();

    settle().await;

    assert_eq!(b.ledger().height().await.unwrap(), 2);
    assert_eq!(b.ledger().tip().await.unwrap().hash, block.hash);
}

#[tokio::test]
async fn test_transaction_relays_across_hops() {
    let network = MemoryNetwork::new();
    let (a, _ta) = node(&network, "a").await;
    let (b, _tb) = node(&network, "b").await;
    let (c, _tc) = node(&network, "c").await;

    // A line topology: a <-> b <-> c
    a.connect_to_peer(&peer("b")).await.unwrap();
    b.connect_to_peer(&peer("c")).await.unwrap();

    let tx = Transaction::new("hop-tx", Decimal::new(250, 2));
    a.broadcast_transaction(tx).await.unwrap();

    settle().await;

    // a holds it locally, b admitted it directly, c via b's relay
    assert_eq!(a.ledger().pool_size().await.unwrap(), 1);
    assert_eq!(b.ledger().pool_size().await.unwrap(), 1);
    assert_eq!(c.ledger().pool_size().await.unwrap(), 1);
}

#[tokio::test]
async fn test_gossip_does_not_loop_in_a_cycle() {
    let network = MemoryNetwork::new();
    let (a, _ta) = node(&network, "a").await;
    let (b, _tb) = node(&network, "b").await;
    let (c, _tc) = node(&network, "c").await;

    // Full triangle; without the seen-cache a relay storm never ends
    a.connect_to_peer(&peer("b")).await.unwrap();
    b.connect_to_peer(&peer("c")).await.unwrap();
    c.connect_to_peer(&peer("a")).await.unwrap();

    a.ledger()
        .submit(Transaction::new("tx-1", Decimal::ONE))
        .await
        .unwrap();
    let block = a.ledger().seal_block().await.unwrap();
    a.broadcast_block(&block).await.unwrap();

    settle().await;

    for service in [&a, &b, &c] {
        assert_eq!(service.ledger().height().await.unwrap(), 2);
        assert_eq!(service.ledger().tip().await.unwrap().hash, block.hash);
    }
}

#[tokio::test]
async fn test_stale_gossip_is_dropped() {
    let network = MemoryNetwork::new();
    let (a, _ta) = node(&network, "a").await;
    let (b, _tb) = node(&network, "b").await;

    a.connect_to_peer(&peer("b")).await.unwrap();

    // b advances on its own; a's block now extends a stale tip
    b.ledger()
        .submit(Transaction::new("b-tx", Decimal::ONE))
        .await
        .unwrap();
    b.ledger().seal_block().await.unwrap();
    let b_tip = b.ledger().tip().await.unwrap();

    a.ledger()
        .submit(Transaction::new("a-tx", Decimal::ONE))
        .await
        .unwrap();
    let stale = a.ledger().seal_block().await.unwrap();
    a.broadcast_block(&stale).await.unwrap();

    settle().await;

    // b kept its own tip
    assert_eq!(b.ledger().tip().await.unwrap().hash, b_tip.hash);
    assert_eq!(b.ledger().height().await.unwrap(), 2);
}

#[tokio::test]
async fn test_sync_adopts_peer_tip() {
    let network = MemoryNetwork::new();
    let (a, _ta) = node(&network, "a").await;
    let (b, _tb) = node(&network, "b").await;

    // a advances two blocks while b hears nothing
    for id in ["tx-1", "tx-2"] {
        a.ledger()
            .submit(Transaction::new(id, Decimal::ONE))
            .await
            .unwrap();
        a.ledger().seal_block().await.unwrap();
    }
    assert_eq!(a.ledger().height().await.unwrap(), 3);

    b.connect_to_peer(&peer("a")).await.unwrap();
    let adopted = b.sync_with_peer(&PeerId::new("a")).await.unwrap();
    assert!(adopted);

    // b holds a's tip block; earlier history was never transferred
    assert_eq!(
        b.ledger().tip().await.unwrap().hash,
        a.ledger().tip().await.unwrap().hash
    );
}

#[tokio::test]
async fn test_sync_noop_when_not_behind() {
    let network = MemoryNetwork::new();
    let (a, _ta) = node(&network, "a").await;
    let (b, _tb) = node(&network, "b").await;

    b.connect_to_peer(&peer("a")).await.unwrap();

    // Equal height, same genesis-era state on both sides
    let adopted = b.sync_with_peer(&PeerId::new("a")).await.unwrap();
    assert!(!adopted);
    assert_eq!(b.ledger().height().await.unwrap(), 1);
}

#[tokio::test]
async fn test_block_broadcast_without_peers_errors() {
    let network = MemoryNetwork::new();
    let (a, _ta) = node(&network, "a").await;

    a.ledger()
        .submit(Transaction::new("tx-1", Decimal::ONE))
        .await
        .unwrap();
    let block = a.ledger().seal_block().await.unwrap();

    let err = a.broadcast_block(&block).await.unwrap_err();
    assert!(matches!(err, chain_p2p::Error::NoPeersReachable));
}

#[tokio::test]
async fn test_tx_broadcast_without_peers_still_admits_locally() {
    let network = MemoryNetwork::new();
    let (a, _ta) = node(&network, "a").await;

    let sent = a
        .broadcast_transaction(Transaction::new("tx-1", Decimal::ONE))
        .await
        .unwrap();
    assert_eq!(sent, 0);
    assert_eq!(a.ledger().pool_size().await.unwrap(), 1);
}

#[tokio::test]
async fn test_tx_broadcast_rejects_malformed_locally() {
    let network = MemoryNetwork::new();
    let (a, _ta) = node(&network, "a").await;

    let bad = Transaction {
        id: String::new(),
        timestamp: 1000,
        amount: Decimal::ONE,
    };
    let err = a.broadcast_transaction(bad).await.unwrap_err();
    assert!(matches!(
        err,
        chain_p2p::Error::Ledger(chain_core::Error::InvalidTransaction(_))
    ));
}
