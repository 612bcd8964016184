//! MeshLedger node binary
//!
//! Wires the chain to the TCP transport and runs the periodic duty cycle:
//! generate a demo transaction every 10s, seal every 30s, report status
//! every 5s, sync against peers every 30s, clean the pool every 60s. An
//! optional bootstrap peer is dialed and synced against at startup.
//!
//! # Environment
//!
//! - `NODE_ID` - peer identity (default: `node-<pid>`)
//! - `NODE_LISTEN_ADDR` - listen address (default: `127.0.0.1:9000`)
//! - `NODE_PEER` - optional bootstrap peer, `id@host:port`
//! - `LEDGER_DATA_DIR`, `LEDGER_MAX_POOL_SIZE`, `LEDGER_CLEANUP_LOOKBACK`
//!   - chain configuration (see `chain_core::Config`)

use anyhow::Context;
use chain_core::{Config, Ledger, Transaction};
use chain_p2p::{PeerAddr, PeerId, Service, TcpTransport};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

const TX_INTERVAL: Duration = Duration::from_secs(10);
const SEAL_INTERVAL: Duration = Duration::from_secs(30);
const REPORT_INTERVAL: Duration = Duration::from_secs(5);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
const SYNC_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let node_id = std::env::var("NODE_ID")
        .unwrap_or_else(|_| format!("node-{}", std::process::id()));
    let listen_addr =
        std::env::var("NODE_LISTEN_ADDR").unwrap_or_else(|_| "127.0.0.1:9000".to_string());

    tracing::info!(%node_id, %listen_addr, "Starting MeshLedger node");

    let config = Config::from_env().context("Bad chain configuration")?;
    let ledger = Ledger::open(config).await.context("Failed to open ledger")?;
    tracing::info!(height = ledger.height().await?, "Chain ready");

    let (transport, inbound) = TcpTransport::bind(PeerId::new(node_id), &listen_addr)
        .await
        .context("Failed to bind transport")?;

    let service = Service::new(ledger, transport);
    service.spawn(inbound);

    if let Ok(bootstrap) = std::env::var("NODE_PEER") {
        let addr: PeerAddr = bootstrap.parse().context("Bad NODE_PEER")?;
        let peer = service
            .connect_to_peer(&addr)
            .await
            .context("Failed to reach bootstrap peer")?;
        if let Err(e) = service.sync_with_peer(&peer).await {
            tracing::warn!(%peer, "Startup sync failed: {}", e);
        }
    }

    spawn_tx_generator(service.clone());
    spawn_sealer(service.clone());
    spawn_reporter(service.clone());
    spawn_cleaner(service.clone());
    spawn_syncer(service.clone());

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    Ok(())
}

/// Submit and gossip one demo transaction per tick
fn spawn_tx_generator(service: Arc<Service>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(TX_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;

            let tx = Transaction::new(
                format!("tx-{}", chrono::Utc::now().timestamp()),
                Decimal::ONE,
            );
            let tx_id = tx.id.clone();
            match service.broadcast_transaction(tx).await {
                Ok(sent) => tracing::info!(%tx_id, peers = sent, "Generated transaction"),
                Err(e) => tracing::warn!(%tx_id, "Transaction rejected: {}", e),
            }
        }
    });
}

/// Seal the pool into a block per tick and gossip it
fn spawn_sealer(service: Arc<Service>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SEAL_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;

            let block = match service.ledger().seal_block().await {
                Ok(block) => block,
                Err(chain_core::Error::EmptyPool) => continue,
                Err(e) => {
                    tracing::error!("Seal failed: {}", e);
                    continue;
                }
            };
            tracing::info!(tx_count = block.transactions.len(), "Sealed block");

            match service.broadcast_block(&block).await {
                Ok(sent) => tracing::debug!(peers = sent, "Gossiped block"),
                Err(chain_p2p::Error::NoPeersReachable) => {}
                Err(e) => tracing::warn!("Block gossip failed: {}", e),
            }
        }
    });
}

/// Log a status line per tick
fn spawn_reporter(service: Arc<Service>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(REPORT_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;

            let peers = service.peers().len();
            let pool = service.ledger().pool_size().await.unwrap_or(0);
            let height = service.ledger().height().await.unwrap_or(0);
            tracing::info!(peers, pool, height, "Status");
        }
    });
}

/// Reconcile against every known peer per tick; a no-op when nobody
/// is ahead of us
fn spawn_syncer(service: Arc<Service>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SYNC_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            service.sync_round().await;
        }
    });
}

/// Drop committed duplicates from the pool per tick
fn spawn_cleaner(service: Arc<Service>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;

            if let Err(e) = service.ledger().cleanup_pool().await {
                tracing::warn!("Pool cleanup failed: {}", e);
            }
        }
    });
}
