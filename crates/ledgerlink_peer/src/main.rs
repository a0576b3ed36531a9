//! LedgerLink headless peer
//!
//! An always-on node that keeps a ledger replica, answers sync requests
//! and gossips server records through a relay.
//!
//! # Background work
//!
//! - Relay session with reconnect, keepalive and downgrade monitoring
//! - Status line every 60 seconds
//! - Replicated store sweep every 120 seconds
//! - A status listener answering each connection with a JSON snapshot

mod status;
mod sweep;

use clap::Parser;
use ledgerlink_storage::DataDir;
use ledgerlink_sync_engine::{
    IngestPolicy, MemoryStore, Node, NodeConfig, NodeStores, RelayDriver, DEFAULT_API_URL,
    DEFAULT_RELAY_URL, DEFAULT_STORE_URL,
};
use ledgerlink_sync_protocol::DEFAULT_ROOM;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::oneshot;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const STATUS_INTERVAL: Duration = Duration::from_secs(60);
const SWEEP_INTERVAL: Duration = Duration::from_secs(120);

/// Headless LedgerLink peer.
#[derive(Parser, Debug)]
#[command(name = "ledgerlink-peer")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Relay WebSocket URL
    #[arg(long, default_value = DEFAULT_RELAY_URL)]
    ws: String,

    /// Replicated store peer URL
    #[arg(long, alias = "gun", default_value = DEFAULT_STORE_URL)]
    store: String,

    /// HTTP API base URL advertised to other peers
    #[arg(long, default_value = DEFAULT_API_URL)]
    api: String,

    /// Data directory
    #[arg(long, default_value = "./peer-data")]
    data: PathBuf,

    /// Relay room to join
    #[arg(long, default_value = DEFAULT_ROOM)]
    room: String,

    /// Address for the status listener
    #[arg(long, default_value = "127.0.0.1:0")]
    status_addr: SocketAddr,

    /// Maximum number of blocks to keep
    #[arg(long)]
    max_blocks: Option<usize>,

    /// Maximum number of events to keep
    #[arg(long)]
    max_events: Option<usize>,

    /// Store peer blocks without recomputing their hash
    #[arg(long)]
    accept_unverified: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn node_config(&self, peer_id: String) -> NodeConfig {
        let mut config = NodeConfig::new(peer_id)
            .with_relay_url(&self.ws)
            .with_store_url(&self.store)
            .with_api_url(&self.api)
            .with_room(&self.room);
        if let Some(max) = self.max_blocks {
            config = config.with_max_blocks(max);
        }
        if let Some(max) = self.max_events {
            config = config.with_max_events(max);
        }
        if self.accept_unverified {
            config = config.with_ingest_policy(IngestPolicy::AcceptAll);
        }
        config
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic| {
        let location = panic
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        error!(%location, "panic: {panic}");
    }));
}

fn random_peer_id() -> String {
    format!("peer-{:08x}", rand::random::<u32>())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    install_panic_hook();

    let dir = DataDir::open(&cli.data, true)?;
    let store = Arc::new(MemoryStore::new());
    let peer_id = random_peer_id();
    let node = Node::open(cli.node_config(peer_id), NodeStores::in_dir(&dir))
        .with_content_store(store.clone());
    info!(
        peer = %node.peer_id(),
        data = %dir.path().display(),
        relay = %cli.ws,
        store = %cli.store,
        "starting headless peer"
    );

    let listener = TcpListener::bind(cli.status_addr).await?;
    info!(addr = %listener.local_addr()?, "status listener ready");

    let (driver, handle) = RelayDriver::new(node);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let driver_task = tokio::spawn(driver.run(async {
        let _ = stop_rx.await;
    }));
    let status_task = tokio::spawn(status::serve(listener, handle.clone()));

    let started = Instant::now();
    let mut status_tick = interval_at(started + STATUS_INTERVAL, STATUS_INTERVAL);
    status_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sweep_tick = interval_at(started + SWEEP_INTERVAL, SWEEP_INTERVAL);
    sweep_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    error!(error = %e, "could not listen for ctrl-c");
                }
                info!("shutting down");
                break;
            }
            _ = status_tick.tick() => {
                status::log_status(&handle.stats(), started.elapsed());
            }
            _ = sweep_tick.tick() => {
                tokio::spawn(sweep::run(store.clone(), handle.clone()));
            }
        }
    }

    let _ = stop_tx.send(());
    status_task.abort();
    match driver_task.await {
        Ok(node) => info!(
            blocks = node.ledger().len(),
            events = node.events().len(),
            servers = node.directory().len(),
            "stopped"
        ),
        Err(e) => warn!(error = %e, "relay driver ended abnormally"),
    }
    drop(dir);
    Ok(())
}
