//! Status reporting: the periodic log line and the status listener.

use ledgerlink_sync_engine::{NodeHandle, NodeStats};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Logs one status line.
pub fn log_status(stats: &NodeStats, uptime: Duration) {
    let memory_mb = resident_memory_bytes().map(|b| b / (1024 * 1024));
    info!(
        connection = %stats.connection,
        relay_peers = stats.relay_peers,
        blocks = stats.blocks,
        last_index = stats.last_index,
        events = stats.events,
        servers = stats.known_servers,
        alarms = stats.alarms,
        memory_mb,
        uptime = %format_uptime(uptime),
        "status"
    );
}

/// Resident set size of this process, where the platform exposes it.
pub fn resident_memory_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    parse_statm(&statm)
}

fn parse_statm(statm: &str) -> Option<u64> {
    // Second field is resident pages.
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages * 4096)
}

/// Formats a duration as `1h 2m 3s`.
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m}m {s}s")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

/// Answers every connection with one JSON snapshot of the node's stats.
pub async fn serve(listener: TcpListener, handle: NodeHandle) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "status listener accept failed");
                continue;
            }
        };
        let stats = handle.stats();
        tokio::spawn(async move {
            if let Err(e) = respond(stream, &stats).await {
                debug!(%addr, error = %e, "status response failed");
            }
        });
    }
}

async fn respond(mut stream: TcpStream, stats: &NodeStats) -> std::io::Result<()> {
    // The request itself is irrelevant; read what is there so the client
    // does not see a reset.
    let mut buf = [0u8; 1024];
    let _ = timeout(READ_TIMEOUT, stream.read(&mut buf)).await;

    stream.write_all(render_response(stats).as_bytes()).await?;
    stream.shutdown().await
}

fn render_response(stats: &NodeStats) -> String {
    let body = serde_json::to_string(stats).unwrap_or_else(|_| "{}".into());
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}
