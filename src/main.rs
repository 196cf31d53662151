//! screen-relay: discover LAN screen streams and serve them over WebSocket
//!
//! Run with: screen-relay [OPTIONS]
//!
//! Examples:
//!   screen-relay                                   # scan 192.168.31.0-255, serve on 0.0.0.0:8080
//!   screen-relay --base-ip 10.0.4 --start 10 --end 60
//!   screen-relay --bind 127.0.0.1:9000 --rescan-secs 300
//!
//! Subscribers connect to ws://<host>:<port>/ws/screen.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use screen_relay::{Relay, RelayConfig, RelayServer, ScanConfig, ServerConfig};

#[derive(Debug, Parser)]
#[command(name = "screen-relay", version, about = "LAN screen-stream discovery and MJPEG relay")]
struct Args {
    /// Address the WebSocket server binds to
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Network prefix to scan, three octets
    #[arg(long, default_value = "192.168.31")]
    base_ip: String,

    /// First host suffix to scan
    #[arg(long, default_value_t = 0)]
    start: u32,

    /// Last host suffix to scan
    #[arg(long, default_value_t = 255)]
    end: u32,

    /// Addresses probed concurrently
    #[arg(long, default_value_t = 10)]
    batch_size: usize,

    /// Device probe port
    #[arg(long, default_value_t = screen_relay::scanner::DEFAULT_PROBE_PORT)]
    probe_port: u16,

    /// Device stream port
    #[arg(long, default_value_t = screen_relay::ingest::DEFAULT_STREAM_PORT)]
    stream_port: u16,

    /// Rescan the network every N seconds (0 = never)
    #[arg(long, default_value_t = 0)]
    rescan_secs: u64,

    /// Maximum concurrent subscribers (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_connections: usize,

    /// Skip the scan at startup
    #[arg(long)]
    no_initial_scan: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("screen_relay=info".parse()?),
        )
        .init();

    let scan = ScanConfig::default()
        .network(args.base_ip.clone(), args.start, args.end)
        .batch_size(args.batch_size)
        .probe_port(args.probe_port)
        .stream_port(args.stream_port);
    scan.validate()?;

    let config = RelayConfig::default().scan(scan);
    let relay = Arc::new(Relay::new(config)?);

    // Probing a full /24 takes close to a minute; serve while it runs
    let initial_scan = (!args.no_initial_scan).then(|| relay.spawn_scan_task());

    let rescan = (args.rescan_secs > 0)
        .then(|| relay.spawn_rescan_task(Duration::from_secs(args.rescan_secs)));

    let server_config = ServerConfig::default()
        .bind(args.bind)
        .max_connections(args.max_connections);
    let server = RelayServer::new(server_config, relay.clone());

    let result = server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    for task in [initial_scan, rescan].into_iter().flatten() {
        task.abort();
    }
    relay.shutdown();

    result?;
    Ok(())
}
