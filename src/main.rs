//! Chronomesh node binary.
//!
//! Binds a UDP socket, joins the mesh through an optional bootstrap peer,
//! and runs the synchronization, proof, and consensus tasks until ctrl-c.

use chronomesh::node::{Node, NodeConfig};
use chronomesh::types::{DEFAULT_FAULT_TOLERANCE, SHARED_KEY_MIN_BYTES, UNCERTAINTY_WINDOW_SECS};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "chronomesh", version, about = "Chronomesh: decentralized secure clock sync")]
struct Args {
    /// Bind address
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Listen port
    #[arg(short, long, default_value = "9100")]
    port: u16,

    /// Bootstrap peer (host:port) to join through
    #[arg(short, long)]
    bootstrap: Option<SocketAddr>,

    /// Archival (data-availability) layer base URL
    #[arg(long, default_value = "http://127.0.0.1:8900")]
    da_url: String,

    /// Mesh-wide shared HMAC key, hex-encoded, at least 32 bytes.
    /// Must be identical on every node in the mesh.
    #[arg(long)]
    shared_key: String,

    /// Fault tolerance F: the sample window holds 2F + 1 entries
    #[arg(long, default_value_t = DEFAULT_FAULT_TOLERANCE)]
    fault_tolerance: usize,

    /// Uncertainty half-width in milliseconds
    #[arg(long)]
    uncertainty_ms: Option<f64>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chronomesh=info".parse().expect("static directive")),
        )
        .init();

    let args = Args::parse();

    let shared_key = match hex::decode(&args.shared_key) {
        Ok(key) if key.len() >= SHARED_KEY_MIN_BYTES => key,
        Ok(key) => {
            error!(
                "--shared-key must be at least {} bytes, got {}",
                SHARED_KEY_MIN_BYTES,
                key.len()
            );
            return;
        }
        Err(e) => {
            error!("--shared-key is not valid hex: {}", e);
            return;
        }
    };

    let mut config = NodeConfig::new(SocketAddr::new(args.host, args.port), shared_key);
    config.bootstrap = args.bootstrap;
    config.da_url = args.da_url;
    config.fault_tolerance = args.fault_tolerance;
    config.uncertainty = args
        .uncertainty_ms
        .map(|ms| ms / 1000.0)
        .unwrap_or(UNCERTAINTY_WINDOW_SECS);

    let node = match Node::new(config).await {
        Ok(node) => Arc::new(node),
        Err(e) => {
            error!("failed to create node: {}", e);
            return;
        }
    };

    info!("════════════════════════════════════════════════════════════");
    info!("  Chronomesh v{} | secure clock synchronization", VERSION);
    info!("════════════════════════════════════════════════════════════");
    info!(
        "Node id: {}… | Listening on {}:{}",
        &node.node_id()[..16],
        args.host,
        args.port
    );
    if let Some(peer) = args.bootstrap {
        info!("Bootstrap peer: {}", peer);
    }

    node.start().await;

    // Status printer
    let status_node = node.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            let snapshot = status_node.engine().snapshot();
            let (lower, upper) = status_node.get_current_time();
            info!(
                "Status: {} peers | window {} | time [{:.3}, {:.3}] | rejects {:?}",
                snapshot.peers.len(),
                snapshot.window.len(),
                lower,
                upper,
                snapshot.counters
            );
        }
    });

    info!("Chronomesh running. Waiting for peers...");

    tokio::signal::ctrl_c().await.ok();
    info!("Shutting down...");
    node.shutdown().await;
}
