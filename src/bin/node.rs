//! replikv node binary
//!
//! Runs one cluster member over TCP, in either replication mode.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use replikv::network::{MessageHandler, Server, TcpTransport, Transport};
use replikv::{
    ClusterConfig, Config, ConflictPolicy, DurableStore, FaultInjection, MasterlessNode, NodeId, PrimaryNode,
};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Elected leader, synchronous log replication
    Primary,
    /// Vector clocks, N/W/R quorums and gossip
    Masterless,
}

/// replikv node
#[derive(Parser, Debug)]
#[command(name = "replikv-node")]
#[command(about = "Replicated key-value store node")]
#[command(version)]
struct Args {
    /// Replication mode
    #[arg(long, value_enum, default_value = "primary")]
    mode: Mode,

    /// This node's id
    #[arg(long)]
    id: NodeId,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:7000")]
    listen: SocketAddr,

    /// Peer as id=host:port; repeat for each peer
    #[arg(long = "peer", value_parser = parse_peer)]
    peers: Vec<(NodeId, SocketAddr)>,

    /// Data directory
    #[arg(short, long, default_value = "./replikv_data")]
    data_dir: String,

    /// Replicas per key (masterless)
    #[arg(short = 'n', long, default_value = "3")]
    replication_factor: usize,

    /// Write quorum (masterless)
    #[arg(short = 'w', long, default_value = "2")]
    write_quorum: usize,

    /// Read quorum (masterless)
    #[arg(short = 'r', long, default_value = "2")]
    read_quorum: usize,

    /// Surface concurrent versions as errors instead of picking a winner
    #[arg(long)]
    surface_conflicts: bool,

    /// Drop this fraction of flushes requested with simulate_failure (testing only)
    #[arg(long)]
    fault_rate: Option<f64>,
}

fn parse_peer(s: &str) -> Result<(NodeId, SocketAddr), String> {
    let (id, addr) = s
        .split_once('=')
        .ok_or_else(|| format!("expected id=host:port, got {:?}", s))?;
    let id = id.parse().map_err(|e| format!("bad peer id {:?}: {}", id, e))?;
    let addr = addr.parse().map_err(|e| format!("bad peer address {:?}: {}", addr, e))?;
    Ok((id, addr))
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,replikv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("replikv node v{}", replikv::VERSION);
    tracing::info!("Node id: {} ({:?})", args.id, args.mode);
    tracing::info!("Data directory: {}", args.data_dir);
    tracing::info!("Listen address: {}", args.listen);

    if let Err(e) = run(args) {
        tracing::error!("Node failed: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Node stopped");
}

fn run(args: Args) -> replikv::Result<()> {
    let fault = match args.fault_rate {
        Some(rate) => FaultInjection::DropFlushes { rate, seed: None },
        None => FaultInjection::Disabled,
    };
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .fault_injection(fault)
        .build();
    let store = Arc::new(DurableStore::open(config)?);

    let policy = if args.surface_conflicts {
        ConflictPolicy::Surface
    } else {
        ConflictPolicy::HighestReplicaWins
    };
    let cluster = ClusterConfig::builder(args.id)
        .peers(args.peers.iter().map(|(id, _)| *id))
        .quorum(args.replication_factor, args.write_quorum, args.read_quorum)
        .conflict_policy(policy)
        .build();

    let addresses: HashMap<NodeId, SocketAddr> = args.peers.iter().copied().collect();
    let transport: Arc<dyn Transport> = Arc::new(TcpTransport::new(addresses));

    let handler: Arc<dyn MessageHandler> = match args.mode {
        Mode::Primary => {
            let node = PrimaryNode::new(cluster, Arc::clone(&store), transport)?;
            node.start()?;
            node
        }
        Mode::Masterless => {
            let node = MasterlessNode::new(cluster, Arc::clone(&store), transport)?;
            node.start()?;
            node
        }
    };

    let server = Server::bind(args.listen, handler)?;
    server.run()?;
    store.close()
}
