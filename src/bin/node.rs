use raftlite::{Cluster, ClusterConfig, PeerDescriptor};
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = config_from_env()?;
    info!(identifier = %config.identifier, peers = config.peers.len(), "starting node");

    let cluster = Cluster::new(config).await?;

    signal::ctrl_c()
        .await
        .expect("failed to listen for shutdown signal");

    info!("shutting down node");
    cluster.shutdown().await;
    Ok(())
}

fn config_from_env() -> anyhow::Result<ClusterConfig> {
    let identifier = std::env::var("RAFTLITE_IDENTIFIER")
        .map_err(|_| anyhow::anyhow!("RAFTLITE_IDENTIFIER must be set"))?;
    let listen_host = std::env::var("RAFTLITE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let listen_port: u16 = std::env::var("RAFTLITE_PORT")
        .unwrap_or_else(|_| "7000".to_string())
        .parse()
        .map_err(|error| anyhow::anyhow!("invalid RAFTLITE_PORT: {error}"))?;
    let peers = parse_peers_env("RAFTLITE_PEERS")?;
    let min_timeout = env_f64("RAFTLITE_MIN_TIMEOUT_SECS", 0.150);
    let max_timeout = env_f64("RAFTLITE_MAX_TIMEOUT_SECS", 0.300);

    Ok(ClusterConfig {
        identifier,
        listen_host,
        listen_port,
        peers,
        min_timeout,
        max_timeout,
        node_metadata: Default::default(),
    })
}

/// Parses entries like `RAFTLITE_PEERS=node-b=127.0.0.1:7001,node-c=127.0.0.1:7002`.
fn parse_peers_env(key: &str) -> anyhow::Result<Vec<PeerDescriptor>> {
    let raw = match std::env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(Vec::new()),
    };

    let mut peers = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (identifier, addr) = entry
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("invalid {key} entry '{entry}'"))?;
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| anyhow::anyhow!("invalid peer address '{addr}' in {key}"))?;
        let port: u16 = port
            .parse()
            .map_err(|error| anyhow::anyhow!("invalid peer port in '{addr}': {error}"))?;
        peers.push(PeerDescriptor {
            host: host.to_string(),
            port,
            identifier: identifier.to_string(),
            metadata: Default::default(),
        });
    }
    Ok(peers)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
