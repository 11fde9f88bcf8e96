//! cairnd — Cairn storage node daemon.
//!
//! Serves the chunk protocol on one TCP port and optionally announces
//! itself to an existing node at startup via JOIN.

use anyhow::{Context, Result};

use cairn_core::config::CairnConfig;
use cairn_core::NodeAddress;
use cairn_services::{net, ChunkStore, Node};

struct Args {
    node_id: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    storage_dir: Option<String>,
    join: Option<String>,
}

fn print_usage() {
    println!("Usage: cairnd [options]");
    println!();
    println!("Options:");
    println!("  --node-id <id>        Unique id for this node (default: from config)");
    println!("  --host <host>         Host to listen on (default: 127.0.0.1)");
    println!("  --port <port>         Port to listen on (default: 8000)");
    println!("  --storage-dir <dir>   Directory to store chunks");
    println!("  --join <host:port>    Announce this node to an existing node");
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        node_id: None,
        host: None,
        port: None,
        storage_dir: None,
        join: None,
    };

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let mut i = 0;
    while i < raw.len() {
        let value = |i: usize| -> Result<String> {
            raw.get(i + 1)
                .cloned()
                .with_context(|| format!("{} requires a value", raw[i]))
        };
        match raw[i].as_str() {
            "--node-id" => args.node_id = Some(value(i)?),
            "--host" => args.host = Some(value(i)?),
            "--port" => {
                args.port = Some(value(i)?.parse().context("--port must be a number")?)
            }
            "--storage-dir" => args.storage_dir = Some(value(i)?),
            "--join" => args.join = Some(value(i)?),
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown option: {other}"),
        }
        i += 2;
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = CairnConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = CairnConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        CairnConfig::default()
    });

    // Command line overrides config.
    let args = parse_args()?;
    let node_id = args.node_id.unwrap_or(config.node.node_id);
    let host = args.host.unwrap_or(config.node.host);
    let port = args.port.unwrap_or(config.node.port);
    let storage_dir = args
        .storage_dir
        .map(Into::into)
        .unwrap_or(config.node.storage_dir);

    tracing::info!(node_id, host, port, storage = %storage_dir.display(), "cairnd starting");

    let store = ChunkStore::new(&storage_dir)?;
    tracing::info!(chunks = store.count(), bytes = store.size(), "chunk store opened");

    let node = Node::new(node_id.clone(), host.clone(), port, store);
    let announce = node.announce_addr();

    // Announce ourselves to an existing node, if asked. A failed join is
    // logged but not fatal — this node still serves.
    if let Some(join_target) = args.join {
        let (join_host, join_port) = join_target
            .split_once(':')
            .context("--join must be host:port")?;
        let join_port: u16 = join_port.parse().context("--join port must be a number")?;
        let target = NodeAddress::new("remote", join_host, join_port);

        let deadline = std::time::Duration::from_secs(config.client.request_timeout_secs);
        match net::join(&target, &announce, deadline).await {
            Ok(()) => tracing::info!(target = %target.endpoint(), "joined existing node"),
            Err(e) => {
                tracing::warn!(target = %target.endpoint(), error = %e, "failed to join node")
            }
        }
    }

    let node_task = tokio::spawn(node.run());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
        result = node_task => {
            match result {
                Ok(Ok(())) => tracing::info!("node exited"),
                Ok(Err(e)) => tracing::error!(error = %e, "node failed"),
                Err(e) => tracing::error!(error = %e, "node task panicked"),
            }
        }
    }

    Ok(())
}
