//! cairn-ctl — command-line client for Cairn storage nodes.
//!
//! Uploads a file and writes its metadata record, or reads a metadata
//! record back and downloads the file. Nodes are given as repeated
//! `--node host:port` options and named node0, node1, … in order; the
//! same node list, in the same order, must be used for download.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use cairn_core::config::CairnConfig;
use cairn_core::{FileMetadata, NodeAddress};
use cairn_services::{net, Client};

// ── Parsed command line ───────────────────────────────────────────────────────

struct CommonOpts {
    nodes: Vec<(String, u16)>,
    output: Option<PathBuf>,
}

fn split_endpoint(s: &str) -> Result<(String, u16)> {
    let (host, port) = s
        .split_once(':')
        .with_context(|| format!("--node must be host:port, got {s:?}"))?;
    let port = port
        .parse()
        .with_context(|| format!("invalid port in {s:?}"))?;
    Ok((host.to_string(), port))
}

/// Pull `--node` and `--output` options out, returning the positionals.
fn parse_opts(args: &[String]) -> Result<(CommonOpts, Vec<String>)> {
    let mut opts = CommonOpts {
        nodes: Vec::new(),
        output: None,
    };
    let mut positional = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--node" => {
                i += 1;
                let value = args.get(i).context("--node requires a value")?;
                opts.nodes.push(split_endpoint(value)?);
            }
            "--output" => {
                i += 1;
                let value = args.get(i).context("--output requires a value")?;
                opts.output = Some(PathBuf::from(value));
            }
            other => positional.push(other.to_string()),
        }
        i += 1;
    }
    Ok((opts, positional))
}

fn build_client(opts: &CommonOpts) -> Result<Client> {
    anyhow::ensure!(!opts.nodes.is_empty(), "at least one --node is required");
    let config = CairnConfig::load().unwrap_or_default();
    let mut client = Client::new(&config.client);
    for (i, (host, port)) in opts.nodes.iter().enumerate() {
        client.add_node(format!("node{i}"), host.clone(), *port);
    }
    Ok(client)
}

// ── Subcommand handlers ───────────────────────────────────────────────────────

async fn cmd_upload(opts: CommonOpts, file: &str) -> Result<()> {
    let client = build_client(&opts)?;
    let file_path = Path::new(file);

    let outcome = client
        .upload(file_path)
        .await
        .with_context(|| format!("failed to upload {file}"))?;

    if !outcome.is_complete() {
        let indices: Vec<String> = outcome.failed.iter().map(u64::to_string).collect();
        eprintln!(
            "warning: {} chunk(s) failed and were omitted from the metadata: {}",
            outcome.failed.len(),
            indices.join(", ")
        );
    }

    let metadata_path = opts
        .output
        .unwrap_or_else(|| PathBuf::from(format!("{file}.cairn")));
    let text = serde_json::to_string_pretty(&outcome.metadata)?;
    std::fs::write(&metadata_path, text)
        .with_context(|| format!("failed to write metadata to {}", metadata_path.display()))?;

    println!("File uploaded. Metadata saved to {}", metadata_path.display());
    Ok(())
}

async fn cmd_download(opts: CommonOpts, metadata_file: &str) -> Result<()> {
    let client = build_client(&opts)?;

    let text = std::fs::read_to_string(metadata_file)
        .with_context(|| format!("failed to read metadata file {metadata_file}"))?;
    let metadata: FileMetadata =
        serde_json::from_str(&text).context("failed to parse metadata file")?;

    let dest = opts.output.unwrap_or_else(|| PathBuf::from("."));
    let written = client
        .download(&metadata, &dest)
        .await
        .context("failed to download file")?;

    println!("File downloaded to {}", written.display());
    Ok(())
}

async fn cmd_ping(opts: CommonOpts) -> Result<()> {
    anyhow::ensure!(!opts.nodes.is_empty(), "at least one --node is required");
    let config = CairnConfig::load().unwrap_or_default();
    let deadline = std::time::Duration::from_secs(config.client.request_timeout_secs);

    let mut failures = 0;
    for (i, (host, port)) in opts.nodes.iter().enumerate() {
        let addr = NodeAddress::new(format!("node{i}"), host.clone(), *port);
        match net::ping(&addr, deadline).await {
            Ok(()) => println!("{host}:{port}  OK"),
            Err(e) => {
                println!("{host}:{port}  unreachable ({e})");
                failures += 1;
            }
        }
    }
    anyhow::ensure!(failures == 0, "{failures} node(s) unreachable");
    Ok(())
}

fn print_usage() {
    println!("Usage: cairn-ctl <command> [options]");
    println!();
    println!("Commands:");
    println!("  upload <file>       Upload a file; writes <file>.cairn metadata");
    println!("  download <meta>     Download the file a metadata record describes");
    println!("  ping                Check that every --node answers");
    println!();
    println!("Options:");
    println!("  --node <host:port>  Storage node (repeatable, required; order matters)");
    println!("  --output <path>     Metadata path (upload) or destination dir (download)");
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (opts, positional) = parse_opts(&args)?;

    let positional: Vec<&str> = positional.iter().map(String::as_str).collect();
    match positional.as_slice() {
        ["upload", file] => cmd_upload(opts, file).await,
        ["download", metadata] => cmd_download(opts, metadata).await,
        ["ping"] => cmd_ping(opts).await,
        ["help"] | ["--help"] | ["-h"] | [] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
