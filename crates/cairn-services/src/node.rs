//! Storage node — accepts connections and serves the chunk protocol.
//!
//! One task per accepted connection. A connection carries any number of
//! commands: read a line, execute, write exactly one response, repeat until
//! the peer closes or the line can't be read. A bad command answers
//! `ERROR Invalid command` and keeps the connection open; a peer that
//! disconnects mid-payload ends the connection silently.
//!
//! Chunk save/load runs under `spawn_blocking` so disk I/O never blocks
//! the accept loop or other connections.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use bytes::Bytes;
use cairn_core::wire::{Request, Response, CHUNK_NOT_FOUND, INVALID_COMMAND, MAX_PAYLOAD_BYTES};
use cairn_core::NodeAddress;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};

use crate::peers::{new_peer_table, PeerEntry, PeerTable};
use crate::store::ChunkStore;

/// A storage node: chunk store plus the peers that have JOINed it.
pub struct Node {
    node_id: String,
    host: String,
    port: u16,
    store: ChunkStore,
    peers: PeerTable,
}

impl Node {
    pub fn new(
        node_id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        store: ChunkStore,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            host: host.into(),
            port,
            store,
            peers: new_peer_table(),
        }
    }

    /// The address this node announces when it JOINs another node.
    pub fn announce_addr(&self) -> NodeAddress {
        NodeAddress::new(self.node_id.clone(), self.host.clone(), self.port)
    }

    pub fn peers(&self) -> PeerTable {
        self.peers.clone()
    }

    /// Bind the configured address and serve until the process exits.
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind((self.host.as_str(), self.port))
            .await
            .with_context(|| format!("failed to bind {}:{}", self.host, self.port))?;
        self.serve(listener).await
    }

    /// Serve connections from an already-bound listener. Split out from
    /// `run` so tests can bind port 0 and learn the real address first.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr()?;
        tracing::info!(node_id = %self.node_id, addr = %local, chunks = self.store.count(), "node serving");

        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            };

            let store = self.store.clone();
            let peers = self.peers.clone();
            tokio::spawn(async move {
                tracing::debug!(peer = %peer_addr, "connection opened");
                handle_connection(stream, peer_addr, store, peers).await;
                tracing::debug!(peer = %peer_addr, "connection closed");
            });
        }
    }
}

/// What the command loop should do after executing one request.
enum Action {
    /// Write the status line and keep reading commands.
    Respond(Response),
    /// Write `OK <len>` followed by the chunk bytes, then keep reading.
    RespondChunk(Bytes),
    /// Write the status line, then close — framing can't be recovered.
    RespondClose(Response),
    /// Close without answering (peer vanished mid-payload).
    Close,
}

/// Per-connection command loop.
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    store: ChunkStore,
    peers: PeerTable,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => return, // peer closed
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(peer = %peer_addr, error = %e, "read failed, dropping connection");
                return;
            }
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let action = match Request::parse(trimmed) {
            Ok(request) => execute(request, &mut reader, &store, &peers, peer_addr).await,
            Err(_) => {
                tracing::debug!(peer = %peer_addr, line = trimmed, "unparseable command");
                Action::Respond(Response::Error(INVALID_COMMAND.into()))
            }
        };

        let written = match &action {
            Action::Respond(response) | Action::RespondClose(response) => {
                write_half.write_all(response.encode().as_bytes()).await
            }
            Action::RespondChunk(data) => {
                let status = Response::OkPayload {
                    len: data.len() as u64,
                };
                match write_half.write_all(status.encode().as_bytes()).await {
                    Ok(()) => write_half.write_all(data).await,
                    Err(e) => Err(e),
                }
            }
            Action::Close => return,
        };

        if let Err(e) = written {
            tracing::debug!(peer = %peer_addr, error = %e, "write failed, dropping connection");
            return;
        }
        if matches!(action, Action::RespondClose(_)) {
            return;
        }
    }
}

/// Execute one parsed request against the store or peer table.
async fn execute(
    request: Request,
    reader: &mut BufReader<OwnedReadHalf>,
    store: &ChunkStore,
    peers: &PeerTable,
    peer_addr: SocketAddr,
) -> Action {
    match request {
        Request::Ping => Action::Respond(Response::Ok),

        Request::Put { id, len } => {
            if len > MAX_PAYLOAD_BYTES {
                // The payload can't be skipped without reading all of it.
                tracing::warn!(peer = %peer_addr, len, "oversized PUT refused");
                return Action::RespondClose(Response::Error("Chunk too large".into()));
            }

            let mut payload = vec![0u8; len as usize];
            if let Err(e) = reader.read_exact(&mut payload).await {
                tracing::debug!(peer = %peer_addr, error = %e, "peer disconnected mid-payload");
                return Action::Close;
            }

            let store = store.clone();
            match tokio::task::spawn_blocking(move || store.save(&id, &payload)).await {
                Ok(Ok(())) => Action::Respond(Response::Ok),
                Ok(Err(e)) => {
                    tracing::error!(id = %id, error = %e, "chunk save failed");
                    Action::Respond(Response::Error("Storage failure".into()))
                }
                Err(e) => {
                    tracing::error!(error = %e, "save task panicked");
                    Action::Respond(Response::Error("Storage failure".into()))
                }
            }
        }

        Request::Get { id } => {
            let store = store.clone();
            match tokio::task::spawn_blocking(move || store.load(&id)).await {
                Ok(Ok(Some(data))) => Action::RespondChunk(data),
                Ok(Ok(None)) => Action::Respond(Response::Error(CHUNK_NOT_FOUND.into())),
                Ok(Err(e)) => {
                    tracing::error!(id = %id, error = %e, "chunk load failed");
                    Action::Respond(Response::Error(CHUNK_NOT_FOUND.into()))
                }
                Err(e) => {
                    tracing::error!(error = %e, "load task panicked");
                    Action::Respond(Response::Error(CHUNK_NOT_FOUND.into()))
                }
            }
        }

        Request::Join {
            node_id,
            host,
            port,
        } => {
            tracing::info!(peer = %peer_addr, node_id, host, port, "peer joined");
            peers.insert(
                node_id.clone(),
                PeerEntry::announced(NodeAddress::new(node_id, host, port)),
            );
            Action::Respond(Response::Ok)
        }
    }
}
