//! Protocol client — one TCP connection per request, never reused.
//!
//! Every call opens a connection, sends one request, reads exactly one
//! response, and closes. Failures come back as a typed `CallError` so a
//! caller can tell "remote says not found" from "could not reach remote";
//! the transfer orchestrator collapses both to "chunk unavailable".
//!
//! The whole exchange runs under one deadline. The protocol has no
//! heartbeat, so the deadline is the only defense against a peer that
//! stalls mid-payload.

use std::time::Duration;

use bytes::Bytes;
use cairn_core::wire::{Request, Response, CHUNK_NOT_FOUND, MAX_PAYLOAD_BYTES};
use cairn_core::{ChunkId, NodeAddress};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Why a protocol call failed.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("request timed out")]
    Timeout,
    #[error("chunk not found")]
    NotFound,
    #[error("remote error: {0}")]
    Remote(String),
    #[error("malformed response: {0}")]
    Protocol(String),
}

/// PING — liveness check.
pub async fn ping(addr: &NodeAddress, deadline: Duration) -> Result<(), CallError> {
    with_deadline(deadline, async {
        let mut stream = TcpStream::connect(addr.endpoint()).await?;
        stream.write_all(Request::Ping.encode().as_bytes()).await?;
        expect_ok(&mut stream).await
    })
    .await
}

/// PUT — store `data` under `id` on the node at `addr`.
pub async fn put_chunk(
    addr: &NodeAddress,
    id: &ChunkId,
    data: &[u8],
    deadline: Duration,
) -> Result<(), CallError> {
    let line = Request::Put {
        id: *id,
        len: data.len() as u64,
    }
    .encode();

    with_deadline(deadline, async {
        let mut stream = TcpStream::connect(addr.endpoint()).await?;
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(data).await?;
        expect_ok(&mut stream).await
    })
    .await
}

/// GET — fetch the bytes stored under `id` on the node at `addr`.
pub async fn get_chunk(
    addr: &NodeAddress,
    id: &ChunkId,
    deadline: Duration,
) -> Result<Bytes, CallError> {
    let line = Request::Get { id: *id }.encode();

    with_deadline(deadline, async {
        let mut stream = TcpStream::connect(addr.endpoint()).await?;
        stream.write_all(line.as_bytes()).await?;

        let mut reader = BufReader::new(stream);
        match read_status(&mut reader).await? {
            Response::OkPayload { len } if len > MAX_PAYLOAD_BYTES => Err(CallError::Protocol(
                format!("declared payload of {len} bytes exceeds limit"),
            )),
            Response::OkPayload { len } => {
                let mut payload = vec![0u8; len as usize];
                reader.read_exact(&mut payload).await?;
                Ok(Bytes::from(payload))
            }
            Response::Ok => Err(CallError::Protocol("GET answered OK without length".into())),
            Response::Error(message) if message == CHUNK_NOT_FOUND => Err(CallError::NotFound),
            Response::Error(message) => Err(CallError::Remote(message)),
        }
    })
    .await
}

/// JOIN — announce `me` to the node at `addr`.
pub async fn join(addr: &NodeAddress, me: &NodeAddress, deadline: Duration) -> Result<(), CallError> {
    let line = Request::Join {
        node_id: me.node_id.clone(),
        host: me.host.clone(),
        port: me.port,
    }
    .encode();

    with_deadline(deadline, async {
        let mut stream = TcpStream::connect(addr.endpoint()).await?;
        stream.write_all(line.as_bytes()).await?;
        expect_ok(&mut stream).await
    })
    .await
}

// ── Helpers ───────────────────────────────────────────────────────────────────

async fn with_deadline<T>(
    deadline: Duration,
    call: impl std::future::Future<Output = Result<T, CallError>>,
) -> Result<T, CallError> {
    tokio::time::timeout(deadline, call)
        .await
        .map_err(|_| CallError::Timeout)?
}

async fn read_status<R: AsyncBufReadExt + Unpin>(reader: &mut R) -> Result<Response, CallError> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(CallError::Protocol(
            "connection closed before response".into(),
        ));
    }
    Response::parse(line.trim_end())
        .map_err(|_| CallError::Protocol(format!("unparseable status line: {:?}", line.trim_end())))
}

async fn expect_ok(stream: &mut TcpStream) -> Result<(), CallError> {
    let mut reader = BufReader::new(stream);
    match read_status(&mut reader).await? {
        Response::Ok => Ok(()),
        Response::OkPayload { .. } => {
            Err(CallError::Protocol("unexpected payload response".into()))
        }
        Response::Error(message) => Err(CallError::Remote(message)),
    }
}
