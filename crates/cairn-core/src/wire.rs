//! Cairn wire grammar — the text protocol spoken between clients and nodes.
//!
//! These types ARE the protocol. One ASCII command line terminated by CRLF,
//! first token is the verb (case-insensitive on receive, sent upper-case),
//! space-separated arguments, then an optional raw binary payload whose
//! exact byte length is declared on the line:
//!
//!   PING                              → OK
//!   PUT <id> <len> [len bytes]        → OK | ERROR <reason>
//!   GET <id>                          → OK <len> [len bytes] | ERROR Chunk not found
//!   JOIN <node-id> <host> <port>      → OK | ERROR Invalid command
//!
//! Parsing and encoding are pure; the I/O halves live in cairn-services.

use std::fmt;

use crate::ids::ChunkId;

/// Line terminator for every command and status line.
pub const CRLF: &str = "\r\n";

/// Upper bound on a declared payload length. The line declares the length
/// before any payload byte arrives, so without a bound a single request
/// could demand an arbitrarily large allocation.
pub const MAX_PAYLOAD_BYTES: u64 = 64 * 1024 * 1024;

/// Status message for an identifier absent from a node's store.
pub const CHUNK_NOT_FOUND: &str = "Chunk not found";

/// Status message for any unparseable or unknown request line.
pub const INVALID_COMMAND: &str = "Invalid command";

/// A parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Ping,
    /// `len` raw payload bytes follow the line immediately.
    Put { id: ChunkId, len: u64 },
    Get { id: ChunkId },
    /// A peer announcing its own address.
    Join {
        node_id: String,
        host: String,
        port: u16,
    },
}

/// Any failure to understand a request line. The server answers
/// `ERROR Invalid command` and keeps the connection open.
#[derive(Debug, thiserror::Error)]
#[error("invalid command")]
pub struct WireError;

impl Request {
    /// Parse one command line (without its CRLF). Extra arguments after the
    /// ones a verb needs are ignored, matching the original protocol's
    /// `len(parts) >= n` checks.
    pub fn parse(line: &str) -> Result<Self, WireError> {
        let mut parts = line.split_whitespace();
        let verb = parts.next().ok_or(WireError)?.to_ascii_uppercase();
        let args: Vec<&str> = parts.collect();

        match verb.as_str() {
            "PING" => Ok(Request::Ping),
            "PUT" => {
                let (id, len) = match args.as_slice() {
                    [id, len, ..] => (*id, *len),
                    _ => return Err(WireError),
                };
                Ok(Request::Put {
                    id: id.parse().map_err(|_| WireError)?,
                    len: len.parse().map_err(|_| WireError)?,
                })
            }
            "GET" => {
                let id = args.first().ok_or(WireError)?;
                Ok(Request::Get {
                    id: id.parse().map_err(|_| WireError)?,
                })
            }
            "JOIN" => {
                let (node_id, host, port) = match args.as_slice() {
                    [node_id, host, port, ..] => (*node_id, *host, *port),
                    _ => return Err(WireError),
                };
                Ok(Request::Join {
                    node_id: node_id.to_string(),
                    host: host.to_string(),
                    port: port.parse().map_err(|_| WireError)?,
                })
            }
            _ => Err(WireError),
        }
    }

    /// Render the command line, CRLF included. PUT payload bytes are sent
    /// separately by the caller.
    pub fn encode(&self) -> String {
        match self {
            Request::Ping => format!("PING{CRLF}"),
            Request::Put { id, len } => format!("PUT {id} {len}{CRLF}"),
            Request::Get { id } => format!("GET {id}{CRLF}"),
            Request::Join {
                node_id,
                host,
                port,
            } => format!("JOIN {node_id} {host} {port}{CRLF}"),
        }
    }
}

/// A parsed status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok,
    /// `OK <len>` — a successful GET; `len` raw payload bytes follow.
    OkPayload { len: u64 },
    Error(String),
}

impl Response {
    /// Parse one status line (without its CRLF).
    pub fn parse(line: &str) -> Result<Self, WireError> {
        let line = line.trim_end();
        if line == "OK" {
            return Ok(Response::Ok);
        }
        if let Some(rest) = line.strip_prefix("OK ") {
            let len = rest.trim().parse().map_err(|_| WireError)?;
            return Ok(Response::OkPayload { len });
        }
        if let Some(message) = line.strip_prefix("ERROR ") {
            return Ok(Response::Error(message.to_string()));
        }
        Err(WireError)
    }

    pub fn encode(&self) -> String {
        format!("{self}{CRLF}")
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok => f.write_str("OK"),
            Response::OkPayload { len } => write!(f, "OK {len}"),
            Response::Error(message) => write!(f, "ERROR {message}"),
        }
    }
}
