//! Error taxonomy. Each failure domain has its own enum; [`Error`] wraps them at the dispatcher
//! seam, where every error ends handling of the one event that raised it.

use std::path::PathBuf;

use thiserror::Error;

/// Push transport failures (Session Registry).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no push session connected for self_id={0}")]
    NotConnected(String),
    #[error("push session for self_id={0} is closed")]
    Closed(String),
    #[error("serialize frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Pull transport failures: network error or non-2xx from the bot's HTTP endpoint. No retry.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid endpoint url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("{endpoint} request failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned status {status}")]
    Status { endpoint: String, status: u16 },
    #[error("{endpoint} response: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} rejected: status={status} retcode={retcode}")]
    Rejected {
        endpoint: String,
        status: String,
        retcode: i64,
    },
}

/// Media fetch/save failures.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("build media client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("fetch {url}: status {status}")]
    Status { url: String, status: u16 },
    #[error("fetch {url}: body exceeds {limit} bytes")]
    TooLarge { url: String, limit: usize },
    #[error("save {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Container (ISO base media) parse failures from the duration probe.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContainerError {
    #[error("moov/mvhd not found in the first {0} bytes")]
    NotFound(usize),
    #[error("box at offset {0} is truncated or does not advance the scan")]
    Truncated(usize),
    #[error("mvhd timescale is zero")]
    InvalidTimescale,
}

/// Image decode failures (before any QR scanning happens).
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("scan task: {0}")]
    Task(String),
}

/// Frame extraction (ffmpeg) failures.
#[derive(Debug, Error)]
pub enum ExternalToolError {
    #[error("spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
    },
    #[error("frames dir {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Moderation state store failures.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state db: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("state dir {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("state task: {0}")]
    Task(String),
}

/// Settings file failures. Fatal at startup only.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    ExternalTool(#[from] ExternalToolError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
