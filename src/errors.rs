//! Error types shared across the crate.

use std::fmt::{Display, Formatter};

/// Shared crate result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Error enumeration covering every session failure mode.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure, raised before any
    /// resource is acquired.
    Config(String),
    /// Peer executable could not be started, or exited before connecting.
    Launch(String),
    /// Peer violated the handshake or message ordering.
    Protocol(String),
    /// Peer speaks a protocol version this host does not support.
    Version(String),
    /// Stream closed, peer disconnected, or a frame was malformed.
    Transport(String),
    /// Message envelope or payload could not be (de)serialized.
    Codec(String),
    /// A configured wait bound expired.
    Timeout(String),
    /// The session's cancellation token fired during an operation.
    Cancelled(String),
    /// File-system or socket operation failure outside the framed channel.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Launch(msg) => write!(f, "launch: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Version(msg) => write!(f, "version: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Codec(msg) => write!(f, "codec: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Cancelled(msg) => write!(f, "cancelled: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
