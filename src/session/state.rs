//! Session lifecycle states.

use std::fmt::{Display, Formatter};

use serde::Serialize;

/// Where a session is in its connect → ready → disposed lifecycle.
///
/// `Disposed` is reachable from every state and is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Constructed; no resources acquired.
    Unconnected,
    /// Port allocated, listener bound, peer launched or launching.
    Connecting,
    /// Peer connected; waiting for the handshake message.
    AwaitingHandshake,
    /// Handshake observed; the host's version check is running.
    VersionChecking,
    /// Messages may be exchanged.
    Ready,
    /// A read or write failed after `Ready`; only disposal remains.
    Faulted,
    /// All resources released.
    Disposed,
}

impl SessionState {
    /// Whether the session holds no further resources.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Disposed
    }
}

impl Display for SessionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unconnected => "unconnected",
            Self::Connecting => "connecting",
            Self::AwaitingHandshake => "awaiting_handshake",
            Self::VersionChecking => "version_checking",
            Self::Ready => "ready",
            Self::Faulted => "faulted",
            Self::Disposed => "disposed",
        };
        f.write_str(name)
    }
}
