//! `dotnet vstest` design-mode host.
//!
//! The peer is started as `dotnet vstest --Port:<port> --ParentProcessId:<pid>`
//! and connects back to the session. After the handshake the client offers
//! the highest protocol version it supports; the peer answers with the
//! version it will use, which must be between 1 and the offered version.

use tracing::info;

use crate::protocol::message_type::PROTOCOL_VERSION;
use crate::session::{MessageChannel, TestHost, VersionCheckFuture};
use crate::{AppError, Result};

/// Highest protocol version this crate speaks by default.
pub const DEFAULT_PROTOCOL_VERSION: u32 = 1;

/// Design-mode `vstest` host variant.
#[derive(Debug, Clone)]
pub struct VsTestHost {
    protocol_version: u32,
}

impl VsTestHost {
    /// Host offering [`DEFAULT_PROTOCOL_VERSION`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            protocol_version: DEFAULT_PROTOCOL_VERSION,
        }
    }

    /// Host offering `version` during the version check.
    #[must_use]
    pub fn with_protocol_version(version: u32) -> Self {
        Self {
            protocol_version: version,
        }
    }

    /// Version offered during the version check.
    #[must_use]
    pub fn protocol_version(&self) -> u32 {
        self.protocol_version
    }
}

impl Default for VsTestHost {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHost for VsTestHost {
    fn launch_arguments(&self, port: u16, parent_process_id: u32) -> Vec<String> {
        vec![
            "vstest".to_owned(),
            format!("--Port:{port}"),
            format!("--ParentProcessId:{parent_process_id}"),
        ]
    }

    fn version_check<'a>(&'a self, channel: &'a mut MessageChannel) -> VersionCheckFuture<'a> {
        Box::pin(async move {
            negotiate_protocol_version(channel, self.protocol_version).await?;
            Ok(())
        })
    }
}

/// Offer `offered` to the peer, validate its answer, and record it on the channel.
///
/// # Errors
///
/// - `AppError::Version` if the reply is not a `ProtocolVersion` message, its
///   payload is not an integer, or the version is outside `1..=offered`.
/// - Transport and codec errors from the exchange itself.
pub async fn negotiate_protocol_version(
    channel: &mut MessageChannel,
    offered: u32,
) -> Result<u32> {
    channel
        .send_message_with_payload(PROTOCOL_VERSION, &offered)
        .await?;

    let reply = channel.read_message().await?;
    if reply.message_type() != PROTOCOL_VERSION {
        return Err(AppError::Version(format!(
            "expected {PROTOCOL_VERSION} reply but was {}",
            reply.message_type()
        )));
    }

    let version: u32 = reply
        .payload_as()
        .map_err(|err| AppError::Version(format!("unreadable protocol version: {err}")))?;

    if version == 0 || version > offered {
        return Err(AppError::Version(format!(
            "unsupported protocol version {version}, expected 1..={offered}"
        )));
    }

    channel.set_protocol_version(version);
    info!(version, "protocol version negotiated");
    Ok(version)
}
