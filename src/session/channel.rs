//! Typed message exchange over the framed channel.
//!
//! [`MessageChannel`] pairs the [`FramedChannel`] with the message codec and
//! logs every raw message in both directions at `INFO`. It is the only path
//! for traffic between the session and the peer, and is handed to the host's
//! version check before the session becomes ready.

use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::protocol::{
    deserialize_message, serialize_payload, serialize_payload_with_version, Message,
    FIRST_VERSIONED_PROTOCOL,
};
use crate::session::bounded;
use crate::transport::channel::FramedChannel;
use crate::{AppError, Result};

/// Framed channel plus message codec for one session.
#[derive(Debug)]
pub struct MessageChannel {
    session_id: String,
    channel: FramedChannel,
    read_timeout: Option<Duration>,
    cancel: CancellationToken,
    protocol_version: Option<u32>,
}

impl MessageChannel {
    pub(crate) fn new(
        session_id: String,
        channel: FramedChannel,
        read_timeout: Option<Duration>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session_id,
            channel,
            read_timeout,
            cancel,
            protocol_version: None,
        }
    }

    /// Protocol version recorded by the version check, if any.
    #[must_use]
    pub fn protocol_version(&self) -> Option<u32> {
        self.protocol_version
    }

    /// Record the negotiated protocol version.
    ///
    /// From [`FIRST_VERSIONED_PROTOCOL`] on, outbound envelopes carry a
    /// `Version` field.
    pub fn set_protocol_version(&mut self, version: u32) {
        self.protocol_version = Some(version);
    }

    /// Send a message with an empty object payload.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` if the write fails.
    pub async fn send_message(&mut self, message_type: &str) -> Result<()> {
        self.send_message_with_payload(message_type, &serde_json::Map::new())
            .await
    }

    /// Serialize `payload` under `message_type` and send it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Codec` if the payload cannot be serialized, or
    /// `AppError::Transport` if the write fails.
    pub async fn send_message_with_payload<T: Serialize + ?Sized>(
        &mut self,
        message_type: &str,
        payload: &T,
    ) -> Result<()> {
        let raw = match self.protocol_version {
            Some(version) if version >= FIRST_VERSIONED_PROTOCOL => {
                serialize_payload_with_version(message_type, payload, version)?
            }
            _ => serialize_payload(message_type, payload)?,
        };

        info!(
            session_id = self.session_id.as_str(),
            message_type,
            raw = raw.as_str(),
            "send"
        );
        self.channel.write(&raw).await
    }

    /// Wait for the next message and decode its envelope.
    ///
    /// # Errors
    ///
    /// - `AppError::Transport` if the peer disconnects or the frame is malformed.
    /// - `AppError::Codec` if the frame is not a valid envelope.
    /// - `AppError::Timeout` if the configured read bound expires.
    /// - `AppError::Cancelled` if the session's cancellation token fires.
    pub async fn read_message(&mut self) -> Result<Message> {
        let raw = tokio::select! {
            biased;

            () = self.cancel.cancelled() => {
                return Err(AppError::Cancelled(format!(
                    "read aborted for session {}",
                    self.session_id
                )));
            }

            result = bounded(self.read_timeout, "message read", self.channel.read()) => result?,
        };

        info!(session_id = self.session_id.as_str(), raw = raw.as_str(), "read");
        deserialize_message(&raw)
    }

    /// Close the underlying framed channel.
    pub(crate) async fn close(self) {
        self.channel.close().await;
    }
}
