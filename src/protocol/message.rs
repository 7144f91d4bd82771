//! Message envelope serialization.
//!
//! Every message on the wire is a JSON object carrying the type tag and an
//! arbitrary payload:
//!
//! ```json
//! { "MessageType": "TestDiscovery.Start", "Payload": { "Sources": ["a.dll"] } }
//! ```
//!
//! Peers that negotiated [`FIRST_VERSIONED_PROTOCOL`] or later also send a `Version`
//! field; [`serialize_payload_with_version`] produces that form and
//! [`deserialize_message`] accepts both.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AppError, Result};

/// First protocol version whose envelopes carry a `Version` field.
pub const FIRST_VERSIONED_PROTOCOL: u32 = 2;

/// Outbound envelope borrowing the caller's payload.
#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct OutboundEnvelope<'a, T: ?Sized> {
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<u32>,
    message_type: &'a str,
    payload: &'a T,
}

/// Decoded inbound message.
///
/// The envelope is decoded eagerly; the payload stays as raw JSON until the
/// caller asks for a concrete type with [`Message::payload_as`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Message {
    /// Protocol version stamped on the envelope, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<u32>,
    /// Type tag identifying the payload shape.
    message_type: String,
    /// Raw payload; `Null` when the peer sent none.
    #[serde(default)]
    payload: Value,
}

impl Message {
    /// Build a message from a tag and an already-encoded payload.
    #[must_use]
    pub fn new(message_type: impl Into<String>, payload: Value) -> Self {
        Self {
            version: None,
            message_type: message_type.into(),
            payload,
        }
    }

    /// Type tag of this message.
    #[must_use]
    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// Envelope version, when the peer sent one.
    #[must_use]
    pub fn version(&self) -> Option<u32> {
        self.version
    }

    /// Raw payload, or `None` when it was absent or `null`.
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        (!self.payload.is_null()).then_some(&self.payload)
    }

    /// Decode the payload into the caller's type.
    ///
    /// An absent payload decodes as JSON `null`, so unit and `Option` targets
    /// succeed for payload-less messages.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Codec` naming the message type if the payload does
    /// not match `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.payload).map_err(|err| {
            AppError::Codec(format!(
                "payload of {} does not match {}: {err}",
                self.message_type,
                std::any::type_name::<T>()
            ))
        })
    }
}

/// Serialize `payload` into an envelope tagged `message_type`.
///
/// # Errors
///
/// Returns `AppError::Codec` if the payload cannot be represented as JSON
/// (for example, a map with non-string keys).
pub fn serialize_payload<T: Serialize + ?Sized>(message_type: &str, payload: &T) -> Result<String> {
    encode(None, message_type, payload)
}

/// Serialize `payload` into an envelope tagged `message_type` and stamped
/// with protocol `version`.
///
/// # Errors
///
/// Returns `AppError::Codec` if the payload cannot be represented as JSON.
pub fn serialize_payload_with_version<T: Serialize + ?Sized>(
    message_type: &str,
    payload: &T,
    version: u32,
) -> Result<String> {
    encode(Some(version), message_type, payload)
}

/// Parse a raw envelope.
///
/// # Errors
///
/// Returns `AppError::Codec("malformed message: …")` if `raw` is not a JSON
/// object or lacks the `MessageType` tag.
pub fn deserialize_message(raw: &str) -> Result<Message> {
    serde_json::from_str(raw).map_err(|err| AppError::Codec(format!("malformed message: {err}")))
}

fn encode<T: Serialize + ?Sized>(
    version: Option<u32>,
    message_type: &str,
    payload: &T,
) -> Result<String> {
    let envelope = OutboundEnvelope {
        version,
        message_type,
        payload,
    };
    serde_json::to_string(&envelope).map_err(|err| {
        AppError::Codec(format!("failed to serialize {message_type} payload: {err}"))
    })
}
