//! Test-host message protocol.
//!
//! - `message`: JSON envelope `{MessageType, Payload}` encode/decode.
//! - `message_type`: well-known type tags.

pub mod message;
pub mod message_type;

pub use message::{
    deserialize_message, serialize_payload, serialize_payload_with_version, Message,
    FIRST_VERSIONED_PROTOCOL,
};
