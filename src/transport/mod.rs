//! Loopback transport between the session and the test-host peer.
//!
//! - `codec`: varint length-prefixed string framing.
//! - `port`: ephemeral loopback port allocation and the single-client listener.
//! - `channel`: the accepted connection wrapped in framed read/write halves.

pub mod channel;
pub mod codec;
pub mod port;
