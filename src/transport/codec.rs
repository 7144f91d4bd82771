//! Length-prefixed string codec for the test-host channel.
//!
//! Each frame is the UTF-8 byte count of the message encoded as an unsigned
//! 7-bit varint (low group first, continuation bit `0x80` on every byte but
//! the last), followed by exactly that many UTF-8 bytes. This is the layout
//! the test host uses for binary-serialized strings, so a reader recovers
//! message boundaries without scanning for delimiters.
//!
//! # Usage
//!
//! Use [`FrameCodec`] with [`tokio_util::codec::FramedRead`] (inbound) and
//! [`tokio_util::codec::FramedWrite`] (outbound).
//!
//! ```rust,ignore
//! use tokio_util::codec::FramedRead;
//! use testhost_session::transport::codec::FrameCodec;
//!
//! let reader = FramedRead::new(read_half, FrameCodec::new());
//! ```

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{AppError, Result};

/// Default inbound frame limit: 64 MiB.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Longest valid length prefix; five 7-bit groups cover a 32-bit length.
pub const MAX_PREFIX_BYTES: usize = 5;

/// Largest payload the prefix may describe (the peer's lengths are signed 32-bit).
const MAX_ENCODABLE_LEN: u64 = 0x7FFF_FFFF;

/// Varint length-prefixed UTF-8 string codec.
///
/// # Decoder
///
/// Returns `Ok(None)` until a complete frame is buffered. Frames whose
/// declared length exceeds the configured limit fail with
/// [`AppError::Transport`] before any payload is buffered, as do over-long
/// prefixes and payloads that are not valid UTF-8.
///
/// # Encoder
///
/// Writes the varint prefix and the raw bytes. The frame limit is an inbound
/// concern and is not applied when encoding.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_bytes: usize,
}

impl FrameCodec {
    /// Create a codec with the [`DEFAULT_MAX_FRAME_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_frame_bytes(DEFAULT_MAX_FRAME_BYTES)
    }

    /// Create a codec with a custom inbound frame limit.
    #[must_use]
    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self { max_frame_bytes }
    }

    /// Inbound frame limit in bytes.
    #[must_use]
    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let Some((len, prefix_len)) = peek_length_prefix(src)? else {
            return Ok(None);
        };

        if len > self.max_frame_bytes {
            return Err(AppError::Transport(format!(
                "frame too large: {len} bytes exceeds limit of {} bytes",
                self.max_frame_bytes
            )));
        }

        let total = prefix_len + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(prefix_len);
        let payload = src.split_to(len);
        String::from_utf8(payload.to_vec())
            .map(Some)
            .map_err(|err| AppError::Transport(format!("frame is not valid utf-8: {err}")))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(AppError::Transport(format!(
                "stream closed mid-frame with {} bytes buffered",
                src.len()
            ))),
        }
    }
}

impl Encoder<String> for FrameCodec {
    type Error = AppError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        <Self as Encoder<&str>>::encode(self, item.as_str(), dst)
    }
}

impl Encoder<&str> for FrameCodec {
    type Error = AppError;

    fn encode(&mut self, item: &str, dst: &mut BytesMut) -> Result<()> {
        let len = item.len();
        if len as u64 > MAX_ENCODABLE_LEN {
            return Err(AppError::Codec(format!(
                "message of {len} bytes cannot be length-prefixed"
            )));
        }

        dst.reserve(MAX_PREFIX_BYTES + len);
        put_length_prefix(dst, len);
        dst.put_slice(item.as_bytes());
        Ok(())
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Read the varint prefix at the front of `src` without consuming it.
///
/// Returns `(payload_len, prefix_len)` or `None` when more bytes are needed.
fn peek_length_prefix(src: &[u8]) -> Result<Option<(usize, usize)>> {
    let mut value: u64 = 0;

    for (index, byte) in src.iter().take(MAX_PREFIX_BYTES).enumerate() {
        value |= u64::from(byte & 0x7F) << (7 * index);

        if byte & 0x80 == 0 {
            if value > MAX_ENCODABLE_LEN {
                return Err(AppError::Transport(format!(
                    "invalid length prefix: {value} exceeds the 32-bit signed range"
                )));
            }
            let len = usize::try_from(value).map_err(|_| {
                AppError::Transport(format!("invalid length prefix: {value} overflows usize"))
            })?;
            return Ok(Some((len, index + 1)));
        }
    }

    if src.len() >= MAX_PREFIX_BYTES {
        return Err(AppError::Transport(format!(
            "invalid length prefix: longer than {MAX_PREFIX_BYTES} bytes"
        )));
    }

    Ok(None)
}

/// Append `len` to `dst` as a 7-bit varint.
fn put_length_prefix(dst: &mut BytesMut, len: usize) {
    let mut remaining = len;
    while remaining >= 0x80 {
        // Truncation keeps the low seven bits plus the continuation flag.
        #[allow(clippy::cast_possible_truncation)]
        dst.put_u8((remaining as u8 & 0x7F) | 0x80);
        remaining >>= 7;
    }
    #[allow(clippy::cast_possible_truncation)]
    dst.put_u8(remaining as u8);
}
