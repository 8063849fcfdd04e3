//! Error types for the protocol layer.

use crate::packet::PacketKind;

/// Errors that can occur while encoding or decoding a packet frame.
///
/// Decoding errors mean the frame is malformed and must be dropped by the
/// read loop — they never crash the connection. Note that an *unknown
/// packet id* is deliberately not represented here: the registry reports
/// it as absence, and the caller drops the frame silently.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame is shorter than the 3-byte `[id][sequence]` header.
    #[error("frame too short for header: {len} bytes")]
    ShortHeader {
        /// Total length of the offending frame.
        len: usize,
    },

    /// A fixed-width field read ran past the end of the buffer.
    #[error("truncated frame: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        /// Bytes the reader needed.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// A string/list/map/wide-int declared a length that exceeds the
    /// bytes remaining in the buffer.
    #[error("declared length {declared} exceeds {remaining} remaining bytes")]
    LengthOverrun {
        /// The length prefix read from the wire.
        declared: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// A string field did not contain valid UTF-8.
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    /// A wide integer field declared an unsupported byte width.
    #[error("wide integer width {len} is outside 1..=16 bytes")]
    WideIntWidth {
        /// The declared byte width.
        len: usize,
    },

    /// Attempted to encode a packet kind the registry does not know.
    ///
    /// This indicates a misconfigured registry, not bad input — the
    /// standard registry covers every variant.
    #[error("packet kind {0:?} is not registered")]
    Unregistered(PacketKind),
}
