//! Error types for the correlation layer.

use std::time::Duration;

use synclink_protocol::ProtocolError;
use synclink_transport::TransportError;

/// Errors that can settle a transmission or fail an exchange operation.
///
/// Errors here are local to one transmission — they never affect other
/// outstanding transmissions on the same talker. Connection-level
/// failures are the lifecycle layer's business.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// Encoding or decoding a frame failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The talker refused the outgoing frame.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// No response arrived within the declared window and no timeout
    /// handler produced a substitute value.
    #[error("transmission timed out after {0:?}")]
    Timeout(Duration),

    /// The talker was detached while the transmission was outstanding.
    #[error("transmission cancelled: talker detached")]
    Cancelled,

    /// The response arrived but no receive handler consumed it, or the
    /// transmission was fire-and-forget to begin with.
    #[error("transmission abandoned: no handler consumed the response")]
    Abandoned,

    /// A reaction handler reported a failure.
    #[error("reaction handler failed: {0}")]
    Handler(String),

    /// A frame addressed to this transmission could not be decoded.
    #[error("malformed response frame: {0}")]
    MalformedResponse(String),

    /// The bounded sequence pool produced no free slot. Only reachable
    /// with hundreds of simultaneously outstanding transmissions.
    #[error("sequence pool exhausted")]
    SequencePoolExhausted,

    /// Another in-flight transmission already occupies this sequence
    /// slot (a reply raced with an independently drawn sequence).
    #[error("sequence slot {0} already in flight")]
    SequenceCollision(u16),
}
