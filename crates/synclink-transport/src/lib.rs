//! Transport layer for Synclink: the [`Talker`] abstraction.
//!
//! A talker is one duplex byte channel — send frames, receive frames,
//! close with a code and reason. The correlation layer sits on top of a
//! talker and never touches the underlying socket. Two implementations
//! are provided:
//!
//! - [`WebSocketTalker`] — the real transport, via `tokio-tungstenite`
//!   (behind the default `websocket` feature), plus the accept-side
//!   [`WebSocketListener`].
//! - [`MemoryTalker`] — a channel-backed pair for exercising the
//!   correlation layer in tests without sockets.

#![allow(async_fn_in_trait)]

mod error;
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use memory::MemoryTalker;
#[cfg(feature = "websocket")]
pub use websocket::{
    ClientTalker, ServerTalker, WebSocketListener, WebSocketTalker,
};

use std::fmt;

use synclink_protocol::CloseCode;

/// Opaque identifier for a talker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TalkerId(u64);

impl TalkerId {
    /// Creates a `TalkerId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TalkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "talker-{}", self.0)
    }
}

/// A close frame observed on a talker: the numeric code and reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// Raw close code; see [`CloseCode::from_u16`] for the 4000 range.
    pub code: u16,
    /// Human-readable reason supplied by the closing side.
    pub reason: String,
}

/// A single duplex channel that can send and receive byte frames.
///
/// The core assumes reliable, ordered delivery within one talker's
/// lifetime and nothing across reconnects.
pub trait Talker: Send + Sync + 'static {
    /// Sends one frame to the remote peer.
    async fn send(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the peer closed the channel; the close
    /// frame, if any, is then available via
    /// [`peer_close`](Self::peer_close).
    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError>;

    /// Closes the channel, sending a close frame with the given code
    /// and reason. No sends may be attempted afterwards.
    async fn close(
        &self,
        code: CloseCode,
        reason: &str,
    ) -> Result<(), TransportError>;

    /// Whether the channel is still open.
    fn is_open(&self) -> bool;

    /// The close frame the peer sent, once `recv` has returned `None`.
    fn peer_close(&self) -> Option<CloseFrame>;

    /// The unique identifier for this talker.
    fn id(&self) -> TalkerId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn talker_id_new_and_into_inner() {
        let id = TalkerId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn talker_id_display() {
        assert_eq!(TalkerId::new(7).to_string(), "talker-7");
    }

    #[test]
    fn talker_id_works_as_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(TalkerId::new(1), "lobby");
        assert_eq!(map[&TalkerId::new(1)], "lobby");
    }
}
