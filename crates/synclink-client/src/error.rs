//! Error types for the node client.

use synclink_exchange::ExchangeError;
use synclink_transport::TransportError;

/// Errors surfaced by the node client API.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A transmission-level failure from the correlation layer.
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// The underlying connection failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The client is between connections; sends are refused rather
    /// than queued.
    #[error("not connected to the hub")]
    NotConnected,

    /// The hub broke the handshake contract.
    #[error("handshake violation: {0}")]
    Handshake(String),
}
