//! Unified error type for the Synclink hub.

use synclink_client::ClientError;
use synclink_exchange::ExchangeError;
use synclink_protocol::ProtocolError;
use synclink_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `synclink` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate. The
/// `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum SynclinkError {
    /// A transport-level error (connection, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, malformed frame).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A correlation-level error (timeout, cancellation, collision).
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// A node-client lifecycle error.
    #[error(transparent)]
    Client(#[from] ClientError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::Closed("gone".into());
        let synclink_err: SynclinkError = err.into();
        assert!(matches!(synclink_err, SynclinkError::Transport(_)));
        assert!(synclink_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidUtf8;
        let synclink_err: SynclinkError = err.into();
        assert!(matches!(synclink_err, SynclinkError::Protocol(_)));
    }

    #[test]
    fn test_from_exchange_error() {
        let err = ExchangeError::Cancelled;
        let synclink_err: SynclinkError = err.into();
        assert!(matches!(synclink_err, SynclinkError::Exchange(_)));
    }

    #[test]
    fn test_from_client_error() {
        let err = ClientError::NotConnected;
        let synclink_err: SynclinkError = err.into();
        assert!(matches!(synclink_err, SynclinkError::Client(_)));
    }
}
