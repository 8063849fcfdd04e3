//! Why a connection ended, and whether that warrants reconnecting.

use std::fmt;

use synclink_protocol::CloseCode;

/// Terminal classification of a finished connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The client was detached; resources are freed and no reconnect
    /// is attempted.
    Detach,
    /// The caller closed the client.
    UserClose,
    /// The connection went silent or dropped; worth reconnecting.
    Timeout,
    /// The hub closed the connection with a close frame.
    ServerClose {
        /// The wire close code, usually one of the protocol's 4000
        /// range codes.
        code: u16,
        /// The hub's stated reason.
        reason: String,
    },
    /// The backoff policy ran out of attempts. Terminal; the caller
    /// must build a fresh client to try again.
    RetryLimitReached,
}

impl CloseReason {
    /// Whether the lifecycle should feed this close into the backoff
    /// policy instead of stopping.
    pub fn should_reconnect(&self) -> bool {
        match self {
            CloseReason::Timeout => true,
            CloseReason::ServerClose { code, .. } => CloseCode::from_u16(*code)
                .map(|code| code.recoverable())
                .unwrap_or(false),
            CloseReason::Detach
            | CloseReason::UserClose
            | CloseReason::RetryLimitReached => false,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Detach => write!(f, "detached"),
            CloseReason::UserClose => write!(f, "closed by user"),
            CloseReason::Timeout => write!(f, "connection timed out"),
            CloseReason::ServerClose { code, reason } => {
                write!(f, "closed by hub ({code}): {reason}")
            }
            CloseReason::RetryLimitReached => write!(f, "retry limit reached"),
        }
    }
}
