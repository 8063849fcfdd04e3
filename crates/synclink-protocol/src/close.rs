//! Protocol-level close codes.
//!
//! When a side terminates a connection it sends a WebSocket close frame
//! carrying one of these codes plus a human-readable reason: the
//! standard 1000 for a deliberate clean shutdown, or one of the hub's
//! application codes (4000–4006). Nodes use the code to decide whether
//! a reconnect attempt is worthwhile.

/// Why a connection was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// Deliberate clean shutdown by either side (the standard 1000).
    Normal,
    /// Login/password pair was rejected.
    WrongCredentials,
    /// A packet violated the protocol (bad fields, wrong state).
    InvalidData,
    /// Another live node already registered under this name.
    NodeAlreadyExists,
    /// The node did not authenticate within the allowed window.
    AuthenticationTimeout,
    /// A data packet arrived before authentication completed.
    NodeIsNotAuthenticated,
    /// The hub is at its connection limit.
    TooManyConnections,
    /// Catch-all for behaviour the hub refuses to tolerate.
    UnexpectedBehaviour,
}

impl CloseCode {
    /// The numeric code carried in the close frame.
    pub fn as_u16(self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::WrongCredentials => 4000,
            CloseCode::InvalidData => 4001,
            CloseCode::NodeAlreadyExists => 4002,
            CloseCode::AuthenticationTimeout => 4003,
            CloseCode::NodeIsNotAuthenticated => 4004,
            CloseCode::TooManyConnections => 4005,
            CloseCode::UnexpectedBehaviour => 4006,
        }
    }

    /// Parses a numeric close code. Codes other than 1000 and
    /// 4000–4006 are not ours and yield `None`.
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1000 => Some(CloseCode::Normal),
            4000 => Some(CloseCode::WrongCredentials),
            4001 => Some(CloseCode::InvalidData),
            4002 => Some(CloseCode::NodeAlreadyExists),
            4003 => Some(CloseCode::AuthenticationTimeout),
            4004 => Some(CloseCode::NodeIsNotAuthenticated),
            4005 => Some(CloseCode::TooManyConnections),
            4006 => Some(CloseCode::UnexpectedBehaviour),
            _ => None,
        }
    }

    /// Whether a node should try to reconnect after this close.
    ///
    /// Credential and protocol failures will fail again identically;
    /// timeouts and capacity limits are transient.
    pub fn recoverable(self) -> bool {
        matches!(
            self,
            CloseCode::AuthenticationTimeout
                | CloseCode::NodeIsNotAuthenticated
                | CloseCode::TooManyConnections
        )
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:?})", self.as_u16(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in [
            CloseCode::Normal,
            CloseCode::WrongCredentials,
            CloseCode::InvalidData,
            CloseCode::NodeAlreadyExists,
            CloseCode::AuthenticationTimeout,
            CloseCode::NodeIsNotAuthenticated,
            CloseCode::TooManyConnections,
            CloseCode::UnexpectedBehaviour,
        ] {
            assert_eq!(CloseCode::from_u16(code.as_u16()), Some(code));
        }
    }

    #[test]
    fn foreign_codes_are_none() {
        assert_eq!(CloseCode::from_u16(1001), None);
        assert_eq!(CloseCode::from_u16(4007), None);
    }

    #[test]
    fn credential_failures_are_not_recoverable() {
        assert!(!CloseCode::Normal.recoverable());
        assert!(!CloseCode::WrongCredentials.recoverable());
        assert!(!CloseCode::NodeAlreadyExists.recoverable());
        assert!(CloseCode::TooManyConnections.recoverable());
    }
}
