//! Authentication hook for validating node credentials.
//!
//! The hub doesn't know what a valid login is — that depends on where
//! it's deployed (a config file, a database, an ops dashboard). It
//! defines the [`NodeAuthenticator`] trait instead: one async method
//! taking the credentials from the Auth packet and returning either
//! acceptance or a typed [`AuthRejection`] that maps onto a wire close
//! code.

use std::fmt;

use synclink_protocol::CloseCode;

/// Why the hub refused a node's credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRejection {
    /// Login/password pair is wrong.
    WrongCredentials,
    /// Credentials were present but structurally unusable (empty node
    /// name, malformed login).
    InvalidData,
    /// Another live connection already registered this node name.
    NodeAlreadyExists,
}

impl AuthRejection {
    /// The close code sent to the node for this rejection.
    pub fn close_code(&self) -> CloseCode {
        match self {
            AuthRejection::WrongCredentials => CloseCode::WrongCredentials,
            AuthRejection::InvalidData => CloseCode::InvalidData,
            AuthRejection::NodeAlreadyExists => CloseCode::NodeAlreadyExists,
        }
    }
}

impl fmt::Display for AuthRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthRejection::WrongCredentials => write!(f, "wrong credentials"),
            AuthRejection::InvalidData => write!(f, "invalid auth data"),
            AuthRejection::NodeAlreadyExists => {
                write!(f, "node already connected")
            }
        }
    }
}

/// Validates a node's credentials during the handshake.
///
/// `Send + Sync + 'static` so the hub can share one authenticator
/// across all connection tasks for its whole lifetime.
pub trait NodeAuthenticator: Send + Sync + 'static {
    /// Validates the credentials carried by an Auth packet.
    ///
    /// Returning `Err` closes the connection with the rejection's
    /// close code; the node will not reconnect for credential
    /// rejections.
    fn authenticate(
        &self,
        login: &str,
        password: &str,
        node_name: &str,
    ) -> impl std::future::Future<Output = Result<(), AuthRejection>> + Send;
}

/// Accepts one fixed login/password pair. Useful for development and
/// single-tenant deployments.
pub struct StaticAuthenticator {
    login: String,
    password: String,
}

impl StaticAuthenticator {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }
}

impl NodeAuthenticator for StaticAuthenticator {
    async fn authenticate(
        &self,
        login: &str,
        password: &str,
        node_name: &str,
    ) -> Result<(), AuthRejection> {
        if node_name.is_empty() {
            return Err(AuthRejection::InvalidData);
        }
        if login != self.login || password != self.password {
            return Err(AuthRejection::WrongCredentials);
        }
        Ok(())
    }
}
