//! Node-side lifecycle for a Synclink hub connection.
//!
//! [`NodeClient::connect`] starts a supervisor that dials the hub,
//! performs the Hello → Auth → Ready handshake, keeps the heartbeat
//! going, and reconnects with linear backoff when the link drops for a
//! recoverable reason. The application consumes [`NodeEvent`]s and
//! sends packets through the handle.

pub mod close;
pub mod error;
pub mod node;
pub mod retry;

pub use close::CloseReason;
pub use error::ClientError;
pub use node::{NodeClient, NodeConfig, NodeEvent};
pub use retry::LinearRetry;
