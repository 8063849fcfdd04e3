//! # Synclink
//!
//! Progress-sync hub for game-server nodes.
//!
//! Synclink keeps player and entity progress consistent across a fleet
//! of game-server nodes. Nodes connect to a central hub over WebSocket
//! and speak a compact binary packet protocol: the hub drives the
//! Hello → Auth → Ready handshake, nodes push saves and pull data and
//! leaderboards, and a sequence-based correlation layer pairs every
//! response with the request that asked for it.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use synclink::prelude::*;
//!
//! // Implement NodeHandler for your storage layer, then:
//! // let hub = HubServerBuilder::new()
//! //     .bind("0.0.0.0:8080")
//! //     .build(my_auth, my_handler)
//! //     .await?;
//! // hub.run().await
//! ```

pub mod auth;
pub mod error;
pub mod handler;
pub mod server;

pub use auth::{AuthRejection, NodeAuthenticator, StaticAuthenticator};
pub use error::SynclinkError;
pub use handler::NodeHandler;
pub use server::{HubConfig, HubServer, HubServerBuilder};

pub mod prelude {
    //! Everything an embedding application usually needs.

    pub use crate::auth::{
        AuthRejection, NodeAuthenticator, StaticAuthenticator,
    };
    pub use crate::error::SynclinkError;
    pub use crate::handler::NodeHandler;
    pub use crate::server::{HubConfig, HubServer, HubServerBuilder};

    pub use synclink_client::{
        CloseReason, ClientError, LinearRetry, NodeClient, NodeConfig,
        NodeEvent,
    };
    pub use synclink_exchange::{
        ExchangeError, IncomingContext, PacketCorrelator, Reaction,
        Transmission,
    };
    pub use synclink_protocol::{
        CloseCode, Packet, PacketKind, PacketRegistry, ProtocolError,
    };
    pub use synclink_transport::{Talker, TransportError};
}
