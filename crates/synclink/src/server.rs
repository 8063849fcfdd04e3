//! `HubServer` builder and accept loop.
//!
//! This is the entry point for running a Synclink hub. It ties the
//! layers together: transport → protocol → exchange → per-node
//! handler.

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

use dashmap::DashMap;
use synclink_protocol::{CloseCode, PacketRegistry};
use synclink_transport::{TalkerId, Talker, WebSocketListener};

use crate::SynclinkError;
use crate::auth::NodeAuthenticator;
use crate::handler::{NodeHandler, handle_node};

/// Timing and capacity knobs for the hub.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Interval nodes are told to heartbeat at.
    pub heartbeat_interval: Duration,
    /// How long a node gets to answer the Hello with its Auth.
    pub auth_timeout: Duration,
    /// Drop a node when no frame arrives for this long.
    pub idle_timeout: Duration,
    /// Simultaneous connections before new ones are turned away.
    pub max_connections: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            auth_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(90),
            max_connections: 1024,
        }
    }
}

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks.
pub(crate) struct ServerState<A, H> {
    pub(crate) auth: A,
    pub(crate) handler: H,
    pub(crate) registry: Arc<PacketRegistry>,
    pub(crate) config: HubConfig,
    /// Live node names, for duplicate-registration rejection.
    pub(crate) nodes: DashMap<String, TalkerId>,
    pub(crate) connections: AtomicUsize,
}

/// Builder for configuring and starting a hub.
///
/// # Example
///
/// ```rust,ignore
/// use synclink::prelude::*;
///
/// let hub = HubServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .build(my_auth, my_handler)
///     .await?;
/// hub.run().await
/// ```
pub struct HubServerBuilder {
    bind_addr: String,
    config: HubConfig,
}

impl HubServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            config: HubConfig::default(),
        }
    }

    /// Sets the address to bind the hub to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the heartbeat interval announced in Ready packets.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Sets the handshake deadline.
    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.config.auth_timeout = timeout;
        self
    }

    /// Sets the idle timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Caps simultaneous connections.
    pub fn max_connections(mut self, max: usize) -> Self {
        self.config.max_connections = max;
        self
    }

    /// Binds the listener and builds the hub with the given
    /// authenticator and packet handler.
    pub async fn build<A: NodeAuthenticator, H: NodeHandler>(
        self,
        auth: A,
        handler: H,
    ) -> Result<HubServer<A, H>, SynclinkError> {
        let listener = WebSocketListener::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            auth,
            handler,
            registry: Arc::new(PacketRegistry::standard()),
            config: self.config,
            nodes: DashMap::new(),
            connections: AtomicUsize::new(0),
        });

        Ok(HubServer { listener, state })
    }
}

impl Default for HubServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Synclink hub.
///
/// Call [`run()`](Self::run) to start accepting node connections.
pub struct HubServer<A, H> {
    listener: WebSocketListener,
    state: Arc<ServerState<A, H>>,
}

impl<A, H> HubServer<A, H>
where
    A: NodeAuthenticator,
    H: NodeHandler,
{
    /// Creates a new builder.
    pub fn builder() -> HubServerBuilder {
        HubServerBuilder::new()
    }

    /// Returns the local address the hub is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop.
    ///
    /// Accepts node connections and spawns a handler task for each.
    /// Runs until the process is terminated.
    pub async fn run(self) -> Result<(), SynclinkError> {
        tracing::info!("synclink hub running");

        loop {
            match self.listener.accept().await {
                Ok(talker) => {
                    let state = Arc::clone(&self.state);
                    let live = state
                        .connections
                        .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    if live >= state.config.max_connections {
                        state
                            .connections
                            .fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                        tracing::warn!(%live, "turning away connection, hub full");
                        tokio::spawn(async move {
                            let _ = talker
                                .close(CloseCode::TooManyConnections, "hub full")
                                .await;
                        });
                        continue;
                    }
                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_node(talker, Arc::clone(&state)).await
                        {
                            tracing::debug!(
                                error = %e,
                                "connection ended with error"
                            );
                        }
                        state
                            .connections
                            .fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
