//! Per-node handler: handshake, auth, and packet routing.
//!
//! Each accepted connection gets its own Tokio task running this
//! handler. The flow is:
//!   1. Send Hello as a transmission awaiting the node's Auth
//!   2. Authenticate credentials → register the node name
//!   3. Respond Ready (carrying the heartbeat interval)
//!   4. Loop: receive frames → answer heartbeats, dispatch data
//!      packets to the application's [`NodeHandler`]

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use synclink_exchange::{
    ExchangeError, IncomingContext, PacketCorrelator, Reaction,
};
use synclink_protocol::{
    Auth, CloseCode, Hello, HeartbeatAck, Packet, PacketKind, Ready,
};
use synclink_transport::{ServerTalker, Talker};

use crate::SynclinkError;
use crate::auth::NodeAuthenticator;
use crate::server::ServerState;

/// Application-side consumer of a node's data packets.
///
/// The hub handles the lifecycle traffic (handshake, heartbeats)
/// itself; everything else a node sends lands here. Returning
/// `Some(packet)` answers the node at the incoming sequence, so the
/// node's pending transmission settles.
pub trait NodeHandler: Send + Sync + 'static {
    /// Handles one unsolicited packet from an authenticated node.
    fn on_packet(
        &self,
        node_name: &str,
        ctx: IncomingContext,
    ) -> impl std::future::Future<Output = Option<Packet>> + Send;
}

/// Drop guard that unregisters a node's name when the handler exits.
///
/// This keeps the name table honest even if the handler errors out.
struct NodeGuard<A, H> {
    name: String,
    state: Arc<ServerState<A, H>>,
}

impl<A, H> Drop for NodeGuard<A, H> {
    fn drop(&mut self) {
        self.state.nodes.remove(&self.name);
    }
}

/// Handles a single node connection from accept to close.
pub(crate) async fn handle_node<A, H>(
    talker: ServerTalker,
    state: Arc<ServerState<A, H>>,
) -> Result<(), SynclinkError>
where
    A: NodeAuthenticator,
    H: NodeHandler,
{
    let talker = Arc::new(talker);
    let talker_id = talker.id();
    tracing::debug!(%talker_id, "handling new connection");

    let correlator =
        PacketCorrelator::new(Arc::clone(&talker), Arc::clone(&state.registry));

    // --- Step 1: Hello → Auth ---
    let Some((auth, auth_sequence)) =
        perform_handshake(&correlator, &state).await?
    else {
        return Ok(());
    };

    // --- Step 2: authenticate, register the name ---
    if let Err(rejection) = state
        .auth
        .authenticate(&auth.login, &auth.password, &auth.node_name)
        .await
    {
        tracing::warn!(node = %auth.node_name, %rejection, "authentication rejected");
        talker
            .close(rejection.close_code(), &rejection.to_string())
            .await?;
        return Ok(());
    }
    match state.nodes.entry(auth.node_name.clone()) {
        Entry::Occupied(_) => {
            talker
                .close(CloseCode::NodeAlreadyExists, "node already connected")
                .await?;
            return Ok(());
        }
        Entry::Vacant(slot) => {
            slot.insert(talker_id);
        }
    }
    let node_name = auth.node_name;
    let _guard = NodeGuard {
        name: node_name.clone(),
        state: Arc::clone(&state),
    };

    // --- Step 3: Ready ---
    let heartbeat_interval_ms =
        state.config.heartbeat_interval.as_millis() as i64;
    correlator
        .respond(
            auth_sequence,
            Packet::Ready(Ready {
                heartbeat_interval_ms,
            }),
            Reaction::<()>::none(),
        )
        .await?;
    tracing::info!(%talker_id, node = %node_name, "node authenticated");

    // --- Step 4: packet loop ---
    loop {
        let bytes = match tokio::time::timeout(
            state.config.idle_timeout,
            talker.recv(),
        )
        .await
        {
            Ok(Ok(Some(bytes))) => bytes,
            Ok(Ok(None)) => {
                tracing::info!(node = %node_name, "node disconnected");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(node = %node_name, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::info!(node = %node_name, "node idle, dropping");
                break;
            }
        };

        let ctx = match correlator.process_receiving(&bytes) {
            Ok(Some(ctx)) => ctx,
            Ok(None) => continue,
            Err(e) => {
                tracing::debug!(
                    node = %node_name, error = %e, "dropped malformed frame"
                );
                continue;
            }
        };

        match ctx.packet.kind() {
            PacketKind::Heartbeat => {
                correlator
                    .respond(
                        ctx.sequence,
                        Packet::HeartbeatAck(HeartbeatAck),
                        Reaction::<()>::none(),
                    )
                    .await?;
            }
            _ => {
                // Handler work must not stall the read loop.
                let state = Arc::clone(&state);
                let correlator = correlator.clone();
                let node_name = node_name.clone();
                tokio::spawn(async move {
                    let sequence = ctx.sequence;
                    let reply =
                        state.handler.on_packet(&node_name, ctx).await;
                    if let Some(reply) = reply {
                        if let Err(e) = correlator
                            .respond(sequence, reply, Reaction::<()>::none())
                            .await
                        {
                            tracing::debug!(
                                node = %node_name,
                                error = %e,
                                "reply send failed"
                            );
                        }
                    }
                });
            }
        }
    }

    correlator.detach();
    // _guard drops here → the node name is released.
    Ok(())
}

/// Sends the Hello and pumps frames until the node's Auth settles it.
///
/// `Ok(None)` means the connection ended during the handshake and was
/// already closed with the right code.
async fn perform_handshake<A, H>(
    correlator: &PacketCorrelator<ServerTalker>,
    state: &Arc<ServerState<A, H>>,
) -> Result<Option<(Auth, u16)>, SynclinkError>
where
    A: NodeAuthenticator,
    H: NodeHandler,
{
    let talker = Arc::clone(correlator.talker());
    let reaction = Reaction::<Auth>::builder()
        .on(PacketKind::Auth, |packet| match packet {
            Packet::Auth(auth) => Ok(auth),
            other => Err(ExchangeError::Handler(format!(
                "expected auth, got {:?}",
                other.kind()
            ))),
        })
        .give_up_after(state.config.auth_timeout)
        .build();
    let hello = correlator.send(Packet::Hello(Hello), reaction).await?;
    let auth_sequence = hello.sequence().wrapping_add(1);

    // Grace on top of the reaction's own deadline so the timeout path
    // wins the race and closes with the right code.
    let frame_deadline = state.config.auth_timeout + Duration::from_secs(1);

    let mut settled = pin!(hello.await_result());
    let auth = loop {
        tokio::select! {
            result = &mut settled => break result,
            frame = tokio::time::timeout(frame_deadline, talker.recv()) => {
                match frame {
                    Ok(Ok(Some(bytes))) => {
                        if let Err(e) = correlator.process_receiving(&bytes) {
                            tracing::debug!(
                                error = %e, "dropped malformed frame"
                            );
                        }
                    }
                    // Gone mid-handshake; nothing left to close.
                    Ok(Ok(None)) | Ok(Err(_)) | Err(_) => return Ok(None),
                }
            }
        }
    };

    match auth {
        Ok(auth) => Ok(Some((auth, auth_sequence))),
        Err(ExchangeError::Timeout(_)) => {
            talker
                .close(CloseCode::AuthenticationTimeout, "authentication timed out")
                .await?;
            Ok(None)
        }
        Err(err) => {
            talker
                .close(CloseCode::UnexpectedBehaviour, "handshake failed")
                .await?;
            Err(err.into())
        }
    }
}
