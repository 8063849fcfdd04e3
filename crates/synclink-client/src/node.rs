//! The node client: connection lifecycle for one hub link.
//!
//! A supervisor task owns the link and walks it through
//! connect → Hello → Auth → Ready, then runs the read loop with a
//! heartbeat timer beside it. Every exit from that pipeline is
//! classified as a [`CloseReason`]; reconnectable reasons feed the
//! [`LinearRetry`] policy, terminal ones end the supervisor. The
//! caller talks to the link through a cheap cloneable handle and
//! observes it through an event channel.

use std::pin::pin;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use synclink_exchange::{
    ExchangeError, IncomingContext, PacketCorrelator, Reaction, Transmission,
};
use synclink_protocol::{
    Auth, CloseCode, Heartbeat, Packet, PacketKind, PacketRegistry,
};
use synclink_transport::{ClientTalker, Talker};

use crate::close::CloseReason;
use crate::error::ClientError;
use crate::retry::LinearRetry;

/// Configuration for a node's link to the hub.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Hub WebSocket URL, e.g. `ws://127.0.0.1:8080`.
    pub url: String,
    /// Credentials presented in the Auth packet.
    pub login: String,
    pub password: String,
    /// Name this node registers under.
    pub node_name: String,
    /// First reconnect backoff delay.
    pub first_backoff: Duration,
    /// Largest reconnect backoff delay.
    pub max_backoff: Duration,
    /// Reconnect attempts before giving up.
    pub max_tries: u32,
    /// How long to wait for each handshake step.
    pub auth_timeout: Duration,
    /// Close the connection when no frame arrives for this long.
    pub idle_timeout: Duration,
}

impl NodeConfig {
    /// Creates a config with default timing parameters.
    pub fn new(
        url: impl Into<String>,
        login: impl Into<String>,
        password: impl Into<String>,
        node_name: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            login: login.into(),
            password: password.into(),
            node_name: node_name.into(),
            first_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            max_tries: 10,
            auth_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(90),
        }
    }

    /// Overrides the reconnect backoff ramp.
    pub fn backoff(
        mut self,
        first: Duration,
        max: Duration,
        max_tries: u32,
    ) -> Self {
        self.first_backoff = first;
        self.max_backoff = max;
        self.max_tries = max_tries;
        self
    }

    /// Overrides the per-step handshake timeout.
    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    /// Overrides the idle timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

/// What the supervisor reports back to the application.
#[derive(Debug)]
pub enum NodeEvent {
    /// The handshake completed; the heartbeat loop is running.
    Connected {
        /// Interval the hub asked heartbeats to be sent at.
        heartbeat_interval: Duration,
    },
    /// An unsolicited packet arrived (hub-pushed sync, stop requests).
    Packet(IncomingContext),
    /// A heartbeat round trip completed.
    Latency(Duration),
    /// The link dropped; a reconnect attempt is scheduled.
    Reconnecting {
        /// 1-based attempt counter since the last good handshake.
        attempt: u32,
        /// Backoff delay before the attempt.
        delay: Duration,
    },
    /// The supervisor stopped. Always the last event.
    Closed(CloseReason),
}

struct Shared {
    current: StdMutex<Option<PacketCorrelator<ClientTalker>>>,
    close_tx: watch::Sender<Option<CloseReason>>,
}

/// Handle to a supervised hub link.
#[derive(Clone)]
pub struct NodeClient {
    shared: Arc<Shared>,
}

impl NodeClient {
    /// Starts the supervisor and returns the handle plus its event
    /// stream. The stream ends with a single [`NodeEvent::Closed`].
    pub fn connect(config: NodeConfig) -> (Self, mpsc::Receiver<NodeEvent>) {
        let (events_tx, events_rx) = mpsc::channel(64);
        let (close_tx, close_rx) = watch::channel(None);
        let shared = Arc::new(Shared {
            current: StdMutex::new(None),
            close_tx,
        });

        tokio::spawn(supervise(
            config,
            Arc::clone(&shared),
            events_tx,
            close_rx,
        ));

        (Self { shared }, events_rx)
    }

    /// Whether a handshaken connection is currently up.
    pub fn is_connected(&self) -> bool {
        self.shared
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Sends a packet on the current connection.
    pub async fn send<R: Send + 'static>(
        &self,
        packet: Packet,
        reaction: Reaction<R>,
    ) -> Result<Transmission<R>, ClientError> {
        let correlator = self.correlator()?;
        Ok(correlator.send(packet, reaction).await?)
    }

    /// Answers the packet stamped with `respond_to` on the current
    /// connection.
    pub async fn respond<R: Send + 'static>(
        &self,
        respond_to: u16,
        packet: Packet,
        reaction: Reaction<R>,
    ) -> Result<Transmission<R>, ClientError> {
        let correlator = self.correlator()?;
        Ok(correlator.respond(respond_to, packet, reaction).await?)
    }

    /// Closes the link for good. No reconnect is attempted.
    pub fn close(&self) {
        self.request_close(CloseReason::UserClose);
    }

    /// Tears the link down and fails everything outstanding. No
    /// reconnect is attempted.
    pub fn detach(&self) {
        self.request_close(CloseReason::Detach);
    }

    fn request_close(&self, reason: CloseReason) {
        // Detach first so no send can slip in after the close request.
        if let Some(correlator) = self
            .shared
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            correlator.detach();
            // Best-effort clean close frame so the hub sees a
            // deliberate shutdown, not a dead peer. `close` is async
            // and this isn't, hence the fire-and-forget task.
            let talker = Arc::clone(correlator.talker());
            tokio::spawn(async move {
                let _ = talker.close(CloseCode::Normal, "client closing").await;
            });
        }
        let _ = self.shared.close_tx.send(Some(reason));
    }

    fn correlator(
        &self,
    ) -> Result<PacketCorrelator<ClientTalker>, ClientError> {
        self.shared
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(ClientError::NotConnected)
    }
}

// --- supervisor ---

async fn supervise(
    config: NodeConfig,
    shared: Arc<Shared>,
    events: mpsc::Sender<NodeEvent>,
    mut close_rx: watch::Receiver<Option<CloseReason>>,
) {
    let registry = Arc::new(PacketRegistry::standard());
    let mut retry = LinearRetry::new(
        config.first_backoff,
        config.max_backoff,
        config.max_tries,
    );

    loop {
        let close_reason = close_rx.borrow_and_update().clone();
        if let Some(reason) = close_reason {
            let _ = events.send(NodeEvent::Closed(reason)).await;
            return;
        }

        let outcome = attempt(
            &config,
            &shared,
            &registry,
            &events,
            &mut retry,
            &mut close_rx,
        )
        .await;

        if let Some(correlator) = shared
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            correlator.detach();
        }

        let reason = match outcome {
            Ok(reason) => reason,
            Err(err) => {
                warn!(error = %err, "connection attempt failed");
                CloseReason::Timeout
            }
        };

        if !reason.should_reconnect() {
            info!(%reason, "node link closed");
            let _ = events.send(NodeEvent::Closed(reason)).await;
            return;
        }

        let Some(delay) = retry.next_delay() else {
            warn!("reconnect budget exhausted");
            let _ = events
                .send(NodeEvent::Closed(CloseReason::RetryLimitReached))
                .await;
            return;
        };
        debug!(attempt = retry.tries(), ?delay, %reason, "reconnecting");
        let _ = events
            .send(NodeEvent::Reconnecting {
                attempt: retry.tries(),
                delay,
            })
            .await;
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = close_rx.changed() => {}
        }
    }
}

/// Runs one connection from dial to close.
///
/// `Ok` carries a definite close classification; `Err` is an
/// attempt-level failure (dial, handshake violation, transport fault)
/// that always feeds the backoff policy.
async fn attempt(
    config: &NodeConfig,
    shared: &Shared,
    registry: &Arc<PacketRegistry>,
    events: &mpsc::Sender<NodeEvent>,
    retry: &mut LinearRetry,
    close_rx: &mut watch::Receiver<Option<CloseReason>>,
) -> Result<CloseReason, ClientError> {
    let talker = ClientTalker::connect(&config.url).await?;
    let correlator =
        PacketCorrelator::new(Arc::new(talker), Arc::clone(registry));
    *shared
        .current
        .lock()
        .unwrap_or_else(|e| e.into_inner()) = Some(correlator.clone());
    debug!(url = %config.url, "connected, awaiting hello");

    // --- Hello ---
    let hello_sequence = loop {
        let bytes =
            match next_frame(&correlator, config.auth_timeout, close_rx)
                .await?
            {
                FrameOutcome::Bytes(bytes) => bytes,
                FrameOutcome::Closed(reason) => return Ok(reason),
            };
        match correlator.process_receiving(&bytes)? {
            Some(ctx) if ctx.packet.kind() == PacketKind::Hello => {
                break ctx.sequence;
            }
            Some(ctx) => {
                return Err(ClientError::Handshake(format!(
                    "expected hello, got {:?}",
                    ctx.packet.kind()
                )));
            }
            None => continue,
        }
    };
    // A frame from the hub proves the network path is healthy again.
    retry.reset();

    // --- Auth ---
    let auth = Packet::Auth(Auth {
        login: config.login.clone(),
        password: config.password.clone(),
        node_name: config.node_name.clone(),
    });
    let reaction = Reaction::<i64>::builder()
        .on(PacketKind::Ready, |packet| match packet {
            Packet::Ready(ready) => Ok(ready.heartbeat_interval_ms),
            other => Err(ExchangeError::Handler(format!(
                "expected ready, got {:?}",
                other.kind()
            ))),
        })
        .give_up_after(config.auth_timeout)
        .build();
    let transmission = correlator.respond(hello_sequence, auth, reaction).await?;

    let mut settled = pin!(transmission.await_result());
    let heartbeat_ms = loop {
        tokio::select! {
            result = &mut settled => break result?,
            frame = next_frame(&correlator, config.auth_timeout, close_rx) => {
                match frame? {
                    FrameOutcome::Bytes(bytes) => {
                        if let Err(err) = correlator.process_receiving(&bytes) {
                            warn!(error = %err, "dropped malformed frame");
                        }
                    }
                    FrameOutcome::Closed(reason) => return Ok(reason),
                }
            }
        }
    };

    let heartbeat_interval =
        Duration::from_millis(heartbeat_ms.max(0) as u64);
    info!(node = %config.node_name, ?heartbeat_interval, "node ready");
    let _ = events
        .send(NodeEvent::Connected { heartbeat_interval })
        .await;

    // --- Ready: heartbeat beside the read loop ---
    let heartbeat = tokio::spawn(heartbeat_loop(
        correlator.clone(),
        heartbeat_interval,
        events.clone(),
    ));
    let outcome = read_loop(&correlator, config, events, close_rx).await;
    heartbeat.abort();
    outcome
}

async fn read_loop(
    correlator: &PacketCorrelator<ClientTalker>,
    config: &NodeConfig,
    events: &mpsc::Sender<NodeEvent>,
    close_rx: &mut watch::Receiver<Option<CloseReason>>,
) -> Result<CloseReason, ClientError> {
    loop {
        match next_frame(correlator, config.idle_timeout, close_rx).await? {
            FrameOutcome::Closed(reason) => return Ok(reason),
            FrameOutcome::Bytes(bytes) => {
                match correlator.process_receiving(&bytes) {
                    Ok(Some(ctx)) => {
                        if events.send(NodeEvent::Packet(ctx)).await.is_err() {
                            // Nobody is listening anymore.
                            return Ok(CloseReason::Detach);
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(error = %err, "dropped malformed frame");
                    }
                }
            }
        }
    }
}

enum FrameOutcome {
    Bytes(Vec<u8>),
    Closed(CloseReason),
}

async fn next_frame(
    correlator: &PacketCorrelator<ClientTalker>,
    idle: Duration,
    close_rx: &mut watch::Receiver<Option<CloseReason>>,
) -> Result<FrameOutcome, ClientError> {
    let talker = Arc::clone(correlator.talker());
    tokio::select! {
        _ = close_rx.changed() => {
            let reason = close_rx
                .borrow_and_update()
                .clone()
                .unwrap_or(CloseReason::UserClose);
            Ok(FrameOutcome::Closed(reason))
        }
        frame = tokio::time::timeout(idle, talker.recv()) => match frame {
            Err(_) => Ok(FrameOutcome::Closed(CloseReason::Timeout)),
            Ok(Err(err)) => Err(err.into()),
            Ok(Ok(None)) => Ok(FrameOutcome::Closed(close_from_peer(&talker))),
            Ok(Ok(Some(bytes))) => Ok(FrameOutcome::Bytes(bytes)),
        },
    }
}

/// Classifies an end-of-stream: a recorded close frame is the hub's
/// verdict, an abrupt drop is treated like a timeout and retried.
fn close_from_peer(talker: &ClientTalker) -> CloseReason {
    match talker.peer_close() {
        Some(frame) => CloseReason::ServerClose {
            code: frame.code,
            reason: frame.reason,
        },
        None => CloseReason::Timeout,
    }
}

async fn heartbeat_loop(
    correlator: PacketCorrelator<ClientTalker>,
    every: Duration,
    events: mpsc::Sender<NodeEvent>,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of a Tokio interval fires immediately.
    interval.tick().await;
    loop {
        interval.tick().await;
        let sent_at = Instant::now();
        let reaction = Reaction::<Duration>::builder()
            .on(PacketKind::HeartbeatAck, move |_| Ok(sent_at.elapsed()))
            .give_up_after(every)
            .build();
        let transmission = match correlator
            .send(Packet::Heartbeat(Heartbeat), reaction)
            .await
        {
            Ok(transmission) => transmission,
            Err(err) => {
                debug!(error = %err, "heartbeat send failed");
                return;
            }
        };
        match transmission.await_result().await {
            Ok(latency) => {
                trace!(?latency, "heartbeat acknowledged");
                if events.send(NodeEvent::Latency(latency)).await.is_err() {
                    return;
                }
            }
            Err(err) => debug!(error = %err, "heartbeat unacknowledged"),
        }
    }
}
