//! WebSocket talker implementation using `tokio-tungstenite`.
//!
//! The stream is split into independent sink and stream halves so that
//! heartbeat/response sends never contend with a blocked read — the
//! read loop can sit in `recv` while other tasks send.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as WsCloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use synclink_protocol::CloseCode;

use crate::{CloseFrame, Talker, TalkerId, TransportError};

/// Counter for generating unique talker IDs.
static NEXT_TALKER_ID: AtomicU64 = AtomicU64::new(1);

/// Server-side talker over a plain TCP stream.
pub type ServerTalker = WebSocketTalker<TcpStream>;

/// Client-side talker, possibly TLS-wrapped by the connector.
pub type ClientTalker = WebSocketTalker<MaybeTlsStream<TcpStream>>;

/// Listens for incoming WebSocket connections and yields talkers.
pub struct WebSocketListener {
    listener: TcpListener,
}

impl WebSocketListener {
    /// Binds a listener to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket listener bound");
        Ok(Self { listener })
    }

    /// The local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for and accepts the next incoming connection.
    pub async fn accept(&self) -> Result<ServerTalker, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| {
                TransportError::AcceptFailed(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    e,
                ))
            })?;

        let talker = WebSocketTalker::new(ws);
        tracing::debug!(id = %talker.id(), %addr, "accepted WebSocket connection");
        Ok(talker)
    }
}

/// A single WebSocket connection implementing [`Talker`].
pub struct WebSocketTalker<S> {
    id: TalkerId,
    open: AtomicBool,
    peer_close: StdMutex<Option<CloseFrame>>,
    sink: Mutex<SplitSink<WebSocketStream<S>, Message>>,
    stream: Mutex<SplitStream<WebSocketStream<S>>>,
}

impl ClientTalker {
    /// Dials a WebSocket endpoint (e.g. `ws://hub.example:7000`).
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        let talker = WebSocketTalker::new(ws);
        tracing::debug!(id = %talker.id(), url, "connected to hub");
        Ok(talker)
    }
}

impl<S> WebSocketTalker<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn new(ws: WebSocketStream<S>) -> Self {
        let (sink, stream) = ws.split();
        Self {
            id: TalkerId::new(NEXT_TALKER_ID.fetch_add(1, Ordering::Relaxed)),
            open: AtomicBool::new(true),
            peer_close: StdMutex::new(None),
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }

    fn record_peer_close(&self, frame: Option<WsCloseFrame>) {
        self.open.store(false, Ordering::Release);
        if let Some(frame) = frame {
            let mut slot = self
                .peer_close
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *slot = Some(CloseFrame {
                code: u16::from(frame.code),
                reason: frame.reason.as_str().to_owned(),
            });
        }
    }
}

impl<S> Talker for WebSocketTalker<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed(self.id.to_string()));
        }
        let msg = Message::Binary(data.to_vec().into());
        self.sink.lock().await.send(msg).await.map_err(|e| {
            self.open.store(false, Ordering::Release);
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            let msg = self.stream.lock().await.next().await;
            match msg {
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.into()));
                }
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(frame))) => {
                    self.record_peer_close(frame);
                    return Ok(None);
                }
                None => {
                    self.open.store(false, Ordering::Release);
                    return Ok(None);
                }
                Some(Ok(_)) => continue, // skip ping/pong/frame
                Some(Err(e)) => {
                    self.open.store(false, Ordering::Release);
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    async fn close(
        &self,
        code: CloseCode,
        reason: &str,
    ) -> Result<(), TransportError> {
        self.open.store(false, Ordering::Release);
        let frame = WsCloseFrame {
            code: code.as_u16().into(),
            reason: reason.to_owned().into(),
        };
        self.sink
            .lock()
            .await
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| {
                TransportError::SendFailed(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    e,
                ))
            })
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn peer_close(&self) -> Option<CloseFrame> {
        self.peer_close
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn id(&self) -> TalkerId {
        self.id
    }
}
