//! In-memory talker pair backed by unbounded channels.
//!
//! Gives the correlation layer something to run against in tests
//! without opening sockets: whatever one side sends, the other side
//! receives, including close frames.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;

use tokio::sync::mpsc;
use tokio::sync::Mutex;

use synclink_protocol::CloseCode;

use crate::{CloseFrame, Talker, TalkerId, TransportError};

static NEXT_MEMORY_ID: AtomicU64 = AtomicU64::new(1);

enum Frame {
    Data(Vec<u8>),
    Close(CloseFrame),
}

/// One end of an in-memory duplex channel.
pub struct MemoryTalker {
    id: TalkerId,
    open: AtomicBool,
    peer_close: StdMutex<Option<CloseFrame>>,
    tx: mpsc::UnboundedSender<Frame>,
    rx: Mutex<mpsc::UnboundedReceiver<Frame>>,
}

impl MemoryTalker {
    /// Creates a connected pair; frames sent on one end arrive on the
    /// other.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (Self::end(a_tx, a_rx), Self::end(b_tx, b_rx))
    }

    fn end(
        tx: mpsc::UnboundedSender<Frame>,
        rx: mpsc::UnboundedReceiver<Frame>,
    ) -> Self {
        Self {
            id: TalkerId::new(NEXT_MEMORY_ID.fetch_add(1, Ordering::Relaxed)),
            open: AtomicBool::new(true),
            peer_close: StdMutex::new(None),
            tx,
            rx: Mutex::new(rx),
        }
    }
}

impl Talker for MemoryTalker {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed(self.id.to_string()));
        }
        self.tx
            .send(Frame::Data(data.to_vec()))
            .map_err(|_| TransportError::Closed(self.id.to_string()))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let frame = self.rx.lock().await.recv().await;
        match frame {
            Some(Frame::Data(data)) => Ok(Some(data)),
            Some(Frame::Close(close)) => {
                self.open.store(false, Ordering::Release);
                let mut slot = self
                    .peer_close
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                *slot = Some(close);
                Ok(None)
            }
            None => {
                self.open.store(false, Ordering::Release);
                Ok(None)
            }
        }
    }

    async fn close(
        &self,
        code: CloseCode,
        reason: &str,
    ) -> Result<(), TransportError> {
        self.open.store(false, Ordering::Release);
        // Peer may already be gone; closing twice is not an error.
        let _ = self.tx.send(Frame::Close(CloseFrame {
            code: code.as_u16(),
            reason: reason.to_owned(),
        }));
        Ok(())
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
