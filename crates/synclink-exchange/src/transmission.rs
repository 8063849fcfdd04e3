//! In-flight transmission bookkeeping.
//!
//! When a packet goes out with a non-passive reaction, the correlator
//! parks a [`Pending`] entry in its table and hands the caller a
//! [`Transmission`] — a typed future for the settled result. The two
//! halves meet over a oneshot channel.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::oneshot;
use tracing::warn;

use crate::ExchangeError;
use crate::reaction::{Reaction, SettleEvent};
use crate::scheduler::TaskHandle;

/// The caller's half of an in-flight exchange.
#[derive(Debug)]
pub struct Transmission<R> {
    sequence: u16,
    reply_sequence: Option<u16>,
    rx: oneshot::Receiver<Result<R, ExchangeError>>,
}

impl<R> Transmission<R> {
    pub(crate) fn new(
        sequence: u16,
        reply_sequence: Option<u16>,
        rx: oneshot::Receiver<Result<R, ExchangeError>>,
    ) -> Self {
        Self {
            sequence,
            reply_sequence,
            rx,
        }
    }

    /// The sequence the outgoing packet was stamped with.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// The sequence a correlated response must carry, when one is
    /// expected at all.
    pub fn reply_sequence(&self) -> Option<u16> {
        self.reply_sequence
    }

    /// Waits for the transmission to settle.
    ///
    /// A dropped sender means no handler ever produced a value: the
    /// transmission was fire-and-forget, or the response arrived and
    /// nothing consumed it. Both surface as
    /// [`ExchangeError::Abandoned`].
    pub async fn await_result(self) -> Result<R, ExchangeError> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(ExchangeError::Abandoned),
        }
    }
}

/// The correlator's half: a type-erased settlement closure plus the
/// timers racing against the response.
///
/// Settlement is take-once. Whichever path removes the table entry
/// first (receive, timeout, detach) runs the closure; everyone else
/// finds the slot empty and walks away.
pub(crate) struct Pending {
    received: AtomicBool,
    settle: Mutex<Option<Box<dyn FnOnce(SettleEvent) + Send>>>,
    timers: Mutex<Vec<TaskHandle>>,
}

impl Pending {
    pub(crate) fn new<R: Send + 'static>(
        reaction: Reaction<R>,
        tx: oneshot::Sender<Result<R, ExchangeError>>,
    ) -> Self {
        let settle = Box::new(move |event: SettleEvent| {
            if let Some(outcome) = reaction.settle(event) {
                // The caller may have dropped the transmission handle.
                let _ = tx.send(outcome);
            }
        });
        Self {
            received: AtomicBool::new(false),
            settle: Mutex::new(Some(settle)),
            timers: Mutex::new(Vec::new()),
        }
    }

    /// Records that the response beat the timers. Guards against a
    /// timer callback that was already past its table lookup.
    pub(crate) fn mark_received(&self) {
        self.received.store(true, Ordering::SeqCst);
    }

    pub(crate) fn was_received(&self) -> bool {
        self.received.load(Ordering::SeqCst)
    }

    /// Registers a timer to cancel once the entry settles.
    pub(crate) fn add_timer(&self, handle: TaskHandle) {
        self.timers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle);
    }

    /// Aborts every armed timer for this entry.
    pub(crate) fn cancel_timers(&self) {
        let timers = std::mem::take(
            &mut *self.timers.lock().unwrap_or_else(|e| e.into_inner()),
        );
        for timer in timers {
            timer.cancel();
        }
    }

    /// Runs the settlement closure with the terminal event.
    pub(crate) fn settle(&self, event: SettleEvent) {
        let closure = self
            .settle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match closure {
            Some(closure) => closure(event),
            // Unreachable via the table (removal is atomic), kept as a
            // tripwire for future callers.
            None => warn!("transmission settled twice"),
        }
    }
}
