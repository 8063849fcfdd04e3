//! The packet correlator: pairs outgoing packets with their responses.
//!
//! Every outgoing packet is stamped with a sequence drawn from a small
//! bounded pool. A packet that answers another is stamped with the
//! original sequence plus one, so the sender of a request knows in
//! advance which sequence its reply will carry and parks a pending
//! entry under that key. Incoming frames are first offered to the
//! pending table; only frames nobody was waiting for surface to the
//! caller as unsolicited traffic.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::Rng;
use tokio::sync::oneshot;
use tracing::trace;

use synclink_protocol::{HEADER_SIZE, Packet, PacketRegistry};
use synclink_transport::Talker;

use crate::ExchangeError;
use crate::reaction::{Reaction, SettleEvent};
use crate::scheduler::TimeoutScheduler;
use crate::transmission::{Pending, Transmission};

/// Size of the sequence pool fresh transmissions draw from. Replies
/// land just above their request's sequence, so reply sequences may
/// exceed this bound by one.
pub const SEQUENCE_POOL_SIZE: u16 = 596;

/// Draw attempts before giving up on a free sequence slot.
const MAX_DRAW_ATTEMPTS: u16 = SEQUENCE_POOL_SIZE;

/// An incoming packet no pending transmission claimed.
#[derive(Debug)]
pub struct IncomingContext {
    /// The decoded packet.
    pub packet: Packet,
    /// The sequence it was stamped with; respond at this plus one.
    pub sequence: u16,
}

/// Correlation engine for one talker.
///
/// Cheap to clone; clones share the pending table and the underlying
/// talker.
pub struct PacketCorrelator<T> {
    talker: Arc<T>,
    registry: Arc<PacketRegistry>,
    table: Arc<DashMap<u16, Arc<Pending>>>,
    scheduler: TimeoutScheduler,
    detached: Arc<AtomicBool>,
}

impl<T> Clone for PacketCorrelator<T> {
    fn clone(&self) -> Self {
        Self {
            talker: Arc::clone(&self.talker),
            registry: Arc::clone(&self.registry),
            table: Arc::clone(&self.table),
            scheduler: self.scheduler,
            detached: Arc::clone(&self.detached),
        }
    }
}

impl<T: Talker> PacketCorrelator<T> {
    /// Wraps a talker with an empty pending table.
    pub fn new(talker: Arc<T>, registry: Arc<PacketRegistry>) -> Self {
        Self {
            talker,
            registry,
            table: Arc::new(DashMap::new()),
            scheduler: TimeoutScheduler::new(),
            detached: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The talker this correlator sends through.
    pub fn talker(&self) -> &Arc<T> {
        &self.talker
    }

    /// The registry frames are encoded and decoded against.
    pub fn registry(&self) -> &Arc<PacketRegistry> {
        &self.registry
    }

    /// Sends a packet under a freshly drawn sequence.
    pub async fn send<R: Send + 'static>(
        &self,
        packet: Packet,
        reaction: Reaction<R>,
    ) -> Result<Transmission<R>, ExchangeError> {
        let sequence = self.draw_sequence()?;
        self.transmit(sequence, packet, reaction).await
    }

    /// Sends a packet as the answer to the transmission stamped with
    /// `respond_to`: the outgoing sequence is `respond_to + 1`, which
    /// is exactly the slot the requester is waiting on.
    pub async fn respond<R: Send + 'static>(
        &self,
        respond_to: u16,
        packet: Packet,
        reaction: Reaction<R>,
    ) -> Result<Transmission<R>, ExchangeError> {
        self.transmit(respond_to.wrapping_add(1), packet, reaction)
            .await
    }

    async fn transmit<R: Send + 'static>(
        &self,
        sequence: u16,
        packet: Packet,
        reaction: Reaction<R>,
    ) -> Result<Transmission<R>, ExchangeError> {
        if self.detached.load(Ordering::SeqCst) {
            return Err(ExchangeError::Cancelled);
        }
        let kind = packet.kind();
        let bytes = packet.encode(&self.registry, sequence)?;
        let (tx, rx) = oneshot::channel();

        if reaction.is_passive() {
            // Nothing will ever settle this; don't track it.
            drop(tx);
            self.talker.send(&bytes).await?;
            trace!(%sequence, ?kind, "sent untracked packet");
            return Ok(Transmission::new(sequence, None, rx));
        }

        let reply_sequence = reaction
            .expects_receive()
            .then(|| sequence.wrapping_add(1));
        let reply_key = reply_sequence.unwrap_or(sequence);
        let timeouts = reaction.timeout_durations();
        let pending = Arc::new(Pending::new(reaction, tx));

        // Timers are registered before the entry is reachable, so a
        // response racing the send always finds them to cancel. Each
        // timer settles only the exact entry it was armed for; a slot
        // reused by a later transmission is left alone.
        for after in timeouts {
            let table = Arc::clone(&self.table);
            let armed_for = Arc::clone(&pending);
            let handle = self.scheduler.run_later(after, move || {
                let Some((_, entry)) = table
                    .remove_if(&reply_key, |_, entry| {
                        Arc::ptr_eq(entry, &armed_for)
                    })
                else {
                    return;
                };
                if entry.was_received() {
                    return;
                }
                entry.cancel_timers();
                entry.settle(SettleEvent::TimedOut(after));
            });
            pending.add_timer(handle);
        }

        match self.table.entry(reply_key) {
            Entry::Occupied(_) => {
                pending.cancel_timers();
                return Err(ExchangeError::SequenceCollision(reply_key));
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&pending));
            }
        }

        if let Err(err) = self.talker.send(&bytes).await {
            if let Some((_, entry)) = self
                .table
                .remove_if(&reply_key, |_, entry| Arc::ptr_eq(entry, &pending))
            {
                entry.cancel_timers();
            }
            return Err(err.into());
        }
        trace!(%sequence, %reply_key, ?kind, "sent tracked packet");

        Ok(Transmission::new(sequence, reply_sequence, rx))
    }

    /// Feeds one incoming frame through the correlator.
    ///
    /// Returns `Ok(None)` when the frame settled a pending
    /// transmission or carried an unregistered packet id, and
    /// `Ok(Some(..))` when it is unsolicited traffic for the caller.
    /// A frame that cannot be decoded fails the pending transmission
    /// its header points at, if any, and is reported to the caller.
    pub fn process_receiving(
        &self,
        bytes: &[u8],
    ) -> Result<Option<IncomingContext>, ExchangeError> {
        match Packet::decode(&self.registry, bytes) {
            Ok(Some((packet, sequence))) => {
                let Some((_, pending)) = self.table.remove(&sequence) else {
                    return Ok(Some(IncomingContext { packet, sequence }));
                };
                pending.mark_received();
                pending.cancel_timers();
                trace!(%sequence, kind = ?packet.kind(), "settled transmission");
                pending.settle(SettleEvent::Received(packet));
                Ok(None)
            }
            Ok(None) => {
                trace!("dropped frame with unregistered packet id");
                Ok(None)
            }
            Err(err) => {
                if bytes.len() >= HEADER_SIZE {
                    let sequence = u16::from_be_bytes([bytes[1], bytes[2]]);
                    if let Some((_, pending)) = self.table.remove(&sequence) {
                        pending.cancel_timers();
                        pending.settle(SettleEvent::Failed(
                            ExchangeError::MalformedResponse(err.to_string()),
                        ));
                    }
                }
                Err(err.into())
            }
        }
    }

    /// Fails every outstanding transmission and refuses new ones.
    /// Used when the connection drops out from under the correlator.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
        let keys: Vec<u16> = self.table.iter().map(|e| *e.key()).collect();
        for key in keys {
            if let Some((_, pending)) = self.table.remove(&key) {
                pending.cancel_timers();
                pending.settle(SettleEvent::Failed(ExchangeError::Cancelled));
            }
        }
    }

    /// Number of transmissions still waiting to settle.
    pub fn outstanding(&self) -> usize {
        self.table.len()
    }

    /// Draws a sequence whose slot and reply slot are both free.
    /// Rejecting the reply slot too keeps a fresh draw from colliding
    /// with the answer to an earlier transmission.
    fn draw_sequence(&self) -> Result<u16, ExchangeError> {
        let mut rng = rand::rng();
        for _ in 0..MAX_DRAW_ATTEMPTS {
            let candidate = rng.random_range(0..SEQUENCE_POOL_SIZE);
            if self.table.contains_key(&candidate)
                || self.table.contains_key(&(candidate + 1))
            {
                continue;
            }
            return Ok(candidate);
        }
        Err(ExchangeError::SequencePoolExhausted)
    }
}
