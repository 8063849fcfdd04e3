//! The reaction pipeline: a declarative description, attached to one
//! outgoing packet, of how to turn the eventual incoming packet (or a
//! timeout, or a failure) into a single result value.
//!
//! A [`Reaction`] is built once via [`ReactionBuilder`] and then
//! immutable: at most one receive handler per packet variant, an
//! optional wildcard used when no typed handler matches, any number of
//! per-duration timeout handlers, and an optional error handler that
//! failures are routed through. Every handler produces the same
//! declared result type `R` — the builder's type parameter enforces it.
//!
//! A reaction with no handlers at all is fire-and-forget: the send
//! happens, nothing is ever awaited, nothing is tracked.

use std::collections::HashMap;
use std::time::Duration;

use synclink_protocol::{Packet, PacketKind};

use crate::ExchangeError;

/// What a handler produces: the declared result value or a failure.
pub type HandlerResult<R> = Result<R, ExchangeError>;

type ReceiveHandler<R> = Box<dyn FnOnce(Packet) -> HandlerResult<R> + Send>;
type TimeoutHandler<R> = Box<dyn FnOnce(Duration) -> HandlerResult<R> + Send>;
type ErrorHandler<R> =
    Box<dyn FnOnce(ExchangeError) -> HandlerResult<R> + Send>;

/// The terminal event that settles a transmission. Exactly one of
/// these is ever applied to a given reaction.
pub(crate) enum SettleEvent {
    /// The correlated response packet arrived.
    Received(Packet),
    /// The armed timeout for this duration elapsed first.
    TimedOut(Duration),
    /// The transmission failed outright (cancellation, malformed
    /// response frame).
    Failed(ExchangeError),
}

/// How to interpret the eventual outcome of one outgoing packet.
pub struct Reaction<R> {
    receive: HashMap<PacketKind, ReceiveHandler<R>>,
    fallback: Option<ReceiveHandler<R>>,
    timeouts: Vec<(Duration, TimeoutHandler<R>)>,
    error: Option<ErrorHandler<R>>,
}

impl<R> Reaction<R> {
    /// Starts building a reaction.
    pub fn builder() -> ReactionBuilder<R> {
        ReactionBuilder {
            reaction: Self::none(),
        }
    }

    /// A reaction with no handlers: fire-and-forget.
    pub fn none() -> Self {
        Self {
            receive: HashMap::new(),
            fallback: None,
            timeouts: Vec::new(),
            error: None,
        }
    }

    /// Whether this reaction wants a correlated response.
    pub(crate) fn expects_receive(&self) -> bool {
        !self.receive.is_empty() || self.fallback.is_some()
    }

    /// Whether nothing could ever settle this reaction — no receive
    /// handlers and no timeouts. Such a transmission is never tracked.
    pub(crate) fn is_passive(&self) -> bool {
        !self.expects_receive() && self.timeouts.is_empty()
    }

    /// The timeout durations the correlator must arm.
    pub(crate) fn timeout_durations(&self) -> Vec<Duration> {
        self.timeouts.iter().map(|(after, _)| *after).collect()
    }

    /// Runs the pipeline for the terminal event. Returns `None` when
    /// the event found no handler (abandonment, not an error).
    pub(crate) fn settle(
        mut self,
        event: SettleEvent,
    ) -> Option<HandlerResult<R>> {
        let outcome = match event {
            SettleEvent::Received(packet) => {
                let handler = self
                    .receive
                    .remove(&packet.kind())
                    .or_else(|| self.fallback.take());
                match handler {
                    Some(handler) => handler(packet),
                    None => return None,
                }
            }
            SettleEvent::TimedOut(elapsed) => {
                match self.take_timeout(elapsed) {
                    Some(handler) => handler(elapsed),
                    None => Err(ExchangeError::Timeout(elapsed)),
                }
            }
            SettleEvent::Failed(err) => Err(err),
        };

        Some(match outcome {
            Err(err) => match self.error.take() {
                Some(handler) => handler(err),
                None => Err(err),
            },
            ok => ok,
        })
    }

    fn take_timeout(
        &mut self,
        elapsed: Duration,
    ) -> Option<TimeoutHandler<R>> {
        let index = self
            .timeouts
            .iter()
            .position(|(after, _)| *after == elapsed)?;
        Some(self.timeouts.swap_remove(index).1)
    }
}

/// Builder for a [`Reaction`]. Consumed by `build`.
pub struct ReactionBuilder<R> {
    reaction: Reaction<R>,
}

impl<R> ReactionBuilder<R> {
    /// Registers the handler for one packet variant. At most one
    /// handler per variant; registering a second replaces the first.
    pub fn on(
        mut self,
        kind: PacketKind,
        handler: impl FnOnce(Packet) -> HandlerResult<R> + Send + 'static,
    ) -> Self {
        self.reaction.receive.insert(kind, Box::new(handler));
        self
    }

    /// Registers the wildcard handler, used when no typed handler
    /// matches the received variant.
    pub fn any(
        mut self,
        handler: impl FnOnce(Packet) -> HandlerResult<R> + Send + 'static,
    ) -> Self {
        self.reaction.fallback = Some(Box::new(handler));
        self
    }

    /// Registers a timeout handler for the given elapsed duration.
    /// Distinct durations may carry distinct handlers (e.g. a short
    /// retry prompt and a final give-up); whichever timer fires first
    /// wins the settlement race.
    pub fn timeout(
        mut self,
        after: Duration,
        handler: impl FnOnce(Duration) -> HandlerResult<R> + Send + 'static,
    ) -> Self {
        self.reaction.timeouts.push((after, Box::new(handler)));
        self
    }

    /// Arms a timeout that settles the transmission with
    /// [`ExchangeError::Timeout`] — for callers with no fallback value.
    pub fn give_up_after(self, after: Duration) -> Self {
        self.timeout(after, |elapsed| Err(ExchangeError::Timeout(elapsed)))
    }

    /// Registers the error handler. Handler failures and transmission
    /// failures are routed through it; it may substitute a value or
    /// rewrap the error.
    pub fn on_error(
        mut self,
        handler: impl FnOnce(ExchangeError) -> HandlerResult<R> + Send + 'static,
    ) -> Self {
        self.reaction.error = Some(Box::new(handler));
        self
    }

    /// Finalizes the reaction.
    pub fn build(self) -> Reaction<R> {
        self.reaction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synclink_protocol::{ErrorPacket, Heartbeat, OkPacket};

    fn ok_packet(message: &str) -> Packet {
        Packet::Ok(OkPacket {
            message: message.into(),
        })
    }

    #[test]
    fn typed_handler_wins_over_wildcard() {
        let reaction = Reaction::<&'static str>::builder()
            .on(PacketKind::Ok, |_| Ok("typed"))
            .any(|_| Ok("wildcard"))
            .build();
        let result = reaction
            .settle(SettleEvent::Received(ok_packet("x")))
            .unwrap();
        assert_eq!(result.unwrap(), "typed");
    }

    #[test]
    fn wildcard_catches_unmatched_variants() {
        let reaction = Reaction::<&'static str>::builder()
            .on(PacketKind::Ok, |_| Ok("typed"))
            .any(|_| Ok("wildcard"))
            .build();
        let result = reaction
            .settle(SettleEvent::Received(Packet::Heartbeat(Heartbeat)))
            .unwrap();
        assert_eq!(result.unwrap(), "wildcard");
    }

    #[test]
    fn no_matching_handler_abandons() {
        let reaction = Reaction::<&'static str>::builder()
            .on(PacketKind::UserData, |_| Ok("data"))
            .build();
        assert!(reaction
            .settle(SettleEvent::Received(ok_packet("x")))
            .is_none());
    }

    #[test]
    fn timeout_handler_selected_by_duration() {
        let reaction = Reaction::<&'static str>::builder()
            .timeout(Duration::from_millis(50), |_| Ok("short"))
            .timeout(Duration::from_secs(5), |_| Ok("long"))
            .build();
        let result = reaction
            .settle(SettleEvent::TimedOut(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(result.unwrap(), "long");
    }

    #[test]
    fn undeclared_timeout_becomes_timeout_error() {
        let reaction = Reaction::<&'static str>::builder()
            .on(PacketKind::Ok, |_| Ok("never"))
            .build();
        let result = reaction
            .settle(SettleEvent::TimedOut(Duration::from_millis(10)))
            .unwrap();
        assert!(matches!(result, Err(ExchangeError::Timeout(_))));
    }

    #[test]
    fn handler_failure_routes_through_error_handler() {
        let reaction = Reaction::<String>::builder()
            .on(PacketKind::Ok, |_| {
                Err(ExchangeError::Handler("broken".into()))
            })
            .on_error(|err| Ok(format!("recovered: {err}")))
            .build();
        let result = reaction
            .settle(SettleEvent::Received(ok_packet("x")))
            .unwrap();
        assert_eq!(result.unwrap(), "recovered: reaction handler failed: broken");
    }

    #[test]
    fn failure_without_error_handler_surfaces() {
        let reaction = Reaction::<String>::builder()
            .on(PacketKind::Ok, |packet| match packet {
                Packet::Ok(ok) => Ok(ok.message),
                other => Err(ExchangeError::Handler(format!(
                    "unexpected {:?}",
                    other.kind()
                ))),
            })
            .build();
        let result = reaction
            .settle(SettleEvent::Failed(ExchangeError::Cancelled))
            .unwrap();
        assert!(matches!(result, Err(ExchangeError::Cancelled)));
    }

    #[test]
    fn second_registration_replaces_first() {
        let reaction = Reaction::<&'static str>::builder()
            .on(PacketKind::Error, |_| Ok("first"))
            .on(PacketKind::Error, |_| Ok("second"))
            .build();
        let result = reaction
            .settle(SettleEvent::Received(Packet::Error(ErrorPacket {
                message: "e".into(),
            })))
            .unwrap();
        assert_eq!(result.unwrap(), "second");
    }

    #[test]
    fn passive_reaction_is_detected() {
        assert!(Reaction::<()>::none().is_passive());
        assert!(!Reaction::<()>::builder()
            .give_up_after(Duration::from_secs(1))
            .build()
            .is_passive());
        assert!(!Reaction::<()>::builder().any(|_| Ok(())).build().is_passive());
    }
}
