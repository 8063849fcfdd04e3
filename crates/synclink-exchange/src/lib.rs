//! Request/response correlation for the Synclink packet protocol.
//!
//! Sits between the transport and the lifecycle layers: callers hand
//! the [`PacketCorrelator`] a packet plus a [`Reaction`] describing
//! what to do with the eventual response (or its absence), and get a
//! [`Transmission`] future back. Incoming frames feed through
//! [`PacketCorrelator::process_receiving`], which settles pending
//! transmissions and surfaces only the unsolicited remainder.

pub mod correlator;
pub mod error;
pub mod reaction;
pub mod scheduler;
pub mod transmission;

pub use correlator::{IncomingContext, PacketCorrelator, SEQUENCE_POOL_SIZE};
pub use error::ExchangeError;
pub use reaction::{HandlerResult, Reaction, ReactionBuilder};
pub use scheduler::{TaskHandle, TimeoutScheduler};
pub use transmission::Transmission;
