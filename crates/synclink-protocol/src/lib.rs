//! Binary wire protocol for Synclink.
//!
//! This crate defines the "language" that the hub and its nodes speak:
//!
//! - **Buffer** ([`PacketBuffer`]) — typed field writers/readers over a
//!   length-prefixed binary frame with a `[id][sequence]` header.
//! - **Packets** ([`Packet`] and its variants) — the closed message set,
//!   each variant owning its own field layout.
//! - **Registry** ([`PacketRegistry`]) — the static id ↔ variant table
//!   used to instantiate packets at decode time.
//! - **Close codes** ([`CloseCode`]) — the 4000-range application codes
//!   carried on close frames.
//! - **Errors** ([`ProtocolError`]) — what can go wrong on the wire.
//!
//! The protocol layer knows nothing about connections, correlation, or
//! sessions — it only turns packets into bytes and back.

mod buffer;
mod close;
mod error;
mod packet;
mod registry;

pub use buffer::{PacketBuffer, HEADER_SIZE};
pub use close::CloseCode;
pub use error::ProtocolError;
pub use packet::{
    Auth, BatchSaveData, EndSession, ErrorPacket, Heartbeat, HeartbeatAck,
    Hello, Leaderboard, LeaderboardEntry, LoadData, OkPacket, Packet,
    PacketKind, Ready, RequestLeaderboard, RequestSync, RequestTopPosition,
    SaveData, StopSession, TopPosition, UserData,
};
pub use registry::{PacketEntry, PacketRegistry};
