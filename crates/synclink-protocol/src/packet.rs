//! The closed packet set of the Synclink protocol.
//!
//! Every message on the wire is one of the variants below. A packet's
//! identity on the wire is its registry-assigned id byte; its payload
//! layout is owned by the variant itself (each variant writes and reads
//! its own fields). The hub and nodes exchange progress data as wide
//! integers keyed by stat name, scoped to a `(scope, holder)` pair —
//! one scope per game mode/realm, one holder per player or entity.

use std::collections::BTreeMap;

use crate::buffer::PacketBuffer;
use crate::registry::PacketRegistry;
use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Variant payloads
// ---------------------------------------------------------------------------

/// Server → node greeting, sent immediately after the transport opens.
/// Carries no fields; its sequence number anchors the handshake chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hello;

/// Node → server credentials, sent in reply to [`Hello`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Auth {
    /// Account login of the node.
    pub login: String,
    /// Account password of the node.
    pub password: String,
    /// Unique name this node registers under.
    pub node_name: String,
}

/// Server → node: authentication accepted, the session is live.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ready {
    /// Interval at which the node must emit [`Heartbeat`] packets,
    /// in milliseconds.
    pub heartbeat_interval_ms: i64,
}

/// Node → server keep-alive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Heartbeat;

/// Server → node reply to [`Heartbeat`]; the node derives round-trip
/// latency from a monotonic timestamp taken at send time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeartbeatAck;

/// Node → server: fetch the stored progress data for a holder.
/// Answered with [`UserData`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadData {
    /// Data scope (game mode, realm, …).
    pub scope: String,
    /// Holder identity (player, entity, …).
    pub holder: String,
}

/// Node → server: store a single progress value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveData {
    /// Data scope.
    pub scope: String,
    /// Holder identity.
    pub holder: String,
    /// Stat key being written.
    pub key: String,
    /// New value.
    pub value: i128,
}

/// Node → server: store a whole bundle of progress values at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSaveData {
    /// Data scope.
    pub scope: String,
    /// Holder identity.
    pub holder: String,
    /// Stat key → value map.
    pub data: BTreeMap<String, i128>,
}

/// Server → node: stop the session for a holder (another node is taking
/// it over, or the hub is shedding load). Unsolicited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopSession {
    /// Data scope.
    pub scope: String,
    /// Holder identity.
    pub holder: String,
}

/// Node → server: the node is done with this holder's session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndSession {
    /// Data scope.
    pub scope: String,
    /// Holder identity.
    pub holder: String,
}

/// A holder's full progress snapshot. Sent by the server in reply to
/// [`LoadData`], or pushed by a node in reply to [`RequestSync`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserData {
    /// Data scope.
    pub scope: String,
    /// Holder identity.
    pub holder: String,
    /// Stat key → value map.
    pub data: BTreeMap<String, i128>,
}

/// Server → node: push your current in-memory data for this holder now.
/// Unsolicited; answered with [`UserData`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSync {
    /// Data scope.
    pub scope: String,
    /// Holder identity.
    pub holder: String,
}

/// Node → server: query the top of a leaderboard.
/// Answered with [`Leaderboard`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestLeaderboard {
    /// Data scope.
    pub scope: String,
    /// Stat key the leaderboard is ordered by.
    pub key: String,
    /// Maximum number of entries to return.
    pub limit: i32,
}

/// One row of a leaderboard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaderboardEntry {
    /// Holder identity.
    pub holder: String,
    /// The holder's value for the requested stat key.
    pub value: i128,
}

/// Server → node: leaderboard contents, best first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Leaderboard {
    /// Data scope.
    pub scope: String,
    /// Stat key the entries are ordered by.
    pub key: String,
    /// Ordered rows, best first.
    pub entries: Vec<LeaderboardEntry>,
}

/// Node → server: where does this holder rank?
/// Answered with [`TopPosition`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestTopPosition {
    /// Data scope.
    pub scope: String,
    /// Stat key the ranking is ordered by.
    pub key: String,
    /// Holder identity.
    pub holder: String,
}

/// Server → node: a holder's rank within a leaderboard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopPosition {
    /// 1-based rank, or 0 when the holder is unranked.
    pub position: i64,
    /// Total number of ranked holders.
    pub of: i64,
}

/// Generic success reply carrying a short message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OkPacket {
    /// Free-form status text.
    pub message: String,
}

/// Generic failure reply carrying a short message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorPacket {
    /// Free-form failure text.
    pub message: String,
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// A decoded protocol packet: the closed union of every variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// See [`Auth`].
    Auth(Auth),
    /// See [`Hello`].
    Hello(Hello),
    /// See [`Heartbeat`].
    Heartbeat(Heartbeat),
    /// See [`HeartbeatAck`].
    HeartbeatAck(HeartbeatAck),
    /// See [`Ready`].
    Ready(Ready),
    /// See [`LoadData`].
    LoadData(LoadData),
    /// See [`SaveData`].
    SaveData(SaveData),
    /// See [`BatchSaveData`].
    BatchSaveData(BatchSaveData),
    /// See [`StopSession`].
    StopSession(StopSession),
    /// See [`EndSession`].
    EndSession(EndSession),
    /// See [`UserData`].
    UserData(UserData),
    /// See [`RequestSync`].
    RequestSync(RequestSync),
    /// See [`RequestLeaderboard`].
    RequestLeaderboard(RequestLeaderboard),
    /// See [`Leaderboard`].
    Leaderboard(Leaderboard),
    /// See [`RequestTopPosition`].
    RequestTopPosition(RequestTopPosition),
    /// See [`TopPosition`].
    TopPosition(TopPosition),
    /// See [`OkPacket`].
    Ok(OkPacket),
    /// See [`ErrorPacket`].
    Error(ErrorPacket),
}

/// The variant tag of a [`Packet`], used as the dispatch key in
/// reaction handler maps and the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum PacketKind {
    Auth,
    Hello,
    Heartbeat,
    HeartbeatAck,
    Ready,
    LoadData,
    SaveData,
    BatchSaveData,
    StopSession,
    EndSession,
    UserData,
    RequestSync,
    RequestLeaderboard,
    Leaderboard,
    RequestTopPosition,
    TopPosition,
    Ok,
    Error,
}

impl Packet {
    /// The variant tag of this packet.
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::Auth(_) => PacketKind::Auth,
            Packet::Hello(_) => PacketKind::Hello,
            Packet::Heartbeat(_) => PacketKind::Heartbeat,
            Packet::HeartbeatAck(_) => PacketKind::HeartbeatAck,
            Packet::Ready(_) => PacketKind::Ready,
            Packet::LoadData(_) => PacketKind::LoadData,
            Packet::SaveData(_) => PacketKind::SaveData,
            Packet::BatchSaveData(_) => PacketKind::BatchSaveData,
            Packet::StopSession(_) => PacketKind::StopSession,
            Packet::EndSession(_) => PacketKind::EndSession,
            Packet::UserData(_) => PacketKind::UserData,
            Packet::RequestSync(_) => PacketKind::RequestSync,
            Packet::RequestLeaderboard(_) => PacketKind::RequestLeaderboard,
            Packet::Leaderboard(_) => PacketKind::Leaderboard,
            Packet::RequestTopPosition(_) => PacketKind::RequestTopPosition,
            Packet::TopPosition(_) => PacketKind::TopPosition,
            Packet::Ok(_) => PacketKind::Ok,
            Packet::Error(_) => PacketKind::Error,
        }
    }

    /// Encodes this packet into a complete frame with the given
    /// sequence number stamped in the header.
    pub fn encode(
        &self,
        registry: &PacketRegistry,
        sequence: u16,
    ) -> Result<Vec<u8>, ProtocolError> {
        let id = registry
            .id_of(self.kind())
            .ok_or(ProtocolError::Unregistered(self.kind()))?;
        let mut buf = PacketBuffer::for_frame(id, sequence);
        self.write_fields(&mut buf);
        Ok(buf.into_bytes())
    }

    /// Decodes a frame into a packet and its sequence number.
    ///
    /// Returns `Ok(None)` when the id byte has no registry entry —
    /// unknown ids are "no packet", not an error, and the caller drops
    /// the frame. Malformed payloads are a [`ProtocolError`].
    pub fn decode(
        registry: &PacketRegistry,
        bytes: &[u8],
    ) -> Result<Option<(Packet, u16)>, ProtocolError> {
        let mut buf = PacketBuffer::from_bytes(bytes.to_vec());
        let id = buf.packet_id()?;
        let sequence = buf.sequence()?;
        let Some(mut packet) = registry.new_instance(id) else {
            return Ok(None);
        };
        buf.focus_data();
        packet.read_fields(&mut buf)?;
        Ok(Some((packet, sequence)))
    }

    fn write_fields(&self, buf: &mut PacketBuffer) {
        match self {
            Packet::Hello(_)
            | Packet::Heartbeat(_)
            | Packet::HeartbeatAck(_) => {}
            Packet::Auth(p) => {
                buf.write_string(&p.login);
                buf.write_string(&p.password);
                buf.write_string(&p.node_name);
            }
            Packet::Ready(p) => buf.write_i64(p.heartbeat_interval_ms),
            Packet::LoadData(p) => {
                buf.write_string(&p.scope);
                buf.write_string(&p.holder);
            }
            Packet::SaveData(p) => {
                buf.write_string(&p.scope);
                buf.write_string(&p.holder);
                buf.write_string(&p.key);
                buf.write_wide(p.value);
            }
            Packet::BatchSaveData(p) => {
                buf.write_string(&p.scope);
                buf.write_string(&p.holder);
                write_data_map(buf, &p.data);
            }
            Packet::StopSession(p) => {
                buf.write_string(&p.scope);
                buf.write_string(&p.holder);
            }
            Packet::EndSession(p) => {
                buf.write_string(&p.scope);
                buf.write_string(&p.holder);
            }
            Packet::UserData(p) => {
                buf.write_string(&p.scope);
                buf.write_string(&p.holder);
                write_data_map(buf, &p.data);
            }
            Packet::RequestSync(p) => {
                buf.write_string(&p.scope);
                buf.write_string(&p.holder);
            }
            Packet::RequestLeaderboard(p) => {
                buf.write_string(&p.scope);
                buf.write_string(&p.key);
                buf.write_i32(p.limit);
            }
            Packet::Leaderboard(p) => {
                buf.write_string(&p.scope);
                buf.write_string(&p.key);
                buf.write_list(&p.entries, |b, e| {
                    b.write_string(&e.holder);
                    b.write_wide(e.value);
                });
            }
            Packet::RequestTopPosition(p) => {
                buf.write_string(&p.scope);
                buf.write_string(&p.key);
                buf.write_string(&p.holder);
            }
            Packet::TopPosition(p) => {
                buf.write_i64(p.position);
                buf.write_i64(p.of);
            }
            Packet::Ok(p) => buf.write_string(&p.message),
            Packet::Error(p) => buf.write_string(&p.message),
        }
    }

    fn read_fields(
        &mut self,
        buf: &mut PacketBuffer,
    ) -> Result<(), ProtocolError> {
        match self {
            Packet::Hello(_)
            | Packet::Heartbeat(_)
            | Packet::HeartbeatAck(_) => {}
            Packet::Auth(p) => {
                p.login = buf.read_string()?;
                p.password = buf.read_string()?;
                p.node_name = buf.read_string()?;
            }
            Packet::Ready(p) => p.heartbeat_interval_ms = buf.read_i64()?,
            Packet::LoadData(p) => {
                p.scope = buf.read_string()?;
                p.holder = buf.read_string()?;
            }
            Packet::SaveData(p) => {
                p.scope = buf.read_string()?;
                p.holder = buf.read_string()?;
                p.key = buf.read_string()?;
                p.value = buf.read_wide()?;
            }
            Packet::BatchSaveData(p) => {
                p.scope = buf.read_string()?;
                p.holder = buf.read_string()?;
                p.data = read_data_map(buf)?;
            }
            Packet::StopSession(p) => {
                p.scope = buf.read_string()?;
                p.holder = buf.read_string()?;
            }
            Packet::EndSession(p) => {
                p.scope = buf.read_string()?;
                p.holder = buf.read_string()?;
            }
            Packet::UserData(p) => {
                p.scope = buf.read_string()?;
                p.holder = buf.read_string()?;
                p.data = read_data_map(buf)?;
            }
            Packet::RequestSync(p) => {
                p.scope = buf.read_string()?;
                p.holder = buf.read_string()?;
            }
            Packet::RequestLeaderboard(p) => {
                p.scope = buf.read_string()?;
                p.key = buf.read_string()?;
                p.limit = buf.read_i32()?;
            }
            Packet::Leaderboard(p) => {
                p.scope = buf.read_string()?;
                p.key = buf.read_string()?;
                p.entries = buf.read_list(|b| {
                    Ok(LeaderboardEntry {
                        holder: b.read_string()?,
                        value: b.read_wide()?,
                    })
                })?;
            }
            Packet::RequestTopPosition(p) => {
                p.scope = buf.read_string()?;
                p.key = buf.read_string()?;
                p.holder = buf.read_string()?;
            }
            Packet::TopPosition(p) => {
                p.position = buf.read_i64()?;
                p.of = buf.read_i64()?;
            }
            Packet::Ok(p) => p.message = buf.read_string()?,
            Packet::Error(p) => p.message = buf.read_string()?,
        }
        Ok(())
    }
}

fn write_data_map(buf: &mut PacketBuffer, data: &BTreeMap<String, i128>) {
    buf.write_pairs(data.iter(), |b, k, v| {
        b.write_string(k);
        b.write_wide(*v);
    });
}

fn read_data_map(
    buf: &mut PacketBuffer,
) -> Result<BTreeMap<String, i128>, ProtocolError> {
    let pairs =
        buf.read_pairs(|b| Ok((b.read_string()?, b.read_wide()?)))?;
    Ok(pairs.into_iter().collect())
}
