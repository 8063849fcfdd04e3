//! The packet type registry: numeric id ↔ packet variant.
//!
//! Ids are dense and assigned monotonically in registration order, so
//! both sides of a connection agree on the numbering as long as they
//! register the same variants in the same order —
//! [`PacketRegistry::standard`] is that fixed order. The registry is
//! built once at startup, shared behind an `Arc`, and read-only
//! afterwards; it is passed by injection to the codec and correlator
//! rather than living in a global.

use std::collections::HashMap;

use crate::packet::{
    Auth, BatchSaveData, EndSession, ErrorPacket, Heartbeat, HeartbeatAck,
    Hello, Leaderboard, LoadData, OkPacket, Packet, PacketKind, Ready,
    RequestLeaderboard, RequestSync, RequestTopPosition, SaveData,
    StopSession, TopPosition, UserData,
};

/// One registered packet variant.
pub struct PacketEntry {
    /// The id byte this variant travels under.
    pub id: u8,
    /// The variant tag.
    pub kind: PacketKind,
    /// Produces an empty instance for decode-time field population.
    ctor: fn() -> Packet,
}

/// Static table mapping id bytes to packet variants.
pub struct PacketRegistry {
    entries: Vec<PacketEntry>,
    ids: HashMap<PacketKind, u8>,
}

impl PacketRegistry {
    /// Creates an empty registry. Use [`standard`](Self::standard) for
    /// the protocol's fixed packet set.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            ids: HashMap::new(),
        }
    }

    /// The standard Synclink packet set, in its fixed id order.
    pub fn standard() -> Self {
        let mut r = Self::empty();
        r.register(PacketKind::Auth, || Packet::Auth(Auth::default()));
        r.register(PacketKind::Hello, || Packet::Hello(Hello));
        r.register(PacketKind::Heartbeat, || Packet::Heartbeat(Heartbeat));
        r.register(PacketKind::HeartbeatAck, || {
            Packet::HeartbeatAck(HeartbeatAck)
        });
        r.register(PacketKind::Ready, || Packet::Ready(Ready::default()));
        r.register(PacketKind::LoadData, || {
            Packet::LoadData(LoadData::default())
        });
        r.register(PacketKind::SaveData, || {
            Packet::SaveData(SaveData::default())
        });
        r.register(PacketKind::BatchSaveData, || {
            Packet::BatchSaveData(BatchSaveData::default())
        });
        r.register(PacketKind::StopSession, || {
            Packet::StopSession(StopSession::default())
        });
        r.register(PacketKind::EndSession, || {
            Packet::EndSession(EndSession::default())
        });
        r.register(PacketKind::UserData, || {
            Packet::UserData(UserData::default())
        });
        r.register(PacketKind::RequestSync, || {
            Packet::RequestSync(RequestSync::default())
        });
        r.register(PacketKind::RequestLeaderboard, || {
            Packet::RequestLeaderboard(RequestLeaderboard::default())
        });
        r.register(PacketKind::Leaderboard, || {
            Packet::Leaderboard(Leaderboard::default())
        });
        r.register(PacketKind::RequestTopPosition, || {
            Packet::RequestTopPosition(RequestTopPosition::default())
        });
        r.register(PacketKind::TopPosition, || {
            Packet::TopPosition(TopPosition::default())
        });
        r.register(PacketKind::Ok, || Packet::Ok(OkPacket::default()));
        r.register(PacketKind::Error, || {
            Packet::Error(ErrorPacket::default())
        });
        r
    }

    /// Registers a variant and returns its assigned id.
    ///
    /// # Panics
    ///
    /// Panics when the 0–255 id space is exhausted or a kind is
    /// registered twice. Both are startup-time configuration errors;
    /// nothing at runtime can reach them.
    pub fn register(&mut self, kind: PacketKind, ctor: fn() -> Packet) -> u8 {
        assert!(
            self.entries.len() <= usize::from(u8::MAX),
            "packet id space exhausted"
        );
        assert!(
            !self.ids.contains_key(&kind),
            "packet kind {kind:?} registered twice"
        );
        let id = self.entries.len() as u8;
        self.entries.push(PacketEntry { id, kind, ctor });
        self.ids.insert(kind, id);
        id
    }

    /// Looks up the entry for an id byte. Unknown ids are absence,
    /// never an error.
    pub fn by_id(&self, id: u8) -> Option<&PacketEntry> {
        self.entries.get(usize::from(id))
    }

    /// Instantiates an empty packet for the given id, ready for field
    /// population during decode.
    pub fn new_instance(&self, id: u8) -> Option<Packet> {
        self.by_id(id).map(|entry| (entry.ctor)())
    }

    /// The id a kind was registered under.
    pub fn id_of(&self, kind: PacketKind) -> Option<u8> {
        self.ids.get(&kind).copied()
    }

    /// Number of registered variants.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_dense_and_monotonic() {
        let registry = PacketRegistry::standard();
        for (index, entry) in registry.entries.iter().enumerate() {
            assert_eq!(usize::from(entry.id), index);
            assert_eq!(registry.id_of(entry.kind), Some(entry.id));
        }
    }

    #[test]
    fn standard_covers_all_eighteen_variants() {
        let registry = PacketRegistry::standard();
        assert_eq!(registry.len(), 18);
        assert_eq!(registry.id_of(PacketKind::Auth), Some(0));
        assert_eq!(registry.id_of(PacketKind::Error), Some(17));
    }

    #[test]
    fn unknown_id_is_absent() {
        let registry = PacketRegistry::standard();
        assert!(registry.by_id(200).is_none());
        assert!(registry.new_instance(200).is_none());
    }

    #[test]
    fn new_instance_matches_registered_kind() {
        let registry = PacketRegistry::standard();
        for entry in &registry.entries {
            let packet = registry.new_instance(entry.id).unwrap();
            assert_eq!(packet.kind(), entry.kind);
        }
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn duplicate_registration_panics() {
        let mut registry = PacketRegistry::empty();
        registry.register(PacketKind::Hello, || Packet::Hello(Hello));
        registry.register(PacketKind::Hello, || Packet::Hello(Hello));
    }
}
