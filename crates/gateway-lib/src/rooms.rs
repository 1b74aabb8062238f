// ============================
// crates/gateway-lib/src/rooms.rs
// ============================
//! Room directory: membership sets and broadcast fan-out.

use crate::session::{ConnId, SessionRegistry};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;
use studyroom_common::RoomId;

#[derive(Default)]
pub struct RoomDirectory {
    rooms: DashMap<RoomId, HashSet<ConnId>>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room, creating the room on first use.
    /// Joining twice is a no-op set insert.
    pub fn join(&self, room: &str, conn: ConnId) {
        self.rooms.entry(room.to_string()).or_default().insert(conn);
    }

    /// Remove a connection from a room. Returns `true` when this
    /// emptied the room, in which case the entry itself is pruned so
    /// idle rooms are reclaimed rather than accumulating forever.
    pub fn leave(&self, room: &str, conn: ConnId) -> bool {
        let emptied = match self.rooms.get_mut(room) {
            Some(mut members) => {
                members.remove(&conn);
                members.is_empty()
            }
            None => return false,
        };
        if emptied {
            self.rooms.remove(room);
            tracing::debug!(room, "pruned empty room");
        }
        emptied
    }

    /// Snapshot of a room's current members.
    pub fn members(&self, room: &str) -> Vec<ConnId> {
        self.rooms
            .get(room)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map_or(0, |m| m.len())
    }

    pub fn contains(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    /// Fan out one `MESSAGE` frame to every current member of `room`,
    /// optionally excluding one connection. The payload is serialized
    /// once; delivery is fire-and-forget per member so one dead
    /// recipient never blocks the rest.
    pub fn broadcast<T: Serialize>(
        &self,
        sessions: &SessionRegistry,
        room: &str,
        destination: &str,
        payload: &T,
        except: Option<ConnId>,
    ) {
        let Some(members) = self.rooms.get(room) else {
            return;
        };
        let body = match serde_json::to_string(payload) {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(room, destination, %err, "failed to encode broadcast payload");
                return;
            }
        };
        let raw = crate::frame::message(destination, body).encode();
        for &conn in members.iter() {
            if except == Some(conn) {
                continue;
            }
            sessions.send_raw(conn, raw.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn conn(
        sessions: &SessionRegistry,
    ) -> (ConnId, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (sessions.connect(tx), rx)
    }

    #[test]
    fn join_is_idempotent() {
        let sessions = SessionRegistry::new();
        let rooms = RoomDirectory::new();
        let (a, _rx) = conn(&sessions);

        rooms.join("7", a);
        rooms.join("7", a);
        assert_eq!(rooms.member_count("7"), 1);
    }

    #[test]
    fn leave_prunes_empty_rooms() {
        let sessions = SessionRegistry::new();
        let rooms = RoomDirectory::new();
        let (a, _ra) = conn(&sessions);
        let (b, _rb) = conn(&sessions);

        rooms.join("7", a);
        rooms.join("7", b);
        assert!(!rooms.leave("7", a));
        assert!(rooms.contains("7"));
        assert!(rooms.leave("7", b));
        assert!(!rooms.contains("7"));

        // A re-join starts from an empty member set.
        rooms.join("7", a);
        assert_eq!(rooms.member_count("7"), 1);
    }

    #[test]
    fn leave_unknown_room_is_a_noop() {
        let sessions = SessionRegistry::new();
        let rooms = RoomDirectory::new();
        let (a, _rx) = conn(&sessions);
        assert!(!rooms.leave("missing", a));
    }

    #[test]
    fn broadcast_respects_exclusion() {
        let sessions = SessionRegistry::new();
        let rooms = RoomDirectory::new();
        let (a, mut ra) = conn(&sessions);
        let (b, mut rb) = conn(&sessions);
        rooms.join("7", a);
        rooms.join("7", b);

        rooms.broadcast(
            &sessions,
            "7",
            "/topic/studies/rooms/7",
            &serde_json::json!({"type": "ENTER", "data": 1}),
            Some(a),
        );

        assert!(ra.try_recv().is_err());
        assert!(rb.try_recv().is_ok());
    }

    #[test]
    fn broadcast_survives_a_dead_recipient() {
        let sessions = SessionRegistry::new();
        let rooms = RoomDirectory::new();
        let (a, ra) = conn(&sessions);
        let (b, mut rb) = conn(&sessions);
        rooms.join("7", a);
        rooms.join("7", b);
        drop(ra);

        rooms.broadcast(
            &sessions,
            "7",
            "/topic/studies/rooms/7",
            &serde_json::json!({"type": "ENTER", "data": 2}),
            None,
        );

        assert!(rb.try_recv().is_ok());
    }
}
