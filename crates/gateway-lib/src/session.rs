// ============================
// crates/gateway-lib/src/session.rs
// ============================
//! Session registry: one entry per live transport connection.

use std::collections::BTreeSet;

use crate::frame::Frame;
use dashmap::DashMap;
use serde::Serialize;
use studyroom_common::{RoomId, UserId};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Connection identifier, allocated at transport-connect time.
pub type ConnId = Uuid;

/// One live connection. Identity and room are absent until the first
/// successful room-entry command.
#[derive(Debug)]
pub struct Session {
    pub tx: mpsc::UnboundedSender<String>,
    pub user_id: Option<UserId>,
    pub nickname: Option<String>,
    pub room_id: Option<RoomId>,
    /// Every room this connection holds membership in, whether through
    /// entry or a bare topic subscription. Drained on disconnect.
    pub joined: BTreeSet<RoomId>,
}

#[derive(Default)]
pub struct SessionRegistry {
    inner: DashMap<ConnId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly connected transport. The returned id keys
    /// every later interaction with this connection.
    pub fn connect(&self, tx: mpsc::UnboundedSender<String>) -> ConnId {
        let conn = Uuid::new_v4();
        self.inner.insert(
            conn,
            Session {
                tx,
                user_id: None,
                nickname: None,
                room_id: None,
                joined: BTreeSet::new(),
            },
        );
        tracing::debug!(%conn, "session connected");
        conn
    }

    /// Discard a session, returning every room it held membership in
    /// so the caller can leave them all. Idempotent for unknown ids.
    pub fn disconnect(&self, conn: ConnId) -> Vec<RoomId> {
        let Some((_, session)) = self.inner.remove(&conn) else {
            return Vec::new();
        };
        tracing::debug!(%conn, "session disconnected");
        session.joined.into_iter().collect()
    }

    /// Record the identity claimed on room entry. Later calls simply
    /// overwrite; the single-room model has no re-entry protection.
    pub fn assign(&self, conn: ConnId, user_id: UserId, nickname: Option<String>, room: RoomId) {
        if let Some(mut session) = self.inner.get_mut(&conn) {
            session.user_id = Some(user_id);
            session.nickname = nickname;
            session.joined.insert(room.clone());
            session.room_id = Some(room);
        }
    }

    /// Record membership gained through a topic subscription alone,
    /// before (or without) a full room entry.
    pub fn note_join(&self, conn: ConnId, room: &str) {
        if let Some(mut session) = self.inner.get_mut(&conn) {
            session.joined.insert(room.to_string());
        }
    }

    /// Forget the room binding after an explicit departure; identity
    /// is kept so the connection can enter another room.
    pub fn clear_room(&self, conn: ConnId) {
        if let Some(mut session) = self.inner.get_mut(&conn) {
            if let Some(room) = session.room_id.take() {
                session.joined.remove(&room);
            }
        }
    }

    pub fn room_of(&self, conn: ConnId) -> Option<RoomId> {
        self.inner.get(&conn).and_then(|s| s.room_id.clone())
    }

    pub fn user_of(&self, conn: ConnId) -> Option<UserId> {
        self.inner.get(&conn).and_then(|s| s.user_id)
    }

    /// Display name for a connection: assigned nickname, else a
    /// synthetic `User{id}` label.
    pub fn display_name(&self, conn: ConnId) -> Option<String> {
        let session = self.inner.get(&conn)?;
        let user_id = session.user_id?;
        Some(
            session
                .nickname
                .clone()
                .unwrap_or_else(|| format!("User{user_id}")),
        )
    }

    pub fn identity(&self, conn: ConnId) -> Option<(UserId, String)> {
        let user = self.user_of(conn)?;
        let name = self.display_name(conn)?;
        Some((user, name))
    }

    /// Fire-and-forget delivery of an encoded frame to one connection.
    /// A closed channel means the connection is going away; log and
    /// move on; never let one recipient's failure surface.
    pub fn send_frame(&self, conn: ConnId, frame: &Frame) {
        self.send_raw(conn, frame.encode());
    }

    pub fn send_raw(&self, conn: ConnId, raw: String) {
        if let Some(session) = self.inner.get(&conn) {
            if session.tx.send(raw).is_err() {
                tracing::debug!(%conn, "dropping frame for closed connection");
            }
        }
    }

    /// Encode `payload` as a JSON `MESSAGE` frame for `destination` and
    /// deliver it to one connection.
    pub fn send_message<T: Serialize>(&self, conn: ConnId, destination: &str, payload: &T) {
        match serde_json::to_string(payload) {
            Ok(body) => self.send_frame(conn, &crate::frame::message(destination, body)),
            Err(err) => tracing::warn!(%conn, destination, %err, "failed to encode payload"),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{decode, Command, Decoded};

    fn registry_with_conn() -> (
        SessionRegistry,
        ConnId,
        mpsc::UnboundedReceiver<String>,
    ) {
        let registry = SessionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = registry.connect(tx);
        (registry, conn, rx)
    }

    #[test]
    fn connect_assign_disconnect() {
        let (registry, conn, _rx) = registry_with_conn();
        assert!(registry.room_of(conn).is_none());

        registry.assign(conn, 42, Some("amy".into()), "7".into());
        assert_eq!(registry.room_of(conn).as_deref(), Some("7"));
        assert_eq!(registry.identity(conn), Some((42, "amy".to_string())));

        assert_eq!(registry.disconnect(conn), vec!["7".to_string()]);
        // Second disconnect is a no-op.
        assert!(registry.disconnect(conn).is_empty());
    }

    #[test]
    fn clear_room_keeps_identity() {
        let (registry, conn, _rx) = registry_with_conn();
        registry.assign(conn, 42, Some("amy".into()), "7".into());
        registry.clear_room(conn);
        assert!(registry.room_of(conn).is_none());
        assert_eq!(registry.user_of(conn), Some(42));
        assert!(registry.disconnect(conn).is_empty());
    }

    #[test]
    fn subscription_only_membership_is_reported_on_disconnect() {
        let (registry, conn, _rx) = registry_with_conn();
        registry.note_join(conn, "7");
        registry.note_join(conn, "9");
        registry.note_join(conn, "7");
        assert!(registry.room_of(conn).is_none());
        assert_eq!(
            registry.disconnect(conn),
            vec!["7".to_string(), "9".to_string()]
        );
    }

    #[test]
    fn display_name_falls_back_to_user_id() {
        let (registry, conn, _rx) = registry_with_conn();
        registry.assign(conn, 9, None, "1".into());
        assert_eq!(registry.display_name(conn).as_deref(), Some("User9"));
    }

    #[test]
    fn send_message_encodes_a_message_frame() {
        let (registry, conn, mut rx) = registry_with_conn();
        registry.send_message(conn, "/topic/studies/rooms/1", &serde_json::json!({"a": 1}));

        let raw = rx.try_recv().unwrap();
        let Decoded::Frame(frame) = decode(&raw) else {
            panic!("expected frame");
        };
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.header("destination"), Some("/topic/studies/rooms/1"));
        assert_eq!(frame.header("content-type"), Some("application/json"));
        assert_eq!(frame.body, r#"{"a":1}"#);
    }

    #[test]
    fn send_to_closed_channel_does_not_panic() {
        let (registry, conn, rx) = registry_with_conn();
        drop(rx);
        registry.send_raw(conn, "MESSAGE\n\n\0".into());
    }
}
