// ============================
// crates/gateway-lib/src/whiteboard.rs
// ============================
//! Per-room whiteboard state machine.
//!
//! A board is Inactive until START records an owner, and CLOSE clears
//! ownership again without discarding objects (a separate CLEAR does
//! that). Object-level edits mutate the `objects` map; only ADDED is
//! appended to the history log, and REMOVE filters it; MODIFIED leaves
//! no trace there. Sync deliberately re-synthesizes ADDED entries from
//! the live objects instead of replaying the log, so a late joiner gets
//! merged final state, not an audit trail.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use studyroom_common::{RoomId, UserId, WhiteboardAction};

/// One recorded ADD (and, transiently, nothing else; see module docs).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub action: WhiteboardAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Full-state snapshot served to SYNC requesters and late subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    pub is_active: bool,
    pub owner_id: Option<UserId>,
    pub owner_name: Option<String>,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Default)]
pub struct WhiteboardState {
    active: bool,
    owner_id: Option<UserId>,
    owner_name: Option<String>,
    objects: HashMap<String, Value>,
    history: Vec<HistoryEntry>,
}

impl WhiteboardState {
    /// START: Inactive -> Active, recording the sender as owner.
    pub fn start(&mut self, owner_id: UserId, owner_name: &str) {
        self.active = true;
        self.owner_id = Some(owner_id);
        self.owner_name = Some(owner_name.to_string());
    }

    /// CLOSE: Active -> Inactive. Ownership is cleared; objects and
    /// history are retained unless a CLEAR is also issued. Not gated on
    /// the owner, so any member may close.
    pub fn close(&mut self) {
        self.active = false;
        self.owner_id = None;
        self.owner_name = None;
    }

    /// CLEAR: empty objects and history, leaving activation untouched.
    pub fn clear(&mut self) {
        self.objects.clear();
        self.history.clear();
    }

    /// ADDED: add-or-overwrite the object and append to history.
    pub fn add_object(&mut self, object_id: &str, data: Option<Value>) {
        self.objects
            .insert(object_id.to_string(), data.clone().unwrap_or(Value::Null));
        self.history.push(HistoryEntry {
            action: WhiteboardAction::Added,
            object_id: Some(object_id.to_string()),
            data,
        });
    }

    /// MODIFIED: overwrite only. No history append, and an unknown id
    /// is ignored so `objects` keys are only ever introduced by ADD.
    pub fn modify_object(&mut self, object_id: &str, data: Option<Value>) {
        if let Some(slot) = self.objects.get_mut(object_id) {
            *slot = data.unwrap_or(Value::Null);
        }
    }

    /// REMOVED: delete the object and filter its history entries.
    pub fn remove_object(&mut self, object_id: &str) {
        self.objects.remove(object_id);
        self.history
            .retain(|e| e.object_id.as_deref() != Some(object_id));
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn owner(&self) -> Option<(UserId, &str)> {
        match (self.owner_id, self.owner_name.as_deref()) {
            (Some(id), Some(name)) => Some((id, name)),
            _ => None,
        }
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Re-synthesize a snapshot from live objects: one ADDED entry per
    /// currently-live object. MODIFIED deltas are invisible except as
    /// already-merged final object state.
    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            is_active: self.active,
            owner_id: self.owner_id,
            owner_name: self.owner_name.clone(),
            history: self
                .objects
                .iter()
                .map(|(id, data)| HistoryEntry {
                    action: WhiteboardAction::Added,
                    object_id: Some(id.clone()),
                    data: Some(data.clone()),
                })
                .collect(),
        }
    }
}

/// Process-wide store of per-room boards, created on first use.
#[derive(Default)]
pub struct WhiteboardStore {
    boards: DashMap<RoomId, WhiteboardState>,
}

impl WhiteboardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a mutation against a room's board, creating it lazily.
    pub fn with_board<R>(&self, room: &str, f: impl FnOnce(&mut WhiteboardState) -> R) -> R {
        let mut board = self.boards.entry(room.to_string()).or_default();
        f(&mut board)
    }

    /// Snapshot without forcing a board into existence: a room with no
    /// prior whiteboard activity yields the empty Inactive snapshot.
    pub fn snapshot(&self, room: &str) -> SyncSnapshot {
        self.boards
            .get(room)
            .map(|b| b.snapshot())
            .unwrap_or_else(|| WhiteboardState::default().snapshot())
    }

    /// Drop a room's board when the room itself is reclaimed.
    pub fn drop_room(&self, room: &str) {
        self.boards.remove(room);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn start_close_lifecycle() {
        let mut board = WhiteboardState::default();
        assert!(!board.is_active());

        board.start(42, "amy");
        assert!(board.is_active());
        assert_eq!(board.owner(), Some((42, "amy")));

        board.add_object("o1", Some(json!({"x": 1})));
        board.close();
        assert!(!board.is_active());
        assert!(board.owner().is_none());
        // Objects survive CLOSE.
        assert_eq!(board.object_count(), 1);
    }

    #[test]
    fn clear_empties_objects_and_history() {
        let mut board = WhiteboardState::default();
        board.start(1, "a");
        board.add_object("o1", Some(json!(1)));
        board.add_object("o2", Some(json!(2)));
        board.clear();
        assert_eq!(board.object_count(), 0);
        assert!(board.snapshot().history.is_empty());
        // CLEAR does not deactivate.
        assert!(board.is_active());
    }

    #[test]
    fn modify_does_not_introduce_objects() {
        let mut board = WhiteboardState::default();
        board.modify_object("ghost", Some(json!(1)));
        assert_eq!(board.object_count(), 0);

        board.add_object("o1", Some(json!({"x": 1})));
        board.modify_object("o1", Some(json!({"x": 2})));
        let snap = board.snapshot();
        assert_eq!(snap.history.len(), 1);
        assert_eq!(snap.history[0].data, Some(json!({"x": 2})));
    }

    #[test]
    fn remove_filters_history() {
        let mut board = WhiteboardState::default();
        board.add_object("o1", Some(json!(1)));
        board.add_object("o2", Some(json!(2)));
        board.remove_object("o1");

        let snap = board.snapshot();
        assert_eq!(snap.history.len(), 1);
        assert_eq!(snap.history[0].object_id.as_deref(), Some("o2"));
    }

    #[test]
    fn snapshot_of_untouched_room_is_empty_inactive() {
        let store = WhiteboardStore::new();
        let snap = store.snapshot("7");
        assert!(!snap.is_active);
        assert!(snap.owner_id.is_none());
        assert!(snap.history.is_empty());
        // Reading a snapshot must not create the board.
        assert!(store.boards.get("7").is_none());
    }

    #[test]
    fn snapshot_resynthesizes_added_entries() {
        let store = WhiteboardStore::new();
        store.with_board("7", |b| {
            b.start(1, "a");
            b.add_object("o1", Some(json!({"x": 1})));
            b.modify_object("o1", Some(json!({"x": 9})));
        });
        let snap = store.snapshot("7");
        assert!(snap.is_active);
        assert_eq!(snap.history.len(), 1);
        assert_eq!(snap.history[0].action, WhiteboardAction::Added);
        assert_eq!(snap.history[0].data, Some(json!({"x": 9})));
    }

    #[test]
    fn drop_room_discards_state() {
        let store = WhiteboardStore::new();
        store.with_board("7", |b| b.add_object("o1", None));
        store.drop_room("7");
        assert!(store.snapshot("7").history.is_empty());
    }

    #[test]
    fn snapshot_serializes_with_camel_case_keys() {
        let snap = WhiteboardState::default().snapshot();
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["isActive"], false);
        assert_eq!(json["ownerId"], serde_json::Value::Null);
        assert!(json["history"].as_array().unwrap().is_empty());
    }
}
