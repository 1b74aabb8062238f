// ============================
// crates/gateway-lib/src/ide.rs
// ============================
//! Editor snapshot cache and watcher registry.
//!
//! Every `/pub/ide/update` is folded into a per-(room, user) snapshot
//! so that a member who starts watching mid-session, or asks for an
//! explicit snapshot, sees the last known code rather than nothing.
//! Partial updates merge field-by-field; a language-only change does
//! not wipe the cached code.

use dashmap::DashMap;
use std::collections::BTreeSet;
use studyroom_common::{IdeUpdatePayload, RoomId, UserId, WatchAction};

/// Last-known editor state for one member in one room.
#[derive(Debug, Clone, Default)]
pub struct IdeSnapshot {
    pub problem_id: i64,
    pub code: String,
    pub language: Option<String>,
}

#[derive(Default)]
pub struct IdeRegistry {
    snapshots: DashMap<(RoomId, UserId), IdeSnapshot>,
    watchers: DashMap<(RoomId, UserId), BTreeSet<UserId>>,
}

impl IdeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a (possibly partial) update into the cached snapshot and
    /// return the merged result for broadcasting.
    pub fn record_update(&self, room: &str, user: UserId, update: &IdeUpdatePayload) -> IdeSnapshot {
        let mut snap = self
            .snapshots
            .entry((room.to_string(), user))
            .or_default();
        if let Some(problem_id) = update.problem_id {
            snap.problem_id = problem_id;
        }
        if let Some(code) = &update.code {
            snap.code = code.clone();
        }
        if let Some(language) = &update.language {
            snap.language = Some(language.clone());
        }
        snap.clone()
    }

    /// Cached snapshot for a member, or the empty default when the
    /// member has never published an update.
    pub fn snapshot_of(&self, room: &str, user: UserId) -> IdeSnapshot {
        self.snapshots
            .get(&(room.to_string(), user))
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Add or drop `watcher` from `target`'s audience. Returns the
    /// post-change watcher set for the WATCH_UPDATE broadcast.
    pub fn watch(
        &self,
        room: &str,
        target: UserId,
        watcher: UserId,
        action: WatchAction,
    ) -> Vec<UserId> {
        let key = (room.to_string(), target);
        let mut set = self.watchers.entry(key).or_default();
        match action {
            WatchAction::Start => {
                set.insert(watcher);
            }
            WatchAction::Stop => {
                set.remove(&watcher);
            }
        }
        set.iter().copied().collect()
    }

    /// Drop everything a disconnecting member contributed: its own
    /// snapshot and watcher set, plus its membership in anyone else's
    /// audience. Returns the targets whose audiences changed so the
    /// caller can broadcast fresh WATCH_UPDATEs.
    pub fn remove_member(&self, room: &str, user: UserId) -> Vec<(UserId, Vec<UserId>)> {
        self.snapshots.remove(&(room.to_string(), user));
        self.watchers.remove(&(room.to_string(), user));

        let mut changed = Vec::new();
        for mut entry in self.watchers.iter_mut() {
            let (entry_room, target) = entry.key().clone();
            if entry_room == room && entry.value().contains(&user) {
                entry.value_mut().remove(&user);
                changed.push((target, entry.value().iter().copied().collect()));
            }
        }
        changed
    }

    /// Reclaim all state for a room that emptied out.
    pub fn drop_room(&self, room: &str) {
        self.snapshots.retain(|(r, _), _| r != room);
        self.watchers.retain(|(r, _), _| r != room);
    }
}
