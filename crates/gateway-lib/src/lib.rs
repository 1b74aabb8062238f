// ============================
// studyroom-gateway-lib/src/lib.rs
// ============================
//! Core gateway-lib functionality for the study-room WebSocket gateway.

pub mod conference;
pub mod config;
pub mod curriculum;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod ide;
pub mod rooms;
pub mod session;
pub mod storage;
pub mod whiteboard;
pub mod ws_router;

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::conference::CredentialIssuer;
use crate::config::Settings;
use crate::curriculum::CurriculumHandle;
use crate::ide::IdeRegistry;
use crate::rooms::RoomDirectory;
use crate::session::{ConnId, SessionRegistry};
use crate::storage::Storage;
use crate::whiteboard::WhiteboardStore;
use studyroom_common::{topics, CurriculumEvent, RoomEvent, RoomId, UserId};

/// Application state shared across all connections.
pub struct AppState {
    /// Settings manager
    pub settings: Arc<Settings>,
    /// Connection registry
    pub sessions: Arc<SessionRegistry>,
    /// Room membership directory
    pub rooms: Arc<RoomDirectory>,
    /// Per-room whiteboard state
    pub whiteboards: WhiteboardStore,
    /// Per-(room, member) editor snapshots and watcher sets
    pub ide: IdeRegistry,
    /// One curriculum actor handle per live room
    curricula: DashMap<RoomId, CurriculumHandle>,
    /// Storage backend
    pub storage: Arc<dyn Storage>,
    /// Video conference credential issuer
    pub credentials: Arc<dyn CredentialIssuer>,
}

impl AppState {
    pub fn new(
        storage: Arc<dyn Storage>,
        credentials: Arc<dyn CredentialIssuer>,
        settings: Settings,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            sessions: Arc::new(SessionRegistry::new()),
            rooms: Arc::new(RoomDirectory::new()),
            whiteboards: WhiteboardStore::new(),
            ide: IdeRegistry::new(),
            curricula: DashMap::new(),
            storage,
            credentials,
        }
    }

    /// The room's curriculum actor, spawned on first use.
    pub fn curriculum(&self, room: &str) -> CurriculumHandle {
        self.curricula
            .entry(room.to_string())
            .or_insert_with(|| {
                CurriculumHandle::spawn(
                    room.to_string(),
                    self.storage.clone(),
                    self.sessions.clone(),
                    self.rooms.clone(),
                )
            })
            .clone()
    }

    /// Tell a room's members to re-fetch their curriculum. Used when
    /// problem data changes outside the frame protocol, for example an
    /// upstream catalog edit.
    pub fn notify_problem_update(&self, room: &str) {
        self.rooms.broadcast(
            &self.sessions,
            room,
            &topics::room_problems(room),
            &RoomEvent::Curriculum(CurriculumEvent::Refresh),
            None,
        );
    }

    /// Remove a connection from its room, broadcasting `event` to the
    /// remaining members and reclaiming room state when the last
    /// member is gone.
    pub fn leave_room(&self, room: &str, conn: ConnId, user: Option<UserId>, event: &RoomEvent) {
        let emptied = self.rooms.leave(room, conn);
        if emptied {
            self.prune_room(room);
            return;
        }

        self.rooms
            .broadcast(&self.sessions, room, &topics::room(room), event, None);

        if let Some(user) = user {
            for (target, viewers) in self.ide.remove_member(room, user) {
                self.broadcast_watchers(room, target, viewers);
            }
        }
    }

    /// Tear down a connection: drop its session entry and leave every
    /// room it held membership in, including rooms joined through a
    /// bare topic subscription. The entered room runs the same leave
    /// path as an explicit LEAVE; subscription-only memberships are
    /// dropped silently since there is no identity to announce.
    /// Identity is captured before the session entry goes away so the
    /// watcher cleanup still knows who left.
    pub fn disconnect(&self, conn: ConnId) {
        let user = self.sessions.user_of(conn);
        let entered = self.sessions.room_of(conn);
        let joined = self.sessions.disconnect(conn);
        if joined.is_empty() {
            debug!(%conn, "disconnected before joining a room");
            return;
        }
        for room in joined {
            match user.filter(|_| entered.as_deref() == Some(room.as_str())) {
                Some(id) => self.leave_room(&room, conn, Some(id), &RoomEvent::Leave(id)),
                None => {
                    if self.rooms.leave(&room, conn) {
                        self.prune_room(&room);
                    }
                }
            }
        }
    }

    /// Drop every piece of per-room state once membership hits zero.
    fn prune_room(&self, room: &str) {
        self.whiteboards.drop_room(room);
        self.ide.drop_room(room);
        self.curricula.remove(room);
        info!(room, "room emptied, state reclaimed");
    }

    /// Push the current watcher roster for `target`'s editor to the
    /// room. Viewer ids are resolved to display names through the
    /// session registry; a viewer with no live session falls back to
    /// the synthetic `User{id}` form.
    pub(crate) fn broadcast_watchers(&self, room: &str, target: UserId, viewers: Vec<UserId>) {
        let names: Vec<String> = viewers
            .iter()
            .map(|id| self.name_in_room(room, *id))
            .collect();
        let event = RoomEvent::WatchUpdate {
            count: viewers.len(),
            viewers: names,
        };
        self.rooms.broadcast(
            &self.sessions,
            room,
            &topics::room_ide_watchers(room, target),
            &event,
            None,
        );
    }

    fn name_in_room(&self, room: &str, user: UserId) -> String {
        self.rooms
            .members(room)
            .into_iter()
            .filter_map(|conn| self.sessions.identity(conn))
            .find(|(id, _)| *id == user)
            .map(|(_, name)| name)
            .unwrap_or_else(|| format!("User{user}"))
    }
}
