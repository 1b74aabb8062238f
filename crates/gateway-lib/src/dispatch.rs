// ============================
// studyroom-gateway-lib/src/dispatch.rs
// ============================
//! Inbound frame dispatcher.
//!
//! Everything a connection sends lands here: the frame is decoded,
//! SEND bodies are parsed into the closed [`GatewayCommand`] set at
//! this boundary, and each command is handled against shared state. A
//! recognized destination with an unparseable body is logged and
//! dropped rather than disconnecting the client.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::frame::{self, Command, Decoded, Frame};
use crate::session::ConnId;
use crate::AppState;
use studyroom_common::{
    topics, ChatEvent, CurriculumAction, GatewayCommand, IdeEventData, IdeSnapshotEvent,
    MemberInfo, RoomEvent, RoomId, RoomInfoData, SignalEvent, UserId, WhiteboardAction,
    WhiteboardEvent, WhiteboardPayload,
};

/// Handle one raw text chunk from a connection.
pub async fn handle_message(state: &Arc<AppState>, conn: ConnId, raw: &str) {
    let frame = match frame::decode(raw) {
        Decoded::Heartbeat => return,
        Decoded::Frame(frame) => frame,
    };

    match frame.command {
        Command::Connect | Command::Stomp => {
            state.sessions.send_frame(conn, &frame::connected());
        }
        Command::Subscribe => handle_subscribe(state, conn, &frame),
        Command::Send => handle_send(state, conn, &frame).await,
        ref other => {
            debug!(%conn, command = other.as_str(), "ignoring frame");
        }
    }
}

/// SUBSCRIBE doubles as room join: subscribing to any room-scoped
/// topic adds the connection to that room. A whiteboard subscription
/// additionally schedules a deferred state push so a late joiner's
/// canvas converges without asking.
fn handle_subscribe(state: &Arc<AppState>, conn: ConnId, frame: &Frame) {
    let Some(destination) = frame.header("destination") else {
        debug!(%conn, "SUBSCRIBE without destination");
        return;
    };
    let Some((room, tail)) = topics::parse_room_subscription(destination) else {
        return;
    };
    state.rooms.join(&room, conn);
    state.sessions.note_join(conn, &room);

    if tail.starts_with("whiteboard") {
        let state = state.clone();
        let destination = destination.to_string();
        let delay = Duration::from_millis(state.settings.whiteboard_sync_delay_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            send_whiteboard_sync(&state, conn, &room, &destination);
        });
    }
}

async fn handle_send(state: &Arc<AppState>, conn: ConnId, frame: &Frame) {
    let Some(destination) = frame.header("destination") else {
        debug!(%conn, "SEND without destination");
        return;
    };

    let command = match GatewayCommand::parse(destination, &frame.body) {
        Ok(Some(command)) => command,
        Ok(None) => {
            debug!(%conn, destination, "no route for destination");
            return;
        }
        Err(err) => {
            let err = crate::error::GatewayError::UnrecognizedPayload {
                destination: destination.to_string(),
                reason: err.to_string(),
            };
            warn!(%conn, %err, "frame dropped");
            return;
        }
    };

    match command {
        GatewayCommand::Enter(p) => handle_enter(state, conn, p.study_id, p.user_id, p.nickname),
        GatewayCommand::Leave(p) => handle_departure(state, conn, &p.study_id, RoomEvent::Leave),
        GatewayCommand::Quit(p) => handle_departure(state, conn, &p.study_id, RoomEvent::Quit),
        GatewayCommand::Kick(p) => {
            room_wide(state, &p.study_id, RoomEvent::Kick(p.target_user_id));
        }
        GatewayCommand::Delegate(p) => {
            room_wide(state, &p.study_id, RoomEvent::Delegate(p.target_user_id));
        }
        GatewayCommand::Delete(p) => {
            room_wide(state, &p.study_id, RoomEvent::Delete("Room deleted".to_string()));
        }
        GatewayCommand::InfoUpdate(p) => {
            let event = RoomEvent::Info {
                title: p.title,
                description: p.description.unwrap_or_else(|| "Updated".to_string()),
            };
            room_wide(state, &p.study_id, event);
        }
        GatewayCommand::Chat(p) => {
            let Some((room, _, sender_name)) = sender_context(state, conn) else {
                return;
            };
            let event = RoomEvent::Chat(ChatEvent {
                sender_name,
                content: p.content,
                kind: p.kind.unwrap_or_else(|| "TALK".to_string()),
                metadata: p.metadata,
            });
            state
                .rooms
                .broadcast(&state.sessions, &room, &topics::room_chat(&room), &event, None);
        }
        GatewayCommand::IdeUpdate(p) => {
            let Some((room, user, _)) = sender_context(state, conn) else {
                return;
            };
            let merged = state.ide.record_update(&room, user, &p);
            let event = RoomEvent::Ide(IdeEventData {
                problem_id: merged.problem_id,
                code: merged.code,
                language: merged.language,
            });
            state.rooms.broadcast(
                &state.sessions,
                &room,
                &topics::room_ide(&room, user),
                &event,
                None,
            );
        }
        GatewayCommand::IdeWatch(p) => {
            let Some((room, user, _)) = sender_context(state, conn) else {
                return;
            };
            let viewers = state.ide.watch(&room, p.target_user_id, user, p.action);
            state.broadcast_watchers(&room, p.target_user_id, viewers);
        }
        GatewayCommand::IdeSnapshotRequest(p) => {
            let Some((room, user, _)) = sender_context(state, conn) else {
                return;
            };
            let target = p.target_user_id.unwrap_or(user);
            let snapshot = state.ide.snapshot_of(&room, target);
            let event = IdeSnapshotEvent {
                target_user_id: target,
                problem_id: snapshot.problem_id,
                code: snapshot.code,
            };
            state
                .sessions
                .send_message(conn, &topics::room_ide_snapshot(&room, user), &event);
        }
        GatewayCommand::Signal(p) => {
            let Some((room, user, _)) = sender_context(state, conn) else {
                return;
            };
            let event = SignalEvent {
                kind: p.kind,
                from_user_id: user,
                payload: p.payload,
            };
            state.rooms.broadcast(
                &state.sessions,
                &room,
                &topics::room_signal(&room, p.target_user_id),
                &event,
                Some(conn),
            );
        }
        GatewayCommand::Curriculum(p) => {
            let Some((room, _, _)) = sender_context(state, conn) else {
                return;
            };
            let handle = state.curriculum(&room);
            let result = match p.action {
                CurriculumAction::Add => handle.add(p.problem_id).await,
                CurriculumAction::Remove => handle.remove(p.problem_id).await,
            };
            if let Err(err) = result {
                warn!(%conn, room, problem_id = p.problem_id, %err, "curriculum command failed");
            }
        }
        GatewayCommand::Whiteboard(p) => handle_whiteboard(state, conn, p),
        GatewayCommand::WhiteboardSync => {
            let Some((room, _, _)) = sender_context(state, conn) else {
                return;
            };
            let destination = topics::room_whiteboard(&room);
            send_whiteboard_sync(state, conn, &room, &destination);
        }
    }
}

/// ENTER binds the identity to the connection, joins the room, and
/// replies with the fixed three-frame sequence: room-wide ENTER, then
/// a private ROOM_INFO snapshot, then a private VIDEO_TOKEN.
fn handle_enter(
    state: &Arc<AppState>,
    conn: ConnId,
    room: RoomId,
    user: UserId,
    nickname: Option<String>,
) {
    state.sessions.assign(conn, user, nickname, room.clone());
    state.rooms.join(&room, conn);

    state.rooms.broadcast(
        &state.sessions,
        &room,
        &topics::room(&room),
        &RoomEvent::Enter(user),
        None,
    );

    let members: Vec<MemberInfo> = state
        .rooms
        .members(&room)
        .into_iter()
        .filter_map(|member| state.sessions.identity(member))
        .map(|(user_id, nickname)| MemberInfo { user_id, nickname })
        .collect();
    let info = RoomEvent::RoomInfo(RoomInfoData {
        id: room.clone(),
        members,
    });
    state
        .sessions
        .send_message(conn, &topics::room_info(&room, user), &info);

    let token = state.credentials.issue(&room, user);
    state.sessions.send_message(
        conn,
        &topics::video_token(&room, user),
        &RoomEvent::VideoToken(token),
    );
}

/// LEAVE and QUIT share the departure path; they differ only in the
/// event the remaining members see.
fn handle_departure(
    state: &Arc<AppState>,
    conn: ConnId,
    room: &str,
    event: fn(UserId) -> RoomEvent,
) {
    let user = state.sessions.user_of(conn);
    state.leave_room(room, conn, user, &event(user.unwrap_or_default()));
    state.sessions.clear_room(conn);
}

fn room_wide(state: &Arc<AppState>, room: &str, event: RoomEvent) {
    state
        .rooms
        .broadcast(&state.sessions, room, &topics::room(room), &event, None);
}

/// Whiteboard fan-out policy: START and CLOSE go to everyone including
/// the sender, object edits exclude the sender (its canvas already
/// applied them), and SYNC is answered to the requester alone.
fn handle_whiteboard(state: &Arc<AppState>, conn: ConnId, p: WhiteboardPayload) {
    let Some((room, user, name)) = sender_context(state, conn) else {
        return;
    };
    let destination = topics::room_whiteboard(&room);

    let event = WhiteboardEvent {
        action: p.action,
        object_id: p.object_id.clone(),
        sender_id: Some(user),
        sender_name: Some(name.clone()),
        data: p.data.clone(),
    };

    match p.action {
        WhiteboardAction::Start => {
            state.whiteboards.with_board(&room, |b| b.start(user, &name));
            state
                .rooms
                .broadcast(&state.sessions, &room, &destination, &event, None);
        }
        WhiteboardAction::Close => {
            state.whiteboards.with_board(&room, |b| b.close());
            state
                .rooms
                .broadcast(&state.sessions, &room, &destination, &event, None);
        }
        WhiteboardAction::Clear => {
            state.whiteboards.with_board(&room, |b| b.clear());
            state
                .rooms
                .broadcast(&state.sessions, &room, &destination, &event, Some(conn));
        }
        WhiteboardAction::Added => {
            let Some(object_id) = p.object_id else {
                warn!(%conn, room, "ADDED without objectId dropped");
                return;
            };
            state
                .whiteboards
                .with_board(&room, |b| b.add_object(&object_id, p.data));
            state
                .rooms
                .broadcast(&state.sessions, &room, &destination, &event, Some(conn));
        }
        WhiteboardAction::Modified => {
            let Some(object_id) = p.object_id else {
                warn!(%conn, room, "MODIFIED without objectId dropped");
                return;
            };
            state
                .whiteboards
                .with_board(&room, |b| b.modify_object(&object_id, p.data));
            state
                .rooms
                .broadcast(&state.sessions, &room, &destination, &event, Some(conn));
        }
        WhiteboardAction::Removed => {
            let Some(object_id) = p.object_id else {
                warn!(%conn, room, "REMOVED without objectId dropped");
                return;
            };
            state
                .whiteboards
                .with_board(&room, |b| b.remove_object(&object_id));
            state
                .rooms
                .broadcast(&state.sessions, &room, &destination, &event, Some(conn));
        }
        WhiteboardAction::Sync => {
            send_whiteboard_sync(state, conn, &room, &destination);
        }
    }
}

/// Serve the full-state snapshot to one connection only.
fn send_whiteboard_sync(state: &Arc<AppState>, conn: ConnId, room: &str, destination: &str) {
    let snapshot = state.whiteboards.snapshot(room);
    let data = match serde_json::to_value(&snapshot) {
        Ok(data) => data,
        Err(err) => {
            warn!(room, %err, "failed to serialize whiteboard snapshot");
            return;
        }
    };
    let event = WhiteboardEvent {
        action: WhiteboardAction::Sync,
        object_id: None,
        sender_id: None,
        sender_name: None,
        data: Some(data),
    };
    state.sessions.send_message(conn, destination, &event);
}

/// Room and identity resolved from the sender's session; commands that
/// carry no room id in their payload are dropped when the sender never
/// entered a room.
fn sender_context(state: &Arc<AppState>, conn: ConnId) -> Option<(RoomId, UserId, String)> {
    let room = state.sessions.room_of(conn);
    let identity = state.sessions.identity(conn);
    match (room, identity) {
        (Some(room), Some((user, name))) => Some((room, user, name)),
        _ => {
            debug!(%conn, "command from connection with no room context dropped");
            None
        }
    }
}
