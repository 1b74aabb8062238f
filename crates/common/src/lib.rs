// ================
// crates/common/src/lib.rs
// ================
//! Shared wire-level types for the study-room gateway.
//!
//! This crate defines the typed payloads carried by inbound `SEND`
//! frames, the outbound event envelopes broadcast to room topics, and
//! the destination/topic naming convention both sides agree on. The
//! frame codec itself lives in the gateway crate; everything here is
//! plain serde data.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Room identifier. String-typed on the wire even when numeric.
pub type RoomId = String;

/// User identifier claimed on room entry and trusted thereafter.
pub type UserId = i64;

/// Accept a room id sent either as a JSON string or a bare number.
fn room_id_lenient<'de, D>(de: D) -> Result<RoomId, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(de)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number room id, got {other}"
        ))),
    }
}

// ---------------------------------------------------------------------
// Inbound payloads (SEND bodies), one struct per destination family.
// ---------------------------------------------------------------------

/// Body of `/pub/studies/enter`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnterPayload {
    #[serde(deserialize_with = "room_id_lenient")]
    pub study_id: RoomId,
    pub user_id: UserId,
    #[serde(default)]
    pub nickname: Option<String>,
}

/// Body of `/pub/studies/leave`, `/pub/studies/quit` and
/// `/pub/studies/delete` (only the room id matters).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPayload {
    #[serde(deserialize_with = "room_id_lenient")]
    pub study_id: RoomId,
}

/// Body of `/pub/studies/kick` and `/pub/studies/delegate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetPayload {
    #[serde(deserialize_with = "room_id_lenient")]
    pub study_id: RoomId,
    pub target_user_id: UserId,
}

/// Body of `/pub/studies/info/update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoUpdatePayload {
    #[serde(deserialize_with = "room_id_lenient")]
    pub study_id: RoomId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Body of `/pub/chat/message`. Carries no room id; the sender's room
/// is resolved from its session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    pub content: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Body of `/pub/ide/update`. All fields optional so a partial update
/// (language change only) rides the same destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeUpdatePayload {
    #[serde(default)]
    pub problem_id: Option<i64>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// `action` field of `/pub/ide/watch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchAction {
    Start,
    Stop,
}

/// Body of `/pub/ide/watch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchPayload {
    pub target_user_id: UserId,
    pub action: WatchAction,
}

/// Body of `/pub/ide/request-snapshot`. A missing target means the
/// requester wants its own last-known snapshot back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRequestPayload {
    #[serde(default)]
    pub target_user_id: Option<UserId>,
}

/// Body of `/pub/studies/signal`: peer-connection negotiation relayed
/// verbatim to the target's signal topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalPayload {
    pub target_user_id: UserId,
    pub kind: String,
    pub payload: Value,
}

/// `action` field of `/pub/studies/problems`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CurriculumAction {
    Add,
    Remove,
}

/// Body of `/pub/studies/problems`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumPayload {
    pub action: CurriculumAction,
    pub problem_id: i64,
}

/// Whiteboard action verbs shared by requests, broadcasts and history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WhiteboardAction {
    Start,
    Close,
    Clear,
    Added,
    Modified,
    Removed,
    Sync,
}

/// Body of `/pub/studies/whiteboard/message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhiteboardPayload {
    pub action: WhiteboardAction,
    #[serde(default)]
    pub object_id: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

// ---------------------------------------------------------------------
// The closed command set the dispatcher routes on.
// ---------------------------------------------------------------------

/// One decoded inbound command: destination + typed body, decoded once
/// at the dispatcher boundary.
#[derive(Debug, Clone)]
pub enum GatewayCommand {
    Enter(EnterPayload),
    Leave(RoomPayload),
    Kick(TargetPayload),
    Delegate(TargetPayload),
    Quit(RoomPayload),
    Delete(RoomPayload),
    InfoUpdate(InfoUpdatePayload),
    Chat(ChatPayload),
    IdeUpdate(IdeUpdatePayload),
    IdeWatch(WatchPayload),
    IdeSnapshotRequest(SnapshotRequestPayload),
    Signal(SignalPayload),
    Curriculum(CurriculumPayload),
    Whiteboard(WhiteboardPayload),
    WhiteboardSync,
}

impl GatewayCommand {
    /// Decode a SEND destination + body into a command.
    ///
    /// `Ok(None)` means the destination is not in the routing table and
    /// the frame should be ignored (forward compatibility). An `Err`
    /// means the destination was recognized but the body did not match
    /// its payload shape.
    pub fn parse(destination: &str, body: &str) -> Result<Option<Self>, serde_json::Error> {
        // An empty body is legal for payloads with no required fields.
        let body = if body.trim().is_empty() { "{}" } else { body };
        let cmd = match destination {
            dest::ENTER => Self::Enter(serde_json::from_str(body)?),
            dest::LEAVE => Self::Leave(serde_json::from_str(body)?),
            dest::KICK => Self::Kick(serde_json::from_str(body)?),
            dest::DELEGATE => Self::Delegate(serde_json::from_str(body)?),
            dest::QUIT => Self::Quit(serde_json::from_str(body)?),
            dest::DELETE => Self::Delete(serde_json::from_str(body)?),
            dest::INFO_UPDATE => Self::InfoUpdate(serde_json::from_str(body)?),
            dest::CHAT_MESSAGE => Self::Chat(serde_json::from_str(body)?),
            dest::IDE_UPDATE => Self::IdeUpdate(serde_json::from_str(body)?),
            dest::IDE_WATCH => Self::IdeWatch(serde_json::from_str(body)?),
            dest::IDE_REQUEST_SNAPSHOT => {
                Self::IdeSnapshotRequest(serde_json::from_str(body)?)
            }
            dest::SIGNAL => Self::Signal(serde_json::from_str(body)?),
            dest::PROBLEMS => Self::Curriculum(serde_json::from_str(body)?),
            dest::WHITEBOARD_MESSAGE => Self::Whiteboard(serde_json::from_str(body)?),
            dest::WHITEBOARD_SYNC => Self::WhiteboardSync,
            _ => return Ok(None),
        };
        Ok(Some(cmd))
    }
}

// ---------------------------------------------------------------------
// Outbound envelopes (MESSAGE bodies).
// ---------------------------------------------------------------------

/// One member entry inside a `ROOM_INFO` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInfo {
    pub user_id: UserId,
    pub nickname: String,
}

/// `ROOM_INFO` payload sent privately to the entering member.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfoData {
    pub id: RoomId,
    pub members: Vec<MemberInfo>,
}

/// Chat payload broadcast on the room chat topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    pub sender_name: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// IDE payload broadcast on a member's per-sender topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeEventData {
    pub problem_id: i64,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Curriculum change notifications on the room problems topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "UPPERCASE", rename_all_fields = "camelCase")]
pub enum CurriculumEvent {
    Add { problem_id: i64, title: String },
    Remove { problem_id: i64 },
    Refresh,
}

/// The `{type, data}` envelope used by every room-scoped broadcast
/// except the whiteboard (which keeps its flat `{action, …}` shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum RoomEvent {
    Enter(UserId),
    Leave(UserId),
    Kick(UserId),
    Delegate(UserId),
    Quit(UserId),
    Delete(String),
    Info {
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        description: String,
    },
    RoomInfo(RoomInfoData),
    VideoToken(String),
    Chat(ChatEvent),
    Ide(IdeEventData),
    WatchUpdate {
        count: usize,
        viewers: Vec<String>,
    },
    Curriculum(CurriculumEvent),
}

/// Flat whiteboard broadcast, the shape the canvas client consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhiteboardEvent {
    pub action: WhiteboardAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// IDE snapshot reply, addressed to the requester only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeSnapshotEvent {
    pub target_user_id: UserId,
    pub problem_id: i64,
    pub code: String,
}

/// Relayed peer-negotiation message on a target's signal topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalEvent {
    pub kind: String,
    pub from_user_id: UserId,
    pub payload: Value,
}

// ---------------------------------------------------------------------
// Destination / topic naming convention.
// ---------------------------------------------------------------------

/// Inbound SEND destinations the dispatcher routes on.
pub mod dest {
    pub const ENTER: &str = "/pub/studies/enter";
    pub const LEAVE: &str = "/pub/studies/leave";
    pub const KICK: &str = "/pub/studies/kick";
    pub const DELEGATE: &str = "/pub/studies/delegate";
    pub const QUIT: &str = "/pub/studies/quit";
    pub const DELETE: &str = "/pub/studies/delete";
    pub const INFO_UPDATE: &str = "/pub/studies/info/update";
    pub const CHAT_MESSAGE: &str = "/pub/chat/message";
    pub const IDE_UPDATE: &str = "/pub/ide/update";
    pub const IDE_WATCH: &str = "/pub/ide/watch";
    pub const IDE_REQUEST_SNAPSHOT: &str = "/pub/ide/request-snapshot";
    pub const SIGNAL: &str = "/pub/studies/signal";
    pub const PROBLEMS: &str = "/pub/studies/problems";
    pub const WHITEBOARD_MESSAGE: &str = "/pub/studies/whiteboard/message";
    pub const WHITEBOARD_SYNC: &str = "/pub/studies/whiteboard/sync";
}

/// Outbound topic builders.
pub mod topics {
    use super::{RoomId, UserId};

    /// Room-wide announcement topic.
    pub fn room(room: &str) -> String {
        format!("/topic/studies/rooms/{room}")
    }

    pub fn room_chat(room: &str) -> String {
        format!("/topic/studies/rooms/{room}/chat")
    }

    pub fn room_problems(room: &str) -> String {
        format!("/topic/studies/rooms/{room}/problems")
    }

    pub fn room_whiteboard(room: &str) -> String {
        format!("/topic/studies/rooms/{room}/whiteboard")
    }

    pub fn room_ide(room: &str, user: UserId) -> String {
        format!("/topic/studies/rooms/{room}/ide/{user}")
    }

    pub fn room_ide_watchers(room: &str, target: UserId) -> String {
        format!("/topic/studies/rooms/{room}/ide/{target}/watchers")
    }

    pub fn room_ide_snapshot(room: &str, user: UserId) -> String {
        format!("/topic/studies/rooms/{room}/ide/{user}/snapshot")
    }

    pub fn room_signal(room: &str, target: UserId) -> String {
        format!("/topic/studies/rooms/{room}/signal/{target}")
    }

    /// Per-identity room snapshot, sent once on entry.
    pub fn room_info(room: &str, user: UserId) -> String {
        format!("/topic/studies/{room}/info/{user}")
    }

    /// Per-identity conferencing credential, sent once on entry.
    pub fn video_token(room: &str, user: UserId) -> String {
        format!("/topic/studies/{room}/video-token/{user}")
    }

    /// Parse the room id out of a room-scoped subscription destination,
    /// returning the id and the remainder after it
    /// (`/topic/studies/rooms/7/whiteboard` -> `("7", "whiteboard")`).
    pub fn parse_room_subscription(destination: &str) -> Option<(RoomId, &str)> {
        let rest = destination.strip_prefix("/topic/studies/rooms/")?;
        match rest.split_once('/') {
            Some((room, tail)) if !room.is_empty() => Some((room.to_string(), tail)),
            None if !rest.is_empty() => Some((rest.to_string(), "")),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_enter_with_numeric_study_id() {
        let cmd = GatewayCommand::parse(dest::ENTER, r#"{"studyId":7,"userId":42}"#)
            .unwrap()
            .unwrap();
        match cmd {
            GatewayCommand::Enter(p) => {
                assert_eq!(p.study_id, "7");
                assert_eq!(p.user_id, 42);
                assert!(p.nickname.is_none());
            }
            other => panic!("expected Enter, got {other:?}"),
        }
    }

    #[test]
    fn parse_unknown_destination_is_none() {
        let cmd = GatewayCommand::parse("/pub/studies/unknown", "{}").unwrap();
        assert!(cmd.is_none());
    }

    #[test]
    fn parse_malformed_body_is_err() {
        assert!(GatewayCommand::parse(dest::ENTER, "not json").is_err());
    }

    #[test]
    fn parse_empty_body_defaults_to_empty_object() {
        let cmd = GatewayCommand::parse(dest::IDE_UPDATE, "").unwrap().unwrap();
        match cmd {
            GatewayCommand::IdeUpdate(p) => {
                assert!(p.problem_id.is_none());
                assert!(p.code.is_none());
            }
            other => panic!("expected IdeUpdate, got {other:?}"),
        }
    }

    #[test]
    fn room_event_wire_shape() {
        let json = serde_json::to_value(RoomEvent::Enter(42)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "ENTER", "data": 42}));

        let json = serde_json::to_value(RoomEvent::VideoToken("tok".into())).unwrap();
        assert_eq!(json["type"], "VIDEO_TOKEN");
        assert_eq!(json["data"], "tok");

        let json = serde_json::to_value(RoomEvent::WatchUpdate {
            count: 1,
            viewers: vec!["42".into()],
        })
        .unwrap();
        assert_eq!(json["type"], "WATCH_UPDATE");
        assert_eq!(json["data"]["count"], 1);
    }

    #[test]
    fn curriculum_event_wire_shape() {
        let json =
            serde_json::to_value(RoomEvent::Curriculum(CurriculumEvent::Add {
                problem_id: 1002,
                title: "Problem 1002".into(),
            }))
            .unwrap();
        assert_eq!(json["type"], "CURRICULUM");
        assert_eq!(json["data"]["action"], "ADD");
        assert_eq!(json["data"]["problemId"], 1002);
    }

    #[test]
    fn whiteboard_event_skips_absent_fields() {
        let json = serde_json::to_value(WhiteboardEvent {
            action: WhiteboardAction::Clear,
            object_id: None,
            sender_id: Some(1),
            sender_name: None,
            data: None,
        })
        .unwrap();
        assert_eq!(json["action"], "CLEAR");
        assert_eq!(json["senderId"], 1);
        assert!(json.get("objectId").is_none());
        assert!(json.get("data").is_none());
    }

    #[test]
    fn parse_room_subscription_variants() {
        assert_eq!(
            topics::parse_room_subscription("/topic/studies/rooms/7/whiteboard"),
            Some(("7".to_string(), "whiteboard"))
        );
        assert_eq!(
            topics::parse_room_subscription("/topic/studies/rooms/7"),
            Some(("7".to_string(), ""))
        );
        assert_eq!(
            topics::parse_room_subscription("/topic/studies/rooms/7/whiteboard/42"),
            Some(("7".to_string(), "whiteboard/42"))
        );
        assert!(topics::parse_room_subscription("/topic/other").is_none());
    }
}
