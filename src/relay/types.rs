// Wire types for the room-scoped event relay

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event type sent when a trigger fires
pub const TRIGGER: &str = "TRIGGER";
/// Event type that truncates a room's log and id counter
pub const RESET: &str = "RESET";

/// Event as stored by the relay
///
/// Fields the relay does not know about (producer debug fields such as
/// `from`, `count`, `clientTs`) are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayEvent {
    /// Server-assigned, strictly increasing per room
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub room_id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial_index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_index: Option<i64>,
    /// Server receive time, epoch ms
    #[serde(default)]
    pub server_ts: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RelayEvent {
    pub fn is_trigger(&self) -> bool {
        self.event_type == TRIGGER
    }
}

/// Trigger announcement posted by the task device
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerMessage {
    /// 0-based trial index
    pub trial_index: u32,
    /// Plan index of the trigger
    pub trigger_index: usize,
    /// Numbers pressed correctly when the trigger fired
    pub count: u32,
    /// 1-based trial number
    pub trial_no: u32,
    /// 1-based trigger number
    pub trigger_no: usize,
    /// Sender clock, epoch ms
    pub client_ts: i64,
}

/// Full POST body: room, type, sender and the trigger fields
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OutgoingEvent<'a> {
    pub room_id: &'a str,
    #[serde(rename = "type")]
    pub event_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<&'a str>,
    #[serde(flatten)]
    pub trigger: Option<&'a TriggerMessage>,
}

/// Acknowledgement of an appended event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostAck {
    pub id: u64,
    pub server_ts: i64,
}

/// Reply to `POST events`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PostReply {
    #[serde(default)]
    pub ok: bool,
    pub id: Option<u64>,
    pub server_ts: Option<i64>,
    #[serde(default)]
    pub reset: bool,
    pub error: Option<String>,
}

/// Reply to `GET events`
#[derive(Debug, Default, Deserialize)]
pub(crate) struct EventsReply {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub events: Vec<Value>,
    pub error: Option<String>,
}
