use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::topic;

/// Event names carried in `system` and `presence` frames.
pub mod events {
    pub const JOIN: &str = "join";
    pub const LEAVE: &str = "leave";
    pub const SUBSCRIBE: &str = "subscribe";
    pub const UNSUBSCRIBE: &str = "unsubscribe";
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const ERROR: &str = "error";
    pub const TRACK: &str = "track";
    pub const UNTRACK: &str = "untrack";
    pub const SYNC: &str = "sync";
    pub const DIFF: &str = "diff";
}

/// Topic carried by heartbeat frames.
pub const HEARTBEAT_TOPIC: &str = "heartbeat";

/// Frame category; decides how the router dispatches an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    System,
    Database,
    Presence,
    Broadcast,
}

impl FrameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameType::System => "system",
            FrameType::Database => "database",
            FrameType::Presence => "presence",
            FrameType::Broadcast => "broadcast",
        }
    }
}

/// One JSON frame on the socket. Inbound and outbound frames share the shape
/// `{ "type", "topic", "event"?, "payload" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub frame_type: FrameType,
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default = "empty_payload")]
    pub payload: JsonValue,
}

fn empty_payload() -> JsonValue {
    JsonValue::Object(Map::new())
}

impl Frame {
    pub fn new(
        frame_type: FrameType,
        topic: impl Into<String>,
        event: Option<String>,
        payload: JsonValue,
    ) -> Self {
        Self {
            frame_type,
            topic: topic.into(),
            event,
            payload,
        }
    }

    fn system(topic: impl Into<String>, event: &str, payload: JsonValue) -> Self {
        Self::new(FrameType::System, topic, Some(event.to_string()), payload)
    }

    pub fn join(channel: &str) -> Self {
        Self::system(channel, events::JOIN, empty_payload())
    }

    pub fn leave(channel: &str) -> Self {
        Self::system(channel, events::LEAVE, empty_payload())
    }

    /// Subscribe frame; the payload carries the database event (taken from
    /// the topic) and the optional row filter.
    pub fn subscribe(topic: &str, filter: Option<&str>) -> Self {
        let mut payload = Map::new();
        if let Some(event) = topic::event_of(topic) {
            payload.insert("event".to_string(), JsonValue::String(event.to_string()));
        }
        if let Some(filter) = filter {
            payload.insert("filter".to_string(), JsonValue::String(filter.to_string()));
        }
        Self::system(topic, events::SUBSCRIBE, JsonValue::Object(payload))
    }

    pub fn unsubscribe(topic: &str, filter: Option<&str>) -> Self {
        let mut payload = Map::new();
        if let Some(filter) = filter {
            payload.insert("filter".to_string(), JsonValue::String(filter.to_string()));
        }
        Self::system(topic, events::UNSUBSCRIBE, JsonValue::Object(payload))
    }

    pub fn ping() -> Self {
        Self::system(HEARTBEAT_TOPIC, events::PING, empty_payload())
    }

    pub fn track(channel: &str, data: JsonValue) -> Self {
        Self::new(
            FrameType::Presence,
            topic::presence_topic(channel),
            Some(events::TRACK.to_string()),
            data,
        )
    }

    pub fn untrack(channel: &str) -> Self {
        Self::new(
            FrameType::Presence,
            topic::presence_topic(channel),
            Some(events::UNTRACK.to_string()),
            empty_payload(),
        )
    }

    pub fn broadcast(channel: &str, event: &str, payload: JsonValue) -> Self {
        Self::new(
            FrameType::Broadcast,
            topic::broadcast_topic(channel),
            Some(event.to_string()),
            payload,
        )
    }

    /// The event name, or `""` when the frame carries none.
    pub fn event_name(&self) -> &str {
        self.event.as_deref().unwrap_or_default()
    }

    /// `true` for a frame of the given type and event.
    pub fn is(&self, frame_type: FrameType, event: &str) -> bool {
        self.frame_type == frame_type && self.event_name() == event
    }
}
