use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::presence::PresenceDiff;

/// A broadcast message: the sender's event name and payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub event: String,
    pub payload: JsonValue,
}

/// What a subscriber callback receives.
///
/// The typed helpers on [`RealtimeClient`](crate::RealtimeClient) unwrap the
/// variant they expect; [`RealtimeClient::subscribe`](crate::RealtimeClient::subscribe)
/// hands the raw event to the callback.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    /// Raw payload of a `database` frame.
    DatabaseChange(JsonValue),
    /// Joins/leaves computed from a presence `sync` or `diff`.
    Presence(PresenceDiff),
    /// Event name and payload of a `broadcast` frame.
    Broadcast(BroadcastMessage),
}

impl RealtimeEvent {
    pub fn as_database_change(&self) -> Option<&JsonValue> {
        match self {
            RealtimeEvent::DatabaseChange(payload) => Some(payload),
            _ => None,
        }
    }

    pub fn as_presence(&self) -> Option<&PresenceDiff> {
        match self {
            RealtimeEvent::Presence(diff) => Some(diff),
            _ => None,
        }
    }

    pub fn as_broadcast(&self) -> Option<&BroadcastMessage> {
        match self {
            RealtimeEvent::Broadcast(message) => Some(message),
            _ => None,
        }
    }
}
