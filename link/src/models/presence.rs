use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// One presence record of a user. A user connected from two devices has two
/// entries, told apart by `presence_ref`.
///
/// Only `presence_ref` is interpreted; every other field is kept as the
/// server sent it, whatever its JSON type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PresenceEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online_at: Option<JsonValue>,

    /// Unique per join; leaves are matched on this.
    #[serde(default)]
    pub presence_ref: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<JsonValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<JsonValue>,

    /// Any other fields the tracking client attached.
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl PresenceEntry {
    pub fn new(presence_ref: impl Into<String>) -> Self {
        Self {
            presence_ref: presence_ref.into(),
            ..Default::default()
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<JsonValue>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_online_at(mut self, online_at: impl Into<JsonValue>) -> Self {
        self.online_at = Some(online_at.into());
        self
    }

    pub fn with_user(mut self, user: JsonValue) -> Self {
        self.user = Some(user);
        self
    }
}

/// Presence of one channel: user key → that user's entries, in join order.
pub type PresenceState = BTreeMap<String, Vec<PresenceEntry>>;

/// Joins and leaves delivered to presence subscribers.
///
/// A `sync` is reported as `{ joins: <full state>, leaves: {} }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceDiff {
    #[serde(default)]
    pub joins: PresenceState,
    #[serde(default)]
    pub leaves: PresenceState,
}
