//! Per-channel presence state kept in sync with the server.
//!
//! State only changes in response to server frames: a `sync` replaces the
//! whole channel state, a `diff` appends joins and removes leaves by
//! `presence_ref`. Local `track` calls never touch it.

use std::collections::HashMap;

use crate::error::{RealtimeError, Result};
use crate::models::frame::events;
use crate::models::{Frame, PresenceDiff, PresenceState};

/// Presence states keyed by presence topic (`realtime:presence:{channel}`).
#[derive(Debug, Default)]
pub struct PresenceSynchronizer {
    states: HashMap<String, PresenceState>,
}

impl PresenceSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of a topic; empty when nothing has been received yet.
    pub fn state(&self, topic: &str) -> PresenceState {
        self.states.get(topic).cloned().unwrap_or_default()
    }

    /// Replace the state of `topic` and report it as a full join.
    pub fn apply_sync(&mut self, topic: &str, state: PresenceState) -> PresenceDiff {
        self.states.insert(topic.to_string(), state.clone());
        PresenceDiff {
            joins: state,
            leaves: PresenceState::new(),
        }
    }

    /// Apply an incremental diff to `topic`. Returns the diff to emit.
    pub fn apply_diff(&mut self, topic: &str, diff: PresenceDiff) -> PresenceDiff {
        let state = self.states.entry(topic.to_string()).or_default();
        merge_diff(state, &diff);
        diff
    }

    /// Handle a `presence` frame. Returns the diff for subscribers, or `None`
    /// for events that do not change state.
    pub fn handle_frame(&mut self, frame: &Frame) -> Result<Option<PresenceDiff>> {
        match frame.event_name() {
            events::SYNC => {
                let state: PresenceState = serde_json::from_value(frame.payload.clone())
                    .map_err(|e| {
                        RealtimeError::ProtocolError(format!("Invalid presence sync payload: {}", e))
                    })?;
                Ok(Some(self.apply_sync(&frame.topic, state)))
            },
            events::DIFF => {
                let diff: PresenceDiff = serde_json::from_value(frame.payload.clone())
                    .map_err(|e| {
                        RealtimeError::ProtocolError(format!("Invalid presence diff payload: {}", e))
                    })?;
                Ok(Some(self.apply_diff(&frame.topic, diff)))
            },
            _ => Ok(None),
        }
    }
}

/// Append joins and remove leaves (matched by `presence_ref`). Users left
/// without entries are removed from the map.
pub fn merge_diff(state: &mut PresenceState, diff: &PresenceDiff) {
    for (key, joined) in &diff.joins {
        state
            .entry(key.clone())
            .or_default()
            .extend(joined.iter().cloned());
    }

    for (key, left) in &diff.leaves {
        let Some(entries) = state.get_mut(key) else {
            continue;
        };
        entries.retain(|entry| !left.iter().any(|l| l.presence_ref == entry.presence_ref));
        if entries.is_empty() {
            state.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FrameType, PresenceEntry};
    use serde_json::json;

    const LOBBY: &str = "realtime:presence:lobby";

    fn state_of(pairs: &[(&str, &[&str])]) -> PresenceState {
        pairs
            .iter()
            .map(|(key, refs)| {
                (key.to_string(), refs.iter().map(|r| PresenceEntry::new(*r)).collect())
            })
            .collect()
    }

    #[test]
    fn test_unknown_topic_reads_as_empty() {
        let sync = PresenceSynchronizer::new();
        assert!(sync.state(LOBBY).is_empty());
    }

    #[test]
    fn test_leave_of_last_entry_removes_user_key() {
        let mut sync = PresenceSynchronizer::new();
        sync.apply_sync(LOBBY, state_of(&[("u1", &["a"])]));

        sync.apply_diff(
            LOBBY,
            PresenceDiff {
                joins: PresenceState::new(),
                leaves: state_of(&[("u1", &["a"])]),
            },
        );

        let state = sync.state(LOBBY);
        assert!(state.is_empty(), "u1 must be removed, not left as an empty list");
    }

    #[test]
    fn test_joins_accumulate_in_order() {
        let mut sync = PresenceSynchronizer::new();
        for r in ["a", "b"] {
            sync.apply_diff(
                LOBBY,
                PresenceDiff {
                    joins: state_of(&[("u1", &[r])]),
                    leaves: PresenceState::new(),
                },
            );
        }

        assert_eq!(sync.state(LOBBY), state_of(&[("u1", &["a", "b"])]));
    }

    #[test]
    fn test_leave_only_removes_matching_refs() {
        let mut state = state_of(&[("u1", &["a", "b"]), ("u2", &["c"])]);
        merge_diff(
            &mut state,
            &PresenceDiff {
                joins: PresenceState::new(),
                leaves: state_of(&[("u1", &["a"]), ("ghost", &["z"])]),
            },
        );

        assert_eq!(state, state_of(&[("u1", &["b"]), ("u2", &["c"])]));
    }

    #[test]
    fn test_sync_replaces_previous_state() {
        let mut sync = PresenceSynchronizer::new();
        sync.apply_sync(LOBBY, state_of(&[("u1", &["a"]), ("u2", &["b"])]));
        let diff = sync.apply_sync(LOBBY, state_of(&[("u3", &["c"])]));

        assert_eq!(sync.state(LOBBY), state_of(&[("u3", &["c"])]));
        assert_eq!(diff.joins, state_of(&[("u3", &["c"])]));
        assert!(diff.leaves.is_empty());
    }

    #[test]
    fn test_topics_are_independent() {
        let mut sync = PresenceSynchronizer::new();
        sync.apply_sync(LOBBY, state_of(&[("u1", &["a"])]));
        sync.apply_sync("realtime:presence:choir", state_of(&[("u9", &["z"])]));

        assert_eq!(sync.state(LOBBY).len(), 1);
        assert!(sync.state(LOBBY).contains_key("u1"));
        assert!(sync.state("realtime:presence:choir").contains_key("u9"));
    }

    #[test]
    fn test_handle_sync_frame_keeps_exact_payload() {
        let payload = json!({"u1": [{"online_at": "t1", "presence_ref": "r1", "user_id": "u1"}]});
        let frame = Frame::new(FrameType::Presence, LOBBY, Some("sync".into()), payload.clone());

        let mut sync = PresenceSynchronizer::new();
        let diff = sync.handle_frame(&frame).unwrap().unwrap();

        assert_eq!(serde_json::to_value(sync.state(LOBBY)).unwrap(), payload);
        assert_eq!(serde_json::to_value(&diff.joins).unwrap(), payload);
        assert!(diff.leaves.is_empty());
    }

    #[test]
    fn test_handle_diff_frame_with_one_side_missing() {
        let frame = Frame::new(
            FrameType::Presence,
            LOBBY,
            Some("diff".into()),
            json!({"joins": {"u1": [{"presence_ref": "a"}]}}),
        );

        let mut sync = PresenceSynchronizer::new();
        let diff = sync.handle_frame(&frame).unwrap().unwrap();

        assert_eq!(diff.joins, state_of(&[("u1", &["a"])]));
        assert!(diff.leaves.is_empty(), "absent side is reported as an empty map");
    }

    #[test]
    fn test_handle_sync_with_numeric_fields() {
        let payload = json!({
            "42": [{"online_at": 1700000000000u64, "presence_ref": "r1", "user_id": 42}],
            "u2": [{"online_at": "t2", "presence_ref": "r2", "user_id": "u2", "user": {"name": "Bo"}}]
        });
        let frame = Frame::new(FrameType::Presence, LOBBY, Some("sync".into()), payload.clone());

        let mut sync = PresenceSynchronizer::new();
        let diff = sync.handle_frame(&frame).unwrap().unwrap();

        let state = sync.state(LOBBY);
        assert_eq!(state["42"][0].user_id, Some(json!(42)));
        assert_eq!(state["42"][0].online_at, Some(json!(1700000000000u64)));
        assert_eq!(serde_json::to_value(&state).unwrap(), payload);
        assert_eq!(diff.joins.len(), 2);

        let leave = Frame::new(
            FrameType::Presence,
            LOBBY,
            Some("diff".into()),
            json!({"leaves": {"42": [{"presence_ref": "r1", "user_id": 42}]}}),
        );
        sync.handle_frame(&leave).unwrap();
        assert_eq!(sync.state(LOBBY).keys().collect::<Vec<_>>(), vec!["u2"]);
    }

    #[test]
    fn test_handle_malformed_payload_is_an_error_and_keeps_state() {
        let mut sync = PresenceSynchronizer::new();
        sync.apply_sync(LOBBY, state_of(&[("u1", &["a"])]));

        let frame = Frame::new(FrameType::Presence, LOBBY, Some("sync".into()), json!([1, 2, 3]));
        assert!(sync.handle_frame(&frame).is_err());
        assert_eq!(sync.state(LOBBY), state_of(&[("u1", &["a"])]));
    }

    #[test]
    fn test_handle_other_events_is_a_no_op() {
        let frame = Frame::new(FrameType::Presence, LOBBY, Some("track".into()), json!({}));
        let mut sync = PresenceSynchronizer::new();
        assert_eq!(sync.handle_frame(&frame).unwrap(), None);
    }
}
