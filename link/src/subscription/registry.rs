//! Book-keeping for subscriptions, joined channels and presence trackings.
//!
//! The registry never touches the socket. Every mutation returns the frames
//! the server should see, and the caller pushes them through the connection's
//! send choke point (which drops them while the socket is not open). After a
//! reconnect [`TopicRegistry::replay`] rebuilds the full set from scratch.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::models::topic::{channel_of, presence_topic};
use crate::models::{Frame, RealtimeEvent, SubscriptionInfo, SubscriptionKind};

/// Callback stored for every subscription.
pub(crate) type EventCallback = Arc<dyn Fn(&RealtimeEvent) + Send + Sync>;

struct SubEntry {
    topic: String,
    channel: Option<String>,
    kind: SubscriptionKind,
    filter: Option<String>,
    callback: EventCallback,
    /// Cleared on unsubscribe so a fan-out already in flight skips it.
    active: Arc<AtomicBool>,
}

struct Tracking {
    channel: String,
    payload: JsonValue,
}

/// A subscriber selected for one fan-out.
#[derive(Clone)]
pub(crate) struct Subscriber {
    pub(crate) id: u64,
    pub(crate) callback: EventCallback,
    pub(crate) active: Arc<AtomicBool>,
}

impl Subscriber {
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

#[derive(Default)]
pub(crate) struct TopicRegistry {
    subscriptions: HashMap<u64, SubEntry>,
    channels: HashSet<String>,
    trackings: HashMap<u64, Tracking>,
    next_id: u64,
}

impl TopicRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Mark `channel` joined; returns the join frame the first time.
    fn ensure_joined(&mut self, channel: &str, frames: &mut Vec<Frame>) {
        if self.channels.insert(channel.to_string()) {
            frames.push(Frame::join(channel));
        }
    }

    /// Leave `channel` when no subscription or tracking references it anymore.
    fn leave_if_unreferenced(&mut self, channel: &str, frames: &mut Vec<Frame>) {
        let referenced = self
            .subscriptions
            .values()
            .any(|s| s.channel.as_deref() == Some(channel))
            || self.trackings.values().any(|t| t.channel == channel);
        if !referenced && self.channels.remove(channel) {
            frames.push(Frame::leave(channel));
        }
    }

    fn has_subscribe(&self, topic: &str, filter: Option<&str>) -> bool {
        self.subscriptions
            .values()
            .any(|s| s.topic == topic && s.filter.as_deref() == filter)
    }

    /// Register a subscription. Returns its id, the flag cleared on
    /// unsubscribe, and the frames to send (join for a new channel, subscribe
    /// for a new topic/filter pair).
    pub(crate) fn subscribe(
        &mut self,
        topic: &str,
        kind: SubscriptionKind,
        filter: Option<String>,
        callback: EventCallback,
    ) -> (u64, Arc<AtomicBool>, Vec<Frame>) {
        let mut frames = Vec::new();
        let channel = channel_of(topic).map(str::to_string);

        if let Some(ref channel) = channel {
            self.ensure_joined(channel, &mut frames);
        }
        if !self.has_subscribe(topic, filter.as_deref()) {
            frames.push(Frame::subscribe(topic, filter.as_deref()));
        }

        let id = self.allocate_id();
        let active = Arc::new(AtomicBool::new(true));
        self.subscriptions.insert(
            id,
            SubEntry {
                topic: topic.to_string(),
                channel,
                kind,
                filter,
                callback,
                active: active.clone(),
            },
        );
        (id, active, frames)
    }

    /// Remove exactly one subscription. Unknown ids are ignored, which makes
    /// repeated `unsubscribe()` calls harmless.
    pub(crate) fn unsubscribe(&mut self, id: u64) -> Vec<Frame> {
        let mut frames = Vec::new();
        let Some(entry) = self.subscriptions.remove(&id) else {
            return frames;
        };
        entry.active.store(false, Ordering::Release);

        if !self.has_subscribe(&entry.topic, entry.filter.as_deref()) {
            frames.push(Frame::unsubscribe(&entry.topic, entry.filter.as_deref()));
        }
        if let Some(ref channel) = entry.channel {
            self.leave_if_unreferenced(channel, &mut frames);
        }
        frames
    }

    /// Register a presence tracking on `channel`, joining it first if needed.
    /// The channel is read back from its presence topic so a tracking and a
    /// presence subscription on the same channel share one join.
    pub(crate) fn track(&mut self, channel: &str, payload: JsonValue) -> (u64, Vec<Frame>) {
        let mut frames = Vec::new();
        let topic = presence_topic(channel);
        let channel = channel_of(&topic).unwrap_or(channel);
        self.ensure_joined(channel, &mut frames);
        frames.push(Frame::track(channel, payload.clone()));

        let id = self.allocate_id();
        self.trackings.insert(
            id,
            Tracking {
                channel: channel.to_string(),
                payload,
            },
        );
        (id, frames)
    }

    /// Release a tracking. When another tracking on the same channel is
    /// still held, its payload is re-sent instead of an `untrack`, since the
    /// server keeps a single presence per connection and channel.
    pub(crate) fn untrack(&mut self, id: u64) -> Vec<Frame> {
        let mut frames = Vec::new();
        let Some(tracking) = self.trackings.remove(&id) else {
            return frames;
        };

        match self.latest_tracking(&tracking.channel) {
            Some(remaining) => frames.push(Frame::track(&tracking.channel, remaining.clone())),
            None => frames.push(Frame::untrack(&tracking.channel)),
        }
        self.leave_if_unreferenced(&tracking.channel, &mut frames);
        frames
    }

    fn latest_tracking(&self, channel: &str) -> Option<&JsonValue> {
        self.trackings
            .iter()
            .filter(|(_, t)| t.channel == channel)
            .max_by_key(|(id, _)| **id)
            .map(|(_, t)| &t.payload)
    }

    /// Frames that rebuild the server-side state on a fresh connection:
    /// every joined channel once, every distinct topic/filter subscription
    /// once, then the latest tracking per channel.
    pub(crate) fn replay(&self) -> Vec<Frame> {
        let mut channels: Vec<&String> = self.channels.iter().collect();
        channels.sort();
        let mut frames: Vec<Frame> = channels.into_iter().map(|c| Frame::join(c)).collect();

        let mut ids: Vec<u64> = self.subscriptions.keys().copied().collect();
        ids.sort_unstable();
        let mut sent: HashSet<(&str, Option<&str>)> = HashSet::new();
        for id in ids {
            let entry = &self.subscriptions[&id];
            if sent.insert((entry.topic.as_str(), entry.filter.as_deref())) {
                frames.push(Frame::subscribe(&entry.topic, entry.filter.as_deref()));
            }
        }

        let mut tracked: Vec<&str> = self.trackings.values().map(|t| t.channel.as_str()).collect();
        tracked.sort_unstable();
        tracked.dedup();
        for channel in tracked {
            if let Some(payload) = self.latest_tracking(channel) {
                frames.push(Frame::track(channel, payload.clone()));
            }
        }
        frames
    }

    /// Subscribers of `topic`, in subscription order. With `kind` set, only
    /// subscriptions of that kind are returned.
    pub(crate) fn subscribers(&self, topic: &str, kind: Option<SubscriptionKind>) -> Vec<Subscriber> {
        let mut matched: Vec<Subscriber> = self
            .subscriptions
            .iter()
            .filter(|(_, s)| s.topic == topic && kind.map_or(true, |k| s.kind == k))
            .map(|(id, s)| Subscriber {
                id: *id,
                callback: s.callback.clone(),
                active: s.active.clone(),
            })
            .collect();
        matched.sort_by_key(|s| s.id);
        matched
    }

    pub(crate) fn snapshot(&self) -> Vec<SubscriptionInfo> {
        let mut infos: Vec<SubscriptionInfo> = self
            .subscriptions
            .iter()
            .map(|(id, s)| SubscriptionInfo {
                id: *id,
                topic: s.topic.clone(),
                kind: s.kind,
                channel: s.channel.clone(),
                filter: s.filter.clone(),
            })
            .collect();
        infos.sort_by_key(|i| i.id);
        infos
    }

    #[cfg(test)]
    pub(crate) fn is_joined(&self, channel: &str) -> bool {
        self.channels.contains(channel)
    }

    pub(crate) fn len(&self) -> usize {
        self.subscriptions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::frame::events;
    use crate::models::topic::{broadcast_topic, database_topic, presence_topic};
    use crate::models::FrameType;
    use serde_json::json;

    fn noop() -> EventCallback {
        Arc::new(|_: &RealtimeEvent| {})
    }

    fn summary(frames: &[Frame]) -> Vec<(String, String)> {
        frames
            .iter()
            .map(|f| (f.event_name().to_string(), f.topic.clone()))
            .collect()
    }

    fn pair(event: &str, topic: &str) -> (String, String) {
        (event.to_string(), topic.to_string())
    }

    #[test]
    fn test_first_subscribe_joins_then_subscribes() {
        let mut reg = TopicRegistry::new();
        let topic = presence_topic("lobby");
        let (_, _, frames) = reg.subscribe(&topic, SubscriptionKind::Presence, None, noop());

        assert_eq!(
            summary(&frames),
            vec![pair(events::JOIN, "lobby"), pair(events::SUBSCRIBE, &topic)]
        );
        assert!(frames[0].is(FrameType::System, events::JOIN));
        assert!(reg.is_joined("lobby"));
    }

    #[test]
    fn test_leave_only_after_last_unsubscribe() {
        let mut reg = TopicRegistry::new();
        let topic = broadcast_topic("room1");
        let (a, _, _) = reg.subscribe(&topic, SubscriptionKind::Broadcast, None, noop());
        let (b, _, second) = reg.subscribe(&topic, SubscriptionKind::Broadcast, None, noop());
        assert!(second.is_empty(), "same channel and topic: nothing new to send");

        let frames = reg.unsubscribe(a);
        assert!(frames.is_empty(), "channel still referenced, no leave");
        assert!(reg.is_joined("room1"));

        let frames = reg.unsubscribe(b);
        assert_eq!(
            summary(&frames),
            vec![pair(events::UNSUBSCRIBE, &topic), pair(events::LEAVE, "room1")]
        );
        assert!(!reg.is_joined("room1"));
    }

    #[test]
    fn test_channel_shared_across_kinds() {
        let mut reg = TopicRegistry::new();
        let (db, _, _) = reg.subscribe(
            &database_topic("lobby", None),
            SubscriptionKind::Database,
            None,
            noop(),
        );
        let (_, _, frames) =
            reg.subscribe(&presence_topic("lobby"), SubscriptionKind::Presence, None, noop());
        assert_eq!(summary(&frames), vec![pair(events::SUBSCRIBE, "realtime:presence:lobby")]);

        let frames = reg.unsubscribe(db);
        assert_eq!(summary(&frames), vec![pair(events::UNSUBSCRIBE, "realtime:database:lobby:*")]);
    }

    #[test]
    fn test_channel_with_colons_is_joined_once() {
        let mut reg = TopicRegistry::new();
        let topic = presence_topic("church:42");
        let (sub, _, frames) = reg.subscribe(&topic, SubscriptionKind::Presence, None, noop());
        assert_eq!(
            summary(&frames),
            vec![pair(events::JOIN, "church:42"), pair(events::SUBSCRIBE, &topic)]
        );

        let (tracking, frames) = reg.track("church:42", json!({"status": "online"}));
        assert_eq!(summary(&frames), vec![pair(events::TRACK, &topic)]);
        assert!(!reg.is_joined("church"));

        reg.unsubscribe(sub);
        assert!(reg.is_joined("church:42"), "tracking still references the channel");
        let frames = reg.untrack(tracking);
        assert_eq!(
            summary(&frames),
            vec![pair(events::UNTRACK, &topic), pair(events::LEAVE, "church:42")]
        );
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let mut reg = TopicRegistry::new();
        let (id, active, _) =
            reg.subscribe(&broadcast_topic("room1"), SubscriptionKind::Broadcast, None, noop());

        assert_eq!(reg.unsubscribe(id).len(), 2);
        assert!(!active.load(Ordering::Acquire));
        assert!(reg.unsubscribe(id).is_empty());
        assert!(reg.unsubscribe(999).is_empty());
        assert_eq!(reg.len(), 0);
    }

    #[test]
    fn test_different_filters_are_separate_subscribes() {
        let mut reg = TopicRegistry::new();
        let topic = database_topic("prayers", Some("INSERT"));
        let (a, _, first) = reg.subscribe(
            &topic,
            SubscriptionKind::Database,
            Some("church_id=eq.1".into()),
            noop(),
        );
        let (_, _, second) = reg.subscribe(
            &topic,
            SubscriptionKind::Database,
            Some("church_id=eq.2".into()),
            noop(),
        );

        assert_eq!(first.len(), 2);
        assert_eq!(summary(&second), vec![pair(events::SUBSCRIBE, &topic)]);
        assert_eq!(second[0].payload, json!({"event": "INSERT", "filter": "church_id=eq.2"}));

        let frames = reg.unsubscribe(a);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, json!({"filter": "church_id=eq.1"}));
    }

    #[test]
    fn test_replay_has_no_duplicates_or_omissions() {
        let mut reg = TopicRegistry::new();
        let messages = database_topic("messages", None);
        let lobby = presence_topic("lobby");
        reg.subscribe(&messages, SubscriptionKind::Database, None, noop());
        reg.subscribe(&messages, SubscriptionKind::Database, None, noop());
        reg.subscribe(&lobby, SubscriptionKind::Presence, None, noop());

        let frames = reg.replay();
        assert_eq!(
            summary(&frames),
            vec![
                pair(events::JOIN, "lobby"),
                pair(events::JOIN, "messages"),
                pair(events::SUBSCRIBE, &messages),
                pair(events::SUBSCRIBE, &lobby),
            ]
        );
    }

    #[test]
    fn test_replay_skips_removed_subscriptions() {
        let mut reg = TopicRegistry::new();
        let (gone, _, _) =
            reg.subscribe(&broadcast_topic("a"), SubscriptionKind::Broadcast, None, noop());
        reg.subscribe(&broadcast_topic("b"), SubscriptionKind::Broadcast, None, noop());
        reg.unsubscribe(gone);

        assert_eq!(
            summary(&reg.replay()),
            vec![pair(events::JOIN, "b"), pair(events::SUBSCRIBE, "realtime:broadcast:b")]
        );
    }

    #[test]
    fn test_tracking_joins_and_keeps_channel_alive() {
        let mut reg = TopicRegistry::new();
        let (track_id, frames) = reg.track("lobby", json!({"status": "online"}));
        assert_eq!(
            summary(&frames),
            vec![pair(events::JOIN, "lobby"), pair(events::TRACK, "realtime:presence:lobby")]
        );

        let (sub, _, _) =
            reg.subscribe(&presence_topic("lobby"), SubscriptionKind::Presence, None, noop());
        let frames = reg.unsubscribe(sub);
        assert_eq!(summary(&frames), vec![pair(events::UNSUBSCRIBE, "realtime:presence:lobby")]);
        assert!(reg.is_joined("lobby"), "tracking still references the channel");

        let frames = reg.untrack(track_id);
        assert_eq!(
            summary(&frames),
            vec![pair(events::UNTRACK, "realtime:presence:lobby"), pair(events::LEAVE, "lobby")]
        );
        assert!(reg.untrack(track_id).is_empty());
    }

    #[test]
    fn test_untrack_with_remaining_tracking_resends_it() {
        let mut reg = TopicRegistry::new();
        let (first, _) = reg.track("lobby", json!({"status": "online"}));
        let (_, _) = reg.track("lobby", json!({"status": "away"}));

        let frames = reg.untrack(first);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is(FrameType::Presence, events::TRACK));
        assert_eq!(frames[0].payload, json!({"status": "away"}));
    }

    #[test]
    fn test_replay_sends_latest_tracking_per_channel() {
        let mut reg = TopicRegistry::new();
        reg.track("lobby", json!({"n": 1}));
        reg.track("lobby", json!({"n": 2}));

        let frames = reg.replay();
        assert_eq!(
            summary(&frames),
            vec![pair(events::JOIN, "lobby"), pair(events::TRACK, "realtime:presence:lobby")]
        );
        assert_eq!(frames[1].payload, json!({"n": 2}));
    }

    #[test]
    fn test_subscribers_filter_by_topic_and_kind() {
        let mut reg = TopicRegistry::new();
        let lobby = presence_topic("lobby");
        let (a, _, _) = reg.subscribe(&lobby, SubscriptionKind::Presence, None, noop());
        let (b, _, _) = reg.subscribe(&lobby, SubscriptionKind::Broadcast, None, noop());
        reg.subscribe(&presence_topic("other"), SubscriptionKind::Presence, None, noop());

        let all: Vec<u64> = reg.subscribers(&lobby, None).iter().map(|s| s.id).collect();
        assert_eq!(all, vec![a, b]);

        let presence: Vec<u64> = reg
            .subscribers(&lobby, Some(SubscriptionKind::Presence))
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(presence, vec![a]);
    }

    #[test]
    fn test_topic_without_channel_does_not_join() {
        let mut reg = TopicRegistry::new();
        let (_, _, frames) = reg.subscribe("custom", SubscriptionKind::Broadcast, None, noop());
        assert_eq!(summary(&frames), vec![pair(events::SUBSCRIBE, "custom")]);
        assert_eq!(reg.snapshot()[0].channel, None);
    }
}
