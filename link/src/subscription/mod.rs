//! Caller-held handles for subscriptions and presence trackings.
//!
//! Handles keep only a weak reference to the client. Dropping a handle does
//! **not** unsubscribe: the subscription lives until [`Subscription::unsubscribe`]
//! is called or the client itself is dropped.

pub(crate) mod registry;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::connection::Shared;
use crate::models::SubscriptionKind;

/// Handle to one registered subscription.
///
/// ```rust,no_run
/// # use realtime_link::RealtimeClient;
/// # fn demo(client: &RealtimeClient) {
/// let sub = client.on_broadcast("room1", |msg| println!("{}: {}", msg.event, msg.payload));
/// // later
/// sub.unsubscribe();
/// # }
/// ```
pub struct Subscription {
    id: u64,
    topic: String,
    kind: SubscriptionKind,
    shared: Weak<Shared>,
    active: Arc<AtomicBool>,
}

impl Subscription {
    pub(crate) fn new(
        id: u64,
        topic: String,
        kind: SubscriptionKind,
        shared: Weak<Shared>,
        active: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            topic,
            kind,
            shared,
            active,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn kind(&self) -> SubscriptionKind {
        self.kind
    }

    /// `false` once unsubscribed.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Remove this subscription. Callbacks stop immediately; the unsubscribe
    /// (and, for the last reference to a channel, leave) frame is sent only
    /// if the socket is open. Calling it again does nothing.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.unsubscribe(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("kind", &self.kind)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Handle returned by [`RealtimeClient::track_presence`](crate::RealtimeClient::track_presence).
pub struct PresenceTracking {
    id: u64,
    channel: String,
    shared: Weak<Shared>,
    released: AtomicBool,
}

impl PresenceTracking {
    pub(crate) fn new(id: u64, channel: String, shared: Weak<Shared>) -> Self {
        Self {
            id,
            channel,
            shared,
            released: AtomicBool::new(false),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Stop tracking. Sends `untrack` when connected; idempotent.
    pub fn untrack(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.untrack(self.id);
        }
    }
}

impl fmt::Debug for PresenceTracking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresenceTracking")
            .field("channel", &self.channel)
            .field("released", &self.released.load(Ordering::Acquire))
            .finish()
    }
}
