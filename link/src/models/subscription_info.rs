//! Subscription metadata exposed to callers.
//!
//! [`SubscriptionInfo`] provides a read-only snapshot of an active
//! subscription, useful for debugging, tests, and diagnostics screens.

use serde::{Deserialize, Serialize};

use super::subscription_kind::SubscriptionKind;

/// Read-only snapshot of an active subscription.
///
/// Returned by [`RealtimeClient::list_subscriptions`](crate::RealtimeClient::list_subscriptions).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    /// Identifier assigned when subscribing.
    pub id: u64,
    /// Full topic string, e.g. `realtime:presence:lobby`.
    pub topic: String,
    pub kind: SubscriptionKind,
    /// Channel segment of the topic, if it has one.
    pub channel: Option<String>,
    /// Row filter sent with the subscribe frame.
    pub filter: Option<String>,
}
