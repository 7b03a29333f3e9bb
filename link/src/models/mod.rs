//! Data models for realtime-link.
//!
//! Defines the wire frame, topic naming conventions, presence structures,
//! client options and the events delivered to subscriber callbacks.

pub mod client_options;
pub mod connection_state;
pub mod database_change_options;
pub mod frame;
pub mod presence;
pub mod realtime_event;
pub mod subscription_info;
pub mod subscription_kind;
pub mod topic;


pub use client_options::ClientOptions;
pub use connection_state::ConnectionState;
pub use database_change_options::DatabaseChangeOptions;
pub use frame::{Frame, FrameType};
pub use presence::{PresenceDiff, PresenceEntry, PresenceState};
pub use realtime_event::{BroadcastMessage, RealtimeEvent};
pub use subscription_info::SubscriptionInfo;
pub use subscription_kind::SubscriptionKind;
