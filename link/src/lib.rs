//! # realtime-link: Realtime Pub/Sub Client
//!
//! A WebSocket channel multiplexer for realtime backends. One socket per
//! client carries database change feeds, presence and broadcast messages for
//! any number of channels.
//!
//! ## Features
//!
//! - **Topic subscriptions**: database changes, presence and broadcast per channel
//! - **Presence sync**: per-channel state kept current from `sync`/`diff` frames
//! - **Broadcast**: fire-and-forget messages to everyone on a channel
//! - **Heartbeat & reconnect**: fixed-interval pings, bounded fixed-interval reconnect
//! - **Replay**: channels, subscriptions and trackings are restored after every reconnect
//! - **Callback API**: every subscription may fire any number of times
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use realtime_link::{DatabaseChangeOptions, RealtimeClient};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RealtimeClient::builder()
//!         .endpoint("ws://localhost:4000/realtime/v1/websocket")
//!         .auth_provider(|| std::env::var("REALTIME_TOKEN").ok())
//!         .build()?;
//!
//!     client
//!         .on_connect(|| println!("connected"))
//!         .on_disconnect(|reason| println!("disconnected: {}", reason))
//!         .connect();
//!
//!     let _messages = client.on_database_changes(
//!         "messages",
//!         |row| println!("row changed: {}", row),
//!         DatabaseChangeOptions::default(),
//!     );
//!     let _lobby = client.on_presence_changes("lobby", |diff| {
//!         println!("{} joined, {} left", diff.joins.len(), diff.leaves.len());
//!     });
//!     let _me = client.track_presence("lobby", json!({"status": "online"}));
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!     client.disconnect();
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
mod connection;
pub mod error;
pub mod event_handlers;
pub mod models;
pub mod presence;
mod router;
pub mod subscription;

// Re-export main types for convenience
pub use auth::{ArcAuthTokenProvider, AuthTokenProvider, ResolvedAuth, StaticToken};
pub use client::{RealtimeClient, RealtimeClientBuilder};
pub use error::{RealtimeError, Result};
pub use event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
pub use models::{
    BroadcastMessage, ClientOptions, ConnectionState, DatabaseChangeOptions, Frame, FrameType,
    PresenceDiff, PresenceEntry, PresenceState, RealtimeEvent, SubscriptionInfo, SubscriptionKind,
};
pub use presence::PresenceSynchronizer;
pub use subscription::{PresenceTracking, Subscription};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
