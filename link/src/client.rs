//! Realtime client with builder pattern.
//!
//! Provides the primary interface: connection lifecycle, subscriptions,
//! presence and broadcast.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tokio::runtime::Handle;

use crate::{
    auth::{AuthTokenProvider, ResolvedAuth, StaticToken},
    connection::Shared,
    error::{RealtimeError, Result},
    event_handlers::{ConnectionError, DisconnectReason, EventHandlers},
    models::{
        topic, BroadcastMessage, ClientOptions, ConnectionState, DatabaseChangeOptions, Frame,
        PresenceDiff, PresenceState, RealtimeEvent, SubscriptionInfo, SubscriptionKind,
    },
    subscription::{PresenceTracking, Subscription},
};

/// Realtime pub/sub client.
///
/// Cheap to clone; all clones share one connection. The connection task is
/// shut down (as an intentional disconnect) when the last clone is dropped.
///
/// # Examples
///
/// ```rust,no_run
/// use realtime_link::{DatabaseChangeOptions, RealtimeClient};
/// use serde_json::json;
///
/// # async fn example() -> realtime_link::Result<()> {
/// let client = RealtimeClient::builder()
///     .endpoint("wss://example.org/realtime/v1/websocket")
///     .auth_token("eyJhbGc...")
///     .build()?;
///
/// client.on_connect(|| println!("connected")).connect();
///
/// let sub = client.on_database_changes(
///     "messages",
///     |change| println!("change: {}", change),
///     DatabaseChangeOptions::new().with_event("INSERT"),
/// );
///
/// let tracking = client.track_presence("lobby", json!({"status": "online"}));
/// client.broadcast("room1", "msg", json!({"text": "hi"}));
///
/// sub.unsubscribe();
/// tracking.untrack();
/// client.disconnect();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    shared: Arc<Shared>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.shared.disconnect();
    }
}

impl RealtimeClient {
    /// Create a new builder for configuring the client
    pub fn builder() -> RealtimeClientBuilder {
        RealtimeClientBuilder::new()
    }

    fn shared(&self) -> &Arc<Shared> {
        &self.inner.shared
    }

    // ── Connection ──────────────────────────────────────────────────────────

    /// Open the connection in the background. Calling it while a connection
    /// is open (or opening) does nothing; while a reconnect is pending it
    /// triggers the next attempt immediately.
    pub fn connect(&self) -> &Self {
        self.shared().connect();
        self
    }

    /// Close the connection and cancel any pending reconnect.
    ///
    /// Subscriptions stay registered and are replayed on the next `connect()`.
    pub fn disconnect(&self) -> &Self {
        self.shared().disconnect();
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Open
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared().connection_state()
    }

    /// Reconnect attempts made since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared().reconnect_attempts()
    }

    pub fn options(&self) -> &ClientOptions {
        &self.shared().options
    }

    // ── Subscriptions ───────────────────────────────────────────────────────

    /// Register a callback for an arbitrary topic.
    ///
    /// The channel (from the third `:`-segment of the topic on) is joined if needed and a
    /// `subscribe` frame is sent when connected; otherwise both are sent on
    /// the next open.
    pub fn subscribe<F>(
        &self,
        topic: &str,
        kind: SubscriptionKind,
        filter: Option<String>,
        callback: F,
    ) -> Subscription
    where
        F: Fn(&RealtimeEvent) + Send + Sync + 'static,
    {
        self.shared().subscribe(topic, kind, filter, Arc::new(callback))
    }

    /// Row changes of `table`, optionally narrowed to one event
    /// (`INSERT`/`UPDATE`/`DELETE`) and a row filter.
    pub fn on_database_changes<F>(
        &self,
        table: &str,
        callback: F,
        options: DatabaseChangeOptions,
    ) -> Subscription
    where
        F: Fn(&JsonValue) + Send + Sync + 'static,
    {
        let topic = topic::database_topic(table, options.event.as_deref());
        self.subscribe(&topic, SubscriptionKind::Database, options.filter, move |event| {
            if let Some(payload) = event.as_database_change() {
                callback(payload);
            }
        })
    }

    /// Joins and leaves on `channel`. A full `sync` arrives as a diff with
    /// every present user in `joins`.
    pub fn on_presence_changes<F>(&self, channel: &str, callback: F) -> Subscription
    where
        F: Fn(&PresenceDiff) + Send + Sync + 'static,
    {
        let topic = topic::presence_topic(channel);
        self.subscribe(&topic, SubscriptionKind::Presence, None, move |event| {
            if let Some(diff) = event.as_presence() {
                callback(diff);
            }
        })
    }

    pub fn on_broadcast<F>(&self, channel: &str, callback: F) -> Subscription
    where
        F: Fn(&BroadcastMessage) + Send + Sync + 'static,
    {
        let topic = topic::broadcast_topic(channel);
        self.subscribe(&topic, SubscriptionKind::Broadcast, None, move |event| {
            if let Some(message) = event.as_broadcast() {
                callback(message);
            }
        })
    }

    /// Snapshot of the active subscriptions, ordered by id.
    pub fn list_subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.shared().list_subscriptions()
    }

    // ── Presence ────────────────────────────────────────────────────────────

    /// Current presence of `channel` as last reported by the server; empty
    /// when nothing has been received.
    pub fn presence_state(&self, channel: &str) -> PresenceState {
        self.shared().presence_state(&topic::presence_topic(channel))
    }

    /// Announce this client on `channel` with `data`. Local presence state is
    /// not changed; it updates when the server echoes a `sync`/`diff`.
    pub fn track_presence(&self, channel: &str, data: JsonValue) -> PresenceTracking {
        self.shared().track(channel, data)
    }

    // ── Broadcast ───────────────────────────────────────────────────────────

    /// Send `{event, payload}` to everyone on `channel`. Returns `false`
    /// without sending anything when not connected.
    pub fn broadcast(&self, channel: &str, event: &str, payload: JsonValue) -> bool {
        self.shared().send_message(Frame::broadcast(channel, event, payload))
    }

    // ── Lifecycle listeners ─────────────────────────────────────────────────

    pub fn on_connect<F>(&self, f: F) -> &Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared().handlers.write().on_connect.push(Arc::new(f));
        self
    }

    pub fn on_disconnect<F>(&self, f: F) -> &Self
    where
        F: Fn(DisconnectReason) + Send + Sync + 'static,
    {
        self.shared().handlers.write().on_disconnect.push(Arc::new(f));
        self
    }

    pub fn on_error<F>(&self, f: F) -> &Self
    where
        F: Fn(ConnectionError) + Send + Sync + 'static,
    {
        self.shared().handlers.write().on_error.push(Arc::new(f));
        self
    }

    /// Debug hook: every raw inbound frame.
    pub fn on_receive<F>(&self, f: F) -> &Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.shared().handlers.write().on_receive.push(Arc::new(f));
        self
    }

    /// Debug hook: every raw frame written to the socket.
    pub fn on_send<F>(&self, f: F) -> &Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.shared().handlers.write().on_send.push(Arc::new(f));
        self
    }

    /// Remove every lifecycle listener. Subscriptions are not affected.
    pub fn remove_all_listeners(&self) -> &Self {
        self.shared().handlers.write().clear();
        self
    }
}

/// Builder for [`RealtimeClient`].
#[derive(Default)]
pub struct RealtimeClientBuilder {
    options: ClientOptions,
    auth: ResolvedAuth,
    event_handlers: EventHandlers,
    runtime: Option<Handle>,
}

impl RealtimeClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// WebSocket endpoint (`ws://`, `wss://`; `http(s)://` is mapped).
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.options.endpoint = endpoint.into();
        self
    }

    /// Replace all options at once, e.g. after loading them from a config file.
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    pub fn heartbeat_interval_ms(mut self, ms: u64) -> Self {
        self.options.heartbeat_interval_ms = ms;
        self
    }

    pub fn reconnect_interval_ms(mut self, ms: u64) -> Self {
        self.options.reconnect_interval_ms = ms;
        self
    }

    pub fn reconnect_max_attempts(mut self, attempts: u32) -> Self {
        self.options.reconnect_max_attempts = attempts;
        self
    }

    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.options.connect_timeout_ms = ms;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.options.debug = debug;
        self
    }

    /// Use a fixed token for every connect.
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth = ResolvedAuth::Static(StaticToken::new(token));
        self
    }

    /// Ask `provider` for a token before every connect and reconnect.
    pub fn auth_provider(mut self, provider: impl AuthTokenProvider) -> Self {
        self.auth = ResolvedAuth::Dynamic(Arc::new(provider));
        self
    }

    /// Lifecycle listeners registered before the first connect.
    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }

    /// Runtime the connection task is spawned on. Defaults to the runtime
    /// `build()` is called from.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<RealtimeClient> {
        self.options.validate()?;

        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| {
                RealtimeError::ConfigurationError(
                    "No tokio runtime: call build() inside a runtime or pass one with .runtime()"
                        .to_string(),
                )
            })?,
        };

        if self.options.debug {
            log::debug!("[realtime-link] Building client with {:?}", self.options);
        }

        let shared = Shared::new(self.options, self.auth, self.event_handlers, runtime);
        Ok(RealtimeClient {
            inner: Arc::new(ClientInner {
                shared: Arc::new(shared),
            }),
        })
    }
}
