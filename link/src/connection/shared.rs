//! Shared client state and the background connection task.
//!
//! One [`Shared`] exists per client. The public handles and the router reach
//! routing/presence state through its mutex; only the connection task ever
//! touches the socket. Handles:
//!
//! - Single socket per client, opened by `connect()` and owned by one task
//! - Heartbeat pings at a fixed interval while open
//! - Fixed-interval reconnect with an attempt cap after unexpected closes
//! - Replay of joined channels, subscriptions and trackings on every open
//! - Connection lifecycle events (`on_connect`, `on_disconnect`, `on_error`)
//!
//! Outbound frames from the public API are queued as [`ConnCmd::Send`]
//! tagged with the connection epoch they were produced for. A frame queued
//! for an epoch that has since closed is dropped, since replay already
//! rebuilt the server-side state for the new connection.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::Value as JsonValue;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{Instant as TokioInstant, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::tungstenite::Utf8Bytes;

use crate::{
    auth::ResolvedAuth,
    connection::{
        encode_frame, redact_url, reconnect::ReconnectController, resolve_ws_url,
        WebSocketStream, FAR_FUTURE, MAX_WS_TEXT_MESSAGE_BYTES, NORMAL_CLOSE_CODE,
    },
    error::{RealtimeError, Result},
    event_handlers::{ConnectionError, DisconnectReason, EventHandlers},
    models::{ClientOptions, ConnectionState, Frame, PresenceState, SubscriptionInfo, SubscriptionKind},
    presence::PresenceSynchronizer,
    router,
    subscription::{
        registry::{EventCallback, TopicRegistry},
        PresenceTracking, Subscription,
    },
};

// ── Commands ────────────────────────────────────────────────────────────────

/// Commands sent from the public API to the background connection task.
pub(crate) enum ConnCmd {
    Send { epoch: u64, frame: Frame },
    /// Skip the remaining reconnect delay and try now.
    Wake,
    Shutdown,
}

struct TaskLink {
    task_id: u64,
    cmd_tx: mpsc::UnboundedSender<ConnCmd>,
}

// ── State ───────────────────────────────────────────────────────────────────

pub(crate) struct ClientState {
    pub(crate) connection: ConnectionState,
    pub(crate) registry: TopicRegistry,
    pub(crate) presence: PresenceSynchronizer,
    reconnect: ReconnectController,
    link: Option<TaskLink>,
    /// Incremented on every successful open.
    epoch: u64,
    next_task_id: u64,
}

impl ClientState {
    fn owned_by(&self, task_id: u64) -> bool {
        self.link.as_ref().is_some_and(|l| l.task_id == task_id)
    }
}

pub(crate) struct Shared {
    pub(crate) options: ClientOptions,
    auth: ResolvedAuth,
    runtime: Handle,
    pub(crate) handlers: RwLock<EventHandlers>,
    pub(crate) state: Mutex<ClientState>,
}

impl Shared {
    pub(crate) fn new(
        options: ClientOptions,
        auth: ResolvedAuth,
        handlers: EventHandlers,
        runtime: Handle,
    ) -> Self {
        let reconnect =
            ReconnectController::new(options.reconnect_interval(), options.reconnect_max_attempts);
        Self {
            options,
            auth,
            runtime,
            handlers: RwLock::new(handlers),
            state: Mutex::new(ClientState {
                connection: ConnectionState::Closed,
                registry: TopicRegistry::new(),
                presence: PresenceSynchronizer::new(),
                reconnect,
                link: None,
                epoch: 0,
                next_task_id: 0,
            }),
        }
    }

    /// Snapshot of the listeners, so a listener may add or remove listeners
    /// without deadlocking.
    pub(crate) fn handlers(&self) -> EventHandlers {
        self.handlers.read().clone()
    }

    pub(crate) fn debug_log(&self, message: impl FnOnce() -> String) {
        if self.options.debug {
            log::debug!("[realtime-link] {}", message());
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Start the connection task, unless one is already running. While the
    /// task is waiting out a reconnect delay it is woken to try immediately.
    pub(crate) fn connect(self: &Arc<Self>) {
        let mut state = self.state.lock();
        if let Some(link) = &state.link {
            if state.connection != ConnectionState::Open {
                let _ = link.cmd_tx.send(ConnCmd::Wake);
            }
            return;
        }

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        state.next_task_id += 1;
        let task_id = state.next_task_id;
        state.link = Some(TaskLink { task_id, cmd_tx });
        state.connection = ConnectionState::Connecting;
        drop(state);

        log::debug!("[realtime-link] Starting connection task #{}", task_id);
        self.runtime.spawn(connection_task(self.clone(), task_id, cmd_rx));
    }

    /// Intentional close. Pending reconnects are cancelled and no new
    /// attempt is scheduled.
    pub(crate) fn disconnect(&self) {
        let mut state = self.state.lock();
        let Some(link) = state.link.take() else {
            return;
        };
        let _ = link.cmd_tx.send(ConnCmd::Shutdown);
        state.connection = match state.connection {
            ConnectionState::Open => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        };
    }

    pub(crate) fn connection_state(&self) -> ConnectionState {
        self.state.lock().connection
    }

    pub(crate) fn reconnect_attempts(&self) -> u32 {
        self.state.lock().reconnect.attempts()
    }

    // ── Send choke point ────────────────────────────────────────────────────

    /// Queue a frame for the open socket. Returns `false` (and drops the
    /// frame) when the connection is not open.
    pub(crate) fn send_message(&self, frame: Frame) -> bool {
        let state = self.state.lock();
        self.send_locked(&state, frame)
    }

    fn send_locked(&self, state: &ClientState, frame: Frame) -> bool {
        match (&state.link, state.connection) {
            (Some(link), ConnectionState::Open) => link
                .cmd_tx
                .send(ConnCmd::Send {
                    epoch: state.epoch,
                    frame,
                })
                .is_ok(),
            _ => {
                self.debug_log(|| {
                    format!(
                        "Dropping {} '{}' on {}: connection is {}",
                        frame.frame_type.as_str(),
                        frame.event_name(),
                        frame.topic,
                        state.connection
                    )
                });
                false
            },
        }
    }

    fn send_all_locked(&self, state: &ClientState, frames: Vec<Frame>) {
        for frame in frames {
            self.send_locked(state, frame);
        }
    }

    // ── Registry operations ─────────────────────────────────────────────────

    pub(crate) fn subscribe(
        self: &Arc<Self>,
        topic: &str,
        kind: SubscriptionKind,
        filter: Option<String>,
        callback: EventCallback,
    ) -> Subscription {
        let mut state = self.state.lock();
        let (id, active, frames) = state.registry.subscribe(topic, kind, filter, callback);
        self.send_all_locked(&state, frames);
        let total = state.registry.len();
        drop(state);

        log::debug!(
            "[realtime-link] Subscribed #{} to {} ({}); {} active",
            id,
            topic,
            kind,
            total
        );
        Subscription::new(id, topic.to_string(), kind, Arc::downgrade(self), active)
    }

    pub(crate) fn unsubscribe(&self, id: u64) {
        let mut state = self.state.lock();
        let frames = state.registry.unsubscribe(id);
        self.send_all_locked(&state, frames);
    }

    pub(crate) fn track(self: &Arc<Self>, channel: &str, payload: JsonValue) -> PresenceTracking {
        let mut state = self.state.lock();
        let (id, frames) = state.registry.track(channel, payload);
        self.send_all_locked(&state, frames);
        drop(state);

        PresenceTracking::new(id, channel.to_string(), Arc::downgrade(self))
    }

    pub(crate) fn untrack(&self, id: u64) {
        let mut state = self.state.lock();
        let frames = state.registry.untrack(id);
        self.send_all_locked(&state, frames);
    }

    pub(crate) fn presence_state(&self, topic: &str) -> PresenceState {
        self.state.lock().presence.state(topic)
    }

    pub(crate) fn list_subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.state.lock().registry.snapshot()
    }
}

// ── Connection task ─────────────────────────────────────────────────────────

enum SessionEnd {
    /// `disconnect()` or the client was dropped.
    Shutdown,
    /// The socket closed or failed without being asked to.
    Lost,
}

async fn establish_ws(shared: &Shared) -> Result<WebSocketStream> {
    let token = shared.auth.resolve();
    let url = resolve_ws_url(&shared.options.endpoint, token.as_deref())?;
    let shown = redact_url(&url);
    log::info!("[realtime-link] Connecting to {}", shown);

    let connect = connect_async(url.as_str());
    let result = match shared.options.connect_timeout() {
        Some(timeout) => match tokio::time::timeout(timeout, connect).await {
            Ok(result) => result,
            Err(_) => {
                return Err(RealtimeError::TimeoutError(format!(
                    "Connection to {} timed out after {:?}",
                    shown, timeout
                )))
            },
        },
        None => connect.await,
    };

    let (ws_stream, _response) = result.map_err(|e| {
        RealtimeError::WebSocketError(format!("Connection to {} failed: {}", shown, e))
    })?;
    Ok(ws_stream)
}

async fn write_frame(shared: &Shared, ws: &mut WebSocketStream, frame: &Frame) -> Result<()> {
    let text = encode_frame(frame)?;
    ws.send(Message::Text(text.clone().into())).await?;
    shared.handlers().emit_send(&text);
    Ok(())
}

pub(crate) async fn connection_task(
    shared: Arc<Shared>,
    task_id: u64,
    mut cmd_rx: mpsc::UnboundedReceiver<ConnCmd>,
) {
    loop {
        {
            let mut state = shared.state.lock();
            if !state.owned_by(task_id) {
                return;
            }
            state.connection = ConnectionState::Connecting;
        }

        let connect = establish_ws(&shared);
        tokio::pin!(connect);
        let result = loop {
            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => match cmd {
                    Some(ConnCmd::Shutdown) | None => break None,
                    // Nothing can be stale-sent before the socket opens.
                    Some(ConnCmd::Send { .. }) | Some(ConnCmd::Wake) => {},
                },
                result = &mut connect => break Some(result),
            }
        };

        let end = match result {
            None => {
                finish_shutdown(&shared, task_id);
                return;
            },
            Some(Ok(ws)) => run_session(&shared, task_id, ws, &mut cmd_rx).await,
            Some(Err(e)) => {
                log::warn!("[realtime-link] {}", e);
                shared
                    .handlers()
                    .emit_error(ConnectionError::new(e.to_string(), e.is_recoverable()));
                SessionEnd::Lost
            },
        };

        if let SessionEnd::Shutdown = end {
            finish_shutdown(&shared, task_id);
            return;
        }

        let delay = {
            let mut state = shared.state.lock();
            if !state.owned_by(task_id) {
                return;
            }
            state.connection = ConnectionState::Closed;
            match state.reconnect.schedule() {
                Some(delay) => Ok((delay, state.reconnect.attempts())),
                None => {
                    state.link = None;
                    Err(state.reconnect.max_attempts())
                },
            }
        };

        let (delay, attempt) = match delay {
            Ok(scheduled) => scheduled,
            Err(max) => {
                log::warn!("[realtime-link] Max reconnection attempts ({}) reached; giving up", max);
                shared.handlers().emit_error(ConnectionError::new(
                    format!("Max reconnection attempts ({}) reached", max),
                    false,
                ));
                return;
            },
        };

        log::info!(
            "[realtime-link] Reconnecting in {:?} (attempt {}/{})",
            delay,
            attempt,
            shared.options.reconnect_max_attempts
        );

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => match cmd {
                    Some(ConnCmd::Shutdown) | None => {
                        finish_shutdown(&shared, task_id);
                        return;
                    },
                    Some(ConnCmd::Wake) => break,
                    Some(ConnCmd::Send { .. }) => {},
                },
                _ = &mut sleep => break,
            }
        }
    }
}

/// Settle the state after an intentional close, unless a newer task has
/// taken over in the meantime.
fn finish_shutdown(shared: &Shared, task_id: u64) {
    let mut state = shared.state.lock();
    if state.link.is_none() && state.connection == ConnectionState::Closing {
        state.connection = ConnectionState::Closed;
    } else if state.owned_by(task_id) {
        state.link = None;
        state.connection = ConnectionState::Closed;
    }
}

/// Mark the connection lost, if this task still owns it.
fn mark_lost(shared: &Shared, task_id: u64) {
    let mut state = shared.state.lock();
    if state.owned_by(task_id) {
        state.connection = ConnectionState::Closed;
    }
}

async fn run_session(
    shared: &Arc<Shared>,
    task_id: u64,
    mut ws: WebSocketStream,
    cmd_rx: &mut mpsc::UnboundedReceiver<ConnCmd>,
) -> SessionEnd {
    let opened = {
        let mut state = shared.state.lock();
        if state.owned_by(task_id) {
            state.epoch += 1;
            state.connection = ConnectionState::Open;
            state.reconnect.reset();
            Some((state.epoch, state.registry.replay()))
        } else {
            None
        }
    };
    let Some((epoch, replay)) = opened else {
        let _ = ws.close(None).await;
        return SessionEnd::Shutdown;
    };

    log::info!("[realtime-link] Connected (epoch {})", epoch);
    if !replay.is_empty() {
        log::info!("[realtime-link] Replaying {} frame(s) after open", replay.len());
    }
    for frame in &replay {
        if let Err(e) = write_frame(shared, &mut ws, frame).await {
            log::warn!("[realtime-link] Replay failed: {}", e);
            let reason = DisconnectReason::new(format!("Replay failed: {}", e));
            return lose(shared, task_id, Some(e), reason);
        }
    }
    shared.handlers().emit_connect();

    let heartbeat_period = shared.options.heartbeat_interval();
    let has_heartbeat = heartbeat_period.is_some();
    let period = heartbeat_period.unwrap_or(FAR_FUTURE);
    let mut heartbeat = tokio::time::interval_at(TokioInstant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            cmd = cmd_rx.recv() => match cmd {
                Some(ConnCmd::Send { epoch: frame_epoch, frame }) => {
                    if frame_epoch != epoch {
                        shared.debug_log(|| format!(
                            "Dropping stale {} '{}' from epoch {}",
                            frame.frame_type.as_str(), frame.event_name(), frame_epoch
                        ));
                        continue;
                    }
                    if let Err(e) = write_frame(shared, &mut ws, &frame).await {
                        log::warn!("[realtime-link] Send failed: {}", e);
                        return lose(shared, task_id, Some(e.clone()), DisconnectReason::new(format!("Send failed: {}", e)));
                    }
                },
                Some(ConnCmd::Wake) => {},
                Some(ConnCmd::Shutdown) | None => {
                    let _ = ws
                        .close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: Utf8Bytes::from_static("Client disconnected"),
                        }))
                        .await;
                    log::info!("[realtime-link] Disconnected");
                    finish_shutdown(shared, task_id);
                    shared.handlers().emit_disconnect(DisconnectReason::with_code(
                        "Client disconnected",
                        NORMAL_CLOSE_CODE,
                    ));
                    return SessionEnd::Shutdown;
                },
            },

            _ = heartbeat.tick(), if has_heartbeat => {
                if let Err(e) = write_frame(shared, &mut ws, &Frame::ping()).await {
                    log::warn!("[realtime-link] Heartbeat failed: {}", e);
                    return lose(shared, task_id, Some(e.clone()), DisconnectReason::new(format!("Heartbeat failed: {}", e)));
                }
            }

            msg = ws.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if text.len() > MAX_WS_TEXT_MESSAGE_BYTES {
                        log::warn!("[realtime-link] Text frame too large ({} bytes); dropped", text.len());
                        continue;
                    }
                    let text = text.as_str();
                    shared.handlers().emit_receive(text);
                    router::dispatch_text(shared, text);
                },
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => {
                        shared.handlers().emit_receive(text);
                        router::dispatch_text(shared, text);
                    },
                    Err(_) => shared.debug_log(|| format!("Dropping non-UTF-8 binary frame ({} bytes)", data.len())),
                },
                Some(Ok(Message::Ping(payload))) => {
                    let _ = ws.send(Message::Pong(payload)).await;
                },
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {},
                Some(Ok(Message::Close(frame))) => {
                    let reason = match frame {
                        Some(f) => DisconnectReason::with_code(f.reason.to_string(), f.code.into()),
                        None => DisconnectReason::new("Server closed connection"),
                    };
                    log::warn!("[realtime-link] Connection closed by server: {}", reason);
                    return lose(shared, task_id, None, reason);
                },
                Some(Err(e)) => {
                    let e = RealtimeError::from(e);
                    log::warn!("[realtime-link] {}", e);
                    return lose(shared, task_id, Some(e.clone()), DisconnectReason::new(e.to_string()));
                },
                None => {
                    log::warn!("[realtime-link] WebSocket stream ended");
                    return lose(shared, task_id, None, DisconnectReason::new("WebSocket stream ended"));
                },
            },
        }
    }
}

fn lose(
    shared: &Shared,
    task_id: u64,
    error: Option<RealtimeError>,
    reason: DisconnectReason,
) -> SessionEnd {
    mark_lost(shared, task_id);
    let handlers = shared.handlers();
    if let Some(e) = error {
        handlers.emit_error(ConnectionError::new(e.to_string(), true));
    }
    handlers.emit_disconnect(reason);
    SessionEnd::Lost
}
