//! Connection lifecycle listeners for the realtime client.
//!
//! Provides callback-based hooks for monitoring the WebSocket connection:
//!
//! - [`on_connect`](EventHandlers::on_connect): fired after every successful open
//! - [`on_disconnect`](EventHandlers::on_disconnect): fired when an open socket closes
//! - [`on_error`](EventHandlers::on_error): transport failures, exhausted retries,
//!   and server `error` frames
//! - [`on_receive`](EventHandlers::on_receive) / [`on_send`](EventHandlers::on_send):
//!   debug hooks for raw frames
//!
//! Any number of listeners may be registered per event. Listeners can be
//! attached up front through the builder or later through
//! [`RealtimeClient::on_connect`](crate::RealtimeClient::on_connect) and friends.
//!
//! # Example
//!
//! ```rust
//! use realtime_link::EventHandlers;
//!
//! let handlers = EventHandlers::new()
//!     .on_connect(|| println!("connected"))
//!     .on_disconnect(|reason| println!("disconnected: {}", reason))
//!     .on_error(|err| eprintln!("error (recoverable={}): {}", err.recoverable, err));
//! assert!(handlers.has_any());
//! ```

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Reason for a disconnect event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReason {
    /// Human-readable description of why the connection closed.
    pub message: String,
    /// WebSocket close code, if available (e.g. 1000 = normal, 1006 = abnormal).
    pub code: Option<u16>,
}

impl DisconnectReason {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: u16) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.code {
            write!(f, "{} (code: {})", self.message, code)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

/// Error information passed to `on_error` listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionError {
    /// Human-readable error message.
    pub message: String,
    /// Whether the automatic reconnect may still clear this error.
    pub recoverable: bool,
}

impl ConnectionError {
    pub fn new(message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            message: message.into(),
            recoverable,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

pub type OnConnectCallback = Arc<dyn Fn() + Send + Sync>;
pub type OnDisconnectCallback = Arc<dyn Fn(DisconnectReason) + Send + Sync>;
pub type OnErrorCallback = Arc<dyn Fn(ConnectionError) + Send + Sync>;
/// Debug hook receiving every raw inbound frame.
pub type OnReceiveCallback = Arc<dyn Fn(&str) + Send + Sync>;
/// Debug hook receiving every raw outbound frame.
pub type OnSendCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Connection lifecycle listeners.
///
/// Cloning is cheap (a handful of `Arc`s); the client snapshots the
/// listener set before dispatching so a listener may register or remove
/// listeners without deadlocking.
#[derive(Clone, Default)]
pub struct EventHandlers {
    pub(crate) on_connect: Vec<OnConnectCallback>,
    pub(crate) on_disconnect: Vec<OnDisconnectCallback>,
    pub(crate) on_error: Vec<OnErrorCallback>,
    pub(crate) on_receive: Vec<OnReceiveCallback>,
    pub(crate) on_send: Vec<OnSendCallback>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_connect", &self.on_connect.len())
            .field("on_disconnect", &self.on_disconnect.len())
            .field("on_error", &self.on_error.len())
            .field("on_receive", &self.on_receive.len())
            .field("on_send", &self.on_send.len())
            .finish()
    }
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener invoked after every successful open (including reconnects).
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect.push(Arc::new(f));
        self
    }

    /// Register a listener invoked when an open connection closes, intentionally or not.
    pub fn on_disconnect(mut self, f: impl Fn(DisconnectReason) + Send + Sync + 'static) -> Self {
        self.on_disconnect.push(Arc::new(f));
        self
    }

    /// Register a listener invoked on transport or server-reported errors.
    pub fn on_error(mut self, f: impl Fn(ConnectionError) + Send + Sync + 'static) -> Self {
        self.on_error.push(Arc::new(f));
        self
    }

    /// Register a debug hook for every raw frame received from the server.
    pub fn on_receive(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_receive.push(Arc::new(f));
        self
    }

    /// Register a debug hook for every raw frame written to the socket.
    pub fn on_send(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_send.push(Arc::new(f));
        self
    }

    /// Returns `true` if any listener is registered.
    pub fn has_any(&self) -> bool {
        !self.on_connect.is_empty()
            || !self.on_disconnect.is_empty()
            || !self.on_error.is_empty()
            || !self.on_receive.is_empty()
            || !self.on_send.is_empty()
    }

    /// Drop every registered listener.
    pub fn clear(&mut self) {
        self.on_connect.clear();
        self.on_disconnect.clear();
        self.on_error.clear();
        self.on_receive.clear();
        self.on_send.clear();
    }

    // ---------------------------------------------------------------
    // Internal dispatch helpers
    // ---------------------------------------------------------------

    pub(crate) fn emit_connect(&self) {
        for cb in &self.on_connect {
            invoke_isolated("on_connect", || cb());
        }
    }

    pub(crate) fn emit_disconnect(&self, reason: DisconnectReason) {
        for cb in &self.on_disconnect {
            let reason = reason.clone();
            invoke_isolated("on_disconnect", || cb(reason));
        }
    }

    pub(crate) fn emit_error(&self, error: ConnectionError) {
        for cb in &self.on_error {
            let error = error.clone();
            invoke_isolated("on_error", || cb(error));
        }
    }

    pub(crate) fn emit_receive(&self, raw: &str) {
        for cb in &self.on_receive {
            invoke_isolated("on_receive", || cb(raw));
        }
    }

    pub(crate) fn emit_send(&self, raw: &str) {
        for cb in &self.on_send {
            invoke_isolated("on_send", || cb(raw));
        }
    }
}

/// Run a user callback, logging instead of unwinding if it panics.
///
/// Returns `false` when the callback panicked.
pub(crate) fn invoke_isolated(label: &str, f: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(_) => {
            log::error!("[realtime-link] {} callback panicked; continuing", label);
            false
        },
    }
}
