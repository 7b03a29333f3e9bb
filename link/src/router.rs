//! Inbound frame dispatch.
//!
//! | type        | handling                                                      |
//! |-------------|---------------------------------------------------------------|
//! | `system`    | `pong` ignored, `error` logged and sent to `on_error`         |
//! | `database`  | raw payload to every subscription on the topic, any kind      |
//! | `presence`  | applied to presence state, diff to `presence` subscriptions   |
//! | `broadcast` | `{event, payload}` to every subscription on the topic         |
//!
//! Subscribers are collected while the state lock is held and invoked after
//! it is released, each one isolated so a panic in one does not stop the
//! rest of the fan-out.

use serde_json::Value as JsonValue;

use crate::connection::{parse_frame, Shared};
use crate::event_handlers::{invoke_isolated, ConnectionError};
use crate::models::frame::events;
use crate::models::{BroadcastMessage, Frame, FrameType, RealtimeEvent, SubscriptionKind};
use crate::subscription::registry::Subscriber;

pub(crate) fn dispatch_text(shared: &Shared, raw: &str) {
    match parse_frame(raw) {
        Ok(frame) => dispatch_frame(shared, frame),
        Err(e) => shared.debug_log(|| format!("Ignoring inbound frame: {}", e)),
    }
}

pub(crate) fn dispatch_frame(shared: &Shared, frame: Frame) {
    match frame.frame_type {
        FrameType::System => handle_system(shared, &frame),
        FrameType::Database => {
            let subscribers = shared.state.lock().registry.subscribers(&frame.topic, None);
            fan_out(&subscribers, &RealtimeEvent::DatabaseChange(frame.payload));
        },
        FrameType::Presence => {
            let dispatch = {
                let mut state = shared.state.lock();
                match state.presence.handle_frame(&frame) {
                    Ok(Some(diff)) => {
                        let subscribers =
                            state.registry.subscribers(&frame.topic, Some(SubscriptionKind::Presence));
                        Ok(Some((diff, subscribers)))
                    },
                    Ok(None) => Ok(None),
                    Err(e) => Err(e),
                }
            };
            match dispatch {
                Ok(Some((diff, subscribers))) => {
                    fan_out(&subscribers, &RealtimeEvent::Presence(diff));
                },
                Ok(None) => shared.debug_log(|| {
                    format!("Ignoring presence '{}' on {}", frame.event_name(), frame.topic)
                }),
                Err(e) => shared.debug_log(|| format!("Ignoring presence frame on {}: {}", frame.topic, e)),
            }
        },
        FrameType::Broadcast => {
            let subscribers = shared.state.lock().registry.subscribers(&frame.topic, None);
            let message = BroadcastMessage {
                event: frame.event.unwrap_or_default(),
                payload: frame.payload,
            };
            fan_out(&subscribers, &RealtimeEvent::Broadcast(message));
        },
    }
}

fn handle_system(shared: &Shared, frame: &Frame) {
    match frame.event_name() {
        events::PONG => {},
        events::ERROR => {
            let message = error_message(&frame.payload);
            log::warn!("[realtime-link] Server error on '{}': {}", frame.topic, message);
            shared.handlers().emit_error(ConnectionError::new(
                format!("Server error on '{}': {}", frame.topic, message),
                false,
            ));
        },
        other => shared.debug_log(|| format!("Unhandled system event '{}' on {}", other, frame.topic)),
    }
}

/// `payload.message` when the server sent one, the whole payload otherwise.
fn error_message(payload: &JsonValue) -> String {
    match payload.get("message").and_then(JsonValue::as_str) {
        Some(message) => message.to_string(),
        None => payload.to_string(),
    }
}

fn fan_out(subscribers: &[Subscriber], event: &RealtimeEvent) {
    for subscriber in subscribers {
        // Unsubscribed by an earlier callback of this same fan-out.
        if !subscriber.is_active() {
            continue;
        }
        invoke_isolated("subscription", || (subscriber.callback)(event));
    }
}
