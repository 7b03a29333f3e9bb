//! WebSocket connection management.
//!
//! This module contains:
//! - [`shared`]: the client state shared between the public handles and the
//!   background connection task, plus the task itself
//! - [`reconnect`]: the fixed-interval attempt counter
//! - low-level helpers (URL resolution, frame encode/decode)

pub(crate) mod reconnect;
pub(crate) mod shared;

pub(crate) use shared::Shared;

use tokio::net::TcpStream;
use url::Url;

use crate::error::{RealtimeError, Result};
use crate::models::Frame;

pub(crate) type WebSocketStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>>;

/// Inbound text frames larger than this are dropped (16 MiB).
pub(crate) const MAX_WS_TEXT_MESSAGE_BYTES: usize = 16 << 20;

/// WebSocket close code for a normal, intentional close.
pub(crate) const NORMAL_CLOSE_CODE: u16 = 1000;

/// A duration far enough in the future (~100 years) to act as "never" for
/// deadline calculations without overflowing `Instant::now() + dur`.
pub(crate) const FAR_FUTURE: std::time::Duration =
    std::time::Duration::from_secs(100 * 365 * 24 * 3600);

/// Build the URL to open: `http(s)` endpoints are mapped to `ws(s)` and the
/// token, when present, is appended as the `token` query parameter
/// (replacing any `token` already in the endpoint).
pub(crate) fn resolve_ws_url(endpoint: &str, token: Option<&str>) -> Result<Url> {
    let mut url = Url::parse(endpoint.trim()).map_err(|e| {
        RealtimeError::ConfigurationError(format!("Invalid endpoint '{}': {}", endpoint, e))
    })?;

    let ws_scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(RealtimeError::ConfigurationError(format!(
                "Unsupported endpoint scheme '{}'; expected ws(s) or http(s)",
                other
            )));
        },
    };
    url.set_scheme(ws_scheme).map_err(|_| {
        RealtimeError::ConfigurationError("Failed to set WebSocket URL scheme".to_string())
    })?;
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "token")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() && token.is_none() {
        url.set_query(None);
        return Ok(url);
    }

    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        if let Some(token) = token {
            pairs.append_pair("token", token);
        }
    }
    Ok(url)
}

/// The URL with the `token` parameter masked, for logging.
pub(crate) fn redact_url(url: &Url) -> String {
    if !url.query_pairs().any(|(k, _)| k == "token") {
        return url.to_string();
    }
    let mut masked = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "token" { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    masked.query_pairs_mut().clear().extend_pairs(pairs);
    masked.to_string()
}

pub(crate) fn parse_frame(text: &str) -> Result<Frame> {
    serde_json::from_str::<Frame>(text)
        .map_err(|e| RealtimeError::ProtocolError(format!("Malformed frame: {}", e)))
}

pub(crate) fn encode_frame(frame: &Frame) -> Result<String> {
    Ok(serde_json::to_string(frame)?)
}
