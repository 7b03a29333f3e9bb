use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the client's single connection.
///
/// `Connecting` covers both the first open and every reconnect attempt.
/// The state is `Closed` while waiting out the reconnect interval and after
/// the reconnect budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Open,
    /// An intentional disconnect is in progress.
    Closing,
    #[default]
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
