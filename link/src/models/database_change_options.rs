use serde::{Deserialize, Serialize};

/// Options for [`RealtimeClient::on_database_changes`](crate::RealtimeClient::on_database_changes).
///
/// # Example
///
/// ```rust
/// use realtime_link::DatabaseChangeOptions;
///
/// // Only inserts on rows belonging to ministry 7
/// let options = DatabaseChangeOptions::new()
///     .with_event("INSERT")
///     .with_filter("ministry_id=eq.7");
/// assert_eq!(options.event.as_deref(), Some("INSERT"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseChangeOptions {
    /// Change event to listen for (`INSERT`, `UPDATE`, `DELETE`).
    /// Default: None (every event, topic suffix `*`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,

    /// Server-side row filter forwarded verbatim in the subscribe frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl DatabaseChangeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}
