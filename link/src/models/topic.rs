//! Topic naming conventions.
//!
//! | kind      | topic                                   |
//! |-----------|-----------------------------------------|
//! | database  | `realtime:database:{table}:{event\|*}`  |
//! | presence  | `realtime:presence:{channel}`           |
//! | broadcast | `realtime:broadcast:{channel}`          |
//!
//! The channel starts at the third colon-delimited segment; see [`channel_of`].

pub const TOPIC_PREFIX: &str = "realtime";

/// Wildcard event segment for database topics.
pub const ANY_EVENT: &str = "*";

pub fn database_topic(table: &str, event: Option<&str>) -> String {
    format!(
        "{}:database:{}:{}",
        TOPIC_PREFIX,
        table,
        event.filter(|e| !e.is_empty()).unwrap_or(ANY_EVENT)
    )
}

pub fn presence_topic(channel: &str) -> String {
    format!("{}:presence:{}", TOPIC_PREFIX, channel)
}

pub fn broadcast_topic(channel: &str) -> String {
    format!("{}:broadcast:{}", TOPIC_PREFIX, channel)
}

/// Channel a topic belongs to, or `None` for topics with fewer than three
/// segments.
///
/// Presence and broadcast channels run to the end of the topic, so
/// `realtime:presence:church:42` belongs to `church:42`, the same channel
/// [`presence_topic`] was built from. Database topics end in an event
/// segment and take the table. Other topics take the third segment.
pub fn channel_of(topic: &str) -> Option<&str> {
    let mut parts = topic.splitn(3, ':');
    let (prefix, kind, rest) = (parts.next()?, parts.next()?, parts.next()?);
    let channel = match (prefix, kind) {
        (TOPIC_PREFIX, "presence") | (TOPIC_PREFIX, "broadcast") => rest,
        _ => rest.split(':').next().unwrap_or(rest),
    };
    Some(channel).filter(|c| !c.is_empty())
}

/// Event segment of a database topic, or `None` for the wildcard.
pub fn event_of(topic: &str) -> Option<&str> {
    let mut parts = topic.split(':');
    if parts.next() != Some(TOPIC_PREFIX) || parts.next() != Some("database") {
        return None;
    }
    parts.nth(1).filter(|e| !e.is_empty() && *e != ANY_EVENT)
}
