use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Server-pushed WebSocket events.
pub mod events;
pub mod health;
/// Room lobby requests and responses.
pub mod rooms;
pub mod validation;
/// Client messages and connect parameters of the WebSocket.
pub mod ws;

/// Format a timestamp as RFC 3339.
pub(crate) fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
