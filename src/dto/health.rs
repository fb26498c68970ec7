use serde::Serialize;
use utoipa::ToSchema;

/// Payload of `/healthcheck`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// "ok" while a game store is installed, "degraded" otherwise.
    pub status: &'static str,
    /// Player sockets currently attached to a room.
    pub connections: usize,
    /// Rooms with an armed phase deadline.
    pub pending_timers: usize,
}

impl HealthResponse {
    /// `degraded` maps to the `"degraded"` status, otherwise `"ok"`.
    pub fn new(degraded: bool, connections: usize, pending_timers: usize) -> Self {
        Self {
            status: if degraded { "degraded" } else { "ok" },
            connections,
            pending_timers,
        }
    }
}
