use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok").
    pub status: String,
    /// Number of live rooms in the directory.
    pub rooms: usize,
}

impl HealthResponse {
    /// Create a health response for a running server.
    pub fn ok(rooms: usize) -> Self {
        Self {
            status: "ok".to_string(),
            rooms,
        }
    }
}
