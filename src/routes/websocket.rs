use axum::{
    Router,
    extract::{Path, Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};

use crate::{
    services::websocket_service::{self, WsQuery},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/ws/{room_code}/{client_id}",
    tag = "realtime",
    params(
        ("room_code" = String, Path, description = "Join code of the target room"),
        ("client_id" = String, Path, description = "Client-supplied opaque connection id"),
        ("organizer" = Option<bool>, Query, description = "Claim the organizer role"),
        ("spectator" = Option<bool>, Query, description = "Attach as a read-only spectator"),
        ("token" = Option<String>, Query, description = "Organizer token"),
    ),
    responses((status = 101, description = "Switching protocols to WebSocket"))
)]
/// Upgrade the HTTP connection into a realtime game session.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Path((room_code, client_id)): Path<(String, String)>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        websocket_service::handle_socket(state, socket, room_code, client_id, query)
    })
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws/{room_code}/{client_id}", get(ws_handler))
}
