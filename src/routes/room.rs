use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::game::{CreateRoomRequest, RoomCreated},
    error::AppError,
    services::room_service,
    state::SharedState,
};

#[utoipa::path(
    post,
    path = "/room/create",
    tag = "room",
    request_body = CreateRoomRequest,
    responses(
        (status = 200, description = "Room created", body = RoomCreated),
        (status = 404, description = "Unknown quiz"),
        (status = 503, description = "Room limit reached"),
    )
)]
/// Create a room playing a stored quiz; returns the join code and the
/// organizer token.
pub async fn create_room(
    State(state): State<SharedState>,
    Json(request): Json<CreateRoomRequest>,
) -> Result<Json<RoomCreated>, AppError> {
    let created = room_service::create_room(&state, request)?;
    Ok(Json(created))
}

/// Configure the room routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/room/create", post(create_room))
}
