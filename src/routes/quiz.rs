use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::game::{QuizImported, QuizInput, QuizSummary},
    error::AppError,
    services::room_service,
    state::SharedState,
};

#[utoipa::path(
    post,
    path = "/quiz/import",
    tag = "quiz",
    request_body = QuizInput,
    responses(
        (status = 200, description = "Quiz stored", body = QuizImported),
        (status = 400, description = "Invalid quiz payload"),
        (status = 503, description = "Quiz store full"),
    )
)]
/// Validate and store a quiz snapshot produced by the external generator.
pub async fn import_quiz(
    State(state): State<SharedState>,
    Json(input): Json<QuizInput>,
) -> Result<Json<QuizImported>, AppError> {
    let imported = room_service::import_quiz(&state, input)?;
    Ok(Json(imported))
}

#[utoipa::path(
    get,
    path = "/quiz/{quiz_id}",
    tag = "quiz",
    params(("quiz_id" = Uuid, Path, description = "Quiz handle")),
    responses(
        (status = 200, description = "Stored quiz", body = QuizSummary),
        (status = 404, description = "Unknown quiz"),
    )
)]
/// Look up a stored quiz by handle.
pub async fn get_quiz(
    State(state): State<SharedState>,
    Path(quiz_id): Path<Uuid>,
) -> Result<Json<QuizSummary>, AppError> {
    let summary = room_service::get_quiz(&state, quiz_id)?;
    Ok(Json(summary))
}

/// Configure the quiz routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/quiz/import", post(import_quiz))
        .route("/quiz/{quiz_id}", get(get_quiz))
}
