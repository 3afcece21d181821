use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Quiz Rush Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::quiz::import_quiz,
        crate::routes::quiz::get_quiz,
        crate::routes::room::create_room,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::game::QuizInput,
            crate::dto::game::QuestionInput,
            crate::dto::game::QuizImported,
            crate::dto::game::QuizSummary,
            crate::dto::game::CreateRoomRequest,
            crate::dto::game::RoomCreated,
            crate::dto::common::PhaseName,
            crate::dto::common::LeaderboardEntry,
            crate::dto::common::TeamStanding,
            crate::dto::common::ParticipantSummary,
            crate::dto::common::QuestionProjection,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::ServerMessage,
            crate::dto::ws::PowerUpKind,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "quiz", description = "Quiz import and retrieval"),
        (name = "room", description = "Room creation"),
        (name = "realtime", description = "WebSocket game channel"),
    )
)]
pub struct ApiDoc;
