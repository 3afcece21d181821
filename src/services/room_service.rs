//! Control-plane services: quiz import and room creation.

use tokio::time::Instant;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::{MAX_TIME_LIMIT, MIN_TIME_LIMIT},
    dto::game::{CreateRoomRequest, QuizImported, QuizSummary, RoomCreated},
    error::ServiceError,
    services::room_actor,
    state::{SharedState, StoredQuiz, quiz::QuizSnapshot},
};

/// Validate and store an externally produced quiz snapshot.
pub fn import_quiz(
    state: &SharedState,
    input: crate::dto::game::QuizInput,
) -> Result<QuizImported, ServiceError> {
    input
        .validate()
        .map_err(|err| ServiceError::InvalidInput(err.to_string()))?;

    sweep_expired(state);
    if state.quizzes().len() >= state.config().max_quizzes {
        return Err(ServiceError::Overloaded("quiz store is full".into()));
    }

    let quiz_id = Uuid::new_v4();
    let stored = StoredQuiz {
        title: input.quiz_title.clone(),
        questions: input.questions.into_iter().map(Into::into).collect(),
        imported_at: Instant::now(),
    };
    let summary = QuizSummary {
        quiz_title: stored.title.clone(),
        question_count: stored.questions.len(),
    };
    state.quizzes().insert(quiz_id, stored);

    Ok(QuizImported {
        quiz_id,
        quiz: summary,
    })
}

/// Look up a stored quiz by handle.
pub fn get_quiz(state: &SharedState, quiz_id: Uuid) -> Result<QuizSummary, ServiceError> {
    let stored = state
        .quizzes()
        .get(&quiz_id)
        .ok_or_else(|| ServiceError::NotFound(format!("quiz `{quiz_id}` not found")))?;
    Ok(QuizSummary {
        quiz_title: stored.title.clone(),
        question_count: stored.questions.len(),
    })
}

/// Create a room playing a stored quiz and spawn its task.
pub fn create_room(
    state: &SharedState,
    request: CreateRoomRequest,
) -> Result<RoomCreated, ServiceError> {
    let time_limit = request
        .time_limit
        .unwrap_or(state.config().default_time_limit);
    if !(MIN_TIME_LIMIT..=MAX_TIME_LIMIT).contains(&time_limit) {
        return Err(ServiceError::InvalidInput(format!(
            "time limit must be between {MIN_TIME_LIMIT} and {MAX_TIME_LIMIT} seconds"
        )));
    }

    let stored = state
        .quizzes()
        .get(&request.quiz_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| ServiceError::NotFound(format!("quiz `{}` not found", request.quiz_id)))?;

    // Bonus rounds are picked here, at snapshot time, and stay stable for
    // the whole game.
    let quiz = QuizSnapshot::new(stored.title, stored.questions);
    let handle = room_actor::spawn(
        state.directory().clone(),
        state.config().clone(),
        quiz,
        time_limit,
    )?;

    Ok(RoomCreated {
        room_code: handle.code,
        organizer_token: handle.organizer_token,
    })
}

/// Drop stored quizzes past their TTL.
fn sweep_expired(state: &SharedState) {
    let ttl = state.config().quiz_ttl;
    state
        .quizzes()
        .retain(|_, stored| stored.imported_at.elapsed() < ttl);
}
