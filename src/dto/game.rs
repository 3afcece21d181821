//! Quiz import and room creation payloads for the HTTP control plane.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

const MAX_QUIZ_TITLE_LENGTH: usize = 500;
const MAX_QUESTION_TEXT_LENGTH: usize = 2000;
const MAX_OPTION_LENGTH: usize = 500;
const MAX_QUESTIONS: usize = 50;

/// Quiz snapshot supplied by the external generation collaborator or a
/// manual import.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct QuizInput {
    /// Display title for the quiz.
    pub quiz_title: String,
    /// Ordered question list.
    pub questions: Vec<QuestionInput>,
}

/// One question of an imported quiz.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct QuestionInput {
    /// Stable id within the quiz.
    pub id: u32,
    /// Prompt text.
    pub text: String,
    /// Option list; exactly 2 (true/false style) or 4 entries.
    pub options: Vec<String>,
    /// Index of the correct option.
    pub answer_index: usize,
    /// Optional background image reference.
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Validate for QuizInput {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.quiz_title.trim().is_empty() {
            errors.add("quiz_title", simple_error("quiz_title_empty", "Quiz title must not be empty"));
        }
        if self.quiz_title.chars().count() > MAX_QUIZ_TITLE_LENGTH {
            errors.add("quiz_title", simple_error("quiz_title_length", "Quiz title is too long"));
        }
        if self.questions.is_empty() {
            errors.add("questions", simple_error("questions_empty", "A quiz needs at least one question"));
        }
        if self.questions.len() > MAX_QUESTIONS {
            errors.add("questions", simple_error("questions_count", "Too many questions"));
        }
        for question in &self.questions {
            if let Err(err) = validate_question(question) {
                errors.add("questions", err);
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

fn validate_question(question: &QuestionInput) -> Result<(), ValidationError> {
    if question.text.trim().is_empty() {
        return Err(simple_error("question_text_empty", "Question text must not be empty"));
    }
    if question.text.chars().count() > MAX_QUESTION_TEXT_LENGTH {
        return Err(simple_error("question_text_length", "Question text is too long"));
    }
    if !matches!(question.options.len(), 2 | 4) {
        return Err(simple_error("options_count", "Questions take exactly 2 or 4 options"));
    }
    for option in &question.options {
        if option.trim().is_empty() {
            return Err(simple_error("option_empty", "Options must not be empty"));
        }
        if option.chars().count() > MAX_OPTION_LENGTH {
            return Err(simple_error("option_length", "Option text is too long"));
        }
    }
    if question.answer_index >= question.options.len() {
        return Err(simple_error("answer_index", "Correct-answer index is out of bounds"));
    }
    Ok(())
}

fn simple_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// Response returned after a quiz snapshot has been imported.
#[derive(Debug, Serialize, ToSchema)]
pub struct QuizImported {
    /// Handle to pass to `POST /room/create`.
    pub quiz_id: Uuid,
    /// Echo of the stored quiz.
    pub quiz: QuizSummary,
}

/// Stored quiz as returned by the control plane.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuizSummary {
    /// Display title.
    pub quiz_title: String,
    /// Number of questions in the snapshot.
    pub question_count: usize,
}

/// Request body for `POST /room/create`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRoomRequest {
    /// Handle of a previously imported quiz.
    pub quiz_id: Uuid,
    /// Per-question time limit in seconds; defaults from configuration.
    #[serde(default)]
    pub time_limit: Option<u64>,
}

/// Response body for `POST /room/create`.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoomCreated {
    /// Join code participants enter.
    pub room_code: String,
    /// Secret proving organizer identity on the realtime channel.
    pub organizer_token: String,
}
