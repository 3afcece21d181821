//! Realtime wire protocol: JSON frames with a `type` discriminator.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::dto::{
    common::{LeaderboardEntry, ParticipantSummary, PhaseName, QuestionProjection, TeamStanding},
    game::QuizInput,
};

/// One-shot per-player modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PowerUpKind {
    DoublePoints,
    FiftyFifty,
}

/// Messages accepted from realtime clients.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "JOIN")]
    Join {
        nickname: String,
        #[serde(default)]
        avatar: String,
        #[serde(default)]
        team: Option<String>,
    },
    #[serde(rename = "ANSWER")]
    Answer { answer_index: usize },
    #[serde(rename = "USE_POWER_UP")]
    UsePowerUp { power_up: PowerUpKind },
    #[serde(rename = "START_GAME")]
    StartGame,
    #[serde(rename = "NEXT_QUESTION")]
    NextQuestion,
    #[serde(rename = "END_QUIZ")]
    EndQuiz,
    #[serde(rename = "SET_TIME_LIMIT")]
    SetTimeLimit { time_limit: u64 },
    #[serde(rename = "RESET_ROOM")]
    ResetRoom {
        #[serde(default)]
        quiz_data: Option<QuizInput>,
        #[serde(default)]
        time_limit: Option<u64>,
    },
    #[serde(other)]
    Unknown,
}

/// Reply to a successful `JOIN`, and resync payload on reconnect.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JoinSync {
    /// Code of the joined room.
    pub room_code: String,
    /// Normalized nickname the player is registered under.
    pub nickname: String,
    /// Current room state.
    pub state: PhaseName,
    /// Cumulative score carried over on reconnect.
    pub score: u64,
    /// Current streak carried over on reconnect.
    pub streak: u32,
    /// 1-based number of the current question, when one is active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_number: Option<usize>,
    /// Total number of questions in the quiz.
    pub total_questions: usize,
    /// Per-question time limit in seconds.
    pub time_limit: u64,
    /// Redacted projection of the current question, when state is QUESTION.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<QuestionProjection>,
    /// Live seconds remaining on the current question.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_remaining: Option<u64>,
    /// Bonus flag of the current question.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_bonus: Option<bool>,
}

/// Roster broadcast sent on join/leave/disconnect/reconnect.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RosterUpdate {
    /// Nickname the update is about.
    pub nickname: String,
    /// Full participant list in join order.
    pub players: Vec<ParticipantSummary>,
    /// Number of registered participants.
    pub player_count: usize,
}

/// Broadcast when a question opens.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionOpen {
    /// 1-based question number.
    pub question_number: usize,
    /// Total question count.
    pub total_questions: usize,
    /// Redacted question payload; the correct index is never sent.
    pub question: QuestionProjection,
    /// Seconds allowed for answering.
    pub time_limit: u64,
    /// Whether this question pays double base points.
    pub is_bonus: bool,
}

/// Private result for the player who just answered.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnswerResult {
    /// Whether the submitted option was correct.
    pub correct: bool,
    /// Points awarded for this answer.
    pub points: u64,
    /// Player multiplier that was in effect when answering.
    pub multiplier: f64,
    /// Streak after this answer.
    pub streak: u32,
    /// Bonus flag of the question answered.
    pub is_bonus: bool,
}

/// Leaderboard broadcast when a question closes.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionClosed {
    /// Index of the correct option.
    pub correct_index: usize,
    /// Leaderboard after this question, with rank changes.
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Whether the question that just ended was the last one.
    pub is_final: bool,
}

/// Final standings broadcast on transition to the podium.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PodiumStandings {
    /// Player leaderboard.
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Team leaderboard grouped by team tag.
    pub team_leaderboard: Vec<TeamStanding>,
}

/// Full resync pushed to the organizer on (re)connect.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OrganizerSync {
    /// Code of the room.
    pub room_code: String,
    /// Current room state.
    pub state: PhaseName,
    /// Unredacted quiz so the organizer UI can resynchronize.
    pub quiz: QuizDetail,
    /// 1-based number of the current question, when one is active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_number: Option<usize>,
    /// Total question count.
    pub total_questions: usize,
    /// Number of registered participants.
    pub player_count: usize,
    /// Answers received for the current question.
    pub answered_count: usize,
    /// Live seconds remaining on the current question.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_remaining: Option<u64>,
    /// Bonus flag of the current question.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_bonus: Option<bool>,
    /// Current player leaderboard.
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Current team leaderboard.
    pub team_leaderboard: Vec<TeamStanding>,
}

/// Organizer-only quiz view, correct indices included.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuizDetail {
    /// Display title.
    pub quiz_title: String,
    /// All questions with their answers and bonus flags.
    pub questions: Vec<QuestionDetail>,
}

/// Organizer-only question view.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionDetail {
    /// Stable question id.
    pub id: u32,
    /// Prompt text.
    pub text: String,
    /// Option list.
    pub options: Vec<String>,
    /// Index of the correct option.
    pub answer_index: usize,
    /// Whether the question pays double base points.
    pub is_bonus: bool,
    /// Optional background image reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Read-only state summary pushed to a spectator on connect.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SpectatorSync {
    /// Code of the room.
    pub room_code: String,
    /// Current room state.
    pub state: PhaseName,
    /// Number of registered participants.
    pub player_count: usize,
    /// Current player leaderboard.
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Current team leaderboard.
    pub team_leaderboard: Vec<TeamStanding>,
    /// 1-based number of the current question, when one is active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_number: Option<usize>,
    /// Total question count.
    pub total_questions: usize,
    /// Redacted projection of the current question, when state is QUESTION.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<QuestionProjection>,
    /// Live seconds remaining on the current question.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_remaining: Option<u64>,
}

/// Events pushed to realtime clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "ROOM_CREATED")]
    RoomCreated { room_code: String },
    #[serde(rename = "JOINED_ROOM")]
    JoinedRoom(JoinSync),
    #[serde(rename = "RECONNECTED")]
    Reconnected(JoinSync),
    #[serde(rename = "PLAYER_JOINED")]
    PlayerJoined(RosterUpdate),
    #[serde(rename = "PLAYER_LEFT")]
    PlayerLeft(RosterUpdate),
    #[serde(rename = "PLAYER_DISCONNECTED")]
    PlayerDisconnected(RosterUpdate),
    #[serde(rename = "PLAYER_RECONNECTED")]
    PlayerReconnected(RosterUpdate),
    #[serde(rename = "GAME_STARTING")]
    GameStarting,
    #[serde(rename = "QUESTION")]
    Question(QuestionOpen),
    #[serde(rename = "TIMER")]
    Timer { remaining: u64 },
    #[serde(rename = "ANSWER_RESULT")]
    AnswerResult(AnswerResult),
    #[serde(rename = "ANSWER_COUNT")]
    AnswerCount { answered: usize, player_count: usize },
    #[serde(rename = "POWER_UP_ACTIVATED")]
    PowerUpActivated {
        power_up: PowerUpKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        remove_indices: Option<Vec<usize>>,
    },
    #[serde(rename = "QUESTION_OVER")]
    QuestionOver(QuestionClosed),
    #[serde(rename = "PODIUM")]
    Podium(PodiumStandings),
    #[serde(rename = "ROOM_RESET")]
    RoomReset {
        players: Vec<ParticipantSummary>,
        player_count: usize,
    },
    #[serde(rename = "ORGANIZER_DISCONNECTED")]
    OrganizerDisconnected,
    #[serde(rename = "HOST_RECONNECTED")]
    HostReconnected,
    #[serde(rename = "ORGANIZER_RECONNECTED")]
    OrganizerReconnected(OrganizerSync),
    #[serde(rename = "SPECTATOR_SYNC")]
    SpectatorSync(SpectatorSync),
    #[serde(rename = "ROOM_CLOSED")]
    RoomClosed { reason: String },
    #[serde(rename = "KICKED")]
    Kicked { reason: String },
    #[serde(rename = "ERROR")]
    Error { message: String },
}

impl ServerMessage {
    /// Build an `ERROR` frame from any displayable message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
