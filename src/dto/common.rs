//! Shared wire-level building blocks used across realtime payloads.

use serde::Serialize;
use utoipa::ToSchema;

use crate::state::state_machine::RoomPhase;

/// Wire name of a room lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseName {
    Lobby,
    Intro,
    Question,
    Reveal,
    Podium,
    Closed,
}

impl From<RoomPhase> for PhaseName {
    fn from(phase: RoomPhase) -> Self {
        match phase {
            RoomPhase::Lobby => PhaseName::Lobby,
            RoomPhase::Intro => PhaseName::Intro,
            RoomPhase::Question => PhaseName::Question,
            RoomPhase::Reveal => PhaseName::Reveal,
            RoomPhase::Podium => PhaseName::Podium,
            RoomPhase::Closed => PhaseName::Closed,
        }
    }
}

/// One row of a player leaderboard, derived on demand from the registry.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LeaderboardEntry {
    /// Player nickname.
    pub nickname: String,
    /// Player avatar.
    pub avatar: String,
    /// Cumulative score.
    pub score: u64,
    /// 1-based rank (score descending, nickname ascending).
    pub rank: usize,
    /// Positive when the player rose since the previous question.
    pub rank_change: i64,
}

/// One row of the team leaderboard, grouped by team tag.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TeamStanding {
    /// Team tag.
    pub team: String,
    /// Sum of member scores.
    pub score: u64,
    /// Number of members carrying the tag.
    pub members: usize,
}

/// Roster entry broadcast on join/leave/disconnect events.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ParticipantSummary {
    /// Player nickname.
    pub nickname: String,
    /// Player avatar.
    pub avatar: String,
    /// Optional team tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    /// Whether a live connection currently backs this participant.
    pub connected: bool,
}

/// Question payload as seen by players and spectators: never carries the
/// correct option index.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QuestionProjection {
    /// Stable question id within the quiz.
    pub id: u32,
    /// Prompt text.
    pub text: String,
    /// Option list of length 2 or 4.
    pub options: Vec<String>,
    /// Optional background image reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}
