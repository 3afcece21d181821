//! Authoritative state of a single room, owned exclusively by its room task.

use std::collections::HashMap;

use tokio::time::Instant;

use crate::{
    dto::{
        common::{LeaderboardEntry, TeamStanding},
        ws::{JoinSync, OrganizerSync, SpectatorSync},
    },
    services::events::EventBus,
    state::{
        participants::ParticipantRegistry,
        quiz::QuizSnapshot,
        state_machine::{RoomPhase, RoomStateMachine},
    },
};

/// An accepted answer for one (question, nickname) pair.
#[derive(Debug, Clone)]
pub struct AnswerRecord {
    /// Submitted option index.
    pub option_index: usize,
    /// Whether it matched the correct option.
    pub correct: bool,
    /// Points awarded by the scorer.
    pub points: u64,
    /// Player multiplier in effect when answering.
    pub multiplier: f64,
    /// Latency fraction used for scoring, clamped to [0, 1].
    pub latency_fraction: f64,
}

/// All mutable state of one room. Lives inside the room task; nothing
/// outside that task ever holds a reference to it.
#[derive(Debug)]
pub struct RoomState {
    pub code: String,
    pub organizer_token: String,
    pub quiz: QuizSnapshot,
    pub time_limit: u64,
    pub machine: RoomStateMachine,
    pub registry: ParticipantRegistry,
    pub bus: EventBus,
    /// Zero-based index of the current question; defined in Intro/Question/Reveal.
    pub current_index: Option<usize>,
    /// Instant the current question opened.
    pub question_started_at: Option<Instant>,
    /// Accepted answers for the current question, keyed by nickname.
    pub answers: HashMap<String, AnswerRecord>,
    /// Every accepted answer of the game: `(question index, nickname, record)`.
    /// Scores are recomputable from this ledger alone.
    pub ledger: Vec<(usize, String, AnswerRecord)>,
    /// 1-based ranks captured when the current question opened; rank-change
    /// deltas in the reveal are computed against this.
    pub rank_snapshot: HashMap<String, usize>,
    /// Whether an organizer has ever attached (first attach gets ROOM_CREATED).
    pub organizer_seen: bool,
    pub created_at: Instant,
    pub last_activity: Instant,
}

impl RoomState {
    pub fn new(code: String, organizer_token: String, quiz: QuizSnapshot, time_limit: u64) -> Self {
        let now = Instant::now();
        Self {
            code,
            organizer_token,
            quiz,
            time_limit,
            machine: RoomStateMachine::new(),
            registry: ParticipantRegistry::new(),
            bus: EventBus::new(),
            current_index: None,
            question_started_at: None,
            answers: HashMap::new(),
            ledger: Vec::new(),
            rank_snapshot: HashMap::new(),
            organizer_seen: false,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn phase(&self) -> RoomPhase {
        self.machine.phase()
    }

    /// Refresh the inactivity deadline.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// 1-based number of the current question.
    pub fn question_number(&self) -> Option<usize> {
        self.current_index.map(|index| index + 1)
    }

    /// Whole seconds left on the open question.
    pub fn remaining_seconds(&self) -> Option<u64> {
        if self.phase() != RoomPhase::Question {
            return None;
        }
        let started = self.question_started_at?;
        let elapsed = started.elapsed().as_secs();
        Some(self.time_limit.saturating_sub(elapsed))
    }

    /// Latency fraction of an answer submitted now, clamped to [0, 1].
    pub fn latency_fraction(&self) -> f64 {
        let Some(started) = self.question_started_at else {
            return 1.0;
        };
        if self.time_limit == 0 {
            return 1.0;
        }
        (started.elapsed().as_secs_f64() / self.time_limit as f64).clamp(0.0, 1.0)
    }

    /// Number of connected players who have answered the current question.
    pub fn answered_connected(&self) -> usize {
        self.answers
            .keys()
            .filter(|nickname| {
                self.registry
                    .get(nickname)
                    .is_some_and(|p| p.is_connected())
            })
            .count()
    }

    /// Participants as `(nickname, avatar, score)` in rank order: score
    /// descending, nickname ascending.
    fn sorted_participants(&self) -> Vec<(String, String, u64)> {
        let mut rows: Vec<(String, String, u64)> = self
            .registry
            .iter()
            .map(|p| (p.nickname.clone(), p.avatar.clone(), p.score))
            .collect();
        rows.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
        rows
    }

    /// Current 1-based ranks: score descending, nickname ascending.
    pub fn current_ranks(&self) -> HashMap<String, usize> {
        self.sorted_participants()
            .into_iter()
            .enumerate()
            .map(|(position, (nickname, _, _))| (nickname, position + 1))
            .collect()
    }

    /// Leaderboard derived from the registry, with rank changes against the
    /// snapshot captured when the current question opened. Unknown previous
    /// ranks default to the current one, so fresh joiners show no movement.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        self.sorted_participants()
            .into_iter()
            .enumerate()
            .map(|(position, (nickname, avatar, score))| {
                let rank = position + 1;
                let prev_rank = self.rank_snapshot.get(&nickname).copied().unwrap_or(rank);
                LeaderboardEntry {
                    nickname,
                    avatar,
                    score,
                    rank,
                    rank_change: prev_rank as i64 - rank as i64,
                }
            })
            .collect()
    }

    /// Team leaderboard grouped by team tag, scored by member-score sum.
    pub fn team_leaderboard(&self) -> Vec<TeamStanding> {
        let mut totals: HashMap<&str, (u64, usize)> = HashMap::new();
        for participant in self.registry.iter() {
            if let Some(team) = &participant.team {
                let entry = totals.entry(team.as_str()).or_insert((0, 0));
                entry.0 += participant.score;
                entry.1 += 1;
            }
        }
        let mut standings: Vec<TeamStanding> = totals
            .into_iter()
            .map(|(team, (score, members))| TeamStanding {
                team: team.to_owned(),
                score,
                members,
            })
            .collect();
        standings.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.team.cmp(&b.team)));
        standings
    }

    /// Recompute score totals from the answer ledger (invariant check and
    /// tests; the registry stays the canonical representation).
    pub fn ledger_totals(&self) -> HashMap<String, u64> {
        let mut totals = HashMap::new();
        for (_, nickname, record) in &self.ledger {
            *totals.entry(nickname.clone()).or_insert(0) += record.points;
        }
        totals
    }

    /// Mutations performed when a question opens.
    pub fn begin_question(&mut self, index: usize) {
        self.current_index = Some(index);
        self.question_started_at = Some(Instant::now());
        self.answers.clear();
        for participant in self.registry.iter_mut() {
            participant.multiplier = 1.0;
        }
        self.rank_snapshot = self.current_ranks();
    }

    /// Mutations performed when a question closes: streaks of players who
    /// never answered reset, the leaderboard is computed against the opening
    /// snapshot, and the new ranks become the next snapshot.
    pub fn close_question(&mut self) -> Vec<LeaderboardEntry> {
        let answered: Vec<String> = self.answers.keys().cloned().collect();
        for participant in self.registry.iter_mut() {
            if !answered.contains(&participant.nickname) {
                participant.streak = 0;
            }
        }
        let leaderboard = self.leaderboard();
        self.rank_snapshot = leaderboard
            .iter()
            .map(|entry| (entry.nickname.clone(), entry.rank))
            .collect();
        leaderboard
    }

    /// Apply a room reset: scores cleared, stale participants dropped, quiz
    /// and time limit replaced when provided. Team tags survive.
    pub fn reset(&mut self, quiz: Option<QuizSnapshot>, time_limit: Option<u64>) {
        if let Some(quiz) = quiz {
            self.quiz = quiz;
        }
        if let Some(limit) = time_limit {
            self.time_limit = limit;
        }
        self.registry.retain_connected();
        self.registry.reset_scores();
        self.current_index = None;
        self.question_started_at = None;
        self.answers.clear();
        self.ledger.clear();
        self.rank_snapshot.clear();
    }

    /// Join/reconnect sync for one player.
    pub fn join_sync(&self, nickname: &str) -> JoinSync {
        let (score, streak) = self
            .registry
            .get(nickname)
            .map(|p| (p.score, p.streak))
            .unwrap_or((0, 0));
        let in_question = self.phase() == RoomPhase::Question;
        JoinSync {
            room_code: self.code.clone(),
            nickname: nickname.to_owned(),
            state: self.phase().into(),
            score,
            streak,
            question_number: self.question_number(),
            total_questions: self.quiz.len(),
            time_limit: self.time_limit,
            question: if in_question {
                self.current_index.and_then(|i| self.quiz.projection(i))
            } else {
                None
            },
            time_remaining: self.remaining_seconds(),
            is_bonus: if in_question {
                self.current_index.map(|i| self.quiz.is_bonus(i))
            } else {
                None
            },
        }
    }

    /// Full resync pushed to the organizer on reconnect.
    pub fn organizer_sync(&self) -> OrganizerSync {
        OrganizerSync {
            room_code: self.code.clone(),
            state: self.phase().into(),
            quiz: self.quiz.detail(),
            question_number: self.question_number(),
            total_questions: self.quiz.len(),
            player_count: self.registry.len(),
            answered_count: self.answers.len(),
            time_remaining: self.remaining_seconds(),
            is_bonus: self.current_index.map(|i| self.quiz.is_bonus(i)),
            leaderboard: self.leaderboard(),
            team_leaderboard: self.team_leaderboard(),
        }
    }

    /// Read-only summary pushed to a spectator on connect.
    pub fn spectator_sync(&self) -> SpectatorSync {
        let in_question = self.phase() == RoomPhase::Question;
        SpectatorSync {
            room_code: self.code.clone(),
            state: self.phase().into(),
            player_count: self.registry.len(),
            leaderboard: self.leaderboard(),
            team_leaderboard: self.team_leaderboard(),
            question_number: self.question_number(),
            total_questions: self.quiz.len(),
            question: if in_question {
                self.current_index.and_then(|i| self.quiz.projection(i))
            } else {
                None
            },
            time_remaining: self.remaining_seconds(),
        }
    }
}
