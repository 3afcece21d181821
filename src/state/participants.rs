//! Per-room participant registry: one record per nickname, surviving
//! disconnects until the room ends.

use std::collections::HashMap;

use indexmap::IndexMap;
use tokio::time::Instant;

use crate::dto::common::ParticipantSummary;

/// A scoring participant, keyed by nickname within its room.
#[derive(Debug, Clone)]
pub struct Participant {
    /// Nickname, unique within the room (case-sensitive).
    pub nickname: String,
    /// Opaque short avatar string.
    pub avatar: String,
    /// Optional team tag.
    pub team: Option<String>,
    /// Cumulative score.
    pub score: u64,
    /// Consecutive correct answers ending at the most recent question.
    pub streak: u32,
    /// Whether the double-points power-up is still unused.
    pub double_points_available: bool,
    /// Whether the fifty-fifty power-up is still unused.
    pub fifty_fifty_available: bool,
    /// Multiplier applied to the current question; reset to 1.0 on advance.
    pub multiplier: f64,
    /// Client id of the live connection, `None` while disconnected.
    pub connection: Option<String>,
    /// Instant of the last registry interaction for this participant.
    pub last_seen: Instant,
}

impl Participant {
    fn new(nickname: String, avatar: String, team: Option<String>, client_id: String) -> Self {
        Self {
            nickname,
            avatar,
            team,
            score: 0,
            streak: 0,
            double_points_available: true,
            fifty_fifty_available: true,
            multiplier: 1.0,
            connection: Some(client_id),
            last_seen: Instant::now(),
        }
    }

    /// Whether a live connection currently backs this participant.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }
}

/// Result of registering a connection under a nickname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Brand-new participant.
    Joined,
    /// Known participant whose connection had dropped.
    Reconnected,
    /// Known participant with a live connection; the new joiner wins and the
    /// displaced client id must be kicked.
    Takeover { displaced_client: String },
}

/// Insertion-ordered registry of participants plus a client-id index.
#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    participants: IndexMap<String, Participant>,
    by_client: HashMap<String, String>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered participants, connected or not.
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Participants currently backed by a live connection.
    pub fn connected_count(&self) -> usize {
        self.participants
            .values()
            .filter(|p| p.is_connected())
            .count()
    }

    pub fn get(&self, nickname: &str) -> Option<&Participant> {
        self.participants.get(nickname)
    }

    pub fn get_mut(&mut self, nickname: &str) -> Option<&mut Participant> {
        self.participants.get_mut(nickname)
    }

    /// Nickname owning the given live connection, if any.
    pub fn nickname_of(&self, client_id: &str) -> Option<&str> {
        self.by_client.get(client_id).map(String::as_str)
    }

    /// Iterate participants in join order.
    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Participant> {
        self.participants.values_mut()
    }

    /// Register `client_id` under `nickname`, creating, reviving, or taking
    /// over the participant record. Score and streak always survive; avatar
    /// and team are refreshed from the new join when non-empty.
    pub fn upsert(
        &mut self,
        nickname: &str,
        avatar: String,
        team: Option<String>,
        client_id: String,
    ) -> UpsertOutcome {
        if let Some(existing) = self.participants.get_mut(nickname) {
            let displaced = existing.connection.take();
            if let Some(old_client) = &displaced {
                self.by_client.remove(old_client);
            }
            existing.connection = Some(client_id.clone());
            existing.last_seen = Instant::now();
            if !avatar.is_empty() {
                existing.avatar = avatar;
            }
            if team.is_some() {
                existing.team = team;
            }
            self.by_client.insert(client_id, nickname.to_owned());
            return match displaced {
                Some(displaced_client) => UpsertOutcome::Takeover { displaced_client },
                None => UpsertOutcome::Reconnected,
            };
        }

        let participant = Participant::new(nickname.to_owned(), avatar, team, client_id.clone());
        self.participants.insert(nickname.to_owned(), participant);
        self.by_client.insert(client_id, nickname.to_owned());
        UpsertOutcome::Joined
    }

    /// Clear the connection owned by `client_id`, returning the nickname it
    /// backed. A close from a superseded connection resolves to nothing and
    /// cannot knock the new connection offline.
    pub fn detach(&mut self, client_id: &str) -> Option<String> {
        let nickname = self.by_client.remove(client_id)?;
        if let Some(participant) = self.participants.get_mut(&nickname) {
            if participant.connection.as_deref() == Some(client_id) {
                participant.connection = None;
                participant.last_seen = Instant::now();
            }
        }
        Some(nickname)
    }

    /// Remove a participant entirely (lobby leave, reset cleanup).
    pub fn remove(&mut self, nickname: &str) -> Option<Participant> {
        let participant = self.participants.shift_remove(nickname)?;
        if let Some(client_id) = &participant.connection {
            self.by_client.remove(client_id);
        }
        Some(participant)
    }

    /// Drop participants with no live connection; used by room reset.
    pub fn retain_connected(&mut self) {
        self.participants.retain(|_, p| p.is_connected());
        let live: HashMap<String, String> = self
            .participants
            .values()
            .filter_map(|p| p.connection.clone().map(|c| (c, p.nickname.clone())))
            .collect();
        self.by_client = live;
    }

    /// Zero scores, streaks, and multipliers and restore power-ups; team
    /// tags are kept.
    pub fn reset_scores(&mut self) {
        for participant in self.participants.values_mut() {
            participant.score = 0;
            participant.streak = 0;
            participant.multiplier = 1.0;
            participant.double_points_available = true;
            participant.fifty_fifty_available = true;
        }
    }

    /// Roster summaries in join order.
    pub fn summaries(&self) -> Vec<ParticipantSummary> {
        self.participants
            .values()
            .map(|p| ParticipantSummary {
                nickname: p.nickname.clone(),
                avatar: p.avatar.clone(),
                team: p.team.clone(),
                connected: p.is_connected(),
            })
            .collect()
    }
}
