use thiserror::Error;

/// Lifecycle state of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    /// Players gather; the organizer configures the game.
    Lobby,
    /// The quiz has started but no question is showing yet.
    Intro,
    /// A question is open and accepting answers.
    Question,
    /// The question closed; leaderboard and correct answer are shown.
    Reveal,
    /// Final standings are displayed.
    Podium,
    /// Terminal state; the room is being torn down.
    Closed,
}

/// Events that can be applied to the room state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// Organizer starts the quiz from the lobby.
    StartGame,
    /// A question opens (from the intro or after a reveal).
    BeginQuestion,
    /// The open question closes: timer expiry, all answered, or organizer skip.
    FinishQuestion,
    /// Jump to final standings: questions exhausted or organizer end.
    ShowPodium,
    /// Organizer resets the room for a new game.
    ResetRoom,
    /// The room closes: TTL expiry, organizer loss, or invariant violation.
    CloseRoom,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event arrived.
    pub from: RoomPhase,
    /// The event that cannot be applied from this phase.
    pub event: PhaseEvent,
}

/// State machine implementing the room lifecycle.
///
/// All transitions happen inside the owning room task, so applying an event
/// validates and commits in one step.
#[derive(Debug, Clone)]
pub struct RoomStateMachine {
    phase: RoomPhase,
}

impl Default for RoomStateMachine {
    fn default() -> Self {
        Self {
            phase: RoomPhase::Lobby,
        }
    }
}

impl RoomStateMachine {
    /// Create a new state machine initialised in the lobby.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    /// Apply an event, returning the new phase.
    pub fn apply(&mut self, event: PhaseEvent) -> Result<RoomPhase, InvalidTransition> {
        let next = self.compute_transition(event)?;
        self.phase = next;
        Ok(next)
    }

    /// Whether an event would be accepted from the current phase.
    pub fn accepts(&self, event: PhaseEvent) -> bool {
        self.compute_transition(event).is_ok()
    }

    /// Compute a transition from an event if the transition is valid.
    fn compute_transition(&self, event: PhaseEvent) -> Result<RoomPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (RoomPhase::Lobby, PhaseEvent::StartGame) => RoomPhase::Intro,
            (RoomPhase::Intro | RoomPhase::Reveal, PhaseEvent::BeginQuestion) => {
                RoomPhase::Question
            }
            (RoomPhase::Question, PhaseEvent::FinishQuestion) => RoomPhase::Reveal,
            (RoomPhase::Question | RoomPhase::Reveal, PhaseEvent::ShowPodium) => RoomPhase::Podium,
            (RoomPhase::Podium, PhaseEvent::ResetRoom) => RoomPhase::Lobby,
            (from, PhaseEvent::CloseRoom) if from != RoomPhase::Closed => RoomPhase::Closed,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}
