//! The room actor: a single task owning all state of one room.
//!
//! Every inbound command, timer fire, and event publication for a room runs
//! inside this task, so the state machine needs no internal locking and the
//! room invariants hold without read-modify-write races. Timer tasks never
//! touch room state; they post commands back onto the same queue.

use std::sync::Arc;

use rand::seq::IndexedRandom;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Duration},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use validator::Validate;

use crate::{
    config::{AppConfig, MAX_TIME_LIMIT, MIN_TIME_LIMIT},
    dto::{
        game::QuizInput,
        validation::{normalize_avatar, normalize_nickname, normalize_team},
        ws::{
            AnswerResult, ClientMessage, PodiumStandings, PowerUpKind, QuestionClosed,
            QuestionOpen, RosterUpdate, ServerMessage,
        },
    },
    error::ServiceError,
    services::{
        events::{EventSender, Outbound, Role},
        scoring::{ScoreInput, score_answer},
    },
    state::{
        directory::{RoomDirectory, RoomHandle},
        participants::UpsertOutcome,
        quiz::QuizSnapshot,
        room::{AnswerRecord, RoomState},
        state_machine::{PhaseEvent, RoomPhase},
    },
};

const COMMAND_QUEUE_DEPTH: usize = 256;

/// Role a connection claims when attaching to a room.
#[derive(Debug)]
pub enum ConnectRole {
    /// Organizer; proven by the token handed out at room creation.
    Organizer { token: String },
    /// Scoring participant (default).
    Player,
    /// Read-only observer.
    Spectator,
}

/// Commands processed by the room task, in arrival order.
#[derive(Debug)]
pub enum RoomCommand {
    /// A connection attached to the room.
    Connect {
        client_id: String,
        role: ConnectRole,
        tx: EventSender,
    },
    /// A connection closed (cleanly or not).
    Disconnect { client_id: String },
    /// A parsed inbound frame.
    Frame {
        client_id: String,
        message: ClientMessage,
    },
    /// An inbound frame that failed to parse; answered with `ERROR`.
    Malformed { client_id: String, reason: String },
    /// Per-second countdown tick from the question timer task.
    QuestionTick { epoch: u64, remaining: u64 },
    /// The question timer ran out.
    QuestionExpired { epoch: u64 },
    /// The organizer grace window ran out.
    GraceExpired { epoch: u64 },
}

/// Create a room, register it in the directory, and spawn its task.
pub fn spawn(
    directory: Arc<RoomDirectory>,
    config: Arc<AppConfig>,
    quiz: QuizSnapshot,
    time_limit: u64,
) -> Result<RoomHandle, ServiceError> {
    if directory.at_capacity() {
        return Err(ServiceError::Overloaded("room limit reached".into()));
    }
    let code = directory.generate_code()?;
    let organizer_token = Uuid::new_v4().to_string();

    let (commands, inbox) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let handle = RoomHandle {
        code: code.clone(),
        organizer_token: organizer_token.clone(),
        commands: commands.clone(),
    };
    directory.register(handle.clone());

    let room = RoomState::new(code, organizer_token, quiz, time_limit);
    tokio::spawn(run(room, inbox, commands, directory, config));

    Ok(handle)
}

/// Main loop of a room task: commands race against the inactivity deadline.
async fn run(
    room: RoomState,
    mut inbox: mpsc::Receiver<RoomCommand>,
    commands: mpsc::Sender<RoomCommand>,
    directory: Arc<RoomDirectory>,
    config: Arc<AppConfig>,
) {
    let code = room.code.clone();
    let mut actor = RoomActor {
        room,
        commands,
        config,
        timer_epoch: 0,
        question_timer: None,
        grace_epoch: 0,
        grace_timer: None,
        closing: false,
    };
    info!(room = %code, "room opened");

    loop {
        let ttl_deadline = actor.room.last_activity + actor.config.room_ttl;
        tokio::select! {
            maybe = inbox.recv() => match maybe {
                Some(command) => {
                    actor.handle(command);
                    if actor.closing {
                        break;
                    }
                }
                None => break,
            },
            _ = time::sleep_until(ttl_deadline) => {
                info!(room = %code, "closing idle room");
                actor.close_room("Room expired");
                break;
            }
        }
    }

    actor.shutdown();
    directory.evict(&code);
    info!(room = %code, "room evicted");
}

/// Owns the room state plus the timer bookkeeping around it.
struct RoomActor {
    room: RoomState,
    commands: mpsc::Sender<RoomCommand>,
    config: Arc<AppConfig>,
    timer_epoch: u64,
    question_timer: Option<JoinHandle<()>>,
    grace_epoch: u64,
    grace_timer: Option<JoinHandle<()>>,
    closing: bool,
}

impl RoomActor {
    fn handle(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::Connect {
                client_id,
                role,
                tx,
            } => {
                self.room.touch();
                self.handle_connect(client_id, role, tx);
            }
            RoomCommand::Disconnect { client_id } => {
                self.room.touch();
                self.handle_disconnect(&client_id);
            }
            RoomCommand::Frame { client_id, message } => {
                self.room.touch();
                self.handle_frame(&client_id, message);
            }
            RoomCommand::Malformed { client_id, reason } => {
                debug!(room = %self.room.code, client = %client_id, %reason, "malformed frame");
                self.send_error(&client_id, format!("Malformed frame: {reason}"));
            }
            RoomCommand::QuestionTick { epoch, remaining } => {
                if epoch == self.timer_epoch && self.room.phase() == RoomPhase::Question {
                    self.room.touch();
                    self.publish_all(ServerMessage::Timer { remaining });
                }
            }
            RoomCommand::QuestionExpired { epoch } => {
                if epoch == self.timer_epoch && self.room.phase() == RoomPhase::Question {
                    self.room.touch();
                    self.finish_question(true);
                }
            }
            RoomCommand::GraceExpired { epoch } => {
                if epoch == self.grace_epoch && self.room.bus.organizer_client().is_none() {
                    info!(room = %self.room.code, "organizer grace expired");
                    self.close_room("Organizer did not return");
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    fn handle_connect(&mut self, client_id: String, role: ConnectRole, tx: EventSender) {
        match role {
            ConnectRole::Organizer { token } => {
                if token != self.room.organizer_token {
                    warn!(room = %self.room.code, client = %client_id, "organizer token rejected");
                    let _ = tx.try_send(Outbound::Event(ServerMessage::error(
                        "Invalid organizer token",
                    )));
                    let _ = tx.try_send(Outbound::Close);
                    return;
                }
                if let Some(previous) = self.room.bus.organizer_client().map(str::to_owned) {
                    self.kick_connection(&previous, "Organizer connected elsewhere");
                }
                self.room.bus.subscribe(client_id.clone(), Role::Organizer, tx);
                self.cancel_grace();
                if self.room.organizer_seen {
                    info!(room = %self.room.code, client = %client_id, "organizer reconnected");
                    let sync = self.room.organizer_sync();
                    self.deliver(&client_id, ServerMessage::OrganizerReconnected(sync));
                    self.publish_audience(ServerMessage::HostReconnected);
                } else {
                    self.room.organizer_seen = true;
                    self.deliver(
                        &client_id,
                        ServerMessage::RoomCreated {
                            room_code: self.room.code.clone(),
                        },
                    );
                }
            }
            ConnectRole::Spectator => {
                self.room.bus.subscribe(client_id.clone(), Role::Spectator, tx);
                let sync = self.room.spectator_sync();
                self.deliver(&client_id, ServerMessage::SpectatorSync(sync));
            }
            ConnectRole::Player => {
                // Registered silently; a JOIN frame names the participant.
                self.room.bus.subscribe(client_id, Role::Player, tx);
            }
        }
    }

    fn handle_disconnect(&mut self, client_id: &str) {
        let was_organizer = self.room.bus.is_organizer(client_id);
        if let Some(subscriber) = self.room.bus.unsubscribe(client_id) {
            subscriber.close();
        }
        if was_organizer {
            info!(room = %self.room.code, client = %client_id, "organizer disconnected");
            self.organizer_lost();
            return;
        }
        let Some(nickname) = self.room.registry.detach(client_id) else {
            return;
        };
        if self.room.phase() == RoomPhase::Lobby {
            self.room.registry.remove(&nickname);
            let update = self.roster_update(&nickname);
            self.publish_all(ServerMessage::PlayerLeft(update));
        } else {
            let update = self.roster_update(&nickname);
            self.publish_all(ServerMessage::PlayerDisconnected(update));
        }
    }

    fn organizer_lost(&mut self) {
        if self.room.phase() == RoomPhase::Closed {
            return;
        }
        self.publish_audience(ServerMessage::OrganizerDisconnected);
        self.grace_epoch += 1;
        if let Some(handle) = self.grace_timer.take() {
            handle.abort();
        }
        let epoch = self.grace_epoch;
        let grace = self.config.organizer_grace;
        let commands = self.commands.clone();
        self.grace_timer = Some(tokio::spawn(async move {
            time::sleep(grace).await;
            let _ = commands.send(RoomCommand::GraceExpired { epoch }).await;
        }));
    }

    fn cancel_grace(&mut self) {
        self.grace_epoch += 1;
        if let Some(handle) = self.grace_timer.take() {
            handle.abort();
        }
    }

    /// Displace a connection with a KICKED notice without touching the
    /// participant record (the record has already been rebound).
    fn kick_connection(&mut self, client_id: &str, reason: &str) {
        let _ = self.room.bus.send_to(
            client_id,
            &ServerMessage::Kicked {
                reason: reason.to_owned(),
            },
        );
        self.room.bus.close(client_id);
        self.room.bus.unsubscribe(client_id);
    }

    // ------------------------------------------------------------------
    // Inbound frames
    // ------------------------------------------------------------------

    fn handle_frame(&mut self, client_id: &str, message: ClientMessage) {
        let Some(role) = self.room.bus.role_of(client_id) else {
            // The connection was dropped while this frame was queued.
            return;
        };

        match message {
            ClientMessage::Join {
                nickname,
                avatar,
                team,
            } => {
                if role != Role::Player {
                    self.send_error(client_id, "Only players can join");
                    return;
                }
                self.handle_join(client_id, &nickname, avatar, team);
            }
            ClientMessage::Answer { answer_index } => {
                self.handle_answer(client_id, answer_index);
            }
            ClientMessage::UsePowerUp { power_up } => {
                self.handle_power_up(client_id, power_up);
            }
            ClientMessage::StartGame => {
                if self.require_organizer(client_id) {
                    self.handle_start_game();
                }
            }
            ClientMessage::NextQuestion => {
                if self.require_organizer(client_id) {
                    self.handle_next_question(client_id);
                }
            }
            ClientMessage::EndQuiz => {
                if self.require_organizer(client_id) {
                    self.handle_end_quiz(client_id);
                }
            }
            ClientMessage::SetTimeLimit { time_limit } => {
                if self.require_organizer(client_id) {
                    self.handle_set_time_limit(client_id, time_limit);
                }
            }
            ClientMessage::ResetRoom {
                quiz_data,
                time_limit,
            } => {
                if self.require_organizer(client_id) {
                    self.handle_reset_room(client_id, quiz_data, time_limit);
                }
            }
            ClientMessage::Unknown => {
                self.send_error(client_id, "Unknown message type");
            }
        }
    }

    fn require_organizer(&mut self, client_id: &str) -> bool {
        if self.room.bus.is_organizer(client_id) {
            true
        } else {
            self.send_error(client_id, "Organizer commands require the organizer role");
            false
        }
    }

    fn handle_join(
        &mut self,
        client_id: &str,
        raw_nickname: &str,
        raw_avatar: String,
        raw_team: Option<String>,
    ) {
        let nickname = match normalize_nickname(raw_nickname) {
            Ok(nickname) => nickname,
            Err(err) => {
                self.send_error(client_id, validation_message(err));
                return;
            }
        };
        let avatar = match normalize_avatar(&raw_avatar) {
            Ok(avatar) => avatar,
            Err(err) => {
                self.send_error(client_id, validation_message(err));
                return;
            }
        };
        let team = match normalize_team(raw_team.as_deref()) {
            Ok(team) => team,
            Err(err) => {
                self.send_error(client_id, validation_message(err));
                return;
            }
        };

        let is_known = self.room.registry.get(&nickname).is_some();
        if !is_known && self.room.registry.len() >= self.config.max_players_per_room {
            self.send_error(client_id, "Room is full");
            self.room.bus.close(client_id);
            self.room.bus.unsubscribe(client_id);
            return;
        }

        let outcome =
            self.room
                .registry
                .upsert(&nickname, avatar, team, client_id.to_owned());
        match outcome {
            UpsertOutcome::Joined => {
                info!(room = %self.room.code, client = %client_id, player = %nickname, "player joined");
                let sync = self.room.join_sync(&nickname);
                self.deliver(client_id, ServerMessage::JoinedRoom(sync));
                let update = self.roster_update(&nickname);
                self.publish_all(ServerMessage::PlayerJoined(update));
            }
            UpsertOutcome::Reconnected => {
                info!(room = %self.room.code, client = %client_id, player = %nickname, "player reconnected");
                let sync = self.room.join_sync(&nickname);
                self.deliver(client_id, ServerMessage::Reconnected(sync));
                let update = self.roster_update(&nickname);
                self.publish_all(ServerMessage::PlayerReconnected(update));
            }
            UpsertOutcome::Takeover { displaced_client } => {
                info!(
                    room = %self.room.code,
                    client = %client_id,
                    displaced = %displaced_client,
                    player = %nickname,
                    "nickname takeover"
                );
                self.kick_connection(&displaced_client, "You joined from another device");
                let sync = self.room.join_sync(&nickname);
                self.deliver(client_id, ServerMessage::Reconnected(sync));
                let update = self.roster_update(&nickname);
                self.publish_all(ServerMessage::PlayerReconnected(update));
            }
        }
    }

    fn handle_answer(&mut self, client_id: &str, answer_index: usize) {
        if self.room.phase() != RoomPhase::Question {
            self.send_error(client_id, "No question is open");
            return;
        }
        let Some(nickname) = self.room.registry.nickname_of(client_id).map(str::to_owned) else {
            self.send_error(client_id, "Join the room before answering");
            return;
        };
        if self.room.answers.contains_key(&nickname) {
            // At most one accepted answer per question per player.
            debug!(room = %self.room.code, player = %nickname, "duplicate answer ignored");
            return;
        }
        let Some(index) = self.room.current_index else {
            return;
        };
        let Some((option_count, correct_index)) = self
            .room
            .quiz
            .question(index)
            .map(|q| (q.options.len(), q.correct_index))
        else {
            return;
        };
        if answer_index >= option_count {
            self.send_error(client_id, "Answer index out of range");
            return;
        }

        let is_bonus = self.room.quiz.is_bonus(index);
        let latency_fraction = self.room.latency_fraction();
        let correct = answer_index == correct_index;
        let Some(participant) = self.room.registry.get_mut(&nickname) else {
            return;
        };
        let reported_multiplier = participant.multiplier;
        let outcome = score_answer(ScoreInput {
            correct,
            latency_fraction,
            previous_streak: participant.streak,
            player_multiplier: participant.multiplier,
            is_bonus,
        });
        participant.score += outcome.points;
        participant.streak = outcome.streak;

        let record = AnswerRecord {
            option_index: answer_index,
            correct,
            points: outcome.points,
            multiplier: reported_multiplier,
            latency_fraction,
        };
        self.room.answers.insert(nickname.clone(), record.clone());
        self.room.ledger.push((index, nickname.clone(), record));

        self.deliver(
            client_id,
            ServerMessage::AnswerResult(AnswerResult {
                correct,
                points: outcome.points,
                multiplier: reported_multiplier,
                streak: outcome.streak,
                is_bonus,
            }),
        );
        self.publish_watchers(ServerMessage::AnswerCount {
            answered: self.room.answers.len(),
            player_count: self.room.registry.connected_count(),
        });

        let connected = self.room.registry.connected_count();
        if connected > 0 && self.room.answered_connected() >= connected {
            self.finish_question(false);
        }
    }

    fn handle_power_up(&mut self, client_id: &str, power_up: PowerUpKind) {
        if self.room.phase() != RoomPhase::Question {
            self.send_error(client_id, "Power-ups can only be used during a question");
            return;
        }
        let Some(nickname) = self.room.registry.nickname_of(client_id).map(str::to_owned) else {
            self.send_error(client_id, "Join the room before using power-ups");
            return;
        };
        if self.room.answers.contains_key(&nickname) {
            self.send_error(client_id, "Power-ups must be used before answering");
            return;
        }
        let Some(index) = self.room.current_index else {
            return;
        };

        match power_up {
            PowerUpKind::DoublePoints => {
                let Some(participant) = self.room.registry.get_mut(&nickname) else {
                    return;
                };
                if !participant.double_points_available {
                    self.send_error(client_id, "Double points already used");
                    return;
                }
                participant.double_points_available = false;
                participant.multiplier = 2.0;
                self.deliver(
                    client_id,
                    ServerMessage::PowerUpActivated {
                        power_up,
                        remove_indices: None,
                    },
                );
            }
            PowerUpKind::FiftyFifty => {
                let Some((option_count, correct_index)) = self
                    .room
                    .quiz
                    .question(index)
                    .map(|q| (q.options.len(), q.correct_index))
                else {
                    return;
                };
                if option_count != 4 {
                    self.send_error(client_id, "Fifty-fifty needs a four-option question");
                    return;
                }
                let wrong: Vec<usize> =
                    (0..option_count).filter(|&i| i != correct_index).collect();
                let Some(participant) = self.room.registry.get_mut(&nickname) else {
                    return;
                };
                if !participant.fifty_fifty_available {
                    self.send_error(client_id, "Fifty-fifty already used");
                    return;
                }
                participant.fifty_fifty_available = false;
                let mut rng = rand::rng();
                let remove: Vec<usize> =
                    wrong.choose_multiple(&mut rng, 2).copied().collect();
                self.deliver(
                    client_id,
                    ServerMessage::PowerUpActivated {
                        power_up,
                        remove_indices: Some(remove),
                    },
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Organizer commands
    // ------------------------------------------------------------------

    fn handle_start_game(&mut self) {
        let organizer = self.room.bus.organizer_client().map(str::to_owned);
        if self.room.phase() != RoomPhase::Lobby {
            if let Some(organizer) = organizer {
                self.send_error(&organizer, "The game has already started");
            }
            return;
        }
        if self.room.registry.is_empty() {
            if let Some(organizer) = organizer {
                self.send_error(&organizer, "No players have joined yet");
            }
            return;
        }
        if self.apply_phase(PhaseEvent::StartGame) {
            self.publish_all(ServerMessage::GameStarting);
        }
    }

    fn handle_next_question(&mut self, client_id: &str) {
        match self.room.phase() {
            // The organizer may cut an open question short.
            RoomPhase::Question => self.finish_question(false),
            RoomPhase::Intro | RoomPhase::Reveal => {
                let next = self.room.current_index.map_or(0, |index| index + 1);
                if next >= self.room.quiz.len() {
                    self.show_podium();
                } else {
                    self.start_question(next);
                }
            }
            _ => self.send_error(client_id, "Cannot advance from the current state"),
        }
    }

    fn handle_end_quiz(&mut self, client_id: &str) {
        match self.room.phase() {
            RoomPhase::Question => {
                self.cancel_question_timer();
                self.show_podium();
            }
            RoomPhase::Reveal => self.show_podium(),
            _ => self.send_error(client_id, "There is no quiz to end"),
        }
    }

    fn handle_set_time_limit(&mut self, client_id: &str, time_limit: u64) {
        if self.room.phase() != RoomPhase::Lobby {
            self.send_error(client_id, "Time limit can only change in the lobby");
            return;
        }
        if !(MIN_TIME_LIMIT..=MAX_TIME_LIMIT).contains(&time_limit) {
            self.send_error(
                client_id,
                format!("Time limit must be between {MIN_TIME_LIMIT} and {MAX_TIME_LIMIT} seconds"),
            );
            return;
        }
        self.room.time_limit = time_limit;
    }

    fn handle_reset_room(
        &mut self,
        client_id: &str,
        quiz_data: Option<QuizInput>,
        time_limit: Option<u64>,
    ) {
        if self.room.phase() != RoomPhase::Podium {
            self.send_error(client_id, "Reset is only available from the podium");
            return;
        }
        let quiz = match quiz_data {
            Some(input) => match input.validate() {
                Ok(()) => Some(QuizSnapshot::from(input)),
                Err(err) => {
                    self.send_error(client_id, format!("Invalid quiz payload: {err}"));
                    return;
                }
            },
            None => None,
        };
        if let Some(limit) = time_limit {
            if !(MIN_TIME_LIMIT..=MAX_TIME_LIMIT).contains(&limit) {
                self.send_error(
                    client_id,
                    format!(
                        "Time limit must be between {MIN_TIME_LIMIT} and {MAX_TIME_LIMIT} seconds"
                    ),
                );
                return;
            }
        }
        if self.apply_phase(PhaseEvent::ResetRoom) {
            info!(room = %self.room.code, "room reset for a new game");
            self.room.reset(quiz, time_limit);
            self.publish_all(ServerMessage::RoomReset {
                players: self.room.registry.summaries(),
                player_count: self.room.registry.len(),
            });
        }
    }

    // ------------------------------------------------------------------
    // Question lifecycle
    // ------------------------------------------------------------------

    fn start_question(&mut self, index: usize) {
        if !self.apply_phase(PhaseEvent::BeginQuestion) {
            return;
        }
        self.room.begin_question(index);
        self.spawn_question_timer();

        let Some(projection) = self.room.quiz.projection(index) else {
            return;
        };
        self.publish_all(ServerMessage::Question(QuestionOpen {
            question_number: index + 1,
            total_questions: self.room.quiz.len(),
            question: projection,
            time_limit: self.room.time_limit,
            is_bonus: self.room.quiz.is_bonus(index),
        }));
    }

    /// Close the open question. `expired` carries the final `TIMER 0` tick;
    /// the early all-answered path skips it.
    fn finish_question(&mut self, expired: bool) {
        self.cancel_question_timer();
        if expired {
            self.publish_all(ServerMessage::Timer { remaining: 0 });
        }
        if !self.apply_phase(PhaseEvent::FinishQuestion) {
            return;
        }
        let leaderboard = self.room.close_question();
        let Some(index) = self.room.current_index else {
            return;
        };
        let Some(correct_index) = self.room.quiz.question(index).map(|q| q.correct_index) else {
            return;
        };
        self.publish_all(ServerMessage::QuestionOver(QuestionClosed {
            correct_index,
            leaderboard,
            is_final: index + 1 >= self.room.quiz.len(),
        }));
    }

    fn show_podium(&mut self) {
        if !self.apply_phase(PhaseEvent::ShowPodium) {
            return;
        }
        self.publish_all(ServerMessage::Podium(PodiumStandings {
            leaderboard: self.room.leaderboard(),
            team_leaderboard: self.room.team_leaderboard(),
        }));
    }

    fn spawn_question_timer(&mut self) {
        self.timer_epoch += 1;
        if let Some(handle) = self.question_timer.take() {
            handle.abort();
        }
        let epoch = self.timer_epoch;
        let limit = self.room.time_limit;
        let commands = self.commands.clone();
        self.question_timer = Some(tokio::spawn(async move {
            let mut remaining = limit;
            while remaining > 1 {
                time::sleep(Duration::from_secs(1)).await;
                remaining -= 1;
                if commands
                    .send(RoomCommand::QuestionTick { epoch, remaining })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            time::sleep(Duration::from_secs(1)).await;
            let _ = commands.send(RoomCommand::QuestionExpired { epoch }).await;
        }));
    }

    fn cancel_question_timer(&mut self) {
        self.timer_epoch += 1;
        if let Some(handle) = self.question_timer.take() {
            handle.abort();
        }
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    fn close_room(&mut self, reason: &str) {
        if self.room.phase() == RoomPhase::Closed {
            return;
        }
        self.cancel_question_timer();
        self.cancel_grace();
        let _ = self.room.machine.apply(PhaseEvent::CloseRoom);
        self.room.bus.broadcast(&ServerMessage::RoomClosed {
            reason: reason.to_owned(),
        });
        self.room.bus.close_all();
        self.closing = true;
    }

    fn shutdown(&mut self) {
        if let Some(handle) = self.question_timer.take() {
            handle.abort();
        }
        if let Some(handle) = self.grace_timer.take() {
            handle.abort();
        }
        self.room.bus.close_all();
    }

    // ------------------------------------------------------------------
    // Publication helpers
    // ------------------------------------------------------------------

    /// Commit a phase transition. Handlers guard their own states, so a
    /// rejection here is a room-invariant violation: the room is torn down
    /// rather than left in an inconsistent state.
    fn apply_phase(&mut self, event: PhaseEvent) -> bool {
        match self.room.machine.apply(event) {
            Ok(_) => true,
            Err(invalid) => {
                error!(room = %self.room.code, error = %invalid, "room invariant violated");
                self.close_room("Internal error");
                false
            }
        }
    }

    fn roster_update(&self, nickname: &str) -> RosterUpdate {
        RosterUpdate {
            nickname: nickname.to_owned(),
            players: self.room.registry.summaries(),
            player_count: self.room.registry.len(),
        }
    }

    fn send_error(&mut self, client_id: &str, message: impl Into<String>) {
        self.deliver(client_id, ServerMessage::error(message));
    }

    fn deliver(&mut self, client_id: &str, message: ServerMessage) {
        if self.room.bus.contains(client_id) && !self.room.bus.send_to(client_id, &message) {
            self.reap(vec![client_id.to_owned()]);
        }
    }

    fn publish_all(&mut self, message: ServerMessage) {
        let rejected = self.room.bus.broadcast(&message);
        self.reap(rejected);
    }

    fn publish_watchers(&mut self, message: ServerMessage) {
        let rejected = self.room.bus.broadcast_watchers(&message);
        self.reap(rejected);
    }

    fn publish_audience(&mut self, message: ServerMessage) {
        let rejected = self.room.bus.broadcast_audience(&message);
        self.reap(rejected);
    }

    /// Treat subscribers with overflowed queues as disconnected.
    fn reap(&mut self, rejected: Vec<String>) {
        for client_id in rejected {
            warn!(room = %self.room.code, client = %client_id, "outbound queue overflow, dropping connection");
            self.handle_disconnect(&client_id);
        }
    }
}

fn validation_message(err: validator::ValidationError) -> String {
    err.message
        .map(|m| m.into_owned())
        .unwrap_or_else(|| "Invalid input".to_owned())
}
