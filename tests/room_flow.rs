//! End-to-end room lifecycle tests driving room tasks through their command
//! queues, with fake subscribers standing in for connection writers. Runs
//! under the paused tokio clock so countdowns and grace windows are
//! deterministic.

use std::{collections::HashSet, sync::Arc, time::Duration};

use tokio::{
    sync::mpsc,
    time::{self, timeout},
};

use quiz_rush_back::{
    config::AppConfig,
    dto::common::PhaseName,
    dto::ws::{ClientMessage, PowerUpKind, ServerMessage},
    services::{
        events::Outbound,
        room_actor::{self, ConnectRole, RoomCommand},
    },
    state::{
        directory::RoomDirectory,
        quiz::{Question, QuizSnapshot},
    },
};

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

fn question(id: u32, text: &str, options: &[&str], correct: usize) -> Question {
    Question {
        id,
        text: text.to_owned(),
        options: options.iter().map(|s| s.to_string()).collect(),
        correct_index: correct,
        image_url: None,
    }
}

fn four_option_quiz(count: usize, bonus: &[usize]) -> QuizSnapshot {
    let questions = (0..count)
        .map(|i| question(i as u32 + 1, &format!("Question {}?", i + 1), &["A", "B", "C", "D"], 1))
        .collect();
    QuizSnapshot::with_bonus(
        "Trivia".into(),
        questions,
        bonus.iter().copied().collect::<HashSet<_>>(),
    )
}

struct TestRoom {
    directory: Arc<RoomDirectory>,
    commands: mpsc::Sender<RoomCommand>,
    code: String,
    organizer_token: String,
}

fn open_room(quiz: QuizSnapshot, time_limit: u64, config: AppConfig) -> TestRoom {
    let directory = Arc::new(RoomDirectory::new(config.max_rooms));
    let handle =
        room_actor::spawn(directory.clone(), Arc::new(config), quiz, time_limit).unwrap();
    TestRoom {
        directory,
        commands: handle.commands,
        code: handle.code,
        organizer_token: handle.organizer_token,
    }
}

struct Client {
    id: String,
    commands: mpsc::Sender<RoomCommand>,
    rx: mpsc::Receiver<Outbound>,
}

impl Client {
    /// Next outbound item, panicking if the subscriber queue was dropped.
    async fn recv_outbound(&mut self) -> Outbound {
        self.rx.recv().await.expect("subscriber queue closed")
    }

    /// Next event frame; panics on a close sentinel.
    async fn recv(&mut self) -> ServerMessage {
        match self.recv_outbound().await {
            Outbound::Event(event) => event,
            Outbound::Close => panic!("unexpected close for client {}", self.id),
        }
    }

    /// Skip frames until one matches the predicate.
    async fn recv_until<F>(&mut self, mut pred: F) -> ServerMessage
    where
        F: FnMut(&ServerMessage) -> bool,
    {
        loop {
            let event = self.recv().await;
            if pred(&event) {
                return event;
            }
        }
    }

    async fn send(&self, message: ClientMessage) {
        self.commands
            .send(RoomCommand::Frame {
                client_id: self.id.clone(),
                message,
            })
            .await
            .expect("room task gone");
    }

    async fn disconnect(&self) {
        let _ = self
            .commands
            .send(RoomCommand::Disconnect {
                client_id: self.id.clone(),
            })
            .await;
    }
}

async fn connect(room: &TestRoom, id: &str, role: ConnectRole) -> Client {
    connect_with_capacity(room, id, role, 256).await
}

async fn connect_with_capacity(
    room: &TestRoom,
    id: &str,
    role: ConnectRole,
    capacity: usize,
) -> Client {
    let (tx, rx) = mpsc::channel(capacity);
    room.commands
        .send(RoomCommand::Connect {
            client_id: id.to_owned(),
            role,
            tx,
        })
        .await
        .expect("room task gone");
    Client {
        id: id.to_owned(),
        commands: room.commands.clone(),
        rx,
    }
}

async fn connect_organizer(room: &TestRoom, id: &str) -> Client {
    let mut organizer = connect(
        room,
        id,
        ConnectRole::Organizer {
            token: room.organizer_token.clone(),
        },
    )
    .await;
    organizer
        .recv_until(|e| {
            matches!(
                e,
                ServerMessage::RoomCreated { .. } | ServerMessage::OrganizerReconnected(_)
            )
        })
        .await;
    organizer
}

async fn join_player(room: &TestRoom, id: &str, nickname: &str) -> Client {
    let mut player = connect(room, id, ConnectRole::Player).await;
    player
        .send(ClientMessage::Join {
            nickname: nickname.to_owned(),
            avatar: String::new(),
            team: None,
        })
        .await;
    let joined = player
        .recv_until(|e| matches!(e, ServerMessage::JoinedRoom(_)))
        .await;
    match joined {
        ServerMessage::JoinedRoom(sync) => assert_eq!(sync.nickname, nickname),
        _ => unreachable!(),
    }
    player
}

/// Read countdown ticks until the given value arrives; panics on anything
/// that is not a TIMER frame.
async fn ticks_until(client: &mut Client, value: u64) {
    loop {
        match client.recv().await {
            ServerMessage::Timer { remaining } => {
                if remaining == value {
                    return;
                }
                assert!(remaining > value, "missed tick {value}, got {remaining}");
            }
            other => panic!("expected TIMER, got {other:?}"),
        }
    }
}

fn answer(index: usize) -> ClientMessage {
    ClientMessage::Answer {
        answer_index: index,
    }
}

// ---------------------------------------------------------------------------
// Seed scenario 1: happy path
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn happy_path_one_question_game() {
    let quiz = QuizSnapshot::with_bonus(
        "Arithmetic".into(),
        vec![question(1, "2+2?", &["3", "4", "5", "6"], 1)],
        HashSet::new(),
    );
    let room = open_room(quiz, 10, AppConfig::default());

    let organizer = connect_organizer(&room, "org").await;
    let mut alice = join_player(&room, "c-a", "A").await;
    let mut bob = join_player(&room, "c-b", "B").await;

    organizer.send(ClientMessage::StartGame).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::GameStarting))
        .await;
    organizer.send(ClientMessage::NextQuestion).await;

    let opened = alice
        .recv_until(|e| matches!(e, ServerMessage::Question(_)))
        .await;
    match &opened {
        ServerMessage::Question(open) => {
            assert_eq!(open.question_number, 1);
            assert_eq!(open.total_questions, 1);
            assert_eq!(open.time_limit, 10);
            assert_eq!(open.question.options, vec!["3", "4", "5", "6"]);
            assert!(!open.is_bonus);
        }
        _ => unreachable!(),
    }
    bob.recv_until(|e| matches!(e, ServerMessage::Question(_)))
        .await;

    // Alice answers correctly at t = 2s, Bob wrong at t = 3s.
    ticks_until(&mut alice, 8).await;
    alice.send(answer(1)).await;
    let result = alice
        .recv_until(|e| matches!(e, ServerMessage::AnswerResult(_)))
        .await;
    match result {
        ServerMessage::AnswerResult(r) => {
            assert!(r.correct);
            assert_eq!(r.points, 900);
            assert_eq!(r.streak, 1);
            assert_eq!(r.multiplier, 1.0);
        }
        _ => unreachable!(),
    }

    ticks_until(&mut bob, 7).await;
    bob.send(answer(2)).await;
    let result = bob
        .recv_until(|e| matches!(e, ServerMessage::AnswerResult(_)))
        .await;
    match result {
        ServerMessage::AnswerResult(r) => {
            assert!(!r.correct);
            assert_eq!(r.points, 0);
            assert_eq!(r.streak, 0);
        }
        _ => unreachable!(),
    }

    // Both players answered, so the question closes early.
    let over = alice
        .recv_until(|e| matches!(e, ServerMessage::QuestionOver(_)))
        .await;
    match over {
        ServerMessage::QuestionOver(closed) => {
            assert_eq!(closed.correct_index, 1);
            assert!(closed.is_final);
            assert_eq!(closed.leaderboard.len(), 2);
            assert_eq!(closed.leaderboard[0].nickname, "A");
            assert_eq!(closed.leaderboard[0].score, 900);
            assert_eq!(closed.leaderboard[0].rank_change, 0);
            assert_eq!(closed.leaderboard[1].nickname, "B");
            assert_eq!(closed.leaderboard[1].score, 0);
            assert_eq!(closed.leaderboard[1].rank_change, 0);
        }
        _ => unreachable!(),
    }

    organizer.send(ClientMessage::NextQuestion).await;
    let podium = bob
        .recv_until(|e| matches!(e, ServerMessage::Podium(_)))
        .await;
    match podium {
        ServerMessage::Podium(standings) => {
            assert_eq!(standings.leaderboard[0].nickname, "A");
            assert_eq!(standings.leaderboard[1].nickname, "B");
        }
        _ => unreachable!(),
    }
}

// ---------------------------------------------------------------------------
// Seed scenario 2: early all-answered transition
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn all_answered_closes_question_early() {
    let room = open_room(four_option_quiz(1, &[]), 10, AppConfig::default());
    let organizer = connect_organizer(&room, "org").await;
    let mut alice = join_player(&room, "c-a", "A").await;
    let mut bob = join_player(&room, "c-b", "B").await;

    organizer.send(ClientMessage::StartGame).await;
    organizer.send(ClientMessage::NextQuestion).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::Question(_)))
        .await;
    bob.recv_until(|e| matches!(e, ServerMessage::Question(_)))
        .await;

    ticks_until(&mut alice, 9).await;
    alice.send(answer(1)).await;
    ticks_until(&mut bob, 6).await;
    bob.send(answer(1)).await;

    let over = bob
        .recv_until(|e| matches!(e, ServerMessage::QuestionOver(_)))
        .await;
    match over {
        ServerMessage::QuestionOver(closed) => {
            let alice_row = closed.leaderboard.iter().find(|e| e.nickname == "A").unwrap();
            let bob_row = closed.leaderboard.iter().find(|e| e.nickname == "B").unwrap();
            assert_eq!(alice_row.score, 950);
            assert_eq!(bob_row.score, 800);
        }
        _ => unreachable!(),
    }
    alice
        .recv_until(|e| matches!(e, ServerMessage::QuestionOver(_)))
        .await;

    // The expiry timer was cancelled: the reveal is not preceded by a zero
    // tick and no further TIMER frames arrive afterwards.
    let quiet = timeout(Duration::from_secs(15), alice.rx.recv()).await;
    match quiet {
        Err(_) => {}
        Ok(Some(Outbound::Event(ServerMessage::Timer { .. }))) => {
            panic!("timer kept ticking after early reveal")
        }
        Ok(other) => panic!("unexpected frame after early reveal: {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Seed scenario 3: streak progression and reset
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn streaks_multiply_and_reset() {
    let room = open_room(four_option_quiz(5, &[]), 10, AppConfig::default());
    let organizer = connect_organizer(&room, "org").await;
    let mut alice = join_player(&room, "c-a", "A").await;

    organizer.send(ClientMessage::StartGame).await;

    // Answers for the five questions: correct, correct, correct, wrong, correct.
    let picks = [1usize, 1, 1, 0, 1];
    let expected_points = [1000u64, 1000, 1500, 0, 1000];
    let expected_streaks = [1u32, 2, 3, 0, 1];

    for round in 0..5 {
        organizer.send(ClientMessage::NextQuestion).await;
        alice
            .recv_until(|e| matches!(e, ServerMessage::Question(_)))
            .await;
        // Answer immediately: latency fraction 0.
        alice.send(answer(picks[round])).await;
        let result = alice
            .recv_until(|e| matches!(e, ServerMessage::AnswerResult(_)))
            .await;
        match result {
            ServerMessage::AnswerResult(r) => {
                assert_eq!(r.points, expected_points[round], "round {round}");
                assert_eq!(r.streak, expected_streaks[round], "round {round}");
            }
            _ => unreachable!(),
        }
        alice
            .recv_until(|e| matches!(e, ServerMessage::QuestionOver(_)))
            .await;
    }
}

// ---------------------------------------------------------------------------
// Seed scenario 4: bonus round scoring
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn bonus_question_doubles_base_points() {
    let room = open_room(four_option_quiz(1, &[0]), 10, AppConfig::default());
    let organizer = connect_organizer(&room, "org").await;
    let mut alice = join_player(&room, "c-a", "A").await;

    organizer.send(ClientMessage::StartGame).await;
    organizer.send(ClientMessage::NextQuestion).await;
    let opened = alice
        .recv_until(|e| matches!(e, ServerMessage::Question(_)))
        .await;
    match opened {
        ServerMessage::Question(open) => assert!(open.is_bonus),
        _ => unreachable!(),
    }

    // Answer at half time: base 750, bonus x2.
    ticks_until(&mut alice, 5).await;
    alice.send(answer(1)).await;
    let result = alice
        .recv_until(|e| matches!(e, ServerMessage::AnswerResult(_)))
        .await;
    match result {
        ServerMessage::AnswerResult(r) => {
            assert!(r.is_bonus);
            assert_eq!(r.points, 1500);
        }
        _ => unreachable!(),
    }
}

// ---------------------------------------------------------------------------
// Seed scenario 5: power-ups
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn double_points_power_up_doubles_score() {
    let room = open_room(four_option_quiz(1, &[]), 10, AppConfig::default());
    let organizer = connect_organizer(&room, "org").await;
    let mut alice = join_player(&room, "c-a", "A").await;

    organizer.send(ClientMessage::StartGame).await;
    organizer.send(ClientMessage::NextQuestion).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::Question(_)))
        .await;

    alice
        .send(ClientMessage::UsePowerUp {
            power_up: PowerUpKind::DoublePoints,
        })
        .await;
    let activated = alice
        .recv_until(|e| matches!(e, ServerMessage::PowerUpActivated { .. }))
        .await;
    match activated {
        ServerMessage::PowerUpActivated {
            power_up,
            remove_indices,
        } => {
            assert_eq!(power_up, PowerUpKind::DoublePoints);
            assert!(remove_indices.is_none());
        }
        _ => unreachable!(),
    }

    alice.send(answer(1)).await;
    let result = alice
        .recv_until(|e| matches!(e, ServerMessage::AnswerResult(_)))
        .await;
    match result {
        ServerMessage::AnswerResult(r) => {
            assert_eq!(r.points, 2000);
            assert_eq!(r.multiplier, 2.0);
        }
        _ => unreachable!(),
    }
}

#[tokio::test(start_paused = true)]
async fn fifty_fifty_hides_two_wrong_options() {
    let room = open_room(four_option_quiz(1, &[]), 10, AppConfig::default());
    let organizer = connect_organizer(&room, "org").await;
    let mut alice = join_player(&room, "c-a", "A").await;

    organizer.send(ClientMessage::StartGame).await;
    organizer.send(ClientMessage::NextQuestion).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::Question(_)))
        .await;

    alice
        .send(ClientMessage::UsePowerUp {
            power_up: PowerUpKind::FiftyFifty,
        })
        .await;
    let activated = alice
        .recv_until(|e| matches!(e, ServerMessage::PowerUpActivated { .. }))
        .await;
    match activated {
        ServerMessage::PowerUpActivated { remove_indices, .. } => {
            let removed = remove_indices.expect("fifty-fifty carries indices");
            assert_eq!(removed.len(), 2);
            assert!(!removed.contains(&1), "correct index must survive");
            assert!(removed.iter().all(|&i| i < 4));
        }
        _ => unreachable!(),
    }

    // Second use in the same game is refused.
    alice
        .send(ClientMessage::UsePowerUp {
            power_up: PowerUpKind::FiftyFifty,
        })
        .await;
    let err = alice
        .recv_until(|e| matches!(e, ServerMessage::Error { .. }))
        .await;
    match err {
        ServerMessage::Error { message } => assert!(message.contains("already used")),
        _ => unreachable!(),
    }
}

#[tokio::test(start_paused = true)]
async fn fifty_fifty_rejected_on_two_option_question() {
    let quiz = QuizSnapshot::with_bonus(
        "True or false".into(),
        vec![
            question(1, "The sky is blue.", &["True", "False"], 0),
            question(2, "Pick one.", &["A", "B", "C", "D"], 1),
        ],
        HashSet::new(),
    );
    let room = open_room(quiz, 10, AppConfig::default());
    let organizer = connect_organizer(&room, "org").await;
    let mut alice = join_player(&room, "c-a", "A").await;

    organizer.send(ClientMessage::StartGame).await;
    organizer.send(ClientMessage::NextQuestion).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::Question(_)))
        .await;

    alice
        .send(ClientMessage::UsePowerUp {
            power_up: PowerUpKind::FiftyFifty,
        })
        .await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::Error { .. }))
        .await;

    // The power-up was not consumed: it works on the next four-option
    // question.
    alice.send(answer(0)).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::QuestionOver(_)))
        .await;
    organizer.send(ClientMessage::NextQuestion).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::Question(_)))
        .await;
    alice
        .send(ClientMessage::UsePowerUp {
            power_up: PowerUpKind::FiftyFifty,
        })
        .await;
    let activated = alice
        .recv_until(|e| matches!(e, ServerMessage::PowerUpActivated { .. }))
        .await;
    assert!(matches!(
        activated,
        ServerMessage::PowerUpActivated {
            remove_indices: Some(_),
            ..
        }
    ));
}

// ---------------------------------------------------------------------------
// Seed scenario 6: organizer reconnect mid-question
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn organizer_reconnects_within_grace_mid_question() {
    let room = open_room(four_option_quiz(1, &[]), 15, AppConfig::default());
    let organizer = connect_organizer(&room, "org-1").await;
    let mut alice = join_player(&room, "c-a", "A").await;

    organizer.send(ClientMessage::StartGame).await;
    organizer.send(ClientMessage::NextQuestion).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::Question(_)))
        .await;
    alice.send(answer(1)).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::AnswerResult(_)))
        .await;

    // Connection drops at t = 5.
    ticks_until(&mut alice, 10).await;
    organizer.disconnect().await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::OrganizerDisconnected))
        .await;

    // Reconnect with the token at t = 8.
    ticks_until(&mut alice, 7).await;
    let mut organizer = connect(
        &room,
        "org-2",
        ConnectRole::Organizer {
            token: room.organizer_token.clone(),
        },
    )
    .await;
    let sync = organizer
        .recv_until(|e| matches!(e, ServerMessage::OrganizerReconnected(_)))
        .await;
    match sync {
        ServerMessage::OrganizerReconnected(sync) => {
            assert_eq!(sync.state, PhaseName::Question);
            assert_eq!(sync.question_number, Some(1));
            assert_eq!(sync.answered_count, 1);
            let remaining = sync.time_remaining.unwrap();
            assert!((6..=8).contains(&remaining), "remaining = {remaining}");
            assert_eq!(sync.leaderboard.len(), 1);
            assert_eq!(sync.quiz.questions[0].answer_index, 1);
        }
        _ => unreachable!(),
    }
    alice
        .recv_until(|e| matches!(e, ServerMessage::HostReconnected))
        .await;

    // The question still expires on its original deadline and no close ever
    // happens.
    let over = alice
        .recv_until(|e| {
            matches!(
                e,
                ServerMessage::QuestionOver(_) | ServerMessage::RoomClosed { .. }
            )
        })
        .await;
    assert!(matches!(over, ServerMessage::QuestionOver(_)));
    assert!(room.directory.lookup(&room.code).is_some());
}

#[tokio::test(start_paused = true)]
async fn organizer_grace_expiry_closes_room_once() {
    let room = open_room(four_option_quiz(1, &[]), 10, AppConfig::default());
    let organizer = connect_organizer(&room, "org").await;
    let mut alice = join_player(&room, "c-a", "A").await;

    organizer.disconnect().await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::OrganizerDisconnected))
        .await;

    let closed = alice
        .recv_until(|e| matches!(e, ServerMessage::RoomClosed { .. }))
        .await;
    match closed {
        ServerMessage::RoomClosed { reason } => assert!(reason.contains("Organizer")),
        _ => unreachable!(),
    }

    // Exactly one close, then the subscriber queue shuts down.
    loop {
        match alice.rx.recv().await {
            Some(Outbound::Event(ServerMessage::RoomClosed { .. })) => {
                panic!("ROOM_CLOSED emitted twice")
            }
            Some(Outbound::Event(_)) => continue,
            Some(Outbound::Close) | None => break,
        }
    }

    // And the directory forgets the room.
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(room.directory.lookup(&room.code).is_none());
}

// ---------------------------------------------------------------------------
// P1 / P2: at-most-once scoring, monotonicity, reset
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn duplicate_answers_are_ignored() {
    let room = open_room(four_option_quiz(1, &[]), 10, AppConfig::default());
    let organizer = connect_organizer(&room, "org").await;
    let mut alice = join_player(&room, "c-a", "A").await;
    let _bob = join_player(&room, "c-b", "B").await;

    organizer.send(ClientMessage::StartGame).await;
    organizer.send(ClientMessage::NextQuestion).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::Question(_)))
        .await;

    alice.send(answer(1)).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::AnswerResult(_)))
        .await;
    // A flood of retries from the same player changes nothing.
    for _ in 0..5 {
        alice.send(answer(1)).await;
    }

    let over = alice
        .recv_until(|e| {
            matches!(
                e,
                ServerMessage::QuestionOver(_) | ServerMessage::AnswerResult(_)
            )
        })
        .await;
    match over {
        ServerMessage::QuestionOver(closed) => {
            let row = closed.leaderboard.iter().find(|e| e.nickname == "A").unwrap();
            assert_eq!(row.score, 1000);
        }
        ServerMessage::AnswerResult(_) => panic!("second answer was scored"),
        _ => unreachable!(),
    }
}

#[tokio::test(start_paused = true)]
async fn reset_room_zeroes_scores_and_keeps_players() {
    let room = open_room(four_option_quiz(1, &[]), 10, AppConfig::default());
    let organizer = connect_organizer(&room, "org").await;
    let mut alice = join_player(&room, "c-a", "A").await;

    organizer.send(ClientMessage::StartGame).await;
    organizer.send(ClientMessage::NextQuestion).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::Question(_)))
        .await;
    alice.send(answer(1)).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::QuestionOver(_)))
        .await;
    organizer.send(ClientMessage::NextQuestion).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::Podium(_)))
        .await;

    organizer
        .send(ClientMessage::ResetRoom {
            quiz_data: None,
            time_limit: None,
        })
        .await;
    let reset = alice
        .recv_until(|e| matches!(e, ServerMessage::RoomReset { .. }))
        .await;
    match reset {
        ServerMessage::RoomReset {
            players,
            player_count,
        } => {
            assert_eq!(player_count, 1);
            assert_eq!(players[0].nickname, "A");
        }
        _ => unreachable!(),
    }

    // A fresh game starts from zero.
    organizer.send(ClientMessage::StartGame).await;
    organizer.send(ClientMessage::NextQuestion).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::Question(_)))
        .await;
    alice.send(answer(1)).await;
    let over = alice
        .recv_until(|e| matches!(e, ServerMessage::QuestionOver(_)))
        .await;
    match over {
        ServerMessage::QuestionOver(closed) => {
            assert_eq!(closed.leaderboard[0].score, 1000);
        }
        _ => unreachable!(),
    }
}

// ---------------------------------------------------------------------------
// P4: per-subscriber ordering and bounded-queue overflow
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn countdown_is_delivered_in_order() {
    let room = open_room(four_option_quiz(1, &[]), 5, AppConfig::default());
    let organizer = connect_organizer(&room, "org").await;
    let mut alice = join_player(&room, "c-a", "A").await;

    organizer.send(ClientMessage::StartGame).await;
    organizer.send(ClientMessage::NextQuestion).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::Question(_)))
        .await;

    // Never answering: ticks 4..1, the final zero tick, then the reveal.
    let mut seen = Vec::new();
    loop {
        match alice.recv().await {
            ServerMessage::Timer { remaining } => seen.push(remaining),
            ServerMessage::QuestionOver(_) => break,
            other => panic!("unexpected frame during countdown: {other:?}"),
        }
    }
    assert_eq!(seen, vec![4, 3, 2, 1, 0]);
}

#[tokio::test(start_paused = true)]
async fn slow_spectator_is_dropped_without_stalling_the_room() {
    let room = open_room(four_option_quiz(2, &[]), 5, AppConfig::default());
    let organizer = connect_organizer(&room, "org").await;
    let mut alice = join_player(&room, "c-a", "A").await;
    // Queue depth 1 and never read: overflows on the first burst.
    let mut spectator =
        connect_with_capacity(&room, "spec", ConnectRole::Spectator, 1).await;

    organizer.send(ClientMessage::StartGame).await;
    organizer.send(ClientMessage::NextQuestion).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::Question(_)))
        .await;
    alice.send(answer(1)).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::QuestionOver(_)))
        .await;

    // The spectator observed a prefix of the published events and was then
    // cut off; the game itself kept going.
    let mut received = 0;
    while let Some(item) = spectator.rx.recv().await {
        match item {
            Outbound::Event(_) => received += 1,
            Outbound::Close => break,
        }
    }
    assert!(received <= 1);

    organizer.send(ClientMessage::NextQuestion).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::Question(_)))
        .await;
}

// ---------------------------------------------------------------------------
// P5: player reconnect consistency
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn player_reconnect_restores_score_and_question() {
    let room = open_room(four_option_quiz(2, &[]), 10, AppConfig::default());
    let organizer = connect_organizer(&room, "org").await;
    let mut alice = join_player(&room, "c-a", "A").await;
    let mut bob = join_player(&room, "c-b", "B").await;

    organizer.send(ClientMessage::StartGame).await;
    organizer.send(ClientMessage::NextQuestion).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::Question(_)))
        .await;
    alice.send(answer(1)).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::AnswerResult(_)))
        .await;

    // Alice drops mid-question and rejoins from a new connection.
    alice.disconnect().await;
    bob.recv_until(|e| matches!(e, ServerMessage::PlayerDisconnected(_)))
        .await;

    ticks_until(&mut bob, 6).await;
    let mut alice2 = connect(&room, "c-a2", ConnectRole::Player).await;
    alice2
        .send(ClientMessage::Join {
            nickname: "A".into(),
            avatar: String::new(),
            team: None,
        })
        .await;
    let sync = alice2
        .recv_until(|e| matches!(e, ServerMessage::Reconnected(_)))
        .await;
    match sync {
        ServerMessage::Reconnected(sync) => {
            assert_eq!(sync.nickname, "A");
            assert_eq!(sync.score, 1000);
            assert_eq!(sync.streak, 1);
            assert_eq!(sync.question_number, Some(1));
            let remaining = sync.time_remaining.unwrap();
            assert!((5..=7).contains(&remaining), "remaining = {remaining}");
            let question = sync.question.expect("mid-question sync carries the question");
            assert_eq!(question.options.len(), 4);
        }
        _ => unreachable!(),
    }
}

#[tokio::test(start_paused = true)]
async fn nickname_takeover_kicks_the_old_connection() {
    let room = open_room(four_option_quiz(1, &[]), 10, AppConfig::default());
    let organizer = connect_organizer(&room, "org").await;
    let mut alice = join_player(&room, "c-a", "A").await;

    organizer.send(ClientMessage::StartGame).await;
    organizer.send(ClientMessage::NextQuestion).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::Question(_)))
        .await;
    alice.send(answer(1)).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::AnswerResult(_)))
        .await;

    let mut alice2 = connect(&room, "c-a2", ConnectRole::Player).await;
    alice2
        .send(ClientMessage::Join {
            nickname: "A".into(),
            avatar: String::new(),
            team: None,
        })
        .await;

    // The old connection sees KICKED and then its queue closes.
    let kicked = alice
        .recv_until(|e| matches!(e, ServerMessage::Kicked { .. }))
        .await;
    assert!(matches!(kicked, ServerMessage::Kicked { .. }));
    loop {
        match alice.rx.recv().await {
            Some(Outbound::Close) | None => break,
            Some(Outbound::Event(_)) => continue,
        }
    }

    // The new connection owns the record, answered status included: a fresh
    // answer attempt is a duplicate.
    let sync = alice2
        .recv_until(|e| matches!(e, ServerMessage::Reconnected(_)))
        .await;
    match sync {
        ServerMessage::Reconnected(sync) => assert_eq!(sync.score, 1000),
        _ => unreachable!(),
    }
    alice2.send(answer(1)).await;
    let next = timeout(Duration::from_secs(2), alice2.rx.recv()).await;
    if let Ok(Some(Outbound::Event(ServerMessage::AnswerResult(_)))) = next {
        panic!("takeover allowed a second scored answer");
    }
}

// ---------------------------------------------------------------------------
// P7: room TTL
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn idle_room_expires_and_is_evicted() {
    let config = AppConfig {
        room_ttl: Duration::from_secs(120),
        ..AppConfig::default()
    };
    let room = open_room(four_option_quiz(1, &[]), 10, config);
    assert!(room.directory.lookup(&room.code).is_some());

    time::sleep(Duration::from_secs(121)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(room.directory.lookup(&room.code).is_none());
}

#[tokio::test(start_paused = true)]
async fn active_room_outlives_the_ttl() {
    let config = AppConfig {
        room_ttl: Duration::from_secs(120),
        ..AppConfig::default()
    };
    let room = open_room(four_option_quiz(1, &[]), 10, config);
    let organizer = connect_organizer(&room, "org").await;

    // Keep the room busy past several TTL windows.
    for _ in 0..4 {
        time::sleep(Duration::from_secs(100)).await;
        organizer
            .send(ClientMessage::SetTimeLimit { time_limit: 20 })
            .await;
    }
    assert!(room.directory.lookup(&room.code).is_some());
}

// ---------------------------------------------------------------------------
// P8: rank changes across questions
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn rank_changes_reflect_overtakes() {
    let room = open_room(four_option_quiz(2, &[]), 10, AppConfig::default());
    let organizer = connect_organizer(&room, "org").await;
    let mut alice = join_player(&room, "c-a", "A").await;
    let mut bob = join_player(&room, "c-b", "B").await;

    organizer.send(ClientMessage::StartGame).await;

    // Q1: only Bob scores.
    organizer.send(ClientMessage::NextQuestion).await;
    bob.recv_until(|e| matches!(e, ServerMessage::Question(_)))
        .await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::Question(_)))
        .await;
    bob.send(answer(1)).await;
    alice.send(answer(0)).await;
    let over = alice
        .recv_until(|e| matches!(e, ServerMessage::QuestionOver(_)))
        .await;
    match over {
        ServerMessage::QuestionOver(closed) => {
            assert_eq!(closed.leaderboard[0].nickname, "B");
        }
        _ => unreachable!(),
    }

    // Q2: only Alice scores, with a streak-free 1000 plus nothing for Bob.
    organizer.send(ClientMessage::NextQuestion).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::Question(_)))
        .await;
    bob.recv_until(|e| matches!(e, ServerMessage::Question(_)))
        .await;
    alice.send(answer(1)).await;
    bob.send(answer(0)).await;
    let over = alice
        .recv_until(|e| matches!(e, ServerMessage::QuestionOver(_)))
        .await;
    match over {
        ServerMessage::QuestionOver(closed) => {
            let alice_row = closed.leaderboard.iter().find(|e| e.nickname == "A").unwrap();
            let bob_row = closed.leaderboard.iter().find(|e| e.nickname == "B").unwrap();
            // Tie at 1000: nickname break puts A first; A rose from 2 to 1.
            assert_eq!(alice_row.rank, 1);
            assert_eq!(alice_row.rank_change, 1);
            assert_eq!(bob_row.rank, 2);
            assert_eq!(bob_row.rank_change, -1);
        }
        _ => unreachable!(),
    }
}

// ---------------------------------------------------------------------------
// Admission, authorization, and command guards
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn bad_organizer_token_is_rejected_and_closed() {
    let room = open_room(four_option_quiz(1, &[]), 10, AppConfig::default());
    let mut impostor = connect(
        &room,
        "mallory",
        ConnectRole::Organizer {
            token: "not-the-token".into(),
        },
    )
    .await;

    match impostor.recv_outbound().await {
        Outbound::Event(ServerMessage::Error { message }) => {
            assert!(message.contains("token"));
        }
        other => panic!("expected ERROR, got {other:?}"),
    }
    assert!(matches!(impostor.recv_outbound().await, Outbound::Close));
}

#[tokio::test(start_paused = true)]
async fn join_is_refused_when_room_is_full() {
    let config = AppConfig {
        max_players_per_room: 1,
        ..AppConfig::default()
    };
    let room = open_room(four_option_quiz(1, &[]), 10, config);
    let _organizer = connect_organizer(&room, "org").await;
    let _alice = join_player(&room, "c-a", "A").await;

    let mut bob = connect(&room, "c-b", ConnectRole::Player).await;
    bob.send(ClientMessage::Join {
        nickname: "B".into(),
        avatar: String::new(),
        team: None,
    })
    .await;
    match bob.recv().await {
        ServerMessage::Error { message } => assert!(message.contains("full")),
        other => panic!("expected ERROR, got {other:?}"),
    }
    loop {
        match bob.rx.recv().await {
            Some(Outbound::Close) | None => break,
            Some(Outbound::Event(_)) => continue,
        }
    }
}

#[tokio::test(start_paused = true)]
async fn invalid_commands_keep_the_connection_open() {
    let room = open_room(four_option_quiz(1, &[]), 10, AppConfig::default());
    let _organizer = connect_organizer(&room, "org").await;
    let mut alice = connect(&room, "c-a", ConnectRole::Player).await;

    // Answering before joining, and joining with a blank nickname, both
    // produce ERROR frames without dropping the connection.
    alice.send(answer(0)).await;
    assert!(matches!(alice.recv().await, ServerMessage::Error { .. }));
    alice
        .send(ClientMessage::Join {
            nickname: "   ".into(),
            avatar: String::new(),
            team: None,
        })
        .await;
    assert!(matches!(alice.recv().await, ServerMessage::Error { .. }));

    // A proper join still succeeds afterwards.
    alice
        .send(ClientMessage::Join {
            nickname: "<b>Alice</b>".into(),
            avatar: String::new(),
            team: None,
        })
        .await;
    let joined = alice
        .recv_until(|e| matches!(e, ServerMessage::JoinedRoom(_)))
        .await;
    match joined {
        ServerMessage::JoinedRoom(sync) => assert_eq!(sync.nickname, "Alice"),
        _ => unreachable!(),
    }
}

#[tokio::test(start_paused = true)]
async fn player_cannot_drive_the_game() {
    let room = open_room(four_option_quiz(1, &[]), 10, AppConfig::default());
    let _organizer = connect_organizer(&room, "org").await;
    let mut alice = join_player(&room, "c-a", "A").await;

    alice.send(ClientMessage::StartGame).await;
    let err = alice
        .recv_until(|e| matches!(e, ServerMessage::Error { .. }))
        .await;
    assert!(matches!(err, ServerMessage::Error { .. }));
    alice.send(ClientMessage::NextQuestion).await;
    let err = alice
        .recv_until(|e| matches!(e, ServerMessage::Error { .. }))
        .await;
    assert!(matches!(err, ServerMessage::Error { .. }));
}

#[tokio::test(start_paused = true)]
async fn spectator_gets_sync_and_public_events_only() {
    let room = open_room(four_option_quiz(1, &[]), 10, AppConfig::default());
    let organizer = connect_organizer(&room, "org").await;
    let mut alice = join_player(&room, "c-a", "A").await;
    let _bob = join_player(&room, "c-b", "B").await;

    organizer.send(ClientMessage::StartGame).await;
    organizer.send(ClientMessage::NextQuestion).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::Question(_)))
        .await;

    // A spectator connecting mid-question sees the live state.
    let mut spectator = connect(&room, "spec", ConnectRole::Spectator).await;
    let sync = spectator
        .recv_until(|e| matches!(e, ServerMessage::SpectatorSync(_)))
        .await;
    match sync {
        ServerMessage::SpectatorSync(sync) => {
            assert_eq!(sync.player_count, 2);
            assert_eq!(sync.question_number, Some(1));
            assert!(sync.question.is_some());
            assert!(sync.time_remaining.is_some());
        }
        _ => unreachable!(),
    }

    // Alice's private result never reaches the spectator; the shared answer
    // count does.
    alice.send(answer(1)).await;
    let event = spectator
        .recv_until(|e| {
            matches!(
                e,
                ServerMessage::AnswerCount { .. } | ServerMessage::AnswerResult(_)
            )
        })
        .await;
    match event {
        ServerMessage::AnswerCount {
            answered,
            player_count,
        } => {
            assert_eq!(answered, 1);
            assert_eq!(player_count, 2);
        }
        ServerMessage::AnswerResult(_) => panic!("private event leaked to a spectator"),
        _ => unreachable!(),
    }
}

#[tokio::test(start_paused = true)]
async fn end_quiz_short_circuits_to_podium() {
    let room = open_room(four_option_quiz(3, &[]), 10, AppConfig::default());
    let organizer = connect_organizer(&room, "org").await;
    let mut alice = join_player(&room, "c-a", "A").await;

    organizer.send(ClientMessage::StartGame).await;
    organizer.send(ClientMessage::NextQuestion).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::Question(_)))
        .await;

    organizer.send(ClientMessage::EndQuiz).await;
    let podium = alice
        .recv_until(|e| matches!(e, ServerMessage::Podium(_)))
        .await;
    assert!(matches!(podium, ServerMessage::Podium(_)));
}

#[tokio::test(start_paused = true)]
async fn mid_game_joiner_gets_the_live_question() {
    let room = open_room(four_option_quiz(1, &[]), 10, AppConfig::default());
    let organizer = connect_organizer(&room, "org").await;
    let mut alice = join_player(&room, "c-a", "A").await;

    organizer.send(ClientMessage::StartGame).await;
    organizer.send(ClientMessage::NextQuestion).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::Question(_)))
        .await;
    ticks_until(&mut alice, 7).await;

    let mut carol = connect(&room, "c-c", ConnectRole::Player).await;
    carol
        .send(ClientMessage::Join {
            nickname: "Carol".into(),
            avatar: String::new(),
            team: None,
        })
        .await;
    let joined = carol
        .recv_until(|e| matches!(e, ServerMessage::JoinedRoom(_)))
        .await;
    match joined {
        ServerMessage::JoinedRoom(sync) => {
            assert_eq!(sync.question_number, Some(1));
            let remaining = sync.time_remaining.unwrap();
            assert!((6..=8).contains(&remaining), "remaining = {remaining}");
            assert!(sync.question.is_some());
        }
        _ => unreachable!(),
    }
}

#[tokio::test(start_paused = true)]
async fn podium_carries_team_standings() {
    let room = open_room(four_option_quiz(1, &[]), 10, AppConfig::default());
    let organizer = connect_organizer(&room, "org").await;

    let mut alice = connect(&room, "c-a", ConnectRole::Player).await;
    alice
        .send(ClientMessage::Join {
            nickname: "A".into(),
            avatar: String::new(),
            team: Some("Red".into()),
        })
        .await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::JoinedRoom(_)))
        .await;
    let mut bob = connect(&room, "c-b", ConnectRole::Player).await;
    bob.send(ClientMessage::Join {
        nickname: "B".into(),
        avatar: String::new(),
        team: Some("Blue".into()),
    })
    .await;
    bob.recv_until(|e| matches!(e, ServerMessage::JoinedRoom(_)))
        .await;

    organizer.send(ClientMessage::StartGame).await;
    organizer.send(ClientMessage::NextQuestion).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::Question(_)))
        .await;
    bob.recv_until(|e| matches!(e, ServerMessage::Question(_)))
        .await;
    alice.send(answer(1)).await;
    bob.send(answer(0)).await;
    alice
        .recv_until(|e| matches!(e, ServerMessage::QuestionOver(_)))
        .await;

    organizer.send(ClientMessage::NextQuestion).await;
    let podium = bob
        .recv_until(|e| matches!(e, ServerMessage::Podium(_)))
        .await;
    match podium {
        ServerMessage::Podium(standings) => {
            assert_eq!(standings.team_leaderboard.len(), 2);
            assert_eq!(standings.team_leaderboard[0].team, "Red");
            assert_eq!(standings.team_leaderboard[1].team, "Blue");
        }
        _ => unreachable!(),
    }
}
