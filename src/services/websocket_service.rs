//! Connection adapter: terminates one WebSocket, parses inbound frames into
//! room commands, and drains the bounded outbound queue onto the wire.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use serde::Deserialize;
use tokio::{
    sync::mpsc,
    time::{self, Duration, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    config::MAX_WS_MESSAGE_SIZE,
    dto::ws::{ClientMessage, ServerMessage},
    services::{
        events::Outbound,
        room_actor::{ConnectRole, RoomCommand},
    },
    state::SharedState,
};

/// Query parameters of the realtime endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct WsQuery {
    /// Claim the organizer role; requires `token`.
    #[serde(default)]
    pub organizer: bool,
    /// Attach as a read-only spectator.
    #[serde(default)]
    pub spectator: bool,
    /// Organizer token handed out at room creation.
    #[serde(default)]
    pub token: Option<String>,
}

impl WsQuery {
    fn role(&self) -> ConnectRole {
        if self.organizer {
            ConnectRole::Organizer {
                token: self.token.clone().unwrap_or_default(),
            }
        } else if self.spectator {
            ConnectRole::Spectator
        } else {
            ConnectRole::Player
        }
    }
}

/// Handle the full lifecycle of one realtime connection.
pub async fn handle_socket(
    state: SharedState,
    mut socket: WebSocket,
    room_code: String,
    client_id: String,
    query: WsQuery,
) {
    let Some(room) = state.directory().lookup(&room_code) else {
        debug!(room = %room_code, client = %client_id, "connection to unknown room");
        send_direct(&mut socket, &ServerMessage::error("Room not found")).await;
        let _ = socket.send(Message::Close(None)).await;
        return;
    };

    let (sender, mut receiver) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel(state.config().outbound_queue_size.max(1));

    // The writer task owns the sink; the room enqueues, the writer drains.
    let pongs = Arc::new(AtomicU64::new(0));
    let mut writer_task = tokio::spawn(write_loop(
        sender,
        outbound_rx,
        state.config().heartbeat_interval,
        pongs.clone(),
    ));
    let mut writer_done = false;

    if room
        .commands
        .send(RoomCommand::Connect {
            client_id: client_id.clone(),
            role: query.role(),
            tx: outbound_tx,
        })
        .await
        .is_err()
    {
        let _ = writer_task.await;
        return;
    }
    info!(room = %room_code, client = %client_id, "connection attached");

    loop {
        tokio::select! {
            _ = &mut writer_task, if !writer_done => {
                writer_done = true;
                break;
            }
            maybe = receiver.next() => match maybe {
                Some(Ok(Message::Text(text))) => {
                    let command = if text.len() > MAX_WS_MESSAGE_SIZE {
                        RoomCommand::Malformed {
                            client_id: client_id.clone(),
                            reason: "frame too large".into(),
                        }
                    } else {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(message) => RoomCommand::Frame {
                                client_id: client_id.clone(),
                                message,
                            },
                            Err(err) => RoomCommand::Malformed {
                                client_id: client_id.clone(),
                                reason: err.to_string(),
                            },
                        }
                    };
                    if room.commands.send(command).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Pong(_))) => {
                    pongs.fetch_add(1, Ordering::Relaxed);
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(room = %room_code, client = %client_id, error = %err, "websocket error");
                    break;
                }
            },
        }
    }

    // The close is a command like any other: it lands after every frame this
    // connection already enqueued.
    let _ = room
        .commands
        .send(RoomCommand::Disconnect {
            client_id: client_id.clone(),
        })
        .await;
    if !writer_done {
        let _ = writer_task.await;
    }
    info!(room = %room_code, client = %client_id, "connection closed");
}

/// Drain the outbound queue onto the socket, pinging on a fixed cadence.
/// Two heartbeat intervals without a pong close the connection.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Outbound>,
    heartbeat: Duration,
    pongs: Arc<AtomicU64>,
) {
    let mut ticker = time::interval(heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    let mut seen_pongs = 0u64;
    let mut strikes = 0u8;

    loop {
        tokio::select! {
            maybe = outbound.recv() => match maybe {
                Some(Outbound::Event(event)) => {
                    let payload = match serde_json::to_string(&event) {
                        Ok(payload) => payload,
                        Err(err) => {
                            warn!(error = %err, "failed to serialize outbound event");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                let current = pongs.load(Ordering::Relaxed);
                if current == seen_pongs {
                    strikes += 1;
                } else {
                    seen_pongs = current;
                    strikes = 0;
                }
                if strikes >= 2 {
                    debug!("missed pongs, closing connection");
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                if sink.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Push one frame on a socket that never attached to a room.
async fn send_direct(socket: &mut WebSocket, message: &ServerMessage) {
    match serde_json::to_string(message) {
        Ok(payload) => {
            let _ = socket.send(Message::Text(payload.into())).await;
        }
        Err(err) => warn!(error = %err, "failed to serialize direct frame"),
    }
}
