//! Per-room event bus: audience-classed subscribers behind bounded queues.
//!
//! Fan-out never performs network I/O; each subscriber owns a bounded
//! `mpsc` queue drained by its connection writer task. A subscriber whose
//! queue overflows is reported back to the caller and must be treated as
//! disconnected, so one slow consumer cannot stall the room.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::dto::ws::ServerMessage;

/// Item travelling through a subscriber queue.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A serializable event frame.
    Event(ServerMessage),
    /// Flush-and-close sentinel; the writer closes the transport after it.
    Close,
}

/// Sending half of a subscriber queue.
pub type EventSender = mpsc::Sender<Outbound>;

/// Audience class of a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Organizer,
    Player,
    Spectator,
}

/// A registered outbound connection.
#[derive(Debug)]
pub struct Subscriber {
    pub role: Role,
    tx: EventSender,
}

impl Subscriber {
    fn push(&self, message: &ServerMessage) -> bool {
        self.tx.try_send(Outbound::Event(message.clone())).is_ok()
    }

    /// Ask the writer task to flush and close the transport.
    pub fn close(&self) {
        let _ = self.tx.try_send(Outbound::Close);
    }
}

/// Registry of a room's outbound connections keyed by client id.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: HashMap<String, Subscriber>,
    organizer: Option<String>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. The organizer slot is a singleton; the caller
    /// must displace any previous organizer first.
    pub fn subscribe(&mut self, client_id: String, role: Role, tx: EventSender) {
        if role == Role::Organizer {
            self.organizer = Some(client_id.clone());
        }
        self.subscribers.insert(client_id, Subscriber { role, tx });
    }

    /// Remove a connection, returning its subscriber for a final close.
    pub fn unsubscribe(&mut self, client_id: &str) -> Option<Subscriber> {
        if self.organizer.as_deref() == Some(client_id) {
            self.organizer = None;
        }
        self.subscribers.remove(client_id)
    }

    /// Client id currently holding the organizer slot.
    pub fn organizer_client(&self) -> Option<&str> {
        self.organizer.as_deref()
    }

    pub fn is_organizer(&self, client_id: &str) -> bool {
        self.organizer.as_deref() == Some(client_id)
    }

    pub fn role_of(&self, client_id: &str) -> Option<Role> {
        self.subscribers.get(client_id).map(|s| s.role)
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.subscribers.contains_key(client_id)
    }

    /// Deliver to one client. Returns `false` when the queue is full or the
    /// writer is gone; the caller must then drop the connection.
    pub fn send_to(&self, client_id: &str, message: &ServerMessage) -> bool {
        match self.subscribers.get(client_id) {
            Some(subscriber) => subscriber.push(message),
            None => false,
        }
    }

    /// Ask a single client's writer to flush and close.
    pub fn close(&self, client_id: &str) {
        if let Some(subscriber) = self.subscribers.get(client_id) {
            subscriber.close();
        }
    }

    /// Broadcast to every subscriber; returns clients whose queue rejected
    /// the event.
    pub fn broadcast(&self, message: &ServerMessage) -> Vec<String> {
        self.fan_out(message, |_| true)
    }

    /// Broadcast to players only (not the organizer, not spectators).
    pub fn broadcast_players(&self, message: &ServerMessage) -> Vec<String> {
        self.fan_out(message, |role| role == Role::Player)
    }

    /// Broadcast to the organizer and spectators (answer counts and other
    /// aggregate views players must not see ahead of the reveal).
    pub fn broadcast_watchers(&self, message: &ServerMessage) -> Vec<String> {
        self.fan_out(message, |role| role != Role::Player)
    }

    /// Broadcast to players and spectators, but not the organizer
    /// (organizer-presence notices).
    pub fn broadcast_audience(&self, message: &ServerMessage) -> Vec<String> {
        self.fan_out(message, |role| role != Role::Organizer)
    }

    /// Deliver to the organizer, if connected. Returns the organizer client
    /// id when its queue rejected the event.
    pub fn send_organizer(&self, message: &ServerMessage) -> Vec<String> {
        match &self.organizer {
            Some(client_id) if !self.send_to(client_id, message) => vec![client_id.clone()],
            _ => Vec::new(),
        }
    }

    /// Close every subscriber and drain the registry (room teardown).
    pub fn close_all(&mut self) {
        for subscriber in self.subscribers.values() {
            subscriber.close();
        }
        self.subscribers.clear();
        self.organizer = None;
    }

    fn fan_out<F>(&self, message: &ServerMessage, include: F) -> Vec<String>
    where
        F: Fn(Role) -> bool,
    {
        let mut rejected = Vec::new();
        for (client_id, subscriber) in &self.subscribers {
            if include(subscriber.role) && !subscriber.push(message) {
                rejected.push(client_id.clone());
            }
        }
        rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscriber(capacity: usize) -> (EventSender, mpsc::Receiver<Outbound>) {
        mpsc::channel(capacity)
    }

    #[tokio::test]
    async fn broadcast_respects_audience_classes() {
        let mut bus = EventBus::new();
        let (org_tx, mut org_rx) = subscriber(8);
        let (player_tx, mut player_rx) = subscriber(8);
        let (spec_tx, mut spec_rx) = subscriber(8);
        bus.subscribe("org".into(), Role::Organizer, org_tx);
        bus.subscribe("p1".into(), Role::Player, player_tx);
        bus.subscribe("s1".into(), Role::Spectator, spec_tx);

        bus.broadcast_players(&ServerMessage::GameStarting);
        assert!(matches!(
            player_rx.try_recv(),
            Ok(Outbound::Event(ServerMessage::GameStarting))
        ));
        assert!(org_rx.try_recv().is_err());
        assert!(spec_rx.try_recv().is_err());

        bus.broadcast_watchers(&ServerMessage::AnswerCount {
            answered: 1,
            player_count: 2,
        });
        assert!(org_rx.try_recv().is_ok());
        assert!(spec_rx.try_recv().is_ok());
        assert!(player_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn overflowing_subscriber_is_reported() {
        let mut bus = EventBus::new();
        let (tx, _rx) = subscriber(1);
        bus.subscribe("p1".into(), Role::Player, tx);

        assert!(bus.broadcast(&ServerMessage::GameStarting).is_empty());
        let rejected = bus.broadcast(&ServerMessage::GameStarting);
        assert_eq!(rejected, vec!["p1".to_string()]);
    }

    #[tokio::test]
    async fn unsubscribe_clears_organizer_slot() {
        let mut bus = EventBus::new();
        let (tx, _rx) = subscriber(1);
        bus.subscribe("org".into(), Role::Organizer, tx);
        assert_eq!(bus.organizer_client(), Some("org"));
        bus.unsubscribe("org");
        assert_eq!(bus.organizer_client(), None);
    }
}
