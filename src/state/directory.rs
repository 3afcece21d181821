//! Process-wide index of live rooms; the only structure shared across rooms.

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::mpsc;

use crate::{
    config::{MAX_ROOM_CODE_ATTEMPTS, ROOM_CODE_LENGTH},
    error::ServiceError,
    services::room_actor::RoomCommand,
};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Cheap handle to a live room task.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    /// Join code.
    pub code: String,
    /// Secret proving organizer identity.
    pub organizer_token: String,
    /// Command queue of the room task.
    pub commands: mpsc::Sender<RoomCommand>,
}

/// Directory from room code to room handle.
#[derive(Debug)]
pub struct RoomDirectory {
    rooms: DashMap<String, RoomHandle>,
    max_rooms: usize,
}

impl RoomDirectory {
    pub fn new(max_rooms: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            max_rooms,
        }
    }

    /// Number of live rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Whether room creation should be refused.
    pub fn at_capacity(&self) -> bool {
        self.rooms.len() >= self.max_rooms
    }

    /// Generate a collision-free 6-character uppercase base-36 code.
    pub fn generate_code(&self) -> Result<String, ServiceError> {
        let mut rng = rand::rng();
        for _ in 0..MAX_ROOM_CODE_ATTEMPTS {
            let code: String = (0..ROOM_CODE_LENGTH)
                .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
                .collect();
            if !self.rooms.contains_key(&code) {
                return Ok(code);
            }
        }
        Err(ServiceError::Overloaded(
            "could not allocate a unique room code".into(),
        ))
    }

    /// Install a handle under its code.
    pub fn register(&self, handle: RoomHandle) {
        self.rooms.insert(handle.code.clone(), handle);
    }

    /// Look up a room by code.
    pub fn lookup(&self, code: &str) -> Option<RoomHandle> {
        self.rooms.get(code).map(|entry| entry.value().clone())
    }

    /// Drop a room from the index. Idempotent; called by the room task as it
    /// winds down.
    pub fn evict(&self, code: &str) {
        self.rooms.remove(code);
    }
}
