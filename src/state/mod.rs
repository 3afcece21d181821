pub mod directory;
pub mod participants;
pub mod quiz;
pub mod room;
pub mod state_machine;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::time::Instant;
use uuid::Uuid;

use crate::{config::AppConfig, state::directory::RoomDirectory, state::quiz::Question};

pub type SharedState = Arc<AppState>;

/// A validated quiz awaiting room creation.
#[derive(Debug, Clone)]
pub struct StoredQuiz {
    /// Display title.
    pub title: String,
    /// Parsed questions with their correct indices.
    pub questions: Vec<Question>,
    /// Import instant, used for TTL eviction.
    pub imported_at: Instant,
}

/// Central application state: configuration, the room directory, and the
/// in-memory quiz store. Room state itself is private to each room task.
pub struct AppState {
    config: Arc<AppConfig>,
    directory: Arc<RoomDirectory>,
    quizzes: DashMap<Uuid, StoredQuiz>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be
    /// cloned cheaply into handlers.
    pub fn new(config: AppConfig) -> SharedState {
        let directory = Arc::new(RoomDirectory::new(config.max_rooms));
        Arc::new(Self {
            config: Arc::new(config),
            directory,
            quizzes: DashMap::new(),
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &Arc<AppConfig> {
        &self.config
    }

    /// Process-wide room directory.
    pub fn directory(&self) -> &Arc<RoomDirectory> {
        &self.directory
    }

    /// Imported quiz snapshots keyed by handle.
    pub fn quizzes(&self) -> &DashMap<Uuid, StoredQuiz> {
        &self.quizzes
    }
}
