//! Process-wide configuration, read from the environment once at startup.

use std::{env, time::Duration};

use tracing::warn;

/// Maximum attempts at generating a collision-free room code.
pub const MAX_ROOM_CODE_ATTEMPTS: usize = 10;
/// Length of generated room codes.
pub const ROOM_CODE_LENGTH: usize = 6;
/// Nickname length cap, counted in characters after trimming.
pub const MAX_NICKNAME_LENGTH: usize = 20;
/// Avatar length cap, counted in code points.
pub const MAX_AVATAR_LENGTH: usize = 8;
/// Team tag length cap, counted in code points.
pub const MAX_TEAM_LENGTH: usize = 20;
/// Smallest accepted per-question time limit, in seconds.
pub const MIN_TIME_LIMIT: u64 = 5;
/// Largest accepted per-question time limit, in seconds.
pub const MAX_TIME_LIMIT: u64 = 60;
/// Fraction of questions flagged as bonus rounds at snapshot time.
pub const BONUS_ROUND_FRACTION: f64 = 0.3;
/// Inbound WebSocket frames larger than this are rejected without parsing.
pub const MAX_WS_MESSAGE_SIZE: usize = 4096;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Inactivity window after which a room is closed and evicted.
    pub room_ttl: Duration,
    /// Window during which an organizer may reconnect before the room closes.
    pub organizer_grace: Duration,
    /// Per-subscriber bounded outbound queue depth.
    pub outbound_queue_size: usize,
    /// Transport ping cadence.
    pub heartbeat_interval: Duration,
    /// Directory admission cap.
    pub max_rooms: usize,
    /// Join admission cap per room.
    pub max_players_per_room: usize,
    /// Allowed CORS origins; empty means permissive.
    pub allowed_origins: Vec<String>,
    /// Cap on stored quiz snapshots awaiting room creation.
    pub max_quizzes: usize,
    /// Age after which an unused stored quiz is evicted.
    pub quiz_ttl: Duration,
    /// Per-question time limit used when a room is created without one.
    pub default_time_limit: u64,
}

impl AppConfig {
    /// Read the configuration from environment variables, falling back to
    /// defaults and warning on unparseable values.
    pub fn from_env() -> Self {
        Self {
            room_ttl: Duration::from_secs(env_u64("ROOM_TTL_SECONDS", 1800)),
            organizer_grace: Duration::from_secs(env_u64("ORGANIZER_GRACE_SECONDS", 30)),
            outbound_queue_size: env_u64("OUTBOUND_QUEUE_SIZE", 64) as usize,
            heartbeat_interval: Duration::from_secs(env_u64("HEARTBEAT_INTERVAL_SECONDS", 15)),
            max_rooms: env_u64("MAX_ROOMS", 50) as usize,
            max_players_per_room: env_u64("MAX_PLAYERS_PER_ROOM", 100) as usize,
            allowed_origins: env_list("ALLOWED_ORIGINS"),
            max_quizzes: env_u64("MAX_QUIZZES", 100) as usize,
            quiz_ttl: Duration::from_secs(env_u64("QUIZ_TTL_SECONDS", 3600)),
            default_time_limit: env_u64("DEFAULT_TIME_LIMIT", 15)
                .clamp(MIN_TIME_LIMIT, MAX_TIME_LIMIT),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            room_ttl: Duration::from_secs(1800),
            organizer_grace: Duration::from_secs(30),
            outbound_queue_size: 64,
            heartbeat_interval: Duration::from_secs(15),
            max_rooms: 50,
            max_players_per_room: 100,
            allowed_origins: Vec::new(),
            max_quizzes: 100,
            quiz_ttl: Duration::from_secs(3600),
            default_time_limit: 15,
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    match env::var(key) {
        Ok(raw) => match raw.parse::<u64>() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, "ignoring unparseable configuration value");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_list(key: &str) -> Vec<String> {
    env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_owned)
        .collect()
}
