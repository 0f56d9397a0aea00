use std::path::PathBuf;

use facegate_core::DEFAULT_THRESHOLD;
use facegate_store::DEFAULT_BUSY_TIMEOUT_MS;

/// Embedding width of the buffalo_l / ArcFace recognizer.
pub const DEFAULT_EMBEDDING_DIM: usize = 512;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Cosine similarity a query face must exceed to count as a match.
    pub similarity_threshold: f32,
    /// Embedding width every request must carry.
    pub embedding_dim: usize,
    /// How long a store call waits on another writer, in milliseconds.
    pub busy_timeout_ms: u64,
    /// Serve on the session bus instead of the system bus.
    pub session_bus: bool,
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facegate");

        let db_path = std::env::var("FACEGATE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("identities.db"));

        Self {
            db_path,
            similarity_threshold: env_threshold("FACEGATE_SIMILARITY_THRESHOLD"),
            embedding_dim: env_parse("FACEGATE_EMBEDDING_DIM", DEFAULT_EMBEDDING_DIM),
            busy_timeout_ms: env_parse("FACEGATE_BUSY_TIMEOUT_MS", DEFAULT_BUSY_TIMEOUT_MS),
            session_bus: std::env::var("FACEGATE_SESSION_BUS")
                .map(|v| v == "1")
                .unwrap_or(false),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Threshold from `key`. Non-finite values fall back to the default.
fn env_threshold(key: &str) -> f32 {
    let threshold = env_parse(key, DEFAULT_THRESHOLD);
    if threshold.is_finite() {
        threshold
    } else {
        tracing::warn!(key, value = threshold, "non-finite similarity threshold, using default");
        DEFAULT_THRESHOLD
    }
}
