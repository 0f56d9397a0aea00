//! facegate-store — Durable identity registry on SQLite.

pub mod sqlite;

pub use sqlite::{SqliteEmbeddingStore, SqliteStoreConfig, SqliteStoreError, DEFAULT_BUSY_TIMEOUT_MS};
