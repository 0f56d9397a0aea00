//! SQLite implementation of [`EmbeddingStore`].
//!
//! Each call opens its own connection, does its work inside one transaction,
//! and closes the connection on return. Writers take `BEGIN IMMEDIATE`, which
//! holds the database write lock from the first read to the commit; this is
//! what makes [`EmbeddingStore::upsert_unless`] a single serialized step
//! across threads and processes.
//!
//! `store_meta` records the embedding width the registry holds. It is pinned
//! by the configured dimension at open or by the first write, and every later
//! write of another width is refused.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use facegate_core::store::{validate_write, EmbeddingStore, StoreError, Upsert, Veto};
use facegate_core::types::{next_update_time, Embedding, IdentityRecord, StoredEmbedding};
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension, TransactionBehavior};
use thiserror::Error;

/// Schema version written to `store_meta`.
const SCHEMA_VERSION: i64 = 2;
/// Default busy timeout (ms).
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Errors raised while opening the store. Per-call failures use [`StoreError`].
#[derive(Error, Debug)]
pub enum SqliteStoreError {
    #[error("sqlite store io error: {0}")]
    Io(String),
    #[error("sqlite store db error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    #[error("sqlite store holds {stored}-value embeddings, configured for {configured}")]
    DimensionMismatch { configured: usize, stored: usize },
}

#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// Path to the SQLite database file. Must be a file path; in-memory
    /// databases do not survive the per-call connection model.
    pub path: PathBuf,
    /// How long a call waits for another writer before reporting
    /// [`StoreError::Unavailable`].
    pub busy_timeout_ms: u64,
    /// Embedding width the caller works with. When set, opening a registry
    /// recorded at another width fails. When unset, the first write pins it.
    pub dimension: Option<usize>,
}

impl SqliteStoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            dimension: None,
        }
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }
}

/// SQLite-backed identity registry.
#[derive(Debug, Clone)]
pub struct SqliteEmbeddingStore {
    config: SqliteStoreConfig,
}

impl SqliteEmbeddingStore {
    /// Create the database if needed, switch it to WAL, and apply the schema.
    pub fn open(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        ensure_parent_dir(&config.path)?;

        let mut conn = open_connection(&config)?;
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        let dimension = initialize_schema(&mut conn, config.dimension)?;

        tracing::info!(
            path = %config.path.display(),
            journal_mode = %mode,
            dimension = ?dimension,
            "identity store opened"
        );
        Ok(Self { config })
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        open_connection(&self.config).map_err(|err| match err {
            SqliteStoreError::Db(e) => store_err(e),
            other => StoreError::Unavailable(other.to_string()),
        })
    }
}

impl EmbeddingStore for SqliteEmbeddingStore {
    fn upsert(&self, identity_id: &str, embedding: &Embedding) -> Result<bool, StoreError> {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(store_err)?;
        let created = write_row(&tx, identity_id, embedding)?;
        tx.commit().map_err(store_err)?;

        tracing::debug!(identity_id, created, "upsert committed");
        Ok(created)
    }

    fn upsert_unless(
        &self,
        identity_id: &str,
        embedding: &Embedding,
        veto: Veto<'_>,
    ) -> Result<Upsert, StoreError> {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(store_err)?;

        let rows = scan(&tx)?;
        // Dropping the transaction on any early return rolls it back.
        if let Some(conflicting_id) = veto(&rows)? {
            return Ok(Upsert::Vetoed { conflicting_id });
        }

        let created = write_row(&tx, identity_id, embedding)?;
        tx.commit().map_err(store_err)?;

        tracing::debug!(identity_id, created, scanned = rows.len(), "guarded upsert committed");
        Ok(Upsert::Written { created })
    }

    fn list_all(&self) -> Result<Vec<StoredEmbedding>, StoreError> {
        let conn = self.connect()?;
        scan(&conn)
    }

    fn get(&self, identity_id: &str) -> Result<Option<Embedding>, StoreError> {
        let conn = self.connect()?;
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT embedding, dimension FROM identities WHERE identity_id = ?1",
                params![identity_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(store_err)?;

        row.map(|(json, dim)| decode_embedding(identity_id, &json, dim))
            .transpose()
    }

    fn record(&self, identity_id: &str) -> Result<Option<IdentityRecord>, StoreError> {
        let conn = self.connect()?;
        let row: Option<(String, String, i64, String, String)> = conn
            .query_row(
                "SELECT record_id, embedding, dimension, created_at, updated_at \
                 FROM identities WHERE identity_id = ?1",
                params![identity_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()
            .map_err(store_err)?;

        let Some((record_id, json, dim, created_at, updated_at)) = row else {
            return Ok(None);
        };

        Ok(Some(IdentityRecord {
            identity_id: identity_id.to_string(),
            record_id,
            embedding: decode_embedding(identity_id, &json, dim)?,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        }))
    }

    fn delete(&self, identity_id: &str) -> Result<bool, StoreError> {
        let conn = self.connect()?;
        let removed = conn
            .execute("DELETE FROM identities WHERE identity_id = ?1", params![identity_id])
            .map_err(store_err)?;
        tracing::debug!(identity_id, removed, "delete committed");
        Ok(removed > 0)
    }

    fn count(&self) -> Result<usize, StoreError> {
        let conn = self.connect()?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM identities", [], |row| row.get(0))
            .map_err(store_err)?;
        usize::try_from(n).map_err(|_| StoreError::Corrupt(format!("negative row count {n}")))
    }
}

/// Busy, locked, and cannot-open conditions are transient unavailability;
/// everything else is an engine failure.
fn store_err(err: rusqlite::Error) -> StoreError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen) => {
            StoreError::Unavailable(err.to_string())
        }
        _ => StoreError::Db(err.to_string()),
    }
}

/// Every row ordered by `identity_id`.
fn scan(conn: &Connection) -> Result<Vec<StoredEmbedding>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT identity_id, embedding, dimension FROM identities ORDER BY identity_id")
        .map_err(store_err)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })
        .map_err(store_err)?;

    let mut out = Vec::new();
    for row in rows {
        let (identity_id, json, dim) = row.map_err(store_err)?;
        let embedding = decode_embedding(&identity_id, &json, dim)?;
        out.push(StoredEmbedding {
            identity_id,
            embedding,
        });
    }
    Ok(out)
}

/// Insert or overwrite one row. Returns `true` on insert.
///
/// Must run inside a write transaction: the width check, the pin in
/// `store_meta`, and the row write commit together.
fn write_row(conn: &Connection, identity_id: &str, embedding: &Embedding) -> Result<bool, StoreError> {
    let pinned = pinned_dimension(conn).map_err(|err| match err {
        SqliteStoreError::Db(e) => store_err(e),
        other => StoreError::Corrupt(other.to_string()),
    })?;
    validate_write(embedding, pinned)?;

    let json = serde_json::to_string(embedding).map_err(|e| StoreError::Db(format!("encode embedding: {e}")))?;
    let dim = i64::try_from(embedding.dim()).map_err(|_| StoreError::Db("embedding too long".into()))?;
    let now = Utc::now();

    if pinned.is_none() {
        conn.execute("UPDATE store_meta SET dimension = ?1", params![dim])
            .map_err(store_err)?;
    }

    let previous: Option<String> = conn
        .query_row(
            "SELECT updated_at FROM identities WHERE identity_id = ?1",
            params![identity_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(store_err)?;

    match previous {
        Some(previous) => {
            let updated_at = next_update_time(parse_timestamp(&previous)?, now);
            conn.execute(
                "UPDATE identities SET embedding = ?1, dimension = ?2, updated_at = ?3 \
                 WHERE identity_id = ?4",
                params![json, dim, format_timestamp(updated_at), identity_id],
            )
            .map_err(store_err)?;
            Ok(false)
        }
        None => {
            let stamp = format_timestamp(now);
            conn.execute(
                "INSERT INTO identities (identity_id, record_id, embedding, dimension, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![identity_id, uuid::Uuid::new_v4().to_string(), json, dim, stamp],
            )
            .map_err(store_err)?;
            Ok(true)
        }
    }
}

fn decode_embedding(identity_id: &str, json: &str, dim: i64) -> Result<Embedding, StoreError> {
    let embedding: Embedding = serde_json::from_str(json)
        .map_err(|e| StoreError::Corrupt(format!("embedding for {identity_id}: {e}")))?;
    if i64::try_from(embedding.dim()).ok() != Some(dim) {
        return Err(StoreError::Corrupt(format!(
            "embedding for {identity_id} has {} values, row says {dim}",
            embedding.dim()
        )));
    }
    Ok(embedding)
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {raw:?}: {e}")))
}

fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|e| SqliteStoreError::Io(e.to_string()))
        }
        _ => Ok(()),
    }
}

fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(&config.path, flags)?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
    Ok(conn)
}

/// Width recorded in `store_meta`, if any write or open has pinned one.
fn pinned_dimension(conn: &Connection) -> Result<Option<usize>, SqliteStoreError> {
    let raw: Option<i64> = conn
        .query_row("SELECT dimension FROM store_meta LIMIT 1", [], |row| {
            row.get::<_, Option<i64>>(0)
        })
        .optional()?
        .flatten();
    raw.map(|d| {
        usize::try_from(d).map_err(|_| SqliteStoreError::VersionMismatch(format!("invalid stored dimension: {d}")))
    })
    .transpose()
}

/// Create or upgrade the schema and reconcile the recorded embedding width
/// with `configured`. Returns the width now in force.
fn initialize_schema(conn: &mut Connection, configured: Option<usize>) -> Result<Option<usize>, SqliteStoreError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL, dimension INTEGER);")?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", [], |row| row.get(0))
        .optional()?;

    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS identities (
                    identity_id TEXT PRIMARY KEY NOT NULL,
                    record_id TEXT NOT NULL UNIQUE,
                    embedding TEXT NOT NULL,
                    dimension INTEGER NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );",
            )?;
        }
        Some(1) => {
            // Version 1 did not record the width; adopt the one its rows use.
            tx.execute_batch("ALTER TABLE store_meta ADD COLUMN dimension INTEGER;")?;
            tx.execute(
                "UPDATE store_meta SET version = ?1, \
                 dimension = (SELECT dimension FROM identities ORDER BY identity_id LIMIT 1)",
                params![SCHEMA_VERSION],
            )?;
            tracing::info!(from = 1, to = SCHEMA_VERSION, "identity store schema upgraded");
        }
        Some(v) if v == SCHEMA_VERSION => {}
        Some(v) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {v}"
            )));
        }
    }

    let dimension = match (pinned_dimension(&tx)?, configured) {
        (Some(stored), Some(configured)) if stored != configured => {
            return Err(SqliteStoreError::DimensionMismatch { configured, stored });
        }
        (None, Some(configured)) => {
            let d = i64::try_from(configured)
                .map_err(|_| SqliteStoreError::VersionMismatch(format!("invalid dimension: {configured}")))?;
            tx.execute("UPDATE store_meta SET dimension = ?1", params![d])?;
            Some(configured)
        }
        (stored, _) => stored,
    };

    tx.commit()?;
    Ok(dimension)
}
