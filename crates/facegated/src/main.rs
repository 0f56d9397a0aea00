use std::sync::Arc;

use anyhow::{Context, Result};
use facegate_core::{CosineMatcher, EmbeddingStore, IdentityService};
use facegate_store::{SqliteEmbeddingStore, SqliteStoreConfig};
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;

use config::Config;
use dbus_interface::{IdentityBus, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facegated starting");

    let config = Config::from_env();
    tracing::info!(
        db = %config.db_path.display(),
        threshold = config.similarity_threshold,
        embedding_dim = config.embedding_dim,
        session_bus = config.session_bus,
        "configuration loaded"
    );

    let store = SqliteEmbeddingStore::open(SqliteStoreConfig {
        path: config.db_path.clone(),
        busy_timeout_ms: config.busy_timeout_ms,
        dimension: Some(config.embedding_dim),
    })
    .with_context(|| format!("opening identity store at {}", config.db_path.display()))?;
    let store: Arc<dyn EmbeddingStore> = Arc::new(store);

    let service = Arc::new(IdentityService::new(
        store,
        CosineMatcher::new(config.similarity_threshold),
        config.embedding_dim,
    ));

    let builder = if config.session_bus {
        zbus::connection::Builder::session()?
    } else {
        zbus::connection::Builder::system()?
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, IdentityBus::new(service))?
        .build()
        .await
        .context("registering on D-Bus")?;

    tracing::info!(bus = BUS_NAME, path = OBJECT_PATH, "facegated ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("facegated shutting down");

    Ok(())
}
