use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

// `#[zbus::proxy]` generates `IdentityProxy` (async) and
// `IdentityProxyBlocking`; only the async one is used.
#[zbus::proxy(
    interface = "org.facegate.Identity1",
    default_service = "org.facegate.Identity1",
    default_path = "/org/facegate/Identity1"
)]
trait Identity {
    async fn register(&self, identity_id: &str, embedding: &[f64]) -> zbus::Result<String>;
    async fn recognize(&self, embedding: &[f64]) -> zbus::Result<String>;
    async fn delete(&self, identity_id: &str) -> zbus::Result<String>;
    async fn list_identities(&self) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "facegate", about = "Facegate face identity CLI")]
struct Cli {
    /// Talk to the daemon on the session bus instead of the system bus
    #[arg(long, global = true)]
    session: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a face embedding under an identity
    Register {
        /// Identity to bind the face to
        identity: String,
        /// JSON file holding the embedding as an array of numbers
        #[arg(short, long)]
        embedding: PathBuf,
    },
    /// Resolve a face embedding to a registered identity
    Recognize {
        /// JSON file holding the embedding as an array of numbers
        #[arg(short, long)]
        embedding: PathBuf,
    },
    /// Remove an identity's face
    Delete {
        /// Identity to remove
        identity: String,
    },
    /// List registered identities
    List,
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = if cli.session {
        zbus::Connection::session().await
    } else {
        zbus::Connection::system().await
    }
    .context("connecting to D-Bus")?;
    let proxy = IdentityProxy::new(&conn)
        .await
        .context("facegated is not reachable")?;

    let reply = match cli.command {
        Commands::Register {
            identity,
            embedding,
        } => {
            let values = read_embedding(&embedding)?;
            tracing::debug!(identity = %identity, dim = values.len(), "register");
            proxy.register(&identity, &values).await?
        }
        Commands::Recognize { embedding } => {
            let values = read_embedding(&embedding)?;
            proxy.recognize(&values).await?
        }
        Commands::Delete { identity } => proxy.delete(&identity).await?,
        Commands::List => proxy.list_identities().await?,
        Commands::Status => proxy.status().await?,
    };

    println!("{reply}");
    Ok(())
}

/// Read a JSON array of numbers from `path`.
fn read_embedding(path: &Path) -> Result<Vec<f64>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_embedding(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn parse_embedding(raw: &str) -> Result<Vec<f64>> {
    let values: Vec<f64> = serde_json::from_str(raw)?;
    if values.is_empty() {
        bail!("embedding is empty");
    }
    Ok(values)
}
