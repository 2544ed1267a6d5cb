//! Engram daemon - per-character memory service for game NPCs

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::Mutex as TokioMutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use engram::config::Config;
use engram::embedding::EmbeddingEngine;
use engram::error::Result;
use engram::memory::coordinator::MemoryCoordinator;
use engram::memory::longterm::LongTermTier;
use engram::memory::recent::RecentTier;
use engram::server::MemoryServer;
use engram::storage::LanceStore;

/// Engram - dynamic memory for game characters
#[derive(Parser)]
#[command(name = "engram")]
#[command(about = "A per-character memory daemon for interactive narrative agents")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the memory service (default command)
    #[command(name = "serve")]
    Serve,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => serve(cli.config).await,
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,engram=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let mut config = if let Some(path) = config_path {
        tracing::info!("Loading config from: {}", path.display());
        let content = std::fs::read_to_string(&path).map_err(|e| {
            engram::EngramError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Config::from_toml(&content)?
    } else {
        let default_paths = [
            dirs::home_dir().map(|h| h.join(".engram").join("config.toml")),
            dirs::config_dir().map(|c| c.join("engram").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ];

        let mut found = None;
        for path in default_paths.iter().flatten() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                let content = std::fs::read_to_string(path).map_err(|e| {
                    engram::EngramError::Config(format!(
                        "Failed to read config file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                found = Some(Config::from_toml(&content)?);
                break;
            }
        }

        found.unwrap_or_else(|| {
            tracing::info!("No config file found, using defaults");
            Config::default()
        })
    };

    config.apply_env()?;
    Ok(config)
}

async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    tracing::info!("Starting Engram daemon");

    let config = load_config(config_path)?;
    tracing::debug!("Config loaded: {config:?}");

    let data_dir = &config.storage.data_dir;
    std::fs::create_dir_all(data_dir).map_err(|e| {
        engram::EngramError::Storage(format!(
            "Failed to create data directory {}: {}",
            data_dir.display(),
            e
        ))
    })?;

    let vector_store_dir = config.storage.vector_store_dir();
    tracing::info!("Opening vector store at: {}", vector_store_dir.display());
    std::fs::create_dir_all(&vector_store_dir)?;
    let store = LanceStore::connect(&vector_store_dir).await?;

    let snapshot_path = config.storage.recent_snapshot_path();
    let mut recent = RecentTier::new(config.memory.recent_capacity);
    recent.restore_from_disk(&snapshot_path);

    let engine = Arc::new(EmbeddingEngine::new(
        config.embedding.backend,
        config.embedding.max_batch,
    ));

    let longterm = LongTermTier::new(
        Arc::new(TokioMutex::new(store)),
        engine.clone(),
        config.storage.buffer_dir(),
        config.memory.buffer_threshold,
    )?;

    if config.embedding.preload {
        tracing::info!("Warming up embedding engine (this may take a moment on first run)...");
        engine.warmup()?;
    } else {
        tracing::info!("Embedding warmup disabled; first embedding call will block");
    }

    let coordinator = Arc::new(MemoryCoordinator::new(
        recent,
        longterm,
        engine,
        config.memory.default_search_k,
        snapshot_path,
    ));

    let server = MemoryServer::new(config.server.listen_addr.clone(), coordinator);
    server.serve().await?;

    tracing::info!("Engram daemon stopped");
    Ok(())
}
