//! quizduel HTTP server.
//!
//! Configuration is read from the TOML file named by `QUIZDUEL_CONFIG_PATH` (optional) and the
//! environment:
//!   PORT             : u16 (default 3000)
//!   DATABASE_PATH    : SQLite file (default "quizduel.db"), ":memory:" for a throwaway store
//!   OPENAI_API_KEY   : enables generated questions; without it the built-in bank is used
//!   OPENAI_BASE_URL  : default "https://api.openai.com/v1"
//!   OPENAI_MODEL     : default "gpt-4o-mini"
//!   LOG_LEVEL        : tracing filter
//!   LOG_FORMAT       : "pretty" (default) or "json"

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use quizduel::content::{BankContentProvider, ContentProvider};
use quizduel::http::{AppState, build_router};
use quizduel::openai::OpenAiContentProvider;
use quizduel::repository::sqlite::SqliteChallengeRepository;
use quizduel::{ChallengeManager, ServerConfig, StaticDirectory, spawn_expiry_sweeper, telemetry};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_tracing();

    let config = ServerConfig::load()?;
    let repository = Arc::new(SqliteChallengeRepository::open(&config.database_path)?);

    let content: Arc<dyn ContentProvider> = match OpenAiContentProvider::from_config(&config.openai)? {
        Some(provider) => {
            info!(model = %provider.model(), "using OpenAI question generation");
            Arc::new(provider)
        }
        None => {
            info!(entries = config.question_bank.len(), "using the question bank");
            Arc::new(BankContentProvider::with_extra(config.question_bank.clone()))
        }
    };

    let manager = ChallengeManager::new(repository, content)
        .with_directory(Arc::new(StaticDirectory::new(config.display_names.clone())))
        .with_config(config.engine.clone());

    if config.engine.sweep_interval_secs > 0 {
        spawn_expiry_sweeper(manager.clone(), Duration::from_secs(config.engine.sweep_interval_secs));
    }

    let app = build_router(AppState { manager });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "quizduel server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
