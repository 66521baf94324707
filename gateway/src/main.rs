mod admin;
mod api;
mod app;
mod error;
mod handlers;

use std::sync::Arc;

use agentbridge_core::config::{AppConfig, DirectoryConfig, DirectorySource, LogFormat, LoggingConfig};
use agentbridge_core::executor::EndpointExecutor;
use agentbridge_core::llm::OpenAiProvider;
use agentbridge_core::registry::{seed_from_file, AgentDirectory, MemoryRegistry};
use agentbridge_core::store::SqliteRegistry;
use agentbridge_core::Pipeline;
use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::app::AppState;

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match config.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Config first so logging honours LOG_LEVEL / LOG_FORMAT
    let config = AppConfig::from_env().context("failed to load configuration")?;
    init_logging(&config.logging);

    info!("Agent Gateway initializing...");

    let directory = open_directory(&config.directory).await?;
    info!(
        "Agent directory ready with {} agents",
        directory.list_agents().await?.len()
    );

    let provider = OpenAiProvider::new(&config.llm);
    // Connectivity check only; a cold provider should not block startup
    match provider.ping().await {
        Ok(msg) => info!("Provider status: {}", msg.trim()),
        Err(e) => warn!("Completion provider is configured but unresponsive: {}", e),
    }

    let executor = EndpointExecutor::new(config.endpoint.timeout)?;
    let pipeline = Pipeline::new(directory, Arc::new(provider), executor, config.shape_policy);
    let app = app::router(AppState::new(pipeline), &config.server.cors_origins);

    let listener = TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_address))?;
    info!("Gateway listening on {}", config.server.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn open_directory(config: &DirectoryConfig) -> Result<Arc<dyn AgentDirectory>> {
    let directory: Arc<dyn AgentDirectory> = match &config.source {
        DirectorySource::File(path) => Arc::new(
            MemoryRegistry::load(path)
                .await
                .with_context(|| format!("failed to load agents from {}", path.display()))?,
        ),
        DirectorySource::Sqlite(url) => Arc::new(
            SqliteRegistry::connect(url)
                .await
                .context("failed to open agent store")?,
        ),
    };

    if let Some(seed) = &config.seed_file {
        let count = seed_from_file(directory.as_ref(), seed)
            .await
            .with_context(|| format!("failed to seed agents from {}", seed.display()))?;
        info!("Seeded {} agents from {}", count, seed.display());
    }

    Ok(directory)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
