//! Bookshelf API Server

use anyhow::Context;
use bookshelf_api::{create_router, state::AppState};
use bookshelf_core::{AppConfig, BookRepository, MemoryStore, PgStore, UserRepository};
use std::sync::Arc;

fn load_config() -> anyhow::Result<AppConfig> {
    let config = match std::env::var("BOOKSHELF_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.as_str().into());

    if config.logging.json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing signing secret stops the process here
    let config = load_config().context("invalid configuration")?;
    init_tracing(&config);

    let (books, users): (Arc<dyn BookRepository>, Arc<dyn UserRepository>) =
        match &config.database.url {
            Some(url) => {
                let store = Arc::new(PgStore::connect(url, config.database.pool_size).await?);
                store.ensure_schema().await?;
                tracing::info!("using PostgreSQL store");
                (store.clone() as Arc<dyn BookRepository>, store as Arc<dyn UserRepository>)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory store");
                let store = Arc::new(MemoryStore::new());
                (store.clone() as Arc<dyn BookRepository>, store as Arc<dyn UserRepository>)
            }
        };

    let addr = format!("{}:{}", config.server.host, config.server.port);

    // Create application state
    let state = Arc::new(AppState::new(config, books, users)?);

    // Create router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Bookshelf API Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    tracing::info!("OpenAPI document at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
