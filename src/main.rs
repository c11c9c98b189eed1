use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use integribot_backend::core::config::{AppPaths, ConfigService, Settings};
use integribot_backend::core::logging;
use integribot_backend::server;
use integribot_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = Arc::new(AppPaths::from_env());
    paths.ensure_dirs().with_context(|| {
        format!(
            "Failed to create data directory {}",
            paths.user_data_dir.display()
        )
    })?;
    let config = ConfigService::new(paths.clone());
    let settings = Settings::load(&config).with_context(|| {
        format!(
            "Failed to load configuration from {}",
            config.config_path().display()
        )
    })?;

    logging::init(&paths.log_dir, &settings.environment.log_level);
    tracing::info!(
        "Starting {} v{} ({})",
        settings.api.title,
        settings.api.version,
        settings.environment.name
    );

    let bind_addr = format!("{}:{}", settings.api.host, settings.api.port);
    let state = AppState::initialize(paths, settings).await?;
    state.spawn_corpus_indexing();

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on {}", addr);

    let app: Router = server::router(state);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
