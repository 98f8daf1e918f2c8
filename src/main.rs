use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sendstack_api::{
    config::load_config,
    db::{establish_connection_from_app_config, run_migrations},
    events::spawn_event_logger,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    info!(
        environment = %config.environment,
        "starting order lifecycle and fulfillment engine"
    );

    let db = establish_connection_from_app_config(&config)
        .await
        .context("failed to connect to database")?;

    if config.auto_migrate {
        run_migrations(&db).await.context("migrations failed")?;
    }

    let (event_sender, _event_worker) = spawn_event_logger(1024);

    let config = Arc::new(config);
    let state = AppState::new(Arc::new(db), config.clone(), Some(event_sender));
    let app = sendstack_api::app_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!(address = %config.bind_address(), "listening");

    axum::serve(listener, app)
        .await
        .context("server terminated")?;

    Ok(())
}
