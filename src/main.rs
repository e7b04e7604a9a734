use anyhow::Context;
use realtime_hub::fanout::{FanoutBus, LocalFanoutBus, RedisFanoutBus};
use realtime_hub::presence::{LocalPresenceStore, PresenceStore, RedisPresenceStore};
use realtime_hub::{AppState, config::Config, create_router};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "realtime_hub=debug,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env().map_err(anyhow::Error::msg)?;
    config.print_info();

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)
        .context("invalid DATABASE_URL")?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(connect_options)
        .await
        .context("failed to open the database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;
    info!("Database ready");

    let (bus, presence): (Arc<dyn FanoutBus>, Arc<dyn PresenceStore>) = match &config.redis_url {
        Some(url) => (
            Arc::new(
                RedisFanoutBus::connect(url, &config.redis_key_prefix, config.broadcast_capacity)
                    .await?,
            ),
            Arc::new(RedisPresenceStore::new(url, &config.redis_key_prefix)?),
        ),
        None => (
            Arc::new(LocalFanoutBus::new(config.broadcast_capacity)),
            Arc::new(LocalPresenceStore::new()),
        ),
    };

    let state = Arc::new(
        AppState::new(pool, config.jwt_secret.clone(), bus, presence)
            .with_idle_timeout(Duration::from_secs(config.ws_idle_timeout_secs)),
    );

    let mut app = create_router(state.clone());
    if config.is_development() {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for the shutdown signal: {}", e);
        return;
    }
    info!("Shutdown requested");
    state.sessions.shutdown_all();
}
