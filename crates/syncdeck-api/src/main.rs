mod config;
mod error;
mod routes;
mod ws;

use std::sync::Arc;

use config::AppConfig;
use routes::{app_router, AppState};
use syncdeck_core::Engine;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("syncdeck_api=info".parse().expect("valid directive"))
                .add_directive("syncdeck_core=info".parse().expect("valid directive")),
        )
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!("Starting syncdeck-api with config: {:?}", config);

    let poll_interval = config.engine.poll_interval;
    let engine = Arc::new(Engine::open(config.engine.clone()).await?);
    let status = engine.daemon_status().await;
    tracing::info!(status = %status, "Daemon status at startup");
    let poller = engine.spawn_background(poll_interval);

    let router = app_router(AppState::new(engine));
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("syncdeck-api listening on {}", config.bind_addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutdown requested");
        })
        .await?;
    poller.abort();
    Ok(())
}
