use anyhow::Context;
use dotenv::dotenv;
use tokio::sync::broadcast;
use tracing::info;

mod app;
mod app_state;
mod certificates;
mod config;
mod db;
mod error;
mod middleware;
mod modules;
mod progress;
mod telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = config::init()?.clone();

    let telemetry_handles = telemetry::init_telemetry(None)
        .await
        .context("Failed to initialize telemetry")?;

    let pool = db::init_pool()
        .await
        .context("Failed to initialize database pool")?;

    // Completion events fan out to the certificate issuer.
    let (completion_tx, completion_rx) = broadcast::channel(64);
    tokio::spawn(certificates::run_issuer(
        pool.clone(),
        config.app.certificate_base_url.clone(),
        completion_rx,
    ));

    let state = app_state::AppState::new(pool, config.clone(), completion_tx);
    let router = app::create_router(state);

    let addr = config.server_addr();
    info!("{} listening on {}", config.app.name, addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("Failed to serve application")?;

    telemetry_handles.shutdown().await?;

    Ok(())
}
