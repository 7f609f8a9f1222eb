use axum::middleware;
use axum::{
    Router,
    routing::{get, post},
};

mod auth;
mod config;
mod console;
mod docker;
mod error;
mod files;
mod lifecycle;
mod routes;
mod state;
mod volume;

use crate::state::AppState;

fn router(state: AppState) -> Router {
    Router::new()
        .route("/handshake", get(routes::handshake))
        .route("/server/create", post(routes::create_server))
        .route("/server/start", post(routes::start_server))
        .route("/server/stop", post(routes::stop_server))
        .route("/server/restart", post(routes::restart_server))
        .route("/server/status", get(routes::server_status))
        .route("/server/console", get(console::console_ws))
        .route("/files/list", get(files::list))
        .route("/files/download", get(files::download))
        .route("/files/upload", post(files::upload))
        .route("/files/delete", post(files::delete))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ))
        .with_state(state)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = config::AgentConfig::from_env()?;
    let addr = config.listen_addr;
    let state = AppState::new(config);

    let app = router(state);

    tracing::info!(%addr, "quarry-agent HTTP listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
