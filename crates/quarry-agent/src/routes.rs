//! Lifecycle HTTP handlers. Thin request/response shells around the
//! orchestrator; validation here is limited to required-field checks.

use axum::Json;
use axum::extract::{Query, State};
use quarry_core::ContainerIdentity;

use crate::config::DEFAULT_HOST_PORT;
use crate::error::{AgentError, StatusBody, required};
use crate::lifecycle::CreateOptions;
use crate::state::AppState;

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRequest {
    #[serde(default)]
    server_name: String,
    #[serde(default)]
    user_email: String,
    #[serde(default)]
    software: String,
    #[serde(default)]
    ram: Option<String>,
    #[serde(default)]
    storage: Option<String>,
    #[serde(default)]
    host_port: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerQuery {
    #[serde(default)]
    server_name: String,
    #[serde(default)]
    user_email: String,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResponse {
    status: &'static str,
    server_id: String,
    message: String,
}

fn resolve(server_name: &str, user_email: &str) -> Result<ContainerIdentity, AgentError> {
    let server_name = required("serverName", server_name)?;
    let user_email = required("userEmail", user_email)?;
    Ok(ContainerIdentity::resolve(server_name, user_email))
}

pub async fn handshake() -> Json<StatusBody> {
    Json(StatusBody {
        status: "ok",
        message: None,
    })
}

pub async fn create_server(
    State(state): State<AppState>,
    Json(req): Json<ServerRequest>,
) -> Result<Json<CreateResponse>, AgentError> {
    let identity = resolve(&req.server_name, &req.user_email)?;
    let software = required("software", &req.software)?;

    let opts = CreateOptions {
        software: software.to_string(),
        memory: req.ram.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(String::from),
        storage: req
            .storage
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from),
    };
    state.lifecycle.create(&identity, &opts).await?;

    Ok(Json(CreateResponse {
        status: "ok",
        server_id: identity.as_str().to_string(),
        message: "Server created successfully".to_string(),
    }))
}

pub async fn start_server(
    State(state): State<AppState>,
    Json(req): Json<ServerRequest>,
) -> Result<Json<StatusBody>, AgentError> {
    let identity = resolve(&req.server_name, &req.user_email)?;
    let host_port = req
        .host_port
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_HOST_PORT);

    state.lifecycle.start(&identity, host_port).await?;
    Ok(Json(StatusBody::ok("Server started successfully")))
}

pub async fn stop_server(
    State(state): State<AppState>,
    Json(req): Json<ServerRequest>,
) -> Result<Json<StatusBody>, AgentError> {
    let identity = resolve(&req.server_name, &req.user_email)?;
    state.lifecycle.stop(&identity).await?;
    Ok(Json(StatusBody::ok("Server stopped successfully")))
}

pub async fn restart_server(
    State(state): State<AppState>,
    Json(req): Json<ServerRequest>,
) -> Result<Json<StatusBody>, AgentError> {
    let identity = resolve(&req.server_name, &req.user_email)?;
    state.lifecycle.restart(&identity).await?;
    Ok(Json(StatusBody::ok("Server restarted successfully")))
}

pub async fn server_status(
    State(state): State<AppState>,
    Query(q): Query<ServerQuery>,
) -> Result<Json<StatusBody>, AgentError> {
    let identity = resolve(&q.server_name, &q.user_email)?;
    let status = state.lifecycle.status(&identity).await?;
    Ok(Json(StatusBody::ok(status)))
}
