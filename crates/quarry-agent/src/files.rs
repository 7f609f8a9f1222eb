//! File operations against a server's volume directory. Paths from the client
//! are relative to the per-identity data directory and are normalized before
//! use; absolute paths and parent traversal are rejected outright.

use std::path::{Component, Path, PathBuf};

use axum::Json;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use quarry_core::ContainerIdentity;

use crate::error::{AgentError, StatusBody, required};
use crate::state::AppState;

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesQuery {
    #[serde(default)]
    server_name: String,
    #[serde(default)]
    user_email: String,
    #[serde(default)]
    path: String,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    #[serde(default)]
    server_name: String,
    #[serde(default)]
    user_email: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    content_base64: String,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    name: String,
    is_dir: bool,
}

fn normalize_rel_path(rel: &str) -> Result<PathBuf, AgentError> {
    if rel.is_empty() {
        return Ok(PathBuf::new());
    }
    let p = Path::new(rel);
    if p.is_absolute() {
        return Err(AgentError::validation("path must be relative"));
    }

    let mut out = PathBuf::new();
    for c in p.components() {
        match c {
            Component::CurDir => {}
            Component::Normal(seg) => out.push(seg),
            Component::ParentDir => {
                return Err(AgentError::validation("path traversal is not allowed"));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(AgentError::validation("path must be relative"));
            }
        }
    }
    Ok(out)
}

fn server_dir(state: &AppState, server_name: &str, user_email: &str) -> PathBuf {
    let identity = ContainerIdentity::resolve(server_name, user_email);
    state.config.data_root.join(identity.as_str())
}

fn scoped(state: &AppState, q_server: &str, q_email: &str, rel: &str) -> Result<PathBuf, AgentError> {
    let server_name = required("serverName", q_server)?;
    let user_email = required("userEmail", q_email)?;
    let rel = normalize_rel_path(rel.trim())?;
    Ok(server_dir(state, server_name, user_email).join(rel))
}

pub async fn list(
    State(state): State<AppState>,
    Query(q): Query<FilesQuery>,
) -> Result<Json<Vec<FileEntry>>, AgentError> {
    let dir = scoped(&state, &q.server_name, &q.user_email, &q.path)?;

    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(&dir)
        .await
        .map_err(|e| AgentError::filesystem("failed to read directory", e))?;
    while let Some(entry) = read_dir
        .next_entry()
        .await
        .map_err(|e| AgentError::filesystem("failed to read directory", e))?
    {
        let is_dir = entry
            .file_type()
            .await
            .map(|t| t.is_dir())
            .unwrap_or(false);
        entries.push(FileEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir,
        });
    }
    Ok(Json(entries))
}

pub async fn download(
    State(state): State<AppState>,
    Query(q): Query<FilesQuery>,
) -> Result<Response, AgentError> {
    required("path", &q.path)?;
    let path = scoped(&state, &q.server_name, &q.user_email, &q.path)?;

    let data = tokio::fs::read(&path)
        .await
        .map_err(|e| AgentError::filesystem("failed to read file", e))?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={filename}"),
            ),
        ],
        data,
    )
        .into_response())
}

pub async fn upload(
    State(state): State<AppState>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<StatusBody>, AgentError> {
    required("path", &req.path)?;
    required("contentBase64", &req.content_base64)?;
    let path = scoped(&state, &req.server_name, &req.user_email, &req.path)?;

    let content = base64::engine::general_purpose::STANDARD
        .decode(req.content_base64.trim().as_bytes())
        .map_err(|e| AgentError::validation(format!("invalid base64 content: {e}")))?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AgentError::filesystem("failed to create directories", e))?;
    }
    tokio::fs::write(&path, content)
        .await
        .map_err(|e| AgentError::filesystem("failed to write file", e))?;

    Ok(Json(StatusBody::ok("File uploaded")))
}

pub async fn delete(
    State(state): State<AppState>,
    Json(req): Json<FilesQuery>,
) -> Result<Json<StatusBody>, AgentError> {
    required("path", &req.path)?;
    let path = scoped(&state, &req.server_name, &req.user_email, &req.path)?;

    tokio::fs::remove_file(&path)
        .await
        .map_err(|e| AgentError::filesystem("failed to delete file", e))?;

    Ok(Json(StatusBody::ok("File deleted")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_accepts_plain_relative_paths() {
        assert_eq!(
            normalize_rel_path("world/level.dat").unwrap(),
            PathBuf::from("world/level.dat")
        );
        assert_eq!(
            normalize_rel_path("./server.properties").unwrap(),
            PathBuf::from("server.properties")
        );
        assert_eq!(normalize_rel_path("").unwrap(), PathBuf::new());
    }

    #[test]
    fn normalize_rejects_traversal_and_absolute() {
        assert!(normalize_rel_path("../other/secret").is_err());
        assert!(normalize_rel_path("world/../../etc/passwd").is_err());
        assert!(normalize_rel_path("/etc/passwd").is_err());
    }

    #[test]
    fn required_rejects_empty_and_whitespace() {
        assert!(required("serverName", "").is_err());
        assert!(required("serverName", "   ").is_err());
        assert_eq!(required("serverName", " lobby ").unwrap(), "lobby");
    }
}
