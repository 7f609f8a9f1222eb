use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Body shape shared by success and error responses.
#[derive(Debug, serde::Serialize)]
pub struct StatusBody {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusBody {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "ok",
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Missing or empty required field. Never retried, always 400.
    #[error("{0}")]
    Validation(String),

    /// The runtime subprocess exited non-zero; the message carries its
    /// combined stdout/stderr verbatim so operators can see what it saw.
    #[error("{0}")]
    RuntimeCommand(String),

    #[error("{context}: {source}")]
    Filesystem {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl AgentError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn filesystem(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Filesystem {
            context: context.into(),
            source,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::RuntimeCommand(_) | Self::Filesystem { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Required-field check shared by every handler. Whitespace-only counts as
/// missing.
pub fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, AgentError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AgentError::validation(format!("{field} is required")));
    }
    Ok(value)
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let body = StatusBody {
            status: "error",
            message: Some(self.to_string()),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
