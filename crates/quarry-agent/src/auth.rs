use axum::Json;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::StatusBody;
use crate::state::AppState;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let raw = headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    let token = raw.trim().strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

/// Rejects any request (including WebSocket upgrades) that does not carry the
/// configured bearer token.
pub async fn require_bearer(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let ok = bearer_token(req.headers()).is_some_and(|got| got == state.config.auth_token);
    if !ok {
        let body = StatusBody {
            status: "error",
            message: Some("unauthorized".to_string()),
        };
        return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::AUTHORIZATION;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn extracts_bearer_token() {
        assert_eq!(bearer_token(&headers_with("Bearer abc123")), Some("abc123"));
    }

    #[test]
    fn rejects_missing_scheme_and_empty_token() {
        assert_eq!(bearer_token(&headers_with("abc123")), None);
        assert_eq!(bearer_token(&headers_with("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
