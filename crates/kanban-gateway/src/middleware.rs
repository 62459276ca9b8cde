use axum::{
    extract::{Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// API keys accepted by the control surface. Empty = no auth required.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// Accepted keys, compared verbatim.
    pub api_keys: Vec<String>,
}

impl AuthConfig {
    /// Wrap the configured keys.
    pub fn new(api_keys: Vec<String>) -> Self {
        Self { api_keys }
    }

    /// Whether any key is configured.
    pub fn is_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }

    fn accepts(&self, key: &str) -> bool {
        self.api_keys.iter().any(|k| k == key)
    }
}

/// `?api_key=` fallback for clients that cannot set headers.
#[derive(serde::Deserialize, Default)]
pub struct AuthQuery {
    /// Key passed in the query string.
    pub api_key: Option<String>,
}

/// Validates `Authorization: Bearer <key>`, then `?api_key=<key>`.
pub async fn auth_middleware(
    State(auth): State<Arc<AuthConfig>>,
    headers: HeaderMap,
    query: Query<AuthQuery>,
    request: Request,
    next: Next,
) -> Response {
    if !auth.is_enabled() {
        return next.run(request).await;
    }

    let key = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
        .or_else(|| query.api_key.clone());

    let message = match key {
        Some(k) if auth.accepts(&k) => return next.run(request).await,
        Some(_) => "Invalid API key",
        None => "API key required",
    };
    warn!(path = %request.uri().path(), reason = message, "Rejected request");
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"success": false, "error": "unauthorized", "message": message})),
    )
        .into_response()
}
