//! HTTP Basic authentication for the status API

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::WebConfig;
use crate::state::AppState;

const CHALLENGE: &str = "Basic realm=\"buildlight\"";

#[derive(Serialize)]
struct AuthError {
    error: String,
    code: &'static str,
}

fn unauthorized(error: &str, code: &'static str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, CHALLENGE)],
        Json(AuthError {
            error: error.to_string(),
            code,
        }),
    )
        .into_response()
}

/// Decode `Basic <base64(user:password)>` into its two parts
fn parse_basic(value: &str) -> Option<(String, String)> {
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

fn credentials_match(web: &WebConfig, user: &str, password: &str) -> bool {
    web.user == user && web.password == password
}

/// Reject requests without the configured user and password
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let Some(auth_header) = auth_header else {
        debug!(path = %request.uri().path(), "Missing authorization header");
        return unauthorized("Authorization required", "AUTH_REQUIRED");
    };

    let Some((user, password)) = parse_basic(auth_header) else {
        warn!("Invalid authorization header format");
        return unauthorized("Invalid authorization header format. Use: Basic <credentials>", "INVALID_AUTH_FORMAT");
    };

    if !credentials_match(&state.web, &user, &password) {
        warn!(user = %user, "Rejected credentials");
        return unauthorized("Invalid user or password", "INVALID_CREDENTIALS");
    }

    next.run(request).await
}
