//! Status API server setup and routing

use anyhow::{Context, Result};
use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api;
use crate::auth;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/api/devices", get(api::list_devices))
        .route("/api/devices/{identity}", get(api::get_device))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/api/health", get(api::health))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the status API until the process exits
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let bind = state.web.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind status API to {}", bind))?;
    info!(address = %bind, "Starting status API");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use buildlight_sync::Board;
    use tower::ServiceExt;

    fn app() -> Router {
        router(AppState::new(
            Board::new(),
            WebConfig {
                bind: "127.0.0.1:0".to_string(),
                user: "builder".to_string(),
                password: "secret".to_string(),
            },
        ))
    }

    fn get(uri: &str, credentials: Option<&str>) -> Request<Body> {
        let mut request = Request::builder().uri(uri);
        if let Some(credentials) = credentials {
            request = request.header(
                header::AUTHORIZATION,
                format!("Basic {}", STANDARD.encode(credentials)),
            );
        }
        request.body(Body::empty()).unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_needs_no_auth() {
        let response = app().oneshot(get("/api/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json(response).await,
            serde_json::json!({ "status": "ok", "generation": 0 })
        );
    }

    #[tokio::test]
    async fn test_devices_require_credentials() {
        let response = app().oneshot(get("/api/devices", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[header::WWW_AUTHENTICATE],
            "Basic realm=\"buildlight\""
        );
        assert_eq!(json(response).await["code"], "AUTH_REQUIRED");

        let response = app()
            .oneshot(get("/api/devices", Some("builder:wrong")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_devices_with_credentials() {
        let response = app()
            .oneshot(get("/api/devices", Some("builder:secret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["generation"], 0);
        assert_eq!(body["devices"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_unknown_device_is_not_found() {
        let response = app()
            .oneshot(get("/api/devices/BS000123-3.0", Some("builder:secret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(response).await["error"], "Device not found");
    }
}
