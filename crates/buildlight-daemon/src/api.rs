//! REST API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use buildlight_core::Generation;
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    generation: Generation,
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(Health {
        status: "ok",
        generation: state.board.generation().await,
    })
}

/// Current generation and every attached device
pub async fn list_devices(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.board.snapshot().await)
}

pub async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
) -> impl IntoResponse {
    let snapshot = state.board.snapshot().await;
    match snapshot.device(&identity) {
        Some(device) => Json(device.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, Json(ApiError::new("Device not found"))).into_response(),
    }
}
