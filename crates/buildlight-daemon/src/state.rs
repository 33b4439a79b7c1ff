//! Application state shared by the status API handlers

use buildlight_sync::Board;
use std::sync::Arc;

use crate::config::WebConfig;

pub struct AppState {
    /// Live view of the reconciler's devices
    pub board: Board,
    /// Credentials and bind address
    pub web: WebConfig,
}

impl AppState {
    pub fn new(board: Board, web: WebConfig) -> Arc<Self> {
        Arc::new(Self { board, web })
    }
}
