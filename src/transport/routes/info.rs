use std::sync::Arc;

use axum::{
    extract::State,
    response::{IntoResponse, Json, Response},
};

use crate::{common::errors::ApiError, server::AppState};

/// GET /v1/nowplaying
pub async fn get_now_playing(State(state): State<Arc<AppState>>) -> Response {
    match state.facade.now_playing() {
        Some(now_playing) => Json(now_playing).into_response(),
        None => ApiError::not_found("No track information available", "/v1/nowplaying")
            .into_response(),
    }
}

/// GET /version
pub async fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
