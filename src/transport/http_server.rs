use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::{
    server::AppState,
    transport::{
        middleware::{add_response_headers, check_auth},
        routes::{commands, info},
        websocket_server,
    },
};

const API_V1: &str = "/v1";

pub fn router(state: Arc<AppState>) -> Router {
    let v1_routes = Router::new()
        .route("/guilds/{guild_id}", get(commands::get_status))
        .route("/guilds/{guild_id}/radio", post(commands::radio))
        .route("/guilds/{guild_id}/join", post(commands::join))
        .route("/guilds/{guild_id}/leave", post(commands::leave))
        .route("/nowplaying", get(info::get_now_playing))
        .route("/voice", get(websocket_server::voice_handler));

    Router::new()
        .nest(API_V1, v1_routes)
        .route("/version", get(info::get_version))
        .layer(middleware::from_fn_with_state(state.clone(), check_auth))
        .layer(middleware::from_fn(add_response_headers))
        .with_state(state)
}
