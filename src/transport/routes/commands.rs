use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Deserialize;

use crate::{
    commands::StatusPayload,
    common::types::{ChannelId, GuildId},
    server::AppState,
};

/// Body of `radio` / `join`: the voice channel the requester sits in.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
}

/// POST /v1/guilds/{guild_id}/radio
pub async fn radio(
    Path(guild_id): Path<u64>,
    State(state): State<Arc<AppState>>,
    body: Option<Json<CommandRequest>>,
) -> Json<StatusPayload> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    tracing::debug!("POST /v1/guilds/{}/radio: {:?}", guild_id, request);
    Json(state.facade.radio(GuildId(guild_id), request.channel_id).await)
}

/// POST /v1/guilds/{guild_id}/join
pub async fn join(
    Path(guild_id): Path<u64>,
    State(state): State<Arc<AppState>>,
    body: Option<Json<CommandRequest>>,
) -> Json<StatusPayload> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    tracing::debug!("POST /v1/guilds/{}/join: {:?}", guild_id, request);
    Json(state.facade.join(GuildId(guild_id), request.channel_id).await)
}

/// POST /v1/guilds/{guild_id}/leave
pub async fn leave(
    Path(guild_id): Path<u64>,
    State(state): State<Arc<AppState>>,
) -> Json<StatusPayload> {
    tracing::debug!("POST /v1/guilds/{}/leave", guild_id);
    Json(state.facade.leave(GuildId(guild_id)).await)
}

/// GET /v1/guilds/{guild_id}
pub async fn get_status(
    Path(guild_id): Path<u64>,
    State(state): State<Arc<AppState>>,
) -> Json<StatusPayload> {
    Json(state.facade.status(GuildId(guild_id)).await)
}
