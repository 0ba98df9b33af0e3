use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::{
    common::{
        errors::{ErrorKind, RelayError},
        types::{ChannelId, GuildId},
    },
    metadata::{NowPlaying, NowPlayingTracker},
    session::{SessionRegistry, SessionState, SessionStatus, VoiceSession},
};

/// What every command answers with. Errors are part of the answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub guild_id: GuildId,
    pub state: SessionState,
    pub channel_id: Option<ChannelId>,
    pub error_message: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// Only while playing.
    pub now_playing: Option<NowPlaying>,
}

#[derive(Debug, Clone, Copy)]
enum Command {
    Radio(ChannelId),
    Join(ChannelId),
    Leave,
}

impl Command {
    fn name(self) -> &'static str {
        match self {
            Self::Radio(_) => "radio",
            Self::Join(_) => "join",
            Self::Leave => "leave",
        }
    }
}

/// The user-facing `radio` / `join` / `leave` commands.
pub struct CommandFacade {
    registry: Arc<SessionRegistry>,
    /// Empty serves every guild.
    allowed_guilds: Vec<GuildId>,
    now_playing: Option<Arc<NowPlayingTracker>>,
}

impl CommandFacade {
    pub fn new(
        registry: Arc<SessionRegistry>,
        allowed_guilds: Vec<GuildId>,
        now_playing: Option<Arc<NowPlayingTracker>>,
    ) -> Self {
        Self {
            registry,
            allowed_guilds,
            now_playing,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Joins the requester's channel unless already connected, then starts
    /// the radio.
    pub async fn radio(
        &self,
        guild_id: GuildId,
        requester_channel: Option<ChannelId>,
    ) -> StatusPayload {
        match requester_channel {
            Some(channel_id) => self.dispatch(guild_id, Command::Radio(channel_id)).await,
            None => self.reject(guild_id, RelayError::NotInVoiceChannel).await,
        }
    }

    /// Joins the requester's channel without starting playback.
    pub async fn join(
        &self,
        guild_id: GuildId,
        requester_channel: Option<ChannelId>,
    ) -> StatusPayload {
        match requester_channel {
            Some(channel_id) => self.dispatch(guild_id, Command::Join(channel_id)).await,
            None => self.reject(guild_id, RelayError::NotInVoiceChannel).await,
        }
    }

    pub async fn leave(&self, guild_id: GuildId) -> StatusPayload {
        self.dispatch(guild_id, Command::Leave).await
    }

    /// Read-only; Idle for guilds without a session.
    pub async fn status(&self, guild_id: GuildId) -> StatusPayload {
        match self.registry.get(guild_id) {
            Some(session) => self.render(session.status().await, None),
            None => self.render(SessionStatus::idle(guild_id), None),
        }
    }

    pub fn now_playing(&self) -> Option<NowPlaying> {
        self.now_playing.as_ref().and_then(|tracker| tracker.current())
    }

    fn allows(&self, guild_id: GuildId) -> bool {
        self.allowed_guilds.is_empty() || self.allowed_guilds.contains(&guild_id)
    }

    async fn dispatch(&self, guild_id: GuildId, command: Command) -> StatusPayload {
        if !self.allows(guild_id) {
            return self.reject(guild_id, RelayError::GuildNotAllowed(guild_id.0)).await;
        }

        let session = match command {
            Command::Leave => match self.registry.get(guild_id) {
                Some(session) => session,
                None => return self.render(SessionStatus::idle(guild_id), None),
            },
            Command::Radio(_) | Command::Join(_) => self.registry.get_or_create(guild_id),
        };

        info!("[{}] Command {} received", guild_id, command.name());

        // Runs detached so a caller that goes away cannot cut a transition
        // short.
        let task = tokio::spawn(run(session.clone(), command));
        let result = match task.await {
            Ok(result) => result,
            Err(e) => Err(RelayError::Voice(format!("{} command aborted: {}", command.name(), e))),
        };

        match result {
            Ok(status) => self.render(status, None),
            Err(e) => {
                warn!("[{}] Command {} failed: {}", guild_id, command.name(), e);
                self.render(session.status().await, Some(e))
            }
        }
    }

    async fn reject(&self, guild_id: GuildId, error: RelayError) -> StatusPayload {
        let status = match self.registry.get(guild_id) {
            Some(session) => session.status().await,
            None => SessionStatus::idle(guild_id),
        };
        self.render(status, Some(error))
    }

    fn render(&self, status: SessionStatus, error: Option<RelayError>) -> StatusPayload {
        let error = error.or(status.last_error);
        let now_playing = match status.state {
            SessionState::Playing => self.now_playing(),
            _ => None,
        };

        StatusPayload {
            guild_id: status.guild_id,
            state: status.state,
            channel_id: status.channel_id,
            error_kind: error.as_ref().map(RelayError::kind),
            error_message: error.map(|e| e.to_string()),
            now_playing,
        }
    }
}

async fn run(session: Arc<VoiceSession>, command: Command) -> Result<SessionStatus, RelayError> {
    match command {
        Command::Radio(channel_id) => session.join_and_play(channel_id).await,
        Command::Join(channel_id) => session.join(channel_id).await,
        Command::Leave => session.leave().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{MockSource, MockTransport, Open, test_config};

    fn facade(
        allowed: Vec<GuildId>,
        script: impl IntoIterator<Item = Open>,
    ) -> (CommandFacade, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::default());
        let registry = Arc::new(SessionRegistry::new(
            transport.clone(),
            Arc::new(MockSource::scripted(script)),
            test_config(),
        ));
        (CommandFacade::new(registry, allowed, None), transport)
    }

    #[tokio::test]
    async fn test_radio_then_leave() {
        let (facade, transport) = facade(vec![], []);

        let playing = facade.radio(GuildId(1), Some(ChannelId(10))).await;
        assert_eq!(playing.state, SessionState::Playing);
        assert_eq!(playing.channel_id, Some(ChannelId(10)));
        assert_eq!(playing.error_message, None);
        assert_eq!(playing.error_kind, None);

        let left = facade.leave(GuildId(1)).await;
        assert_eq!(left.state, SessionState::Idle);
        assert_eq!(left.channel_id, None);
        assert_eq!(transport.live(GuildId(1)), 0);
    }

    #[tokio::test]
    async fn test_requires_voice_channel() {
        let (facade, transport) = facade(vec![], []);

        let payload = facade.radio(GuildId(1), None).await;

        assert_eq!(payload.state, SessionState::Idle);
        assert_eq!(payload.error_kind, Some(ErrorKind::NotInVoiceChannel));
        assert_eq!(transport.connects(), 0);
        assert!(facade.registry().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_unlisted_guild() {
        let (facade, transport) = facade(vec![GuildId(1)], []);

        let payload = facade.join(GuildId(2), Some(ChannelId(10))).await;

        assert_eq!(payload.error_kind, Some(ErrorKind::GuildNotAllowed));
        assert_eq!(transport.connects(), 0);
    }

    #[tokio::test]
    async fn test_join_does_not_play() {
        let (facade, _) = facade(vec![], []);

        let payload = facade.join(GuildId(1), Some(ChannelId(10))).await;

        assert_eq!(payload.state, SessionState::Connected);
        assert_eq!(payload.now_playing, None);
    }

    #[tokio::test]
    async fn test_stream_outage_reported_in_payload() {
        let (facade, _) = facade(vec![], [Open::Fail, Open::Fail]);

        let payload = facade.radio(GuildId(1), Some(ChannelId(10))).await;

        assert_eq!(payload.state, SessionState::Connected);
        assert_eq!(payload.error_kind, Some(ErrorKind::Connect));
        assert!(payload.error_message.unwrap().contains("503"));

        let status = facade.status(GuildId(1)).await;
        assert_eq!(status.error_kind, Some(ErrorKind::Connect));
    }

    #[tokio::test]
    async fn test_leave_without_session_is_acknowledged() {
        let (facade, transport) = facade(vec![], []);

        let payload = facade.leave(GuildId(5)).await;

        assert_eq!(payload.state, SessionState::Idle);
        assert_eq!(payload.error_kind, None);
        assert_eq!(transport.disconnects(), 0);
        assert!(facade.registry().is_empty());
    }

    #[test]
    fn test_payload_serializes_camel_case_with_nulls() {
        let payload = StatusPayload {
            guild_id: GuildId(1),
            state: SessionState::Idle,
            channel_id: None,
            error_message: None,
            error_kind: None,
            now_playing: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "guildId": "1",
                "state": "IDLE",
                "channelId": null,
                "errorMessage": null,
                "errorKind": null,
                "nowPlaying": null
            })
        );
    }
}
