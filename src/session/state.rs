use serde::{Deserialize, Serialize};

use crate::common::{
    errors::RelayError,
    types::{ChannelId, GuildId},
};

/// Lifecycle of one guild's voice session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Playing,
    Leaving,
    /// Recoverable by a new join.
    Failed,
}

impl SessionState {
    /// Whether `self -> to` is an edge of the session state machine.
    ///
    /// Any state may drop to `Idle` when the platform disconnects us.
    pub fn can_transition_to(self, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, to),
            (Idle, Connecting)
                | (Connecting, Connected | Failed)
                | (Connected, Playing | Leaving | Failed)
                | (Playing, Connected | Leaving | Failed)
                | (Failed, Connecting)
                | (_, Idle)
        ) && self != to
    }

    /// States that are only observable while a transition is in flight.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Connecting | Self::Leaving)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Playing => "playing",
            Self::Leaving => "leaving",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed edge, published to session subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub guild_id: GuildId,
    pub from: SessionState,
    pub to: SessionState,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub guild_id: GuildId,
    pub state: SessionState,
    pub channel_id: Option<ChannelId>,
    pub last_error: Option<RelayError>,
    /// Automatic stream re-opens performed for the current playback.
    pub stream_retries: u32,
}

impl SessionStatus {
    pub fn idle(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            state: SessionState::Idle,
            channel_id: None,
            last_error: None,
            stream_retries: 0,
        }
    }
}
