use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    common::{
        errors::RelayError,
        types::{ChannelId, ConnectionId, GuildId},
    },
    stream::OpenedStream,
};

/// One voice connection negotiated through a [`VoiceTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHandle {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub connection_id: ConnectionId,
}

/// Notifications the transport raises on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection went away without us asking (bot kicked, channel
    /// deleted, shell gone).
    Disconnected {
        guild_id: GuildId,
        connection_id: ConnectionId,
    },
}

pub type TransportEventSender = tokio::sync::mpsc::UnboundedSender<TransportEvent>;
pub type TransportEventReceiver = tokio::sync::mpsc::UnboundedReceiver<TransportEvent>;

/// The real-time voice connection the relay attaches to.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<ConnectionHandle, RelayError>;

    async fn disconnect(&self, handle: &ConnectionHandle) -> Result<(), RelayError>;

    /// Feeds `stream` into the connection. Resolves `Ok` when the stream ends
    /// cleanly or `cancel` fires, `Err` when the stream or the connection fails.
    async fn attach_audio_source(
        &self,
        handle: &ConnectionHandle,
        stream: OpenedStream,
        cancel: CancellationToken,
    ) -> Result<(), RelayError>;
}
