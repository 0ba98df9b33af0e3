//! Wire format spoken with the bot shell over the voice bridge socket.
//!
//! Text frames carry JSON control messages tagged by `op`. Binary frames carry
//! audio: an 8-byte big-endian guild id followed by an opaque chunk of the
//! radio stream.

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::types::{ChannelId, ConnectionId, GuildId};

pub const AUDIO_HEADER_LEN: usize = 8;

/// Relay → shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RelayMessage {
    Ready {
        version: String,
    },
    Connect {
        request_id: Uuid,
        guild_id: GuildId,
        channel_id: ChannelId,
        connection_id: ConnectionId,
    },
    Disconnect {
        request_id: Uuid,
        guild_id: GuildId,
        connection_id: ConnectionId,
    },
    AudioStart {
        guild_id: GuildId,
        connection_id: ConnectionId,
        #[serde(skip_serializing_if = "Option::is_none")]
        content_type: Option<String>,
    },
    AudioEnd {
        guild_id: GuildId,
        connection_id: ConnectionId,
    },
}

/// Shell → relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ShellMessage {
    Connected {
        request_id: Uuid,
        guild_id: GuildId,
        connection_id: ConnectionId,
    },
    ConnectFailed {
        request_id: Uuid,
        reason: String,
    },
    Disconnected {
        request_id: Uuid,
    },
    /// The platform closed the voice connection on its own.
    VoiceClosed {
        guild_id: GuildId,
        connection_id: ConnectionId,
    },
}

pub fn encode_audio_frame(guild_id: GuildId, chunk: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(AUDIO_HEADER_LEN + chunk.len());
    let mut header = [0u8; AUDIO_HEADER_LEN];
    BigEndian::write_u64(&mut header, guild_id.0);
    frame.put_slice(&header);
    frame.put_slice(chunk);
    frame.freeze()
}

pub fn decode_audio_frame(frame: &[u8]) -> Option<(GuildId, &[u8])> {
    if frame.len() < AUDIO_HEADER_LEN {
        return None;
    }
    let (header, chunk) = frame.split_at(AUDIO_HEADER_LEN);
    Some((GuildId(BigEndian::read_u64(header)), chunk))
}
