use async_trait::async_trait;
use axum::extract::ws::Message;
use dashmap::DashMap;
use futures::StreamExt;
use parking_lot::RwLock;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    protocol::{RelayMessage, ShellMessage, encode_audio_frame},
    transport::{ConnectionHandle, TransportEvent, TransportEventSender, VoiceTransport},
};
use crate::{
    common::{
        errors::RelayError,
        types::{ChannelId, ConnectionId, GuildId},
    },
    stream::OpenedStream,
};

/// Outgoing frames buffered per shell before audio forwarding waits.
const LINK_BUFFER: usize = 256;

struct BridgeLink {
    id: Uuid,
    tx: flume::Sender<Message>,
}

struct PendingConnect {
    handle: ConnectionHandle,
    reply: oneshot::Sender<Result<(), String>>,
}

/// Removes a pending request when the waiting future goes away (timeout).
struct PendingGuard<'a, V> {
    map: &'a DashMap<Uuid, V>,
    request_id: Uuid,
}

impl<V> Drop for PendingGuard<'_, V> {
    fn drop(&mut self) {
        self.map.remove(&self.request_id);
    }
}

/// [`VoiceTransport`] backed by the bot shell attached over a WebSocket.
///
/// The shell owns the actual Discord voice connection; the bridge asks it to
/// connect/disconnect and forwards the radio bytes as binary frames.
pub struct VoiceBridge {
    link: RwLock<Option<BridgeLink>>,
    pending_connects: DashMap<Uuid, PendingConnect>,
    pending_disconnects: DashMap<Uuid, oneshot::Sender<()>>,
    connections: DashMap<ConnectionId, ConnectionHandle>,
    events: TransportEventSender,
}

impl VoiceBridge {
    pub fn new(events: TransportEventSender) -> Self {
        Self {
            link: RwLock::new(None),
            pending_connects: DashMap::new(),
            pending_disconnects: DashMap::new(),
            connections: DashMap::new(),
            events,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.link.read().is_some()
    }

    /// Registers a newly connected shell, replacing any previous one.
    /// Returns the link id and the queue of frames to write to its socket.
    pub fn attach(&self) -> (Uuid, flume::Receiver<Message>) {
        let (tx, rx) = flume::bounded(LINK_BUFFER);
        let id = Uuid::new_v4();
        let previous = self.link.write().replace(BridgeLink { id, tx });
        if let Some(previous) = previous {
            warn!("Voice bridge {} replaced by {}", previous.id, id);
            self.drop_all_connections();
        }
        info!("Voice bridge attached: {}", id);
        (id, rx)
    }

    /// Called when a shell socket closes. Ignored if that shell was already
    /// replaced.
    pub fn detach(&self, link_id: Uuid) {
        {
            let mut link = self.link.write();
            match link.as_ref() {
                Some(current) if current.id == link_id => {
                    *link = None;
                }
                _ => return,
            }
        }
        info!("Voice bridge detached: {}", link_id);
        self.drop_all_connections();
    }

    fn drop_all_connections(&self) {
        // Dropping the reply senders fails every waiter.
        self.pending_connects.clear();
        self.pending_disconnects.clear();

        let lost: Vec<ConnectionHandle> =
            self.connections.iter().map(|e| e.value().clone()).collect();
        self.connections.clear();
        for handle in lost {
            self.emit_disconnected(&handle);
        }
    }

    fn emit_disconnected(&self, handle: &ConnectionHandle) {
        let _ = self.events.send(TransportEvent::Disconnected {
            guild_id: handle.guild_id,
            connection_id: handle.connection_id,
        });
    }

    fn sender(&self) -> Option<flume::Sender<Message>> {
        self.link.read().as_ref().map(|l| l.tx.clone())
    }

    async fn send(&self, msg: &RelayMessage) -> Result<(), RelayError> {
        let tx = self
            .sender()
            .ok_or_else(|| RelayError::Voice("no voice bridge attached".into()))?;
        let json = serde_json::to_string(msg).map_err(|e| RelayError::Voice(e.to_string()))?;
        tx.send_async(Message::Text(json.into()))
            .await
            .map_err(|_| RelayError::Voice("voice bridge detached".into()))
    }

    fn try_send(&self, msg: &RelayMessage) {
        if let (Some(tx), Ok(json)) = (self.sender(), serde_json::to_string(msg)) {
            let _ = tx.try_send(Message::Text(json.into()));
        }
    }

    /// Handles one text frame from the shell.
    pub fn handle_text(&self, text: &str) {
        let msg: ShellMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Ignoring malformed bridge message: {}", e);
                return;
            }
        };

        match msg {
            ShellMessage::Connected {
                request_id,
                guild_id,
                connection_id,
            } => self.on_connected(request_id, guild_id, connection_id),
            ShellMessage::ConnectFailed { request_id, reason } => {
                if let Some((_, pending)) = self.pending_connects.remove(&request_id) {
                    let _ = pending.reply.send(Err(reason));
                }
            }
            ShellMessage::Disconnected { request_id } => {
                if let Some((_, reply)) = self.pending_disconnects.remove(&request_id) {
                    let _ = reply.send(());
                }
            }
            ShellMessage::VoiceClosed {
                guild_id,
                connection_id,
            } => {
                if let Some((_, handle)) = self.connections.remove(&connection_id) {
                    info!("[{}] Voice connection closed by platform", guild_id);
                    self.emit_disconnected(&handle);
                } else {
                    debug!("[{}] voiceClosed for unknown connection {}", guild_id, connection_id);
                }
            }
        }
    }

    fn on_connected(&self, request_id: Uuid, guild_id: GuildId, connection_id: ConnectionId) {
        let abandoned = match self.pending_connects.remove(&request_id) {
            Some((_, pending)) => {
                let handle = pending.handle.clone();
                self.connections.insert(handle.connection_id, handle.clone());
                if pending.reply.send(Ok(())).is_ok() {
                    return;
                }
                self.connections.remove(&handle.connection_id);
                handle.connection_id
            }
            None => connection_id,
        };

        // Nobody is waiting for this connection any more; do not leak it.
        warn!(
            "[{}] Late connect reply for {}; releasing connection {}",
            guild_id, request_id, abandoned
        );
        self.try_send(&RelayMessage::Disconnect {
            request_id: Uuid::new_v4(),
            guild_id,
            connection_id: abandoned,
        });
    }
}

#[async_trait]
impl VoiceTransport for VoiceBridge {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<ConnectionHandle, RelayError> {
        if !self.is_attached() {
            return Err(RelayError::Voice("no voice bridge attached".into()));
        }

        let request_id = Uuid::new_v4();
        let handle = ConnectionHandle {
            guild_id,
            channel_id,
            connection_id: ConnectionId::generate(),
        };
        let (reply, rx) = oneshot::channel();
        self.pending_connects.insert(
            request_id,
            PendingConnect {
                handle: handle.clone(),
                reply,
            },
        );
        let _guard = PendingGuard {
            map: &self.pending_connects,
            request_id,
        };

        self.send(&RelayMessage::Connect {
            request_id,
            guild_id,
            channel_id,
            connection_id: handle.connection_id,
        })
        .await?;

        match rx.await {
            Ok(Ok(())) => Ok(handle),
            Ok(Err(reason)) => Err(RelayError::Voice(reason)),
            Err(_) => Err(RelayError::Voice("voice bridge detached".into())),
        }
    }

    async fn disconnect(&self, handle: &ConnectionHandle) -> Result<(), RelayError> {
        if self.connections.remove(&handle.connection_id).is_none() {
            // Already gone on the shell side.
            return Ok(());
        }

        let request_id = Uuid::new_v4();
        let (reply, rx) = oneshot::channel();
        self.pending_disconnects.insert(request_id, reply);
        let _guard = PendingGuard {
            map: &self.pending_disconnects,
            request_id,
        };

        self.send(&RelayMessage::Disconnect {
            request_id,
            guild_id: handle.guild_id,
            connection_id: handle.connection_id,
        })
        .await?;

        // A detached shell takes its connections with it.
        let _ = rx.await;
        Ok(())
    }

    async fn attach_audio_source(
        &self,
        handle: &ConnectionHandle,
        stream: OpenedStream,
        cancel: CancellationToken,
    ) -> Result<(), RelayError> {
        let OpenedStream {
            content_type,
            mut body,
        } = stream;

        self.send(&RelayMessage::AudioStart {
            guild_id: handle.guild_id,
            connection_id: handle.connection_id,
            content_type,
        })
        .await?;

        let tx = self
            .sender()
            .ok_or_else(|| RelayError::Voice("voice bridge detached".into()))?;

        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                chunk = body.next() => match chunk {
                    Some(Ok(bytes)) => {
                        let frame = encode_audio_frame(handle.guild_id, &bytes);
                        if tx.send_async(Message::Binary(frame)).await.is_err() {
                            break Err(RelayError::Voice("voice bridge detached".into()));
                        }
                    }
                    Some(Err(e)) => break Err(e),
                    None => break Ok(()),
                },
            }
        };

        self.try_send(&RelayMessage::AudioEnd {
            guild_id: handle.guild_id,
            connection_id: handle.connection_id,
        });

        result
    }
}
