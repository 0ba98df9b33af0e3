//! In-memory transport and stream doubles for session tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::{Notify, broadcast};
use tokio_util::sync::CancellationToken;

use super::state::{SessionState, Transition};
use crate::{
    common::{
        errors::RelayError,
        types::{ChannelId, ConnectionId, GuildId},
    },
    configs::SessionConfig,
    stream::{OpenedStream, StreamSource},
    voice::{ConnectionHandle, VoiceTransport},
};

#[derive(Default)]
pub(crate) struct MockTransport {
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub hang_connect: AtomicBool,
    pub fail_connect: AtomicBool,
    /// While set, `connect` waits on `connect_gate` before completing.
    pub gate_connect: AtomicBool,
    pub connect_gate: Notify,
    /// While set, `disconnect` never returns and the connection stays live.
    pub hang_disconnect: AtomicBool,
    pub max_live: AtomicUsize,
    /// `connect:<channel>` / `disconnect:<channel>` in call order.
    pub calls: parking_lot::Mutex<Vec<String>>,
    live: parking_lot::Mutex<HashMap<GuildId, usize>>,
}

impl MockTransport {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn live(&self, guild_id: GuildId) -> usize {
        self.live.lock().get(&guild_id).copied().unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl VoiceTransport for MockTransport {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<ConnectionHandle, RelayError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push(format!("connect:{channel_id}"));
        if self.hang_connect.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        if self.gate_connect.load(Ordering::SeqCst) {
            self.connect_gate.notified().await;
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(RelayError::Voice("missing permissions".into()));
        }

        let mut live = self.live.lock();
        let count = live.entry(guild_id).or_default();
        *count += 1;
        self.max_live.fetch_max(*count, Ordering::SeqCst);

        Ok(ConnectionHandle {
            guild_id,
            channel_id,
            connection_id: ConnectionId::generate(),
        })
    }

    async fn disconnect(&self, handle: &ConnectionHandle) -> Result<(), RelayError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.calls
            .lock()
            .push(format!("disconnect:{}", handle.channel_id));
        if self.hang_disconnect.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        if let Some(count) = self.live.lock().get_mut(&handle.guild_id) {
            *count = count.saturating_sub(1);
        }
        Ok(())
    }

    async fn attach_audio_source(
        &self,
        _handle: &ConnectionHandle,
        mut stream: OpenedStream,
        cancel: CancellationToken,
    ) -> Result<(), RelayError> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                chunk = stream.body.next() => match chunk {
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e),
                    None => return Ok(()),
                },
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Open {
    Fail,
    /// Never ends on its own.
    Endless,
    /// Yields one chunk, then ends.
    Ends,
    /// Yields one chunk after the delay, then ends.
    EndsAfter(Duration),
    /// `open` never returns.
    Hang,
}

/// Replays a script of open outcomes; `Endless` once the script runs out.
#[derive(Default)]
pub(crate) struct MockSource {
    script: parking_lot::Mutex<VecDeque<Open>>,
    pub opens: AtomicUsize,
}

impl MockSource {
    pub fn scripted(script: impl IntoIterator<Item = Open>) -> Self {
        Self {
            script: parking_lot::Mutex::new(script.into_iter().collect()),
            opens: AtomicUsize::new(0),
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamSource for MockSource {
    async fn open(&self) -> Result<OpenedStream, RelayError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().pop_front().unwrap_or(Open::Endless);
        let body = match next {
            Open::Fail => return Err(RelayError::Connect("upstream returned 503".into())),
            Open::Endless => futures::stream::pending().boxed(),
            Open::Ends => futures::stream::iter([Ok(Bytes::from_static(b"ID3"))]).boxed(),
            Open::EndsAfter(delay) => futures::stream::once(async move {
                tokio::time::sleep(delay).await;
                Ok(Bytes::from_static(b"ID3"))
            })
            .boxed(),
            Open::Hang => futures::future::pending().await,
        };
        Ok(OpenedStream {
            content_type: Some("audio/mpeg".into()),
            body,
        })
    }
}

pub(crate) fn test_config() -> SessionConfig {
    SessionConfig {
        connect_timeout_secs: 2,
        open_timeout_secs: 2,
        disconnect_timeout_secs: 2,
        idle_timeout_secs: 30,
        reaper_interval_secs: 5,
        stable_playback_secs: 30,
    }
}

/// Waits until a transition into `state` is published.
pub(crate) async fn wait_for(rx: &mut broadcast::Receiver<Transition>, state: SessionState) {
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            match rx.recv().await {
                Ok(t) if t.to == state => return,
                Ok(_) => {}
                Err(e) => panic!("transition stream closed: {e}"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no transition to {state}"));
}
