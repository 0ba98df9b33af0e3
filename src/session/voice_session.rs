use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use tokio::{
    sync::{Mutex, MutexGuard, broadcast},
    time::Instant,
};
use tracing::{debug, error, info, warn};

use super::{
    playback::PlaybackHandle,
    state::{SessionState, SessionStatus, Transition},
};
use crate::{
    common::{
        errors::RelayError,
        types::{ChannelId, ConnectionId, GuildId},
    },
    configs::SessionConfig,
    stream::{OpenedStream, StreamSource},
    voice::{ConnectionHandle, VoiceTransport},
};

const TRANSITION_BUFFER: usize = 64;

struct SessionInner {
    state: SessionState,
    channel_id: Option<ChannelId>,
    /// Present while Connected or Playing, and until a pending disconnect
    /// resolves.
    connection: Option<ConnectionHandle>,
    /// Present iff Playing.
    playback: Option<PlaybackHandle>,
    last_error: Option<RelayError>,
    stream_retries: u32,
    /// Whether the single automatic stream re-open is still unspent.
    retry_available: bool,
    generation: u64,
}

/// One guild's voice connection and the radio playback attached to it.
///
/// Every operation holds `inner` for its whole transition, so operations on a
/// guild run one at a time in the order they queued on the (fair) mutex.
/// Transport callbacks and playback endings enter through the same lock.
pub struct VoiceSession {
    guild_id: GuildId,
    me: Weak<VoiceSession>,
    inner: Mutex<SessionInner>,
    transport: Arc<dyn VoiceTransport>,
    source: Arc<dyn StreamSource>,
    config: SessionConfig,
    transitions: broadcast::Sender<Transition>,
    last_activity: parking_lot::Mutex<Instant>,
}

impl VoiceSession {
    pub fn new(
        guild_id: GuildId,
        transport: Arc<dyn VoiceTransport>,
        source: Arc<dyn StreamSource>,
        config: SessionConfig,
    ) -> Arc<Self> {
        let (transitions, _) = broadcast::channel(TRANSITION_BUFFER);
        Arc::new_cyclic(|me| Self {
            guild_id,
            me: me.clone(),
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                channel_id: None,
                connection: None,
                playback: None,
                last_error: None,
                stream_retries: 0,
                retry_available: true,
                generation: 0,
            }),
            transport,
            source,
            config,
            transitions,
            last_activity: parking_lot::Mutex::new(Instant::now()),
        })
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Every state change from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Transition> {
        self.transitions.subscribe()
    }

    /// Time since the last command touched this session.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// True when Idle with no transition in flight. Never waits.
    pub fn is_idle_now(&self) -> bool {
        self.inner
            .try_lock()
            .map(|inner| inner.state == SessionState::Idle && inner.connection.is_none())
            .unwrap_or(false)
    }

    pub async fn status(&self) -> SessionStatus {
        let inner = self.inner.lock().await;
        self.snapshot(&inner)
    }

    /// The live voice connection, if any.
    pub async fn connection(&self) -> Option<ConnectionHandle> {
        self.inner.lock().await.connection.clone()
    }

    /// Joins `channel_id`. Same channel is a no-op; another channel is left
    /// first.
    pub async fn join(&self, channel_id: ChannelId) -> Result<SessionStatus, RelayError> {
        let mut inner = self.lock().await;
        self.join_locked(&mut inner, channel_id).await?;
        Ok(self.snapshot(&inner))
    }

    /// Starts the radio on the current connection. Idempotent while Playing.
    pub async fn play(&self) -> Result<SessionStatus, RelayError> {
        let mut inner = self.lock().await;
        self.play_locked(&mut inner).await?;
        Ok(self.snapshot(&inner))
    }

    /// Joins `channel_id` unless already connected, then plays, as one step.
    pub async fn join_and_play(&self, channel_id: ChannelId) -> Result<SessionStatus, RelayError> {
        let mut inner = self.lock().await;
        if !matches!(inner.state, SessionState::Connected | SessionState::Playing) {
            self.join_locked(&mut inner, channel_id).await?;
        }
        self.play_locked(&mut inner).await?;
        Ok(self.snapshot(&inner))
    }

    pub async fn leave(&self) -> Result<SessionStatus, RelayError> {
        let mut inner = self.lock().await;
        self.leave_locked(&mut inner).await?;
        Ok(self.snapshot(&inner))
    }

    /// Forced teardown: releases playback and the voice connection.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        self.recover_interrupted(&mut inner).await;
        if let Err(e) = self.leave_locked(&mut inner).await {
            warn!("[{}] Error while shutting down session: {}", self.guild_id, e);
        }
    }

    /// The platform dropped `connection_id` on its own.
    pub async fn on_transport_disconnected(&self, connection_id: ConnectionId) {
        let mut inner = self.inner.lock().await;
        let current = inner.connection.as_ref().map(|c| c.connection_id);
        if current != Some(connection_id) {
            debug!(
                "[{}] Ignoring disconnect for stale connection {}",
                self.guild_id, connection_id
            );
            return;
        }

        info!("[{}] Voice connection lost; cleaning up", self.guild_id);
        self.stop_playback(&mut inner);
        inner.connection = None;
        inner.channel_id = None;
        self.transition(&mut inner, SessionState::Idle);
    }

    async fn lock(&self) -> MutexGuard<'_, SessionInner> {
        let mut inner = self.inner.lock().await;
        *self.last_activity.lock() = Instant::now();
        self.recover_interrupted(&mut inner).await;
        inner
    }

    /// A caller that was dropped mid-transition leaves a transient state
    /// behind; release whatever it held and start over from Idle.
    async fn recover_interrupted(&self, inner: &mut SessionInner) {
        if !inner.state.is_transient() {
            return;
        }
        warn!(
            "[{}] Recovering session interrupted while {}",
            self.guild_id, inner.state
        );
        self.stop_playback(inner);
        // The handle stays in `inner` until the disconnect resolves, so a
        // recovery that is itself dropped is retried by the next caller.
        if let Some(handle) = inner.connection.clone() {
            if let Err(e) = self.disconnect_transport(&handle).await {
                warn!(
                    "[{}] Could not release connection {} during recovery: {}",
                    self.guild_id, handle.connection_id, e
                );
            }
            inner.connection = None;
        }
        inner.channel_id = None;
        self.transition(inner, SessionState::Idle);
    }

    async fn join_locked(
        &self,
        inner: &mut SessionInner,
        channel_id: ChannelId,
    ) -> Result<(), RelayError> {
        match inner.state {
            SessionState::Connected | SessionState::Playing
                if inner.channel_id == Some(channel_id) =>
            {
                debug!("[{}] Already in channel {}", self.guild_id, channel_id);
                return Ok(());
            }
            SessionState::Connected | SessionState::Playing => {
                info!(
                    "[{}] Moving from channel {:?} to {}",
                    self.guild_id, inner.channel_id, channel_id
                );
                self.leave_locked(inner).await?;
            }
            _ => {}
        }

        let prior = inner.state;
        self.transition(inner, SessionState::Connecting);

        let limit = self.config.connect_timeout();
        match tokio::time::timeout(limit, self.transport.connect(self.guild_id, channel_id)).await
        {
            Ok(Ok(handle)) => {
                info!("[{}] Connected to voice channel {}", self.guild_id, channel_id);
                inner.connection = Some(handle);
                inner.channel_id = Some(channel_id);
                inner.last_error = None;
                self.transition(inner, SessionState::Connected);
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("[{}] Voice connect failed: {}", self.guild_id, e);
                inner.last_error = Some(e.clone());
                self.transition(inner, SessionState::Failed);
                Err(e)
            }
            Err(_) => {
                let e = RelayError::timeout("voice connect", limit);
                warn!("[{}] {}; rolling back to {}", self.guild_id, e, prior);
                inner.last_error = Some(e.clone());
                self.transition(inner, prior);
                Err(e)
            }
        }
    }

    async fn play_locked(&self, inner: &mut SessionInner) -> Result<(), RelayError> {
        match inner.state {
            SessionState::Playing => {
                debug!("[{}] Already playing", self.guild_id);
                return Ok(());
            }
            SessionState::Connected => {}
            state => {
                return Err(RelayError::Voice(format!(
                    "cannot play while {}; join a voice channel first",
                    state
                )));
            }
        }

        inner.stream_retries = 0;
        inner.retry_available = true;

        let stream = match self.open_stream().await {
            Ok(stream) => stream,
            Err(first) => {
                warn!("[{}] Opening radio failed: {}; retrying once", self.guild_id, first);
                inner.stream_retries += 1;
                inner.retry_available = false;
                match self.open_stream().await {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!("[{}] Radio unavailable: {}", self.guild_id, e);
                        inner.last_error = Some(e.clone());
                        return Err(e);
                    }
                }
            }
        };

        self.start_playback(inner, stream);
        Ok(())
    }

    async fn leave_locked(&self, inner: &mut SessionInner) -> Result<(), RelayError> {
        match inner.state {
            SessionState::Idle => return Ok(()),
            SessionState::Failed => {
                inner.last_error = None;
                self.transition(inner, SessionState::Idle);
                return Ok(());
            }
            _ => {}
        }

        self.stop_playback(inner);
        self.transition(inner, SessionState::Leaving);

        // Cleared only after the disconnect resolves; a dropped leave is
        // finished by `recover_interrupted`.
        let result = match inner.connection.clone() {
            Some(handle) => self.disconnect_transport(&handle).await,
            None => Ok(()),
        };

        inner.connection = None;
        inner.channel_id = None;
        inner.last_error = result.as_ref().err().cloned();
        self.transition(inner, SessionState::Idle);
        info!("[{}] Left voice channel", self.guild_id);
        result
    }

    async fn disconnect_transport(&self, handle: &ConnectionHandle) -> Result<(), RelayError> {
        let limit = self.config.disconnect_timeout();
        let result = match tokio::time::timeout(limit, self.transport.disconnect(handle)).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::timeout("voice disconnect", limit)),
        };
        if let Err(e) = &result {
            warn!("[{}] Voice disconnect failed: {}", self.guild_id, e);
        }
        result
    }

    async fn open_stream(&self) -> Result<OpenedStream, RelayError> {
        let limit = self.config.open_timeout();
        tokio::time::timeout(limit, self.source.open())
            .await
            .map_err(|_| RelayError::timeout("stream open", limit))?
    }

    fn start_playback(&self, inner: &mut SessionInner, stream: OpenedStream) {
        let Some(connection) = inner.connection.clone() else {
            error!("[{}] Playback requested without a voice connection", self.guild_id);
            return;
        };

        inner.generation += 1;
        let generation = inner.generation;
        let me = self.me.clone();

        inner.playback = Some(PlaybackHandle::spawn(
            generation,
            self.transport.clone(),
            connection,
            stream,
            move |result| async move {
                if let Some(session) = me.upgrade() {
                    session.on_playback_ended(generation, result).await;
                }
            },
        ));
        inner.last_error = None;
        self.transition(inner, SessionState::Playing);
        info!("[{}] Radio playing", self.guild_id);
    }

    fn stop_playback(&self, inner: &mut SessionInner) {
        if let Some(playback) = inner.playback.take() {
            debug!("[{}] Stopping playback #{}", self.guild_id, playback.generation());
            playback.stop();
        }
    }

    /// The stream behind playback `generation` stopped on its own.
    async fn on_playback_ended(&self, generation: u64, result: Result<(), RelayError>) {
        let mut inner = self.inner.lock().await;
        let Some(playback) = inner
            .playback
            .take_if(|p| p.generation() == generation)
        else {
            debug!("[{}] Ignoring end of stale playback #{}", self.guild_id, generation);
            return;
        };

        let cause = match result {
            Ok(()) => "radio stream ended unexpectedly".to_string(),
            Err(e) => e.to_string(),
        };
        warn!("[{}] Playback #{} stopped: {}", self.guild_id, generation, cause);

        if playback.ran_for() >= self.config.stable_playback() {
            inner.retry_available = true;
        }
        drop(playback);
        self.transition(&mut inner, SessionState::Connected);

        let cause = if inner.retry_available {
            inner.retry_available = false;
            inner.stream_retries += 1;
            info!("[{}] Re-opening radio stream", self.guild_id);
            match self.open_stream().await {
                Ok(stream) => {
                    self.start_playback(&mut inner, stream);
                    return;
                }
                Err(e) => format!("{cause}; retry failed: {e}"),
            }
        } else {
            cause
        };

        // Give the voice channel back rather than sit in it silently.
        if let Some(handle) = inner.connection.clone() {
            if let Err(e) = self.disconnect_transport(&handle).await {
                warn!(
                    "[{}] Could not release connection {} after playback failure: {}",
                    self.guild_id, handle.connection_id, e
                );
            }
            inner.connection = None;
        }
        inner.channel_id = None;
        let e = RelayError::Playback(cause);
        error!("[{}] {}", self.guild_id, e);
        inner.last_error = Some(e);
        self.transition(&mut inner, SessionState::Failed);
    }

    fn transition(&self, inner: &mut SessionInner, to: SessionState) {
        let from = inner.state;
        if !from.can_transition_to(to) {
            error!("[{}] Illegal session transition {} -> {}", self.guild_id, from, to);
            debug_assert!(false, "illegal session transition {from} -> {to}");
        }
        debug_assert_eq!(
            inner.playback.is_some(),
            to == SessionState::Playing,
            "playback must exist iff playing"
        );

        inner.state = to;
        debug!("[{}] {} -> {}", self.guild_id, from, to);
        let _ = self.transitions.send(Transition {
            guild_id: self.guild_id,
            from,
            to,
        });
    }

    fn snapshot(&self, inner: &SessionInner) -> SessionStatus {
        SessionStatus {
            guild_id: self.guild_id,
            state: inner.state,
            channel_id: inner.channel_id,
            last_error: inner.last_error.clone(),
            stream_retries: inner.stream_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::{
        common::errors::ErrorKind,
        session::testing::{MockSource, MockTransport, Open, test_config, wait_for},
    };

    const GUILD: GuildId = GuildId(1);

    fn session(
        script: impl IntoIterator<Item = Open>,
    ) -> (Arc<VoiceSession>, Arc<MockTransport>, Arc<MockSource>) {
        let transport = Arc::new(MockTransport::default());
        let source = Arc::new(MockSource::scripted(script));
        let session = VoiceSession::new(GUILD, transport.clone(), source.clone(), test_config());
        (session, transport, source)
    }

    /// Lets spawned tasks run until `done` holds.
    async fn settle(done: impl Fn() -> bool) {
        for _ in 0..100 {
            if done() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("spawned work never reached the expected point");
    }

    #[tokio::test]
    async fn test_join_same_channel_is_noop() {
        let (session, transport, _) = session([]);

        session.join(ChannelId(10)).await.unwrap();
        let status = session.join(ChannelId(10)).await.unwrap();

        assert_eq!(status.state, SessionState::Connected);
        assert_eq!(status.channel_id, Some(ChannelId(10)));
        assert_eq!(transport.connects(), 1);
        assert_eq!(transport.disconnects(), 0);
    }

    #[tokio::test]
    async fn test_switching_channel_disconnects_first() {
        let (session, transport, _) = session([]);

        session.join(ChannelId(10)).await.unwrap();
        let status = session.join(ChannelId(20)).await.unwrap();

        assert_eq!(status.channel_id, Some(ChannelId(20)));
        assert_eq!(
            transport.calls(),
            ["connect:10", "disconnect:10", "connect:20"]
        );
        assert_eq!(transport.max_live.load(Ordering::SeqCst), 1);
        assert_eq!(transport.live(GUILD), 1);
    }

    #[tokio::test]
    async fn test_radio_retries_failed_open_once() {
        let (session, _, source) = session([Open::Fail, Open::Endless]);

        let status = session.join_and_play(ChannelId(10)).await.unwrap();

        assert_eq!(status.state, SessionState::Playing);
        assert_eq!(status.stream_retries, 1);
        assert_eq!(status.last_error, None);
        assert_eq!(source.opens(), 2);
    }

    #[tokio::test]
    async fn test_radio_stays_connected_when_stream_unavailable() {
        let (session, transport, source) = session([Open::Fail, Open::Fail]);

        let err = session.join_and_play(ChannelId(10)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connect);

        let status = session.status().await;
        assert_eq!(status.state, SessionState::Connected);
        assert_eq!(status.last_error, Some(err));
        assert_eq!(source.opens(), 2);
        assert_eq!(transport.live(GUILD), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_open_rolls_back_to_connected() {
        let (session, transport, source) = session([Open::Hang, Open::Hang]);

        let err = session.join_and_play(ChannelId(10)).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        let status = session.status().await;
        assert_eq!(status.state, SessionState::Connected);
        assert_eq!(status.channel_id, Some(ChannelId(10)));
        assert_eq!(status.last_error, Some(err));
        assert_eq!(status.stream_retries, 1);
        assert_eq!(source.opens(), 2);
        assert_eq!(transport.live(GUILD), 1);
    }

    #[tokio::test]
    async fn test_radio_while_playing_is_noop() {
        let (session, transport, source) = session([]);

        session.join_and_play(ChannelId(10)).await.unwrap();
        let status = session.join_and_play(ChannelId(20)).await.unwrap();

        assert_eq!(status.state, SessionState::Playing);
        assert_eq!(status.channel_id, Some(ChannelId(10)));
        assert_eq!(transport.connects(), 1);
        assert_eq!(source.opens(), 1);
    }

    #[tokio::test]
    async fn test_play_requires_connection() {
        let (session, _, source) = session([]);

        let err = session.play().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Voice);
        assert_eq!(session.status().await.state, SessionState::Idle);
        assert_eq!(source.opens(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_rolls_back_to_idle() {
        let (session, transport, _) = session([]);
        transport.hang_connect.store(true, Ordering::SeqCst);

        let err = session.join(ChannelId(10)).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        let status = session.status().await;
        assert_eq!(status.state, SessionState::Idle);
        assert_eq!(status.channel_id, None);
        assert_eq!(status.last_error, Some(err));
    }

    #[tokio::test]
    async fn test_connect_error_fails_then_recovers() {
        let (session, transport, _) = session([]);
        transport.fail_connect.store(true, Ordering::SeqCst);

        let err = session.join(ChannelId(10)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Voice);
        assert_eq!(session.status().await.state, SessionState::Failed);

        transport.fail_connect.store(false, Ordering::SeqCst);
        let status = session.join(ChannelId(10)).await.unwrap();
        assert_eq!(status.state, SessionState::Connected);
        assert_eq!(status.last_error, None);
    }

    #[tokio::test]
    async fn test_published_transitions_are_valid() {
        let (session, _, _) = session([]);
        let mut rx = session.subscribe();

        session.join_and_play(ChannelId(10)).await.unwrap();
        session.join(ChannelId(20)).await.unwrap();
        session.leave().await.unwrap();

        let mut seen = Vec::new();
        while let Ok(t) = rx.try_recv() {
            assert!(t.from.can_transition_to(t.to), "{} -> {}", t.from, t.to);
            seen.push(t.to);
        }
        use SessionState::*;
        assert_eq!(
            seen,
            [Connecting, Connected, Playing, Leaving, Idle, Connecting, Connected, Leaving, Idle]
        );
    }

    #[tokio::test]
    async fn test_leave_waits_for_inflight_radio() {
        let (session, transport, _) = session([]);
        transport.gate_connect.store(true, Ordering::SeqCst);
        let mut rx = session.subscribe();

        let radio = tokio::spawn({
            let session = session.clone();
            async move { session.join_and_play(ChannelId(10)).await }
        });
        settle(|| transport.connects() == 1).await;

        let leave = tokio::spawn({
            let session = session.clone();
            async move { session.leave().await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!leave.is_finished());
        assert_eq!(transport.calls(), ["connect:10"]);

        transport.connect_gate.notify_one();
        let radio = radio.await.unwrap().unwrap();
        let left = leave.await.unwrap().unwrap();

        assert_eq!(radio.state, SessionState::Playing);
        assert_eq!(left.state, SessionState::Idle);
        assert_eq!(transport.calls(), ["connect:10", "disconnect:10"]);
        assert_eq!(transport.live(GUILD), 0);

        let mut seen = Vec::new();
        while let Ok(t) = rx.try_recv() {
            seen.push(t.to);
        }
        use SessionState::*;
        assert_eq!(seen, [Connecting, Connected, Playing, Leaving, Idle]);
    }

    #[tokio::test]
    async fn test_second_join_runs_after_first_completes() {
        let (session, transport, _) = session([]);
        transport.gate_connect.store(true, Ordering::SeqCst);

        let first = tokio::spawn({
            let session = session.clone();
            async move { session.join(ChannelId(10)).await }
        });
        settle(|| transport.connects() == 1).await;
        let second = tokio::spawn({
            let session = session.clone();
            async move { session.join(ChannelId(20)).await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(transport.connects(), 1);

        transport.gate_connect.store(false, Ordering::SeqCst);
        transport.connect_gate.notify_one();
        first.await.unwrap().unwrap();
        let status = second.await.unwrap().unwrap();

        assert_eq!(status.channel_id, Some(ChannelId(20)));
        assert_eq!(
            transport.calls(),
            ["connect:10", "disconnect:10", "connect:20"]
        );
        assert_eq!(transport.max_live.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_leave_releases_everything() {
        let (session, transport, _) = session([]);

        session.join_and_play(ChannelId(10)).await.unwrap();
        let status = session.leave().await.unwrap();

        assert_eq!(status.state, SessionState::Idle);
        assert_eq!(status.channel_id, None);
        assert_eq!(transport.live(GUILD), 0);
        assert!(session.is_idle_now());

        // Leaving again is harmless.
        session.leave().await.unwrap();
        assert_eq!(transport.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_stream_end_reopens_once() {
        let (session, _, source) = session([Open::Ends]);
        let mut rx = session.subscribe();

        session.join_and_play(ChannelId(10)).await.unwrap();
        wait_for(&mut rx, SessionState::Playing).await;
        wait_for(&mut rx, SessionState::Connected).await;
        wait_for(&mut rx, SessionState::Playing).await;

        let status = session.status().await;
        assert_eq!(status.state, SessionState::Playing);
        assert_eq!(status.stream_retries, 1);
        assert_eq!(source.opens(), 2);
    }

    #[tokio::test]
    async fn test_stream_end_after_retry_fails_session() {
        let (session, transport, _) = session([Open::Ends, Open::Ends]);
        let mut rx = session.subscribe();

        session.join_and_play(ChannelId(10)).await.unwrap();
        wait_for(&mut rx, SessionState::Failed).await;

        let status = session.status().await;
        assert_eq!(status.channel_id, None);
        assert!(matches!(status.last_error, Some(RelayError::Playback(_))));
        assert_eq!(transport.live(GUILD), 0);

        // A new radio command starts over.
        let status = session.join_and_play(ChannelId(10)).await.unwrap();
        assert_eq!(status.state, SessionState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stable_playback_earns_retry_back() {
        // The first open fails, spending the automatic retry up front. The
        // feed then outlives `stable_playback_secs` before ending.
        let (session, _, source) = session([
            Open::Fail,
            Open::EndsAfter(Duration::from_secs(31)),
            Open::Endless,
        ]);
        let mut rx = session.subscribe();

        let status = session.join_and_play(ChannelId(10)).await.unwrap();
        assert_eq!(status.stream_retries, 1);

        wait_for(&mut rx, SessionState::Playing).await;
        wait_for(&mut rx, SessionState::Connected).await;
        wait_for(&mut rx, SessionState::Playing).await;

        let status = session.status().await;
        assert_eq!(status.state, SessionState::Playing);
        assert_eq!(status.stream_retries, 2);
        assert_eq!(source.opens(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_playback_does_not_earn_retry_back() {
        let (session, transport, source) = session([
            Open::Fail,
            Open::EndsAfter(Duration::from_secs(5)),
        ]);
        let mut rx = session.subscribe();

        session.join_and_play(ChannelId(10)).await.unwrap();
        wait_for(&mut rx, SessionState::Failed).await;

        assert_eq!(source.opens(), 2);
        assert_eq!(transport.live(GUILD), 0);
    }

    #[tokio::test]
    async fn test_external_disconnect_goes_idle() {
        let (session, transport, _) = session([]);
        let mut rx = session.subscribe();
        session.join_and_play(ChannelId(10)).await.unwrap();

        session
            .on_transport_disconnected(ConnectionId::generate())
            .await;
        assert_eq!(session.status().await.state, SessionState::Playing);

        let current = session.connection().await.unwrap();
        session
            .on_transport_disconnected(current.connection_id)
            .await;
        wait_for(&mut rx, SessionState::Idle).await;

        let status = session.status().await;
        assert_eq!(status.channel_id, None);
        // The platform already dropped us; nothing to disconnect.
        assert_eq!(transport.disconnects(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_join_is_recovered() {
        let (session, transport, _) = session([]);
        transport.hang_connect.store(true, Ordering::SeqCst);

        let pending = tokio::spawn({
            let session = session.clone();
            async move { session.join(ChannelId(10)).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        pending.abort();
        let _ = pending.await;

        transport.hang_connect.store(false, Ordering::SeqCst);
        let status = session.join(ChannelId(20)).await.unwrap();
        assert_eq!(status.state, SessionState::Connected);
        assert_eq!(status.channel_id, Some(ChannelId(20)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_leave_still_releases_connection() {
        let (session, transport, _) = session([]);
        session.join(ChannelId(10)).await.unwrap();
        transport.hang_disconnect.store(true, Ordering::SeqCst);

        let pending = tokio::spawn({
            let session = session.clone();
            async move { session.leave().await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        pending.abort();
        let _ = pending.await;
        assert_eq!(transport.live(GUILD), 1);

        transport.hang_disconnect.store(false, Ordering::SeqCst);
        let status = session.leave().await.unwrap();

        assert_eq!(status.state, SessionState::Idle);
        assert_eq!(transport.live(GUILD), 0);
        assert_eq!(transport.disconnects(), 2);
        assert!(session.is_idle_now());
    }

    #[tokio::test]
    async fn test_shutdown_leaves_voice() {
        let (session, transport, _) = session([]);
        session.join_and_play(ChannelId(10)).await.unwrap();

        session.shutdown().await;

        assert_eq!(session.status().await.state, SessionState::Idle);
        assert_eq!(transport.live(GUILD), 0);
    }
}
