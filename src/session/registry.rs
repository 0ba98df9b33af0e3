use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use futures::future::join_all;
use tracing::{debug, info};

use super::voice_session::VoiceSession;
use crate::{
    common::types::GuildId,
    configs::SessionConfig,
    stream::StreamSource,
    voice::{TransportEvent, TransportEventReceiver, VoiceTransport},
};

/// Owns every guild's [`VoiceSession`]; at most one per guild.
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<VoiceSession>>,
    transport: Arc<dyn VoiceTransport>,
    source: Arc<dyn StreamSource>,
    config: SessionConfig,
}

impl SessionRegistry {
    pub fn new(
        transport: Arc<dyn VoiceTransport>,
        source: Arc<dyn StreamSource>,
        config: SessionConfig,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            transport,
            source,
            config,
        }
    }

    /// Lookup-or-insert under the shard lock; racing callers all get the
    /// same instance.
    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<VoiceSession> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                debug!("[{}] Creating voice session", guild_id);
                VoiceSession::new(
                    guild_id,
                    self.transport.clone(),
                    self.source.clone(),
                    self.config.clone(),
                )
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<VoiceSession>> {
        self.sessions.get(&guild_id).map(|s| s.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drops the guild's session if it is Idle and nobody else holds it.
    ///
    /// The reference-count check runs under the shard lock, so no caller can
    /// be midway through using a session that gets evicted.
    pub fn evict_if_idle(&self, guild_id: GuildId) -> bool {
        let evicted = self
            .sessions
            .remove_if(&guild_id, |_, session| {
                Arc::strong_count(session) == 1 && session.is_idle_now()
            })
            .is_some();
        if evicted {
            debug!("[{}] Evicted idle voice session", guild_id);
        }
        evicted
    }

    /// Forced removal: the session leaves voice before it is dropped. A
    /// session that a racing command brought back up stays registered.
    pub async fn remove(&self, guild_id: GuildId) -> bool {
        let Some(session) = self.get(guild_id) else {
            return false;
        };
        session.shutdown().await;
        self.sessions
            .remove_if(&guild_id, |_, current| {
                Arc::ptr_eq(current, &session) && current.is_idle_now()
            })
            .is_some()
    }

    /// Tears down every session (process shutdown).
    pub async fn shutdown(&self) {
        let guilds: Vec<GuildId> = self.sessions.iter().map(|e| *e.key()).collect();
        info!("Shutting down {} voice session(s)", guilds.len());
        join_all(guilds.into_iter().map(|guild_id| self.remove(guild_id))).await;
    }

    pub async fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Disconnected {
                guild_id,
                connection_id,
            } => match self.get(guild_id) {
                Some(session) => session.on_transport_disconnected(connection_id).await,
                None => debug!("[{}] Disconnect event for unknown session", guild_id),
            },
        }
    }

    /// Feeds transport events into the owning sessions. Each event runs on
    /// its own task so one busy guild does not hold up the others.
    pub fn spawn_event_loop(
        self: &Arc<Self>,
        mut events: TransportEventReceiver,
    ) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let registry = registry.clone();
                tokio::spawn(async move {
                    registry.handle_transport_event(event).await;
                });
            }
            debug!("Transport event channel closed");
        })
    }

    /// Periodically evicts sessions untouched for `idle_timeout`.
    pub fn spawn_idle_reaper(
        self: &Arc<Self>,
        interval: Duration,
        idle_timeout: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let registry = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let stale: Vec<GuildId> = registry
                    .sessions
                    .iter()
                    .filter(|e| e.value().idle_for() >= idle_timeout)
                    .map(|e| *e.key())
                    .collect();
                let evicted = stale
                    .into_iter()
                    .filter(|guild_id| registry.evict_if_idle(*guild_id))
                    .count();
                if evicted > 0 {
                    info!("Evicted {} idle voice session(s)", evicted);
                }
            }
        })
    }
}
