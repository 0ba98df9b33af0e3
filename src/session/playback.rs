use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    common::errors::RelayError,
    stream::OpenedStream,
    voice::{ConnectionHandle, VoiceTransport},
};

/// The running radio feed of a session. Owned by exactly one session.
pub(crate) struct PlaybackHandle {
    generation: u64,
    cancel: CancellationToken,
    started_at: Instant,
}

impl PlaybackHandle {
    /// Starts forwarding `stream` into `connection`. `on_end` runs once the
    /// stream stops on its own; it is skipped after [`PlaybackHandle::stop`].
    pub(crate) fn spawn<F, Fut>(
        generation: u64,
        transport: Arc<dyn VoiceTransport>,
        connection: ConnectionHandle,
        stream: OpenedStream,
        on_end: F,
    ) -> Self
    where
        F: FnOnce(Result<(), RelayError>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tokio::spawn(async move {
            let result = transport
                .attach_audio_source(&connection, stream, token.clone())
                .await;
            if token.is_cancelled() {
                return;
            }
            on_end(result).await;
        });

        Self {
            generation,
            cancel,
            started_at: Instant::now(),
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn ran_for(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub(crate) fn stop(self) {
        self.cancel.cancel();
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
