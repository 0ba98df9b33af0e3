use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream::BoxStream};
use tracing::{debug, info, warn};

use super::{backoff::Backoff, license::LicenseResolver};
use crate::{
    common::{
        errors::RelayError,
        http::HttpClient,
        types::AnyResult,
    },
    configs::RadioConfig,
};

/// Lazy, effectively infinite radio byte stream. Dropping it closes the feed.
pub type AudioStream = BoxStream<'static, Result<Bytes, RelayError>>;

pub struct OpenedStream {
    pub content_type: Option<String>,
    pub body: AudioStream,
}

impl std::fmt::Debug for OpenedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedStream")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Something that can open the radio feed.
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Opens a readable byte stream, retrying internally; fails with
    /// [`RelayError::Connect`] once retries are spent.
    async fn open(&self) -> Result<OpenedStream, RelayError>;
}

enum StreamLocation {
    Fixed(String),
    License(Arc<LicenseResolver>),
}

impl std::fmt::Display for StreamLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed(url) => write!(f, "{}", url),
            Self::License(resolver) => write!(f, "licence {}", resolver.license_url()),
        }
    }
}

/// Opens the radio feed over HTTP.
pub struct HttpStreamSource {
    client: reqwest::Client,
    location: StreamLocation,
    attempts: u32,
    backoff_base: Duration,
    backoff_cap: Duration,
    request_timeout: Duration,
    stall_timeout: Duration,
}

impl HttpStreamSource {
    pub fn from_config(
        config: &RadioConfig,
        resolver: Option<Arc<LicenseResolver>>,
    ) -> AnyResult<Self> {
        let location = match (resolver, &config.stream_url) {
            (Some(resolver), _) => StreamLocation::License(resolver),
            (None, Some(url)) => StreamLocation::Fixed(url.clone()),
            (None, None) => return Err("no stream URL or licence configured".into()),
        };

        Ok(Self {
            client: HttpClient::new_streaming(config.request_timeout())?,
            location,
            attempts: config.open_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_cap: Duration::from_millis(config.backoff_cap_ms),
            request_timeout: config.request_timeout(),
            stall_timeout: config.stall_timeout(),
        })
    }

    async fn current_url(&self) -> AnyResult<String> {
        match &self.location {
            StreamLocation::Fixed(url) => Ok(url.clone()),
            StreamLocation::License(resolver) => Ok(resolver.resolve().await?.stream_url),
        }
    }

    async fn open_once(&self) -> AnyResult<OpenedStream> {
        let url = self.current_url().await?;
        debug!("Opening radio stream: {}", url);

        let request = self
            .client
            .get(&url)
            .header("Accept", "*/*")
            .header("Icy-MetaData", "0")
            .send();

        let res = tokio::time::timeout(self.request_timeout, request)
            .await
            .map_err(|_| format!("no response within {:?}: {}", self.request_timeout, url))??;

        if !res.status().is_success() {
            return Err(format!("Stream fetch failed ({}): {}", res.status(), url).into());
        }

        let content_type = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        info!("Opened radio stream: {} (type={:?})", url, content_type);

        let body = res
            .bytes_stream()
            .map_err(|e| RelayError::Playback(e.to_string()))
            .boxed();

        Ok(OpenedStream {
            content_type,
            body: with_stall_timeout(body, self.stall_timeout),
        })
    }
}

/// Fails the stream with [`RelayError::Playback`] once no chunk arrives for
/// `limit`, then ends it. A radio server can keep the socket open and stop
/// sending.
fn with_stall_timeout(body: AudioStream, limit: Duration) -> AudioStream {
    futures::stream::unfold(Some(body), move |body| async move {
        let mut body = body?;
        match tokio::time::timeout(limit, body.next()).await {
            Ok(Some(chunk)) => Some((chunk, Some(body))),
            Ok(None) => None,
            Err(_) => {
                warn!("Radio stream stalled: no audio for {:?}", limit);
                Some((
                    Err(RelayError::Playback(format!(
                        "no audio received for {}s",
                        limit.as_secs()
                    ))),
                    None,
                ))
            }
        }
    })
    .boxed()
}

#[async_trait]
impl StreamSource for HttpStreamSource {
    async fn open(&self) -> Result<OpenedStream, RelayError> {
        let mut backoff = Backoff::new(self.backoff_base, self.backoff_cap, self.attempts - 1);

        loop {
            match self.open_once().await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    if backoff.is_exhausted() {
                        warn!(
                            "Radio stream unreachable after {} attempts: {}",
                            backoff.retries() + 1,
                            e
                        );
                        return Err(RelayError::Connect(e.to_string()));
                    }
                    let delay = backoff.next();
                    warn!(
                        "Opening {} failed: {}. Retrying in {:?}",
                        self.location, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
