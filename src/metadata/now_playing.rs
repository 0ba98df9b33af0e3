use std::{sync::Arc, time::Duration};

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::artwork::ArtworkLookup;
use crate::{
    common::types::{AnyResult, now_ms},
    stream::LicenseResolver,
};

pub const UNKNOWN_TRACK: &str = "Unknown Track";

/// The track the radio is currently airing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlaying {
    pub title: String,
    pub artwork_url: Option<String>,
    /// Unix ms when the title last changed.
    pub updated_at: u64,
}

/// Extracts `title` from a form-encoded body such as
/// `title=Artist+-+Song&artist=...`.
pub fn parse_title(body: &str) -> String {
    body.trim()
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "title")
        .and_then(|(_, value)| {
            urlencoding::decode(&value.replace('+', " "))
                .ok()
                .map(|title| title.trim().to_string())
        })
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| UNKNOWN_TRACK.to_string())
}

/// Polls the radio's track-title endpoint and keeps the latest title.
pub struct NowPlayingTracker {
    client: reqwest::Client,
    resolver: Arc<LicenseResolver>,
    text_base_url: String,
    artwork: Option<ArtworkLookup>,
    current: RwLock<Option<NowPlaying>>,
}

impl NowPlayingTracker {
    /// `text_base_url` defaults to the licence URL's origin.
    pub fn new(
        client: reqwest::Client,
        resolver: Arc<LicenseResolver>,
        text_base_url: Option<&str>,
        artwork: Option<ArtworkLookup>,
    ) -> AnyResult<Self> {
        let text_base_url = match text_base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => reqwest::Url::parse(resolver.license_url())?
                .origin()
                .ascii_serialization(),
        };

        Ok(Self {
            client,
            resolver,
            text_base_url,
            artwork,
            current: RwLock::new(None),
        })
    }

    pub fn current(&self) -> Option<NowPlaying> {
        self.current.read().clone()
    }

    /// Fetches the title once. Returns whether it changed.
    pub async fn refresh(&self) -> AnyResult<bool> {
        let endpoints = match self.resolver.latest() {
            Some(endpoints) => endpoints,
            None => self.resolver.resolve().await?,
        };
        let Some(text_url) = endpoints.text_url else {
            debug!("Licence has no track name URL");
            return Ok(false);
        };

        let url = if text_url.starts_with("http") {
            text_url
        } else {
            format!("{}{}", self.text_base_url, text_url)
        };
        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let title = parse_title(&body);

        if self.current.read().as_ref().map(|np| np.title.as_str()) == Some(title.as_str()) {
            return Ok(false);
        }
        info!("Updated track name to: {}", title);

        let artwork_url = match &self.artwork {
            Some(lookup) if title != UNKNOWN_TRACK => lookup.lookup(&title).await,
            _ => None,
        };

        *self.current.write() = Some(NowPlaying {
            title,
            artwork_url,
            updated_at: now_ms(),
        });
        Ok(true)
    }

    /// Refreshes every `interval` until the tracker is dropped.
    pub fn spawn(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let tracker = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(tracker) = tracker.upgrade() else {
                    break;
                };
                if let Err(e) = tracker.refresh().await {
                    warn!("Error updating track name: {}", e);
                }
            }
        })
    }
}
