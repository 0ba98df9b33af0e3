use base64::{Engine as _, engine::general_purpose::STANDARD};
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, info};

use crate::common::types::{AnyResult, now_ms};

/// The stream and track-title locations a licence currently points to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoints {
    pub stream_url: String,
    /// Path (relative to the radio origin) serving the current title.
    pub text_url: Option<String>,
}

#[derive(Deserialize)]
struct LicenseDocument {
    streams: Vec<Vec<LicenseStream>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LicenseStream {
    url: String,
    #[serde(default)]
    text_url: Option<String>,
}

/// Decodes a licence body: base64 text wrapping
/// `{"streams": [[{"url": "...", "textUrl": "..."}]]}`.
pub fn decode_license(body: &str) -> AnyResult<StreamEndpoints> {
    let raw = STANDARD.decode(body.trim())?;
    let doc: LicenseDocument = serde_json::from_slice(&raw)?;
    let first = doc
        .streams
        .into_iter()
        .next()
        .and_then(|group| group.into_iter().next())
        .ok_or("licence contains no streams")?;

    Ok(StreamEndpoints {
        stream_url: first.url,
        text_url: first.text_url,
    })
}

/// Resolves the rotating stream URL from the radio's player licence.
pub struct LicenseResolver {
    client: reqwest::Client,
    license_url: String,
    latest: RwLock<Option<StreamEndpoints>>,
}

impl LicenseResolver {
    pub fn new(client: reqwest::Client, license_url: impl Into<String>) -> Self {
        Self {
            client,
            license_url: license_url.into(),
            latest: RwLock::new(None),
        }
    }

    pub fn license_url(&self) -> &str {
        &self.license_url
    }

    /// Fetches the licence again; the cache-busting `_` parameter keeps
    /// intermediaries from replaying a stale URL.
    pub async fn resolve(&self) -> AnyResult<StreamEndpoints> {
        let res = self
            .client
            .get(&self.license_url)
            .query(&[("_", now_ms().to_string())])
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(format!("Licence fetch failed ({}): {}", res.status(), self.license_url).into());
        }

        let body = res.text().await?;
        let endpoints = decode_license(&body)?;

        let changed = self.latest.read().as_ref() != Some(&endpoints);
        if changed {
            info!("Stream URL and track name URL updated: {}", endpoints.stream_url);
        } else {
            debug!("Licence unchanged: {}", endpoints.stream_url);
        }
        *self.latest.write() = Some(endpoints.clone());

        Ok(endpoints)
    }

    /// Last successfully resolved endpoints, if any.
    pub fn latest(&self) -> Option<StreamEndpoints> {
        self.latest.read().clone()
    }
}
