use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::stream::Backoff;

/// Where the radio feed comes from and how hard to try reaching it.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RadioConfig {
    /// Fixed stream URL. Ignored when `license_url` is set.
    #[serde(default)]
    pub stream_url: Option<String>,
    /// Player licence endpoint that resolves to the current stream URL.
    #[serde(default)]
    pub license_url: Option<String>,
    /// Origin the licence's relative `textUrl` is joined onto.
    #[serde(default)]
    pub text_base_url: Option<String>,
    #[serde(default = "default_open_attempts")]
    pub open_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    /// Bound on each HTTP attempt up to the response head.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// An open stream that delivers no bytes for this long is treated as dead.
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,
    #[serde(default = "default_metadata_poll_secs")]
    pub metadata_poll_secs: u64,
    #[serde(default = "default_true")]
    pub artwork_lookup: bool,
}

impl RadioConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs.max(1))
    }

    /// Longest one `open()` can take: every attempt times out and every
    /// backoff delay is slept.
    pub fn worst_case_open(&self) -> Duration {
        let attempts = self.open_attempts.max(1);
        let mut backoff = Backoff::new(
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_cap_ms),
            attempts - 1,
        );
        let mut total = self.request_timeout() * attempts;
        while !backoff.is_exhausted() {
            total += backoff.next();
        }
        total
    }

    pub fn metadata_poll_interval(&self) -> Duration {
        Duration::from_secs(self.metadata_poll_secs.max(1))
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            stream_url: None,
            license_url: None,
            text_base_url: None,
            open_attempts: default_open_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            stall_timeout_secs: default_stall_timeout_secs(),
            metadata_poll_secs: default_metadata_poll_secs(),
            artwork_lookup: true,
        }
    }
}

fn default_open_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_cap_ms() -> u64 {
    4_000
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_stall_timeout_secs() -> u64 {
    15
}

fn default_metadata_poll_secs() -> u64 {
    5
}

fn default_true() -> bool {
    true
}
