use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounds for the per-guild voice session state machine.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_ten")]
    pub connect_timeout_secs: u64,
    /// Must cover the radio's full retry schedule.
    #[serde(default = "default_open_timeout_secs")]
    pub open_timeout_secs: u64,
    #[serde(default = "default_ten")]
    pub disconnect_timeout_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,
    /// Playback that survived this long earns back its automatic retry.
    #[serde(default = "default_stable_playback_secs")]
    pub stable_playback_secs: u64,
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_secs(self.disconnect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs.max(1))
    }

    pub fn stable_playback(&self) -> Duration {
        Duration::from_secs(self.stable_playback_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_ten(),
            open_timeout_secs: default_open_timeout_secs(),
            disconnect_timeout_secs: default_ten(),
            idle_timeout_secs: default_idle_timeout_secs(),
            reaper_interval_secs: default_reaper_interval_secs(),
            stable_playback_secs: default_stable_playback_secs(),
        }
    }
}

fn default_ten() -> u64 {
    10
}

fn default_open_timeout_secs() -> u64 {
    20
}

fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_reaper_interval_secs() -> u64 {
    60
}

fn default_stable_playback_secs() -> u64 {
    30
}
