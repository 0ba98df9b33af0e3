use serde::{Deserialize, Serialize};

use crate::common::types::GuildId;

/// Credentials and guild allow-list shared with the bot shell.
#[derive(Deserialize, Serialize, Clone, Default)]
pub struct DiscordConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub guild_ids: Vec<GuildId>,
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("bot_token", &"<redacted>")
            .field("guild_ids", &self.guild_ids)
            .finish()
    }
}
