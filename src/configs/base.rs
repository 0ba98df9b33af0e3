use serde::{Deserialize, Serialize};

use crate::{
    common::types::{AnyResult, GuildId},
    configs::*,
};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub radio: RadioConfig,
    #[serde(default)]
    pub session: SessionConfig,
    pub logging: Option<LoggingConfig>,
}

impl Config {
    /// Reads `config.toml` (or `config.default.toml`), applies `BOT_TOKEN` /
    /// `GUILD_ID` from the environment and validates the result.
    pub fn load() -> AnyResult<(Self, &'static str)> {
        let config_path = if std::path::Path::new("config.toml").exists() {
            "config.toml"
        } else if std::path::Path::new("config.default.toml").exists() {
            "config.default.toml"
        } else {
            return Err("config.toml or config.default.toml not found".into());
        };

        let config_str = std::fs::read_to_string(config_path)?;
        if config_str.trim().is_empty() {
            return Err(format!("{} is empty", config_path).into());
        }

        let mut config = Self::from_toml(&config_str)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok((config, config_path))
    }

    pub fn from_toml(s: &str) -> AnyResult<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Environment values win over the file.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> AnyResult<()> {
        if let Some(token) = lookup("BOT_TOKEN").filter(|t| !t.is_empty()) {
            self.discord.bot_token = token;
        }
        if let Some(raw) = lookup("GUILD_ID").filter(|g| !g.trim().is_empty()) {
            self.discord.guild_ids = raw
                .split(',')
                .map(|id| {
                    id.trim()
                        .parse::<u64>()
                        .map(GuildId)
                        .map_err(|_| format!("GUILD_ID must be a valid integer, got '{}'", id.trim()))
                })
                .collect::<Result<_, _>>()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> AnyResult<()> {
        if self.discord.bot_token.is_empty() {
            return Err("discord.bot_token (or BOT_TOKEN) is required".into());
        }
        if self.discord.guild_ids.is_empty() {
            return Err("discord.guild_ids (or GUILD_ID) is required".into());
        }
        if self.radio.stream_url.is_none() && self.radio.license_url.is_none() {
            return Err("radio.stream_url or radio.license_url is required".into());
        }
        if self.radio.open_attempts == 0 {
            return Err("radio.open_attempts must be at least 1".into());
        }
        let open_budget = self.session.open_timeout();
        let worst_case = self.radio.worst_case_open();
        if open_budget < worst_case {
            return Err(format!(
                "session.open_timeout_secs ({}s) is shorter than the radio retry schedule ({:?}); \
                 raise it or lower radio.request_timeout_secs / radio.open_attempts",
                open_budget.as_secs(),
                worst_case
            )
            .into());
        }
        if self.server.password.is_empty() {
            return Err("server.password must not be empty".into());
        }
        Ok(())
    }
}
