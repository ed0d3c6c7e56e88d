use chrono::Duration;
use color_eyre::eyre::{Result, WrapErr, bail};
use poise::serenity_prelude::{ChannelId, GuildId, UserId};
use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};
use std::{
    num::NonZeroU64,
    path::{Path, PathBuf},
};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Config {
    /// The bot operator. Owner commands only answer to them.
    pub owner_id: u64,
    /// Where errors, startup/shutdown and server join/leave reports go.
    pub bot_log_channel: Option<u64>,
    /// Register commands in this guild only (instant updates while developing).
    pub dev_guild_id: Option<u64>,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// How many messages are remembered for the edit/delete logs.
    #[serde(default = "default_message_cache_capacity")]
    pub message_cache_capacity: usize,
    #[serde(default)]
    pub automod: AutomodConfig,
    #[serde(default)]
    pub welcome: WelcomeConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub streams: StreamConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            owner_id: 0,
            bot_log_channel: None,
            dev_guild_id: None,
            database_path: default_database_path(),
            message_cache_capacity: default_message_cache_capacity(),
            automod: AutomodConfig::default(),
            welcome: WelcomeConfig::default(),
            status: StatusConfig::default(),
            streams: StreamConfig::default(),
        }
    }
}

impl Config {
    /// Fetches the config from the config file in the root directory.
    pub fn create_from_file(config_path: impl AsRef<Path>) -> Result<Config> {
        let file = std::fs::read_to_string(config_path).wrap_err("Could not read config file")?;

        let config: Config = toml::from_str(&file).wrap_err("Could not parse config file")?;
        config.validate()?;

        Ok(config)
    }

    /// Discord IDs are never 0.
    pub fn validate(&self) -> Result<()> {
        if self.owner_id == 0 {
            bail!("owner_id must be set to the bot owner's user ID");
        }
        if self.bot_log_channel == Some(0) {
            bail!("bot_log_channel must be a channel ID, not 0");
        }
        if self.dev_guild_id == Some(0) {
            bail!("dev_guild_id must be a server ID, not 0");
        }

        Ok(())
    }

    /// Reloads the config file and updates the configuration.
    pub fn reload(&mut self, config_path: impl AsRef<Path>) {
        match Config::create_from_file(config_path) {
            Ok(config) => *self = config,
            Err(e) => tracing::warn!("Keeping the old config, reload failed: {:?}", e),
        }
    }

    pub fn owner(&self) -> Option<UserId> {
        NonZeroU64::new(self.owner_id).map(|id| UserId::new(id.get()))
    }

    pub fn bot_log_channel(&self) -> Option<ChannelId> {
        self.bot_log_channel
            .and_then(NonZeroU64::new)
            .map(|id| ChannelId::new(id.get()))
    }

    pub fn dev_guild(&self) -> Option<GuildId> {
        self.dev_guild_id
            .and_then(NonZeroU64::new)
            .map(|id| GuildId::new(id.get()))
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/bot.db")
}

const fn default_message_cache_capacity() -> usize {
    2000
}

#[serde_as]
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AutomodConfig {
    pub enabled: bool,
    /// Hosts (and their subdomains) links may point to.
    pub link_whitelist: Vec<String>,
    /// This many messages inside `spam_window` trips the spam filter.
    pub spam_message_count: usize,
    #[serde_as(as = "DurationSeconds<i64>")]
    pub spam_window: Duration,
    #[serde_as(as = "DurationSeconds<i64>")]
    pub spam_timeout: Duration,
}

impl Default for AutomodConfig {
    fn default() -> Self {
        AutomodConfig {
            enabled: true,
            link_whitelist: ["youtube.com", "youtu.be", "twitch.tv", "discord.com"]
                .map(String::from)
                .to_vec(),
            spam_message_count: 5,
            spam_window: Duration::seconds(5),
            spam_timeout: Duration::minutes(10),
        }
    }
}

/// Candidate channel names for the welcome card links, first existing one wins.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct WelcomeConfig {
    pub rules_channels: Vec<String>,
    pub news_channels: Vec<String>,
    pub minecraft_channels: Vec<String>,
    pub steam_channels: Vec<String>,
    pub support_url: String,
}

impl Default for WelcomeConfig {
    fn default() -> Self {
        WelcomeConfig {
            rules_channels: ["rules", "info", "server-rules"].map(String::from).to_vec(),
            news_channels: ["updates", "news", "announcements"]
                .map(String::from)
                .to_vec(),
            minecraft_channels: ["minecraft", "mc-server", "minecraft-info"]
                .map(String::from)
                .to_vec(),
            steam_channels: ["steam-ids", "steam", "codes"].map(String::from).to_vec(),
            support_url: "https://youtube.com".to_owned(),
        }
    }
}

#[serde_as]
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StatusConfig {
    /// Small logo on the status card, the bot avatar when unset.
    pub thumbnail_url: Option<String>,
    pub banner_url: Option<String>,
    #[serde_as(as = "DurationSeconds<i64>")]
    pub refresh_interval: Duration,
}

impl Default for StatusConfig {
    fn default() -> Self {
        StatusConfig {
            thumbnail_url: None,
            banner_url: None,
            refresh_interval: Duration::minutes(2),
        }
    }
}

#[serde_as]
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    /// Minimum time between two live alerts for the same member.
    #[serde_as(as = "DurationSeconds<i64>")]
    pub alert_cooldown: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            alert_cooldown: Duration::hours(12),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn should_deserialize_properly() {
        let test_input = r#"
owner_id = 123456789109876
bot_log_channel = 555

[automod]
link_whitelist = ["example.com"]
spam_window = 10

[streams]
alert_cooldown = 60
"#;

        let config: Config = toml::from_str(test_input).unwrap();

        assert_eq!(
            config,
            Config {
                owner_id: 123456789109876,
                bot_log_channel: Some(555),
                automod: AutomodConfig {
                    link_whitelist: vec!["example.com".to_owned()],
                    spam_window: Duration::seconds(10),
                    ..Default::default()
                },
                streams: StreamConfig {
                    alert_cooldown: Duration::seconds(60),
                },
                ..Default::default()
            }
        );
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config: Config = toml::from_str("owner_id = 1").unwrap();

        assert_eq!(config.database_path, PathBuf::from("data/bot.db"));
        assert_eq!(config.automod.spam_message_count, 5);
        assert_eq!(config.automod.spam_timeout, Duration::minutes(10));
        assert_eq!(config.status.refresh_interval, Duration::minutes(2));
        assert_eq!(config.streams.alert_cooldown, Duration::hours(12));
        assert_eq!(config.welcome.rules_channels[0], "rules");
        assert_eq!(config.bot_log_channel(), None);
    }

    #[test]
    fn zero_ids_are_rejected() {
        let config: Config = toml::from_str("owner_id = 0").unwrap();
        assert!(config.validate().is_err());
        assert_eq!(config.owner(), None);

        let config: Config = toml::from_str("owner_id = 1\ndev_guild_id = 0").unwrap();
        assert!(config.validate().is_err());
        assert_eq!(config.dev_guild(), None);

        let config: Config = toml::from_str("owner_id = 1\nbot_log_channel = 7").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.owner(), Some(UserId::new(1)));
    }
}
