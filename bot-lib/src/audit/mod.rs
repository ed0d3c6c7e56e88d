//! Mirrors server events into the configured log channels.

use crate::data::State;
use bot_db::settings::{SettingsDb, keys};
use color_eyre::eyre::{Result, WrapErr};
use poise::serenity_prelude::{CacheHttp, ChannelId, CreateEmbed, CreateMessage, GuildId};

pub mod members;
pub mod messages;
pub mod profile;
pub mod voice;

/// Which log an event goes to. Every kind falls back to the general log channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, poise::ChoiceParameter)]
pub enum LogKind {
    #[name = "General (fallback for everything)"]
    General,
    #[name = "Joins"]
    Join,
    #[name = "Leaves"]
    Leave,
    #[name = "Moderation (kicks, bans, timeouts)"]
    Moderation,
    #[name = "Voice"]
    Voice,
    #[name = "Deleted messages"]
    Delete,
    #[name = "Edited messages"]
    Edit,
    #[name = "Profile changes"]
    Profile,
}

impl LogKind {
    pub fn key(self) -> &'static str {
        match self {
            LogKind::General => keys::LOG_CHANNEL,
            LogKind::Join => keys::LOG_JOIN,
            LogKind::Leave => keys::LOG_LEAVE,
            LogKind::Moderation => keys::LOG_MOD,
            LogKind::Voice => keys::LOG_VOICE,
            LogKind::Delete => keys::LOG_DELETE,
            LogKind::Edit => keys::LOG_EDIT,
            LogKind::Profile => keys::LOG_PROFILE,
        }
    }
}

/// The channel for `kind`, or the general log channel when that one isn't set.
pub fn log_channel(
    settings: &SettingsDb,
    guild_id: GuildId,
    kind: LogKind,
) -> Result<Option<ChannelId>> {
    let settings = settings.get(guild_id)?;

    Ok(settings
        .id(kind.key())
        .or_else(|| settings.id(keys::LOG_CHANNEL))
        .map(ChannelId::new))
}

/// Sends `embed` to the log for `kind`. Does nothing if no log channel is configured.
pub async fn send_log(
    ctx: impl CacheHttp,
    data: &State,
    guild_id: GuildId,
    kind: LogKind,
    embed: CreateEmbed,
) -> Result<()> {
    let Some(channel) = log_channel(&data.settings, guild_id, kind)? else {
        return Ok(());
    };

    channel
        .send_message(ctx, CreateMessage::new().embed(embed))
        .await
        .wrap_err_with(|| format!("Failed to send {kind:?} log to {channel}"))?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use bot_db::BotDb;

    #[test]
    fn falls_back_to_general_channel() {
        let db = BotDb::temporary().unwrap();
        let settings = SettingsDb::new(&db).unwrap();
        let guild = GuildId::new(7);

        assert_eq!(log_channel(&settings, guild, LogKind::Voice).unwrap(), None);

        settings.set_id(guild, keys::LOG_CHANNEL, 100u64).unwrap();
        assert_eq!(
            log_channel(&settings, guild, LogKind::Voice).unwrap(),
            Some(ChannelId::new(100))
        );

        settings.set_id(guild, keys::LOG_VOICE, 200u64).unwrap();
        assert_eq!(
            log_channel(&settings, guild, LogKind::Voice).unwrap(),
            Some(ChannelId::new(200))
        );
        assert_eq!(
            log_channel(&settings, guild, LogKind::Join).unwrap(),
            Some(ChannelId::new(100))
        );
    }
}
