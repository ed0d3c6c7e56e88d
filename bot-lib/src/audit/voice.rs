use super::{LogKind, send_log};
use crate::{data::State, utils::format_hms};
use ahash::AHashMap;
use chrono::{DateTime, TimeDelta, Utc};
use color_eyre::eyre::Result;
use parking_lot::Mutex;
use poise::serenity_prelude::{
    self as serenity, ChannelId, Colour, CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter,
    GuildId, Mentionable, Timestamp, UserId, VoiceState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceTransition {
    Joined(ChannelId),
    Left(ChannelId),
    Moved { from: ChannelId, to: ChannelId },
}

impl VoiceTransition {
    /// `None` for mute/deafen/stream toggles that keep the member where they were.
    pub fn classify(before: Option<ChannelId>, after: Option<ChannelId>) -> Option<Self> {
        match (before, after) {
            (None, Some(to)) => Some(VoiceTransition::Joined(to)),
            (Some(from), None) => Some(VoiceTransition::Left(from)),
            (Some(from), Some(to)) if from != to => Some(VoiceTransition::Moved { from, to }),
            _ => None,
        }
    }
}

/// When each member connected, for the session length on leave.
#[derive(Default)]
pub struct VoiceSessions(Mutex<AHashMap<(GuildId, UserId), DateTime<Utc>>>);

impl VoiceSessions {
    pub fn start(&self, guild_id: GuildId, user_id: UserId, at: DateTime<Utc>) {
        self.0.lock().insert((guild_id, user_id), at);
    }

    /// How long the session lasted, `None` if it started before the bot was watching.
    pub fn end(&self, guild_id: GuildId, user_id: UserId, at: DateTime<Utc>) -> Option<TimeDelta> {
        self.0
            .lock()
            .remove(&(guild_id, user_id))
            .map(|started| at - started)
    }
}

pub async fn voice_state_changed(
    ctx: &serenity::Context,
    data: &State,
    old: Option<&VoiceState>,
    new: &VoiceState,
) -> Result<()> {
    let Some(guild_id) = new.guild_id else {
        return Ok(());
    };

    let Some(transition) =
        VoiceTransition::classify(old.and_then(|old| old.channel_id), new.channel_id)
    else {
        return Ok(());
    };

    let now = Utc::now();
    let user_id = new.user_id;

    let (name, avatar) = match &new.member {
        Some(member) => (member.user.name.clone(), Some(member.face())),
        None => match user_id.to_user(ctx).await {
            Ok(user) => (user.name.clone(), Some(user.face())),
            Err(_) => (user_id.to_string(), None),
        },
    };

    let author = |title: &str| {
        let author = CreateEmbedAuthor::new(title);
        match &avatar {
            Some(avatar) => author.icon_url(avatar),
            None => author,
        }
    };

    let embed = match transition {
        VoiceTransition::Joined(channel) => {
            data.voice_sessions.start(guild_id, user_id, now);

            CreateEmbed::new()
                .author(author("Voice Join"))
                .description(format!("🎤 **{name}** joined {}", channel.mention()))
                .colour(Colour::DARK_GREEN)
        }
        VoiceTransition::Left(channel) => {
            let duration = data
                .voice_sessions
                .end(guild_id, user_id, now)
                .map(format_hms)
                .unwrap_or_else(|| "Unknown".to_owned());

            CreateEmbed::new()
                .author(author("Voice Leave"))
                .description(format!("👋 **{name}** left {}", channel.mention()))
                .colour(Colour::RED)
                .field("Duration", duration, false)
        }
        VoiceTransition::Moved { from, to } => CreateEmbed::new()
            .author(author("Voice Move"))
            .description(format!(
                "➡️ **{name}** moved from {} to {}",
                from.mention(),
                to.mention()
            ))
            .colour(Colour::GOLD),
    };

    let embed = embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(format!("ID: {user_id}")));

    send_log(ctx, data, guild_id, LogKind::Voice, embed).await
}

#[cfg(test)]
mod test {
    use super::*;

    const A: ChannelId = ChannelId::new(1);
    const B: ChannelId = ChannelId::new(2);

    #[test]
    fn classifies_transitions() {
        assert_eq!(
            VoiceTransition::classify(None, Some(A)),
            Some(VoiceTransition::Joined(A))
        );
        assert_eq!(
            VoiceTransition::classify(Some(A), None),
            Some(VoiceTransition::Left(A))
        );
        assert_eq!(
            VoiceTransition::classify(Some(A), Some(B)),
            Some(VoiceTransition::Moved { from: A, to: B })
        );
        assert_eq!(VoiceTransition::classify(Some(A), Some(A)), None);
        assert_eq!(VoiceTransition::classify(None, None), None);
    }

    #[test]
    fn session_length_is_measured() {
        let sessions = VoiceSessions::default();
        let (guild, user) = (GuildId::new(1), UserId::new(2));
        let start = Utc::now();

        assert_eq!(sessions.end(guild, user, start), None);

        sessions.start(guild, user, start);
        assert_eq!(
            sessions.end(guild, user, start + TimeDelta::seconds(90)),
            Some(TimeDelta::seconds(90))
        );
        assert_eq!(sessions.end(guild, user, start), None);
    }
}
