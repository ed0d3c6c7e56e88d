use crate::{CloneableCtx, SendThenDelete, data::State};
use ahash::AHashMap;
use bot_traits::ForwardRefToTracing;
use chrono::{DateTime, Utc};
use color_eyre::eyre::Result;
use parking_lot::Mutex;
use poise::serenity_prelude::{
    self as serenity, CreateMessage, EditMember, GuildId, Mentionable, UserId,
};
use std::time::Duration;

pub const AFK_PREFIX: &str = "[AFK] ";
const MAX_NICKNAME_LENGTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AfkEntry {
    pub reason: String,
    pub since: DateTime<Utc>,
}

/// Who is away, per server. Lives only as long as the process.
#[derive(Default)]
pub struct AfkRegistry(Mutex<AHashMap<(GuildId, UserId), AfkEntry>>);

impl AfkRegistry {
    pub fn set(&self, guild_id: GuildId, user_id: UserId, reason: String) {
        self.0.lock().insert(
            (guild_id, user_id),
            AfkEntry {
                reason,
                since: Utc::now(),
            },
        );
    }

    /// Returns the entry if the member was away.
    pub fn clear(&self, guild_id: GuildId, user_id: UserId) -> Option<AfkEntry> {
        self.0.lock().remove(&(guild_id, user_id))
    }

    pub fn get(&self, guild_id: GuildId, user_id: UserId) -> Option<AfkEntry> {
        self.0.lock().get(&(guild_id, user_id)).cloned()
    }
}

/// `[AFK] name`, cut to the nickname limit. `None` when already marked.
pub fn afk_nickname(display_name: &str) -> Option<String> {
    if display_name.starts_with(AFK_PREFIX.trim_end()) {
        return None;
    }

    Some(
        format!("{AFK_PREFIX}{display_name}")
            .chars()
            .take(MAX_NICKNAME_LENGTH)
            .collect(),
    )
}

/// The nickname to restore, `None` if the name was never marked.
pub fn restored_nickname(display_name: &str) -> Option<&str> {
    display_name.strip_prefix(AFK_PREFIX)
}

/// Clears the author's away status on their next message and answers mentions of away members.
pub async fn handle_message(
    ctx: &serenity::Context,
    data: &State,
    message: &serenity::Message,
) -> Result<()> {
    let Some(guild_id) = message.guild_id else {
        return Ok(());
    };

    if message.author.bot {
        return Ok(());
    }

    if data.afk.clear(guild_id, message.author.id).is_some() {
        let display_name = message
            .member
            .as_ref()
            .and_then(|member| member.nick.clone())
            .unwrap_or_else(|| message.author.display_name().to_owned());

        if let Some(name) = restored_nickname(&display_name) {
            guild_id
                .edit_member(ctx, message.author.id, EditMember::new().nickname(name))
                .await
                .trace_warn_ok("restoring AFK nickname");
        }

        let cloneable = CloneableCtx::from(ctx);
        let reply = CreateMessage::new().content(format!(
            "👋 Welcome back, {}! I removed your AFK status.",
            message.author.mention()
        ));
        let channel = message.channel_id;
        tokio::spawn(async move {
            channel
                .send_then_delete(cloneable, reply, Duration::from_secs(5))
                .await
                .trace_err_ok()
        });
    }

    for mentioned in &message.mentions {
        let Some(entry) = data.afk.get(guild_id, mentioned.id) else {
            continue;
        };

        let cloneable = CloneableCtx::from(ctx);
        let reply = CreateMessage::new().content(format!(
            "💤 **{}** is AFK: {}",
            mentioned.name, entry.reason
        ));
        let channel = message.channel_id;
        tokio::spawn(async move {
            channel
                .send_then_delete(cloneable, reply, Duration::from_secs(10))
                .await
                .trace_err_ok()
        });
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nickname_gets_prefixed_once() {
        assert_eq!(afk_nickname("Misty").as_deref(), Some("[AFK] Misty"));
        assert_eq!(afk_nickname("[AFK] Misty"), None);
    }

    #[test]
    fn nickname_respects_length_limit() {
        let long = "a".repeat(40);
        let nickname = afk_nickname(&long).unwrap();

        assert_eq!(nickname.chars().count(), MAX_NICKNAME_LENGTH);
        assert!(nickname.starts_with(AFK_PREFIX));
    }

    #[test]
    fn nickname_restores() {
        assert_eq!(restored_nickname("[AFK] Brock"), Some("Brock"));
        assert_eq!(restored_nickname("Brock"), None);
    }

    #[test]
    fn registry_is_per_server() {
        let registry = AfkRegistry::default();
        let user = UserId::new(5);

        registry.set(GuildId::new(1), user, "lunch".to_owned());

        assert_eq!(registry.get(GuildId::new(2), user), None);
        assert_eq!(
            registry.clear(GuildId::new(1), user).map(|entry| entry.reason),
            Some("lunch".to_owned())
        );
        assert_eq!(registry.clear(GuildId::new(1), user), None);
    }
}
