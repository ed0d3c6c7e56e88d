use crate::{CloneableCtx, SendThenDelete, TimeoutExt, data::State};
use ahash::AHashMap;
use bot_traits::ForwardRefToTracing;
use chrono::{DateTime, TimeDelta, Utc};
use color_eyre::eyre::{Result, WrapErr};
use parking_lot::Mutex;
use poise::serenity_prelude::{self as serenity, CreateMessage, GuildId, Mentionable, UserId};
use regex::Regex;
use std::{collections::VecDeque, sync::LazyLock, time::Duration};

static URL_HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)https?://(?:[^\s/@]+@)?([a-z0-9.\-]+)").expect("URL regex is valid")
});

/// Whether any link in `content` points outside the whitelisted hosts.
///
/// A whitelisted host also allows its subdomains, `www.` is ignored.
pub fn contains_unauthorized_link(content: &str, whitelist: &[String]) -> bool {
    URL_HOST.captures_iter(content).any(|captures| {
        let host = captures[1].trim_end_matches('.').to_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host);

        !whitelist.iter().any(|allowed| {
            let allowed = allowed.trim().to_lowercase();
            host == allowed || host.ends_with(&format!(".{allowed}"))
        })
    })
}

/// Recent message times per member.
#[derive(Default)]
pub struct SpamTracker(Mutex<AHashMap<(GuildId, UserId), VecDeque<DateTime<Utc>>>>);

impl SpamTracker {
    /// Records a message and reports whether the member just crossed `limit` messages
    /// inside `window`. Tripping resets their history.
    pub fn record(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        at: DateTime<Utc>,
        window: TimeDelta,
        limit: usize,
    ) -> bool {
        let mut tracker = self.0.lock();

        // drop everyone whose whole history has left the window
        tracker.retain(|_, history| history.back().is_some_and(|last| at - *last < window));

        let history = tracker.entry((guild_id, user_id)).or_default();

        history.push_back(at);
        while history.front().is_some_and(|first| at - *first >= window) {
            history.pop_front();
        }

        if history.len() >= limit.max(1) {
            tracker.remove(&(guild_id, user_id));
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.0.lock().len()
    }
}

/// Returns `true` when the message was removed.
pub async fn moderate_message(
    ctx: &serenity::Context,
    data: &State,
    message: &serenity::Message,
) -> Result<bool> {
    let Some(guild_id) = message.guild_id else {
        return Ok(false);
    };

    if message.author.bot {
        return Ok(false);
    }

    let (whitelist, count, window, timeout) = {
        let config = data.config.read().await;
        if !config.automod.enabled {
            return Ok(false);
        }

        (
            config.automod.link_whitelist.clone(),
            config.automod.spam_message_count,
            config.automod.spam_window,
            config.automod.spam_timeout,
        )
    };

    if is_admin(ctx, message) {
        return Ok(false);
    }

    if contains_unauthorized_link(&message.content, &whitelist) {
        tracing::info!(
            "Removing unauthorized link from {} in {}",
            message.author.name,
            guild_id
        );

        message
            .delete(ctx)
            .await
            .wrap_err("Failed to delete message with link")?;

        let cloneable = CloneableCtx::from(ctx);
        let warning = CreateMessage::new().content(format!(
            "⚠️ {}, unauthorized links are not allowed!",
            message.author.mention()
        ));
        let channel = message.channel_id;
        tokio::spawn(async move {
            channel
                .send_then_delete(cloneable, warning, Duration::from_secs(5))
                .await
                .trace_err_ok()
        });

        return Ok(true);
    }

    if data
        .spam
        .record(guild_id, message.author.id, Utc::now(), window, count)
    {
        tracing::info!("{} tripped the spam filter in {}", message.author.name, guild_id);

        let duration = timeout.to_std().unwrap_or(Duration::from_secs(600));
        if guild_id
            .timeout(ctx, message.author.id, duration, Some("Anti-Spam Auto-Mod"))
            .await
            .trace_warn_ok("timing out spammer")
            .is_some()
        {
            message
                .channel_id
                .say(
                    ctx,
                    format!("🔇 **{}** has been timed out for spamming.", message.author.name),
                )
                .await
                .trace_err_ok();
        }
    }

    Ok(false)
}

fn is_admin(ctx: &serenity::Context, message: &serenity::Message) -> bool {
    message
        .author_permissions(ctx)
        .is_some_and(|permissions| permissions.administrator())
}

#[cfg(test)]
mod test {
    use super::*;

    fn whitelist() -> Vec<String> {
        ["youtube.com", "youtu.be", "twitch.tv", "discord.com"]
            .map(String::from)
            .to_vec()
    }

    #[test]
    fn plain_text_passes() {
        assert!(!contains_unauthorized_link("gg everyone, http is a protocol", &whitelist()));
    }

    #[test]
    fn whitelisted_hosts_pass() {
        let whitelist = whitelist();

        assert!(!contains_unauthorized_link(
            "watch https://www.youtube.com/watch?v=abc",
            &whitelist
        ));
        assert!(!contains_unauthorized_link("https://m.twitch.tv/someone", &whitelist));
        assert!(!contains_unauthorized_link("HTTPS://YOUTU.BE/xyz", &whitelist));
    }

    #[test]
    fn other_hosts_are_caught() {
        let whitelist = whitelist();

        assert!(contains_unauthorized_link("free nitro http://discord-gift.ru", &whitelist));
        assert!(contains_unauthorized_link(
            "https://youtube.com.evil.example/",
            &whitelist
        ));
        assert!(contains_unauthorized_link(
            "https://youtube.com and https://evil.example",
            &whitelist
        ));
    }

    #[test]
    fn spam_trips_inside_window() {
        let tracker = SpamTracker::default();
        let (guild, user) = (GuildId::new(1), UserId::new(2));
        let start = Utc::now();
        let window = TimeDelta::seconds(5);

        for i in 0..4 {
            assert!(!tracker.record(guild, user, start + TimeDelta::milliseconds(i * 100), window, 5));
        }
        assert!(tracker.record(guild, user, start + TimeDelta::milliseconds(500), window, 5));

        // history was reset
        assert!(!tracker.record(guild, user, start + TimeDelta::seconds(1), window, 5));
    }

    #[test]
    fn quiet_members_are_forgotten() {
        let tracker = SpamTracker::default();
        let guild = GuildId::new(1);
        let start = Utc::now();
        let window = TimeDelta::seconds(5);

        for user in 1..=1000 {
            tracker.record(guild, UserId::new(user), start, window, 5);
        }
        assert_eq!(tracker.tracked(), 1000);

        tracker.record(guild, UserId::new(1), start + TimeDelta::seconds(10), window, 5);
        assert_eq!(tracker.tracked(), 1);
    }

    #[test]
    fn slow_messages_never_trip() {
        let tracker = SpamTracker::default();
        let (guild, user) = (GuildId::new(1), UserId::new(2));
        let start = Utc::now();

        for i in 0..20 {
            assert!(!tracker.record(
                guild,
                user,
                start + TimeDelta::seconds(i * 2),
                TimeDelta::seconds(5),
                5
            ));
        }
    }
}
