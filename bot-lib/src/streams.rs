use crate::data::State;
use ahash::AHashMap;
use bot_db::settings::keys;
use chrono::{DateTime, TimeDelta, Utc};
use color_eyre::eyre::{Result, WrapErr};
use parking_lot::Mutex;
use poise::serenity_prelude::{
    self as serenity, ActivityType, ChannelId, Colour, CreateEmbed, CreateMessage, GuildId,
    UserId,
};

#[derive(Debug, Default, Clone, Copy)]
struct StreamState {
    live: bool,
    last_alert: Option<DateTime<Utc>>,
}

/// Presence updates carry no previous state, so whether a member was already live is kept
/// here.
#[derive(Default)]
pub struct StreamTracker(Mutex<AHashMap<(GuildId, UserId), StreamState>>);

impl StreamTracker {
    /// Records the member's current streaming state and reports whether this is a new
    /// stream worth announcing.
    pub fn observe(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        streaming: bool,
        now: DateTime<Utc>,
        cooldown: TimeDelta,
    ) -> bool {
        let key = (guild_id, user_id);
        let mut tracker = self.0.lock();

        if !streaming {
            // Nothing worth keeping once the cooldown is over.
            let expired = tracker.get(&key).is_none_or(|state| {
                state
                    .last_alert
                    .is_none_or(|last_alert| now - last_alert >= cooldown)
            });

            if expired {
                tracker.remove(&key);
            } else if let Some(state) = tracker.get_mut(&key) {
                state.live = false;
            }

            return false;
        }

        let state = tracker.entry(key).or_default();
        let went_live = !state.live;
        state.live = true;

        if !went_live {
            return false;
        }

        if state
            .last_alert
            .is_some_and(|last_alert| now - last_alert < cooldown)
        {
            tracing::debug!("{} went live again inside the alert cooldown", user_id);
            return false;
        }

        state.last_alert = Some(now);

        // members who went quiet without a final presence update
        tracker.retain(|_, state| {
            state.live
                || state
                    .last_alert
                    .is_some_and(|last_alert| now - last_alert < cooldown)
        });

        true
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.0.lock().len()
    }
}

/// Resolves a rich presence `large_image` key into something an embed can show.
fn large_image_url(asset: &str) -> Option<String> {
    if let Some(path) = asset.strip_prefix("mp:") {
        Some(format!("https://media.discordapp.net/{path}"))
    } else {
        asset.strip_prefix("twitch:").map(|channel| {
            format!("https://static-cdn.jtvnw.net/previews-ttv/live_user_{channel}-1920x1080.jpg")
        })
    }
}

pub async fn handle_presence(
    ctx: &serenity::Context,
    data: &State,
    presence: &serenity::Presence,
) -> Result<()> {
    let Some(guild_id) = presence.guild_id else {
        return Ok(());
    };

    let Some(channel_id) = data.settings.get_id(guild_id, keys::STREAM_CHANNEL)? else {
        return Ok(());
    };

    let stream = presence
        .activities
        .iter()
        .find(|activity| activity.kind == ActivityType::Streaming);

    let cooldown = data.config.read().await.streams.alert_cooldown;
    let user_id = presence.user.id;

    if !data
        .streams
        .observe(guild_id, user_id, stream.is_some(), Utc::now(), cooldown)
    {
        return Ok(());
    }

    let Some(stream) = stream else {
        return Ok(());
    };

    let (display_name, username, avatar) = match ctx.cache.member(guild_id, user_id) {
        Some(member) => (
            member.display_name().to_owned(),
            member.user.name.clone(),
            member.face(),
        ),
        None => {
            let name = presence.user.name.clone().unwrap_or_else(|| user_id.to_string());
            (name.clone(), name, String::new())
        }
    };

    let url = stream
        .url
        .as_ref()
        .map(|url| url.to_string())
        .unwrap_or_default();

    let mut embed = CreateEmbed::new()
        .title(format!("🔴 {display_name} is LIVE!"))
        .description(format!(
            "**{}**\n\n[Click here to Watch!]({url})",
            stream.details.as_deref().unwrap_or(&stream.name)
        ))
        .colour(Colour::PURPLE);

    if !avatar.is_empty() {
        embed = embed.thumbnail(avatar);
    }

    if let Some(image) = stream
        .assets
        .as_ref()
        .and_then(|assets| assets.large_image.as_deref())
        .and_then(large_image_url)
    {
        embed = embed.image(image);
    }

    tracing::info!("{} went live in {}", username, guild_id);

    ChannelId::new(channel_id)
        .send_message(
            ctx,
            CreateMessage::new()
                .content(format!("Hey @everyone! **{username}** is live!"))
                .embed(embed),
        )
        .await
        .wrap_err("Failed to send stream alert")?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    const GUILD: GuildId = GuildId::new(1);
    const USER: UserId = UserId::new(2);

    #[test]
    fn alerts_once_per_stream() {
        let tracker = StreamTracker::default();
        let now = Utc::now();
        let cooldown = TimeDelta::hours(12);

        assert!(tracker.observe(GUILD, USER, true, now, cooldown));
        // still live, presence changed for another reason
        assert!(!tracker.observe(GUILD, USER, true, now + TimeDelta::minutes(1), cooldown));
    }

    #[test]
    fn cooldown_suppresses_restarts() {
        let tracker = StreamTracker::default();
        let now = Utc::now();
        let cooldown = TimeDelta::hours(12);

        assert!(tracker.observe(GUILD, USER, true, now, cooldown));
        assert!(!tracker.observe(GUILD, USER, false, now + TimeDelta::hours(1), cooldown));
        assert!(!tracker.observe(GUILD, USER, true, now + TimeDelta::hours(2), cooldown));
        assert!(!tracker.observe(GUILD, USER, false, now + TimeDelta::hours(3), cooldown));
        assert!(tracker.observe(GUILD, USER, true, now + TimeDelta::hours(13), cooldown));
    }

    #[test]
    fn idle_members_are_not_remembered() {
        let tracker = StreamTracker::default();
        let now = Utc::now();
        let cooldown = TimeDelta::hours(12);

        for user in 1..=1000 {
            tracker.observe(GUILD, UserId::new(user), false, now, cooldown);
        }
        assert_eq!(tracker.tracked(), 0);

        assert!(tracker.observe(GUILD, USER, true, now, cooldown));
        assert!(!tracker.observe(GUILD, USER, false, now + TimeDelta::hours(1), cooldown));
        // still inside the cooldown, so kept
        assert_eq!(tracker.tracked(), 1);

        assert!(!tracker.observe(GUILD, USER, false, now + TimeDelta::hours(13), cooldown));
        assert_eq!(tracker.tracked(), 0);
    }

    #[test]
    fn not_streaming_never_alerts() {
        let tracker = StreamTracker::default();

        assert!(!tracker.observe(GUILD, USER, false, Utc::now(), TimeDelta::zero()));
    }

    #[test]
    fn resolves_image_assets() {
        assert_eq!(
            large_image_url("twitch:someone").as_deref(),
            Some("https://static-cdn.jtvnw.net/previews-ttv/live_user_someone-1920x1080.jpg")
        );
        assert_eq!(
            large_image_url("mp:external/abc.png").as_deref(),
            Some("https://media.discordapp.net/external/abc.png")
        );
        assert_eq!(large_image_url("123456"), None);
    }
}
