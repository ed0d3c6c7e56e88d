use super::{LogKind, send_log};
use crate::{
    data::State,
    utils::{GetRelativeTimestamp, format_time_ago, timestamp_to_utc},
};
use ::serenity::model::guild::audit_log::{Action, MemberAction};
use bot_traits::ForwardRefToTracing;
use chrono::{DateTime, TimeDelta, Utc};
use color_eyre::eyre::Result;
use itertools::Itertools;
use poise::serenity_prelude::{
    self as serenity, Colour, CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter, GuildId,
    Mentionable, Timestamp, User, UserId,
};

/// Audit entries older than this are not attributed to a member leaving.
const AUDIT_MATCH_WINDOW: TimeDelta = TimeDelta::seconds(10);
const AUDIT_SCAN_LIMIT: u8 = 5;

/// Whether an audit entry is about `user` and recent enough to explain what just happened.
fn is_recent_entry_for(
    target: Option<u64>,
    created_at: DateTime<Utc>,
    user: UserId,
    now: DateTime<Utc>,
) -> bool {
    target == Some(user.get()) && now - created_at < AUDIT_MATCH_WINDOW
}

struct AuditMatch {
    moderator: UserId,
    reason: Option<String>,
}

/// Looks for a fresh `action` entry targeting `user`.
///
/// Racy: the entry may not be written yet when the gateway event arrives.
async fn recent_audit_entry(
    ctx: &serenity::Context,
    guild_id: GuildId,
    action: MemberAction,
    user: UserId,
) -> Option<AuditMatch> {
    let logs = guild_id
        .audit_logs(
            ctx,
            Some(Action::Member(action)),
            None,
            None,
            Some(AUDIT_SCAN_LIMIT),
        )
        .await
        .trace_warn_ok("reading the audit log")?;

    let now = Utc::now();

    logs.entries
        .into_iter()
        .find(|entry| {
            is_recent_entry_for(
                entry.target_id.map(|id| id.get()),
                timestamp_to_utc(&entry.id.created_at()),
                user,
                now,
            )
        })
        .map(|entry| AuditMatch {
            moderator: entry.user_id,
            reason: entry.reason,
        })
}

fn avatar_author(name: impl Into<String>, user: &User) -> CreateEmbedAuthor {
    CreateEmbedAuthor::new(name).icon_url(user.face())
}

pub async fn member_joined(
    ctx: &serenity::Context,
    data: &State,
    member: &serenity::Member,
) -> Result<()> {
    let member_count = ctx
        .cache
        .guild(member.guild_id)
        .map(|guild| guild.member_count)
        .unwrap_or_default();

    let created_at = member.user.id.created_at();

    let embed = CreateEmbed::new()
        .author(avatar_author("Member Joined", &member.user))
        .description(format!("Welcome {} to the server!", member.mention()))
        .colour(Colour::DARK_GREEN)
        .timestamp(Timestamp::now())
        .field("User", &member.user.name, true)
        .field(
            "Account Created",
            format!(
                "{}\n{}",
                format_time_ago(timestamp_to_utc(&created_at), Utc::now()),
                created_at.discord_relative_timestamp()
            ),
            true,
        )
        .thumbnail(member.face())
        .footer(CreateEmbedFooter::new(format!(
            "Member Count: {member_count} | User ID: {}",
            member.user.id
        )));

    send_log(ctx, data, member.guild_id, LogKind::Join, embed).await
}

/// Logs a departure, or a kick if the audit log says a moderator did it.
///
/// A fresh ban entry means the ban log covers it and nothing is sent here.
pub async fn member_left(
    ctx: &serenity::Context,
    data: &State,
    guild_id: GuildId,
    user: &User,
    member: Option<&serenity::Member>,
) -> Result<()> {
    if recent_audit_entry(ctx, guild_id, MemberAction::BanAdd, user.id)
        .await
        .is_some()
    {
        tracing::debug!("{} was banned, leaving the leave log to the ban log", user.name);
        return Ok(());
    }

    if let Some(kick) = recent_audit_entry(ctx, guild_id, MemberAction::Kick, user.id).await {
        let embed = CreateEmbed::new()
            .title("👢 Member Kicked")
            .colour(Colour::RED)
            .timestamp(Timestamp::now())
            .field("User", user.mention().to_string(), false)
            .field("Moderator", kick.moderator.mention().to_string(), true)
            .field(
                "Reason",
                kick.reason.as_deref().unwrap_or("No reason provided"),
                false,
            )
            .footer(CreateEmbedFooter::new(format!("User ID: {}", user.id)));

        return send_log(ctx, data, guild_id, LogKind::Moderation, embed).await;
    }

    let stayed = member
        .and_then(|member| member.joined_at)
        .map(|joined_at| format_time_ago(timestamp_to_utc(&joined_at), Utc::now()))
        .unwrap_or_else(|| "at an unknown time".to_owned());

    let roles = member
        .map(|member| member.roles.iter().map(|role| role.mention()).join(" "))
        .filter(|roles| !roles.is_empty())
        .unwrap_or_else(|| "None".to_owned());

    let embed = CreateEmbed::new()
        .author(avatar_author("Member left", user))
        .description(format!("{} joined {stayed}", user.mention()))
        .colour(Colour::GOLD)
        .timestamp(Timestamp::now())
        .field("Roles:", roles, false)
        .footer(CreateEmbedFooter::new(format!("ID: {}", user.id)));

    send_log(ctx, data, guild_id, LogKind::Leave, embed).await
}

pub async fn member_banned(
    ctx: &serenity::Context,
    data: &State,
    guild_id: GuildId,
    user: &User,
) -> Result<()> {
    let ban = recent_audit_entry(ctx, guild_id, MemberAction::BanAdd, user.id).await;

    let embed = CreateEmbed::new()
        .title("🔨 Member Banned")
        .colour(Colour::DARK_RED)
        .timestamp(Timestamp::now())
        .field("User", format!("{} ({})", user.mention(), user.name), false)
        .field(
            "Moderator",
            ban.as_ref()
                .map(|ban| ban.moderator.mention().to_string())
                .unwrap_or_else(|| "Unknown".to_owned()),
            true,
        )
        .field(
            "Reason",
            ban.and_then(|ban| ban.reason)
                .unwrap_or_else(|| "No reason provided".to_owned()),
            false,
        )
        .thumbnail(user.face())
        .footer(CreateEmbedFooter::new(format!("User ID: {}", user.id)));

    send_log(ctx, data, guild_id, LogKind::Moderation, embed).await
}

/// A timeout was just put on a member that had none.
pub fn timeout_started(
    before: Option<&Timestamp>,
    after: Option<&Timestamp>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let until = timestamp_to_utc(after?);
    let was_timed_out = before.is_some_and(|before| timestamp_to_utc(before) > now);

    (until > now && !was_timed_out).then_some(until)
}

pub async fn timeout_issued(
    ctx: &serenity::Context,
    data: &State,
    guild_id: GuildId,
    user: &User,
    until: DateTime<Utc>,
) -> Result<()> {
    let update = recent_audit_entry(ctx, guild_id, MemberAction::Update, user.id).await;

    let embed = CreateEmbed::new()
        .title("⏳ Timeout Issued")
        .colour(Colour::GOLD)
        .timestamp(Timestamp::now())
        .field("User", user.mention().to_string(), false)
        .field(
            "Moderator",
            update
                .as_ref()
                .map(|entry| entry.moderator.mention().to_string())
                .unwrap_or_else(|| "Unknown".to_owned()),
            true,
        )
        .field(
            "Duration",
            format!("Until {}", until.discord_full_timestamp()),
            false,
        )
        .field(
            "Reason",
            update
                .and_then(|entry| entry.reason)
                .unwrap_or_else(|| "No reason provided".to_owned()),
            false,
        )
        .footer(CreateEmbedFooter::new(format!("ID: {}", user.id)));

    send_log(ctx, data, guild_id, LogKind::Moderation, embed).await
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn audit_entry_must_be_fresh_and_about_the_user() {
        let now = Utc::now();
        let user = UserId::new(5);

        assert!(is_recent_entry_for(Some(5), now - TimeDelta::seconds(3), user, now));
        assert!(!is_recent_entry_for(Some(5), now - TimeDelta::seconds(11), user, now));
        assert!(!is_recent_entry_for(Some(6), now, user, now));
        assert!(!is_recent_entry_for(None, now, user, now));
    }

    #[test]
    fn only_new_timeouts_count() {
        let now = Utc::now();
        let later = Timestamp::from_unix_timestamp(now.timestamp() + 600).unwrap();
        let earlier = Timestamp::from_unix_timestamp(now.timestamp() - 600).unwrap();

        assert!(timeout_started(None, Some(&later), now).is_some());
        // an expired timeout being replaced is a new one
        assert!(timeout_started(Some(&earlier), Some(&later), now).is_some());
        assert!(timeout_started(Some(&later), Some(&later), now).is_none());
        assert!(timeout_started(Some(&later), None, now).is_none());
        assert!(timeout_started(None, Some(&earlier), now).is_none());
    }
}
