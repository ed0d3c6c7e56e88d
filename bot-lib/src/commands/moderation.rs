use crate::{
    TimeoutExt,
    data::PoiseContext,
    utils::{GetRelativeTimestamp, SendReplyEphemeral, timestamp_to_utc},
};
use bot_traits::ForwardRefToTracing;
use chrono::{DateTime, TimeDelta, Utc};
use color_eyre::eyre::{ContextCompat, Result, WrapErr};
use human_repr::HumanDuration;
use humantime::parse_duration;
use poise::{
    CreateReply,
    serenity_prelude::{
        Colour, CreateEmbed, CreateMessage, GetMessages, Member, Mentionable, MessageId,
        Timestamp, User,
    },
};
use std::time::Duration;

const MAX_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 24 * 28);
/// Discord refuses to bulk delete anything older.
const BULK_DELETE_MAX_DAYS: i64 = 14;

fn reason_text(reason: &Option<String>) -> &str {
    reason.as_deref().unwrap_or("No reason provided")
}

/// Parses a duration like `10m` or `1h`, within what discord accepts for a timeout.
fn parse_timeout(text: &str) -> std::result::Result<Duration, &'static str> {
    if text.len() > 20 {
        return Err("Send something reasonable, please.");
    }

    let Ok(time) = parse_duration(text) else {
        return Err("Invalid time format! Say something like '10m' or '1h'");
    };

    if time > MAX_TIMEOUT {
        return Err("Discord doesn't allow timeouts longer than 28 days.");
    }

    if time < Duration::from_secs(1) {
        return Err("Timeouts must be at least one second long.");
    }

    Ok(time)
}

fn action_embed(
    title: &str,
    colour: Colour,
    target: &User,
    moderator: &User,
    reason: &str,
) -> CreateEmbed {
    CreateEmbed::new()
        .title(title)
        .colour(colour)
        .timestamp(Timestamp::now())
        .thumbnail(target.face())
        .field("User", format!("{} (`{}`)", target.mention(), target.id), true)
        .field("Moderator", moderator.mention().to_string(), true)
        .field("Reason", reason, false)
}

/// Tells the member before they lose the ability to read it.
async fn notify_member(ctx: PoiseContext<'_>, user: &User, action: &str, reason: &str) {
    let server = ctx
        .guild()
        .map(|guild| guild.name.clone())
        .unwrap_or_else(|| "the server".to_owned());

    user.direct_message(
        ctx,
        CreateMessage::new().content(format!(
            "You have been {action} from **{server}**.\nReason: {reason}"
        )),
    )
    .await
    .trace_warn_ok("notifying a moderated member");
}

/// Kick a member from the server
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "KICK_MEMBERS",
    required_bot_permissions = "KICK_MEMBERS"
)]
pub async fn kick(
    ctx: PoiseContext<'_>,
    #[description = "The member to kick"] member: Member,
    #[description = "Why they are being kicked"] reason: Option<String>,
) -> Result<()> {
    let reason = reason_text(&reason);

    notify_member(ctx, &member.user, "kicked", reason).await;

    member
        .kick_with_reason(ctx.http(), reason)
        .await
        .wrap_err("Failed to kick member")?;

    tracing::info!(
        "{} kicked {} ({})",
        ctx.author().name,
        member.user.name,
        reason
    );

    ctx.send(CreateReply::default().embed(action_embed(
        "👢 Member Kicked",
        Colour::ORANGE,
        &member.user,
        ctx.author(),
        reason,
    )))
    .await?;

    Ok(())
}

/// Ban a user from the server
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "BAN_MEMBERS",
    required_bot_permissions = "BAN_MEMBERS"
)]
pub async fn ban(
    ctx: PoiseContext<'_>,
    #[description = "The user to ban"] user: User,
    #[description = "Why they are being banned"] reason: Option<String>,
    #[description = "Days of their messages to delete"]
    #[min = 0]
    #[max = 7]
    delete_message_days: Option<u8>,
) -> Result<()> {
    let guild_id = ctx.guild_id().wrap_err("No guild ID?")?;
    let reason = reason_text(&reason);

    notify_member(ctx, &user, "banned", reason).await;

    guild_id
        .ban_with_reason(ctx.http(), user.id, delete_message_days.unwrap_or(0), reason)
        .await
        .wrap_err("Failed to ban user")?;

    tracing::info!("{} banned {} ({})", ctx.author().name, user.name, reason);

    ctx.send(CreateReply::default().embed(action_embed(
        "🔨 User Banned",
        Colour::DARK_RED,
        &user,
        ctx.author(),
        reason,
    )))
    .await?;

    Ok(())
}

/// Stop a member from talking for a while
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MODERATE_MEMBERS",
    required_bot_permissions = "MODERATE_MEMBERS"
)]
pub async fn timeout(
    ctx: PoiseContext<'_>,
    #[description = "The member to time out"] member: Member,
    #[description = "How long, like '10m' or '1h'"] duration: String,
    #[description = "Why they are being timed out"] reason: Option<String>,
) -> Result<()> {
    let time = match parse_timeout(&duration) {
        Ok(time) => time,
        Err(problem) => return ctx.reply_ephemeral(format!("❌ {problem}")).await,
    };
    let reason = reason_text(&reason);

    let (_, timeout_end) = member
        .guild_id
        .timeout(ctx, member.user.id, time, Some(reason))
        .await?;

    tracing::info!(
        "{} timed out {} until {} ({})",
        ctx.author().name,
        member.user.name,
        timeout_end,
        reason
    );

    ctx.send(
        CreateReply::default().embed(
            action_embed(
                "⏳ Member Timed Out",
                Colour::GOLD,
                &member.user,
                ctx.author(),
                reason,
            )
            .field("Duration", time.human_duration().to_string(), true)
            .field("Returns", timeout_end.discord_relative_timestamp(), true),
        ),
    )
    .await?;

    Ok(())
}

/// Lift a member's timeout
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MODERATE_MEMBERS",
    required_bot_permissions = "MODERATE_MEMBERS"
)]
pub async fn untimeout(
    ctx: PoiseContext<'_>,
    #[description = "The member to let talk again"] member: Member,
) -> Result<()> {
    let timed_out = member
        .communication_disabled_until
        .is_some_and(|until| timestamp_to_utc(&until) > Utc::now());

    if !timed_out {
        return ctx
            .reply_ephemeral(format!("❌ {} is not timed out.", member.mention()))
            .await;
    }

    member.guild_id.remove_timeout(ctx, member.user.id).await?;

    tracing::info!(
        "{} removed the timeout of {}",
        ctx.author().name,
        member.user.name
    );

    ctx.say(format!("✅ {} can talk again.", member.mention()))
        .await?;

    Ok(())
}

/// Ids of the messages young enough to be bulk deleted.
fn purgeable(messages: &[(MessageId, Timestamp)], now: DateTime<Utc>) -> Vec<MessageId> {
    let max_age = TimeDelta::days(BULK_DELETE_MAX_DAYS);

    messages
        .iter()
        .filter(|(_, sent)| now - timestamp_to_utc(sent) < max_age)
        .map(|(id, _)| *id)
        .collect()
}

/// Delete recent messages in this channel
#[poise::command(
    slash_command,
    guild_only,
    ephemeral = true,
    required_permissions = "MANAGE_MESSAGES",
    required_bot_permissions = "MANAGE_MESSAGES"
)]
pub async fn purge(
    ctx: PoiseContext<'_>,
    #[description = "How many messages to delete"]
    #[min = 1]
    #[max = 100]
    amount: u8,
) -> Result<()> {
    ctx.defer_ephemeral().await?;

    let channel = ctx.channel_id();
    let messages = channel
        .messages(ctx, GetMessages::new().limit(amount.clamp(1, 100)))
        .await
        .wrap_err("Failed to fetch messages to purge")?
        .into_iter()
        .map(|message| (message.id, message.timestamp))
        .collect::<Vec<_>>();

    let ids = purgeable(&messages, Utc::now());

    match ids.as_slice() {
        [] => {}
        [id] => channel
            .delete_message(ctx, *id)
            .await
            .wrap_err("Failed to delete message")?,
        ids => channel
            .delete_messages(ctx, ids)
            .await
            .wrap_err("Failed to bulk delete messages")?,
    }

    tracing::info!(
        "{} purged {} messages in {}",
        ctx.author().name,
        ids.len(),
        channel
    );

    let skipped = messages.len() - ids.len();
    let note = if skipped > 0 {
        format!(" ({skipped} were older than 14 days and were skipped)")
    } else {
        String::new()
    };

    ctx.say(format!("🧹 Deleted **{}** messages.{note}", ids.len()))
        .await?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn timeouts_are_bounded() {
        assert_eq!(parse_timeout("10m"), Ok(Duration::from_secs(600)));
        assert_eq!(parse_timeout("28days"), Ok(MAX_TIMEOUT));
        assert!(parse_timeout("29days").is_err());
        assert!(parse_timeout("0s").is_err());
        assert!(parse_timeout("soon").is_err());
        assert!(parse_timeout(&"1".repeat(21)).is_err());
    }

    #[test]
    fn old_messages_are_not_purged() {
        let now = Utc::now();
        let at = |days_ago: i64| {
            Timestamp::from_unix_timestamp((now - TimeDelta::days(days_ago)).timestamp())
                .expect("valid timestamp")
        };

        let messages = vec![
            (MessageId::new(1), at(0)),
            (MessageId::new(2), at(13)),
            (MessageId::new(3), at(15)),
        ];

        assert_eq!(
            purgeable(&messages, now),
            vec![MessageId::new(1), MessageId::new(2)]
        );
    }
}
