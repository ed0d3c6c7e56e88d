//! Reports for whoever runs the bot, plus the public status card.

use crate::{
    data::State,
    utils::{GetRelativeTimestamp, format_uptime, is_missing_or_forbidden},
};
use bot_db::settings::keys;
use bot_traits::ForwardRefToTracing;
use chrono::Utc;
use color_eyre::eyre::{Result, WrapErr};
use poise::serenity_prelude::{
    self as serenity, Cache, CacheHttp, ChannelId, Colour, CreateEmbed, CreateEmbedFooter,
    CreateMessage, EditMessage, GuildId, MessageId, ShardManager, Timestamp,
};
use std::{
    sync::{Arc, atomic::Ordering},
    time::Duration,
};
use tokio::time::interval;
use tokio_stream::wrappers::IntervalStream;

/// Sends to the operator log channel. Returns `false` when none is configured.
pub async fn send_operator_log(
    ctx: impl CacheHttp,
    data: &State,
    embed: CreateEmbed,
) -> Result<bool> {
    let Some(channel) = data.config.read().await.bot_log_channel() else {
        return Ok(false);
    };

    channel
        .send_message(ctx, CreateMessage::new().embed(embed))
        .await
        .wrap_err("Failed to send to the operator log")?;

    Ok(true)
}

/// Average heartbeat latency over all shards that measured one.
pub async fn gateway_latency(shard_manager: &ShardManager) -> Option<Duration> {
    let runners = shard_manager.runners.lock().await;
    let latencies = runners
        .values()
        .filter_map(|runner| runner.latency)
        .collect::<Vec<_>>();

    if latencies.is_empty() {
        return None;
    }

    Some(latencies.iter().sum::<Duration>() / latencies.len() as u32)
}

fn latency_text(latency: Option<Duration>) -> String {
    latency
        .map(|latency| format!("{}ms", latency.as_millis()))
        .unwrap_or_else(|| "n/a".to_owned())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BotStats {
    pub servers: usize,
    pub members: u64,
}

impl BotStats {
    pub fn collect(cache: &Cache) -> Self {
        let guilds = cache.guilds();
        let members = guilds
            .iter()
            .filter_map(|guild_id| cache.guild(*guild_id).map(|guild| guild.member_count))
            .sum();

        BotStats {
            servers: guilds.len(),
            members,
        }
    }
}

fn code_block(value: impl std::fmt::Display) -> String {
    format!("```\n{value}\n```")
}

/// The live status card used by `/status` and the self-updating status message.
pub async fn status_embed(
    cache: &Cache,
    shard_manager: &ShardManager,
    data: &State,
) -> CreateEmbed {
    let stats = BotStats::collect(cache);
    let latency = gateway_latency(shard_manager).await;
    let uptime = format_uptime(Utc::now() - data.started_at);

    let (name, avatar) = {
        let user = cache.current_user();
        (user.name.clone(), user.face())
    };

    let status = data.config.read().await.status.clone();

    let mut embed = CreateEmbed::new()
        .title(name)
        .colour(Colour::DARK_GREEN)
        .thumbnail(status.thumbnail_url.unwrap_or(avatar))
        .field("🟢 STATUS", code_block("Online"), true)
        .field("🛡️ SERVERS", code_block(stats.servers), true)
        .field("📶 PING", code_block(latency_text(latency)), true)
        .field("👥 MEMBERS", code_block(stats.members), true)
        .field("⏳ UPTIME", code_block(uptime), false)
        .footer(CreateEmbedFooter::new(format!(
            "Last Updated: {}",
            Utc::now().format("%H:%M:%S UTC")
        )));

    if let Some(banner) = status.banner_url {
        embed = embed.image(banner);
    }

    embed
}

/// Refreshes every server's status message. A message that can no longer be edited is
/// forgotten.
async fn refresh_status_messages(
    ctx: &serenity::Context,
    shard_manager: &ShardManager,
    data: &State,
) -> Result<()> {
    let embed = status_embed(&ctx.cache, shard_manager, data).await;

    let all_settings = data.settings.iter_all().collect::<Result<Vec<_>>>()?;

    for (guild_id, settings) in all_settings {
        let (Some(channel_id), Some(message_id)) = (
            settings.id(keys::STATUS_CHANNEL),
            settings.id(keys::STATUS_MESSAGE),
        ) else {
            continue;
        };

        let edit = ChannelId::new(channel_id)
            .edit_message(
                ctx,
                MessageId::new(message_id),
                EditMessage::new().embed(embed.clone()),
            )
            .await;

        match edit {
            Ok(_) => {}
            Err(e) if is_missing_or_forbidden(&e) => {
                tracing::info!(
                    "Status message in {} is gone, forgetting it: {}",
                    guild_id,
                    e
                );
                data.settings.unset(guild_id, keys::STATUS_MESSAGE)?;
            }
            Err(e) => tracing::warn!("Failed to refresh status in {}: {:?}", guild_id, e),
        }
    }

    Ok(())
}

pub async fn status_updater(ctx: serenity::Context, data: State, shard_manager: Arc<ShardManager>) {
    use futures::StreamExt;

    let period = data
        .config
        .read()
        .await
        .status
        .refresh_interval
        .to_std()
        .unwrap_or(Duration::from_secs(120));

    IntervalStream::new(interval(period))
        .for_each(|_| async {
            refresh_status_messages(&ctx, &shard_manager, &data)
                .await
                .trace_err_ok();
            tracing::trace!("Refreshed status messages");
        })
        .await
}

/// The online report, once per process.
pub async fn announce_startup(
    ctx: &serenity::Context,
    data: &State,
    shard_manager: &ShardManager,
) -> Result<()> {
    if data.announced_startup.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let name = ctx.cache.current_user().name.clone();
    tracing::info!("{} is online", name);

    let latency = gateway_latency(shard_manager).await;

    let embed = CreateEmbed::new()
        .title("🟢 Bot is Online!")
        .description(format!("**{name}** is now up and running."))
        .colour(Colour::DARK_GREEN)
        .timestamp(Timestamp::now())
        .field("Ping", format!("`{}`", latency_text(latency)), true)
        .field("Servers", format!("`{}`", ctx.cache.guild_count()), true)
        .footer(CreateEmbedFooter::new("System Startup"));

    send_operator_log(ctx, data, embed).await?;

    Ok(())
}

pub async fn announce_shutdown(http: impl CacheHttp, data: &State) -> Result<()> {
    let uptime = format_uptime(Utc::now() - data.started_at);

    let embed = CreateEmbed::new()
        .title("🔴 Bot is Shutting Down")
        .description("System shutdown initiated.")
        .colour(Colour::RED)
        .timestamp(Timestamp::now())
        .field("Session Uptime", format!("`{uptime}`"), false)
        .footer(CreateEmbedFooter::new("System Shutdown"));

    send_operator_log(http, data, embed).await?;

    Ok(())
}

pub async fn guild_joined(
    ctx: &serenity::Context,
    data: &State,
    guild: &serenity::Guild,
) -> Result<()> {
    tracing::info!("Joined server {} ({})", guild.name, guild.id);

    let owner = match guild.owner_id.to_user(ctx).await {
        Ok(owner) => format!("{} (`{}`)", owner.name, guild.owner_id),
        Err(_) => format!("`{}`", guild.owner_id),
    };

    let mut embed = CreateEmbed::new()
        .title("📈 Bot Joined New Server")
        .colour(Colour::DARK_GREEN)
        .timestamp(Timestamp::now())
        .field("Server Name", format!("**{}**", guild.name), true)
        .field("Server ID", format!("`{}`", guild.id), true)
        .field("Owner", owner, false)
        .field("Member Count", format!("{} Members", guild.member_count), true)
        .field(
            "Created At",
            guild.id.created_at().discord_relative_timestamp(),
            true,
        );

    if let Some(icon) = guild.icon_url() {
        embed = embed.thumbnail(icon);
    }

    send_operator_log(ctx, data, embed).await?;

    Ok(())
}

/// `full` is only there if the server was cached.
pub async fn guild_left(
    ctx: &serenity::Context,
    data: &State,
    guild_id: GuildId,
    full: Option<&serenity::Guild>,
) -> Result<()> {
    tracing::info!("Left server {}", guild_id);

    let mut embed = CreateEmbed::new()
        .title("📉 Bot Left Server")
        .colour(Colour::RED)
        .timestamp(Timestamp::now())
        .field(
            "Server Name",
            format!(
                "**{}**",
                full.map(|guild| guild.name.as_str()).unwrap_or("Unknown")
            ),
            true,
        )
        .field("Server ID", format!("`{guild_id}`"), true)
        .field(
            "Member Count",
            full.map(|guild| format!("{} Members", guild.member_count))
                .unwrap_or_else(|| "Unknown".to_owned()),
            false,
        );

    if let Some(icon) = full.and_then(|guild| guild.icon_url()) {
        embed = embed.thumbnail(icon);
    }

    send_operator_log(ctx, data, embed).await?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn latency_is_shown_in_millis() {
        assert_eq!(latency_text(Some(Duration::from_millis(42))), "42ms");
        assert_eq!(latency_text(None), "n/a");
    }

    #[test]
    fn stats_fields_are_code_blocks() {
        assert_eq!(code_block(3), "```\n3\n```");
    }
}
