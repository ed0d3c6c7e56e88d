use super::is_owner;
use crate::{data::PoiseContext, utils::clip};
use bot_db::settings::GuildSettings;
use color_eyre::eyre::{Result, WrapErr};
use itertools::Itertools;
use poise::{
    CreateReply,
    serenity_prelude::{
        ActivityData, Colour, CreateAttachment, CreateEmbed, GuildId, OnlineStatus,
    },
};
use std::{collections::BTreeMap, num::NonZeroU64};

/// Tools for whoever runs the bot
#[poise::command(
    slash_command,
    subcommands("status", "servers", "leave_server", "backup"),
    guild_only
)]
pub async fn owner(_ctx: PoiseContext<'_>) -> Result<()> {
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, poise::ChoiceParameter)]
pub enum ActivityKind {
    Playing,
    Watching,
    #[name = "Listening to"]
    Listening,
    #[name = "Competing in"]
    Competing,
}

impl ActivityKind {
    fn activity(self, text: &str) -> ActivityData {
        match self {
            ActivityKind::Playing => ActivityData::playing(text),
            ActivityKind::Watching => ActivityData::watching(text),
            ActivityKind::Listening => ActivityData::listening(text),
            ActivityKind::Competing => ActivityData::competing(text),
        }
    }
}

/// Change what the bot is shown doing
#[poise::command(slash_command, ephemeral = true, check = "is_owner")]
pub async fn status(
    ctx: PoiseContext<'_>,
    #[description = "What kind of activity"] kind: ActivityKind,
    #[description = "The activity text"] text: String,
) -> Result<()> {
    let activity = kind.activity(&text);

    for runner in ctx.framework().shard_manager().runners.lock().await.values() {
        runner
            .runner_tx
            .set_presence(Some(activity.clone()), OnlineStatus::Online);
    }

    tracing::info!("Presence changed to {:?} {}", kind, text);

    ctx.say(format!("✅ Status updated to **{kind:?} {text}**."))
        .await?;

    Ok(())
}

/// Every server the bot is in
#[poise::command(slash_command, ephemeral = true, check = "is_owner")]
pub async fn servers(ctx: PoiseContext<'_>) -> Result<()> {
    let cache = &ctx.serenity_context().cache;

    let lines = cache
        .guilds()
        .into_iter()
        .filter_map(|guild_id| {
            cache.guild(guild_id).map(|guild| {
                (
                    guild.member_count,
                    format!(
                        "**{}** (`{}`) • {} members",
                        guild.name, guild.id, guild.member_count
                    ),
                )
            })
        })
        .sorted_by(|a, b| b.0.cmp(&a.0))
        .map(|(_, line)| line)
        .collect::<Vec<_>>();

    let embed = CreateEmbed::new()
        .title(format!("🌐 Servers ({})", lines.len()))
        .description(clip(&lines.join("\n"), 4000))
        .colour(Colour::BLURPLE);

    ctx.send(CreateReply::default().embed(embed)).await?;

    Ok(())
}

fn parse_server_id(input: &str) -> Option<GuildId> {
    input
        .trim()
        .parse::<NonZeroU64>()
        .ok()
        .map(|id| GuildId::new(id.get()))
}

/// Make the bot leave a server
#[poise::command(slash_command, ephemeral = true, check = "is_owner")]
pub async fn leave_server(
    ctx: PoiseContext<'_>,
    #[description = "The server ID"] server_id: String,
) -> Result<()> {
    let Some(guild_id) = parse_server_id(&server_id) else {
        ctx.say("❌ That is not a server ID.").await?;
        return Ok(());
    };

    let Some(name) = ctx
        .serenity_context()
        .cache
        .guild(guild_id)
        .map(|guild| guild.name.clone())
    else {
        ctx.say("❌ I'm not in that server.").await?;
        return Ok(());
    };

    guild_id
        .leave(ctx.http())
        .await
        .wrap_err("Failed to leave server")?;

    tracing::info!("Left server {} ({}) on request", name, guild_id);

    ctx.say(format!("👋 Left **{name}**.")).await?;

    Ok(())
}

/// Download the clan table and every server's settings
#[poise::command(slash_command, ephemeral = true, check = "is_owner")]
pub async fn backup(ctx: PoiseContext<'_>) -> Result<()> {
    let data = ctx.data();

    let clans = data.clans.iter_all().collect::<Result<Vec<_>>>()?;
    let settings = data
        .settings
        .iter_all()
        .map_ok(|(guild_id, settings)| (guild_id.to_string(), settings))
        .collect::<Result<BTreeMap<String, GuildSettings>>>()?;

    let clans_json = serde_json::to_vec_pretty(&clans).wrap_err("Failed to encode clans")?;
    let settings_json =
        serde_json::to_vec_pretty(&settings).wrap_err("Failed to encode settings")?;

    tracing::info!(
        "Exported {} clans and {} server settings",
        clans.len(),
        settings.len()
    );

    ctx.send(
        CreateReply::default()
            .content(format!(
                "📦 Backup of **{}** clans and **{}** server settings.",
                clans.len(),
                settings.len()
            ))
            .attachment(CreateAttachment::bytes(clans_json, "clans.json"))
            .attachment(CreateAttachment::bytes(settings_json, "settings.json")),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn server_ids_must_be_snowflakes() {
        assert_eq!(
            parse_server_id(" 123456789 "),
            Some(GuildId::new(123456789))
        );
        assert_eq!(parse_server_id("0"), None);
        assert_eq!(parse_server_id("-4"), None);
        assert_eq!(parse_server_id("my server"), None);
    }
}
