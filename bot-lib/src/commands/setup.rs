use crate::{audit::LogKind, data::PoiseContext};
use bot_db::settings::{SettingValue, keys};
use color_eyre::eyre::{ContextCompat, Result};
use itertools::Itertools;
use poise::{
    ChoiceParameter, CreateReply,
    serenity_prelude::{Colour, CreateEmbed, GuildChannel, Mentionable, Role},
};

/// Point the bot's features at channels in this server
#[poise::command(
    slash_command,
    subcommands("logs", "welcome", "stream", "clans", "show"),
    default_member_permissions = "ADMINISTRATOR",
    guild_only
)]
pub async fn setup(_ctx: PoiseContext<'_>) -> Result<()> {
    Ok(())
}

/// Where event logs go
#[poise::command(
    slash_command,
    required_permissions = "ADMINISTRATOR",
    ephemeral = true
)]
pub async fn logs(
    ctx: PoiseContext<'_>,
    #[description = "The log channel"]
    #[channel_types("Text")]
    channel: GuildChannel,
    #[description = "Only send this kind of event there (default: everything)"]
    kind: Option<LogKind>,
) -> Result<()> {
    let guild_id = ctx.guild_id().wrap_err("No guild ID?")?;
    let kind = kind.unwrap_or(LogKind::General);

    ctx.data().settings.set_id(guild_id, kind.key(), channel.id)?;

    tracing::info!(
        "{} set {:?} logs to {} in {}",
        ctx.author().name,
        kind,
        channel.id,
        guild_id
    );

    ctx.say(format!(
        "✅ {} logs will be sent to {}.",
        kind.name(),
        channel.mention()
    ))
    .await?;

    Ok(())
}

/// Where new members are greeted
#[poise::command(
    slash_command,
    required_permissions = "ADMINISTRATOR",
    ephemeral = true
)]
pub async fn welcome(
    ctx: PoiseContext<'_>,
    #[description = "The welcome channel"]
    #[channel_types("Text")]
    channel: GuildChannel,
) -> Result<()> {
    let guild_id = ctx.guild_id().wrap_err("No guild ID?")?;

    ctx.data()
        .settings
        .set_id(guild_id, keys::WELCOME_CHANNEL, channel.id)?;

    ctx.say(format!(
        "✅ New members will be welcomed in {}.",
        channel.mention()
    ))
    .await?;

    Ok(())
}

/// Where stream alerts are posted
#[poise::command(
    slash_command,
    required_permissions = "ADMINISTRATOR",
    ephemeral = true
)]
pub async fn stream(
    ctx: PoiseContext<'_>,
    #[description = "The stream alert channel"]
    #[channel_types("Text", "News")]
    channel: GuildChannel,
) -> Result<()> {
    let guild_id = ctx.guild_id().wrap_err("No guild ID?")?;

    ctx.data()
        .settings
        .set_id(guild_id, keys::STREAM_CHANNEL, channel.id)?;

    ctx.say(format!(
        "✅ Stream alerts will be posted in {}.",
        channel.mention()
    ))
    .await?;

    Ok(())
}

/// Use existing channels for the clan system
#[poise::command(
    slash_command,
    required_permissions = "ADMINISTRATOR",
    ephemeral = true
)]
pub async fn clans(
    ctx: PoiseContext<'_>,
    #[description = "The role allowed to request clans"] leader_role: Role,
    #[description = "Where clan requests are reviewed"]
    #[channel_types("Text")]
    approvals: GuildChannel,
    #[description = "Where clan events are logged"]
    #[channel_types("Text")]
    log: GuildChannel,
    #[description = "The category clan channels are made in"]
    #[channel_types("Category")]
    category: GuildChannel,
) -> Result<()> {
    let guild_id = ctx.guild_id().wrap_err("No guild ID?")?;
    let settings = &ctx.data().settings;

    settings.set_id(guild_id, keys::CLAN_LEADER_ROLE, leader_role.id)?;
    settings.set_id(guild_id, keys::CLAN_APPROVE_CHANNEL, approvals.id)?;
    settings.set_id(guild_id, keys::CLAN_LOG_CHANNEL, log.id)?;
    settings.set_id(guild_id, keys::CLAN_CATEGORY, category.id)?;

    ctx.say(format!(
        "✅ Clan system configured: leaders need {}, requests go to {}, logs to {}, clans are made under **{}**.",
        leader_role.mention(),
        approvals.mention(),
        log.mention(),
        category.name
    ))
    .await?;

    Ok(())
}

/// How a stored setting reads in discord.
fn render_setting(key: &str, value: &SettingValue) -> String {
    let Some(id) = value.as_id() else {
        return value.to_string();
    };

    if key.contains("role") {
        format!("<@&{id}>")
    } else if key.contains("message") {
        format!("`{id}`")
    } else {
        format!("<#{id}>")
    }
}

/// Show everything configured for this server
#[poise::command(
    slash_command,
    required_permissions = "ADMINISTRATOR",
    ephemeral = true
)]
pub async fn show(ctx: PoiseContext<'_>) -> Result<()> {
    let guild_id = ctx.guild_id().wrap_err("No guild ID?")?;
    let settings = ctx.data().settings.get(guild_id)?;

    if settings.is_empty() {
        ctx.say("Nothing is configured yet. Start with `/setup logs`.")
            .await?;
        return Ok(());
    }

    let description = settings
        .iter()
        .map(|(key, value)| format!("**{key}**: {}", render_setting(key, value)))
        .join("\n");

    ctx.send(
        CreateReply::default().embed(
            CreateEmbed::new()
                .title("⚙️ Server Settings")
                .description(description)
                .colour(Colour::BLURPLE),
        ),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn settings_render_as_mentions() {
        assert_eq!(
            render_setting(keys::CLAN_LEADER_ROLE, &SettingValue::Id(5)),
            "<@&5>"
        );
        assert_eq!(
            render_setting(keys::LOG_VOICE, &SettingValue::Id(6)),
            "<#6>"
        );
        assert_eq!(
            render_setting(keys::STATUS_MESSAGE, &SettingValue::Id(7)),
            "`7`"
        );
        assert_eq!(
            render_setting("motto", &SettingValue::Text("hi".to_owned())),
            "hi"
        );
    }
}
