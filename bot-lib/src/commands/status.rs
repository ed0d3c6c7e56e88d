use super::is_owner;
use crate::{data::PoiseContext, operator::status_embed};
use bot_db::settings::keys;
use color_eyre::eyre::{ContextCompat, Result, WrapErr};
use poise::{
    CreateReply,
    serenity_prelude::{CreateMessage, GuildChannel, Mentionable},
};

/// How the bot is doing
#[poise::command(slash_command)]
pub async fn status(ctx: PoiseContext<'_>) -> Result<()> {
    let embed = status_embed(
        &ctx.serenity_context().cache,
        &ctx.framework().shard_manager(),
        ctx.data(),
    )
    .await;

    ctx.send(CreateReply::default().embed(embed)).await?;

    Ok(())
}

/// Post a status card that keeps itself up to date
#[poise::command(slash_command, guild_only, ephemeral = true, check = "is_owner")]
pub async fn setup_status(
    ctx: PoiseContext<'_>,
    #[description = "Where to post the status card"]
    #[channel_types("Text", "News")]
    channel: GuildChannel,
) -> Result<()> {
    let guild_id = ctx.guild_id().wrap_err("No guild ID?")?;

    let embed = status_embed(
        &ctx.serenity_context().cache,
        &ctx.framework().shard_manager(),
        ctx.data(),
    )
    .await;

    let message = channel
        .send_message(ctx, CreateMessage::new().embed(embed))
        .await
        .wrap_err("Failed to post the status card")?;

    let settings = &ctx.data().settings;
    settings.set_id(guild_id, keys::STATUS_CHANNEL, channel.id)?;
    settings.set_id(guild_id, keys::STATUS_MESSAGE, message.id)?;

    tracing::info!("Status card posted in {} of {}", channel.id, guild_id);

    ctx.say(format!(
        "✅ Status card posted in {}. It refreshes on its own.",
        channel.mention()
    ))
    .await?;

    Ok(())
}
