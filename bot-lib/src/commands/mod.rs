pub mod clans;
pub mod general;
pub mod help;
pub mod moderation;
pub mod owner;
pub mod setup;
pub mod status;
pub mod sync;

use crate::data::PoiseContext;
use color_eyre::eyre::Result;

/// Only the configured bot owner may run the command.
pub async fn is_owner(ctx: PoiseContext<'_>) -> Result<bool> {
    let owner = ctx.data().config.read().await.owner();

    if owner != Some(ctx.author().id) {
        tracing::info!(
            "{} tried to use owner command /{}",
            ctx.author().name,
            ctx.command().qualified_name
        );
        ctx.send(
            poise::CreateReply::default()
                .content("❌ **Access Denied:** Only the Bot Owner can run this command.")
                .ephemeral(true),
        )
        .await?;

        return Ok(false);
    }

    Ok(true)
}

/// Whether the author is a server administrator. Only meaningful for slash commands, which
/// carry the resolved permissions.
pub async fn author_is_admin(ctx: PoiseContext<'_>) -> bool {
    ctx.author_member()
        .await
        .and_then(|member| member.permissions)
        .is_some_and(|permissions| permissions.administrator())
}
