use crate::{data::State, operator::send_operator_log, utils::clip};
use bot_traits::ForwardRefToTracing;
use color_eyre::eyre::Error;
use poise::{
    CreateReply, FrameworkError,
    serenity_prelude::{Colour, CreateEmbed, Timestamp},
};

/// Error reports are cut to what fits in an embed description.
const REPORT_LIMIT: usize = 4000;

pub async fn on_error(error: FrameworkError<'_, State, Error>) {
    match error {
        FrameworkError::Command { error, ctx, .. } => {
            let command = ctx.command().qualified_name.clone();
            tracing::error!("Command /{} failed: {:?}", command, error);

            ctx.send(
                CreateReply::default()
                    .content("❌ An error occurred while processing this command.")
                    .ephemeral(true),
            )
            .await
            .trace_err_ok();

            let author = ctx.author();
            let guild = match ctx.guild_id() {
                Some(guild_id) => {
                    let name = ctx
                        .guild()
                        .map(|guild| guild.name.clone())
                        .unwrap_or_else(|| "Unknown".to_owned());
                    format!("{name} (`{guild_id}`)")
                }
                None => "Direct Messages".to_owned(),
            };

            let embed = CreateEmbed::new()
                .title("⚠️ Bot Error Occurred")
                .colour(Colour::RED)
                .timestamp(Timestamp::now())
                .field("User", format!("{} (`{}`)", author.name, author.id), true)
                .field("Guild", guild, true)
                .field("Command", format!("/{command}"), true)
                .description(format!(
                    "```\n{}\n```",
                    clip(&format!("{error:?}"), REPORT_LIMIT - 8)
                ));

            match send_operator_log(ctx.serenity_context(), ctx.data(), embed).await {
                Ok(true) => {}
                Ok(false) => tracing::debug!("No operator log channel for the error report"),
                Err(e) => tracing::error!("Failed to report command error: {:?}", e),
            }
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                tracing::error!("Error while handling error: {}", e);
            }
        }
    }
}
