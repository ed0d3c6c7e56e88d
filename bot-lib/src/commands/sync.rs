use super::is_owner;
use crate::data::PoiseContext;
use color_eyre::eyre::Result;
use poise::builtins::register_application_commands_buttons;

/// Register or remove slash commands, here or everywhere
#[poise::command(prefix_command, check = "is_owner")]
pub async fn sync(ctx: PoiseContext<'_>) -> Result<()> {
    register_application_commands_buttons(ctx).await?;
    Ok(())
}
