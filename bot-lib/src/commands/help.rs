use crate::data::PoiseContext;
use color_eyre::eyre::Result;
use poise::{
    CreateReply,
    serenity_prelude::{
        Colour, ComponentInteractionDataKind, CreateActionRow, CreateEmbed, CreateEmbedFooter,
        CreateInteractionResponse, CreateInteractionResponseMessage, CreateSelectMenu,
        CreateSelectMenuKind, CreateSelectMenuOption,
    },
};
use std::time::Duration;

/// The menu stays usable this long after the last selection.
const MENU_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HelpCategory {
    Clans,
    Admin,
    General,
}

impl HelpCategory {
    const ALL: [HelpCategory; 3] = [
        HelpCategory::Clans,
        HelpCategory::Admin,
        HelpCategory::General,
    ];

    fn value(self) -> &'static str {
        match self {
            HelpCategory::Clans => "clans",
            HelpCategory::Admin => "admin",
            HelpCategory::General => "general",
        }
    }

    fn from_value(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.value() == value)
    }

    fn label(self) -> &'static str {
        match self {
            HelpCategory::Clans => "🛡️ Clans",
            HelpCategory::Admin => "🔧 Admin & Owner",
            HelpCategory::General => "🎮 General",
        }
    }

    fn commands(self) -> &'static [(&'static str, &'static str)] {
        match self {
            HelpCategory::Clans => &[
                ("/create_clan", "Ask the admins for a new clan"),
                ("/apply_clan", "Apply to join a clan"),
                ("/leave_clan", "Leave the clan whose channel you're in"),
                ("/clan_info", "Show a clan's leader, members and role"),
                ("/clan_list", "The server's clans, biggest first"),
                ("/clan_kick", "Leader: remove a member"),
                ("/transfer_ownership", "Leader: hand the clan to a member"),
                ("/disband_clan", "Leader: delete the clan"),
            ],
            HelpCategory::Admin => &[
                ("/setup_clan_system", "Create the clan channels and categories"),
                ("/setup", "Point logs, welcomes, stream alerts and clans at channels"),
                ("/kick /ban", "Remove someone from the server"),
                ("/timeout /untimeout", "Mute someone for a while"),
                ("/purge", "Delete recent messages"),
                ("/owner", "Owner: presence, servers, backups"),
                ("/setup_status", "Owner: post a self-updating status card"),
            ],
            HelpCategory::General => &[
                ("/teams", "Split names into two random teams"),
                ("/afk", "Let people know you're away"),
                ("/status", "How the bot is doing"),
                ("/help", "This menu"),
            ],
        }
    }

    fn embed(self) -> CreateEmbed {
        self.commands().iter().fold(
            CreateEmbed::new()
                .title(format!("{} Commands", self.label()))
                .colour(Colour::BLURPLE),
            |embed, (name, description)| embed.field(*name, *description, false),
        )
    }
}

fn menu(id: &str) -> CreateActionRow {
    let options = HelpCategory::ALL
        .into_iter()
        .map(|category| CreateSelectMenuOption::new(category.label(), category.value()))
        .collect();

    CreateActionRow::SelectMenu(
        CreateSelectMenu::new(id, CreateSelectMenuKind::String { options })
            .placeholder("Pick a category"),
    )
}

/// What the bot can do
#[poise::command(slash_command, prefix_command)]
pub async fn help(ctx: PoiseContext<'_>) -> Result<()> {
    let menu_id = format!("help_menu:{}", ctx.id());

    let intro = CreateEmbed::new()
        .title("📖 Help")
        .description("Pick a category below to see its commands.")
        .colour(Colour::BLURPLE)
        .footer(CreateEmbedFooter::new(
            "Commands marked Leader or Owner need those rights",
        ));

    let reply = ctx
        .send(
            CreateReply::default()
                .embed(intro)
                .components(vec![menu(&menu_id)])
                .ephemeral(true),
        )
        .await?;
    let message = reply.message().await?;

    while let Some(interaction) = message
        .await_component_interaction(ctx)
        .author_id(ctx.author().id)
        .custom_ids(vec![menu_id.clone()])
        .timeout(MENU_TIMEOUT)
        .await
    {
        let ComponentInteractionDataKind::StringSelect { values } = &interaction.data.kind else {
            continue;
        };

        let Some(category) = values.first().and_then(|value| HelpCategory::from_value(value))
        else {
            continue;
        };

        interaction
            .create_response(
                ctx,
                CreateInteractionResponse::UpdateMessage(
                    CreateInteractionResponseMessage::new()
                        .embed(category.embed())
                        .components(vec![menu(&menu_id)]),
                ),
            )
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn categories_round_trip_through_menu_values() {
        for category in HelpCategory::ALL {
            assert_eq!(HelpCategory::from_value(category.value()), Some(category));
        }
        assert_eq!(HelpCategory::from_value("secret"), None);
    }
}
