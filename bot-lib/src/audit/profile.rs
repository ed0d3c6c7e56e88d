use super::{LogKind, members, send_log};
use crate::data::State;
use bot_traits::ForwardRefToTracing;
use chrono::Utc;
use color_eyre::eyre::Result;
use itertools::Itertools;
use poise::serenity_prelude::{
    self as serenity, Colour, CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter,
    GuildMemberUpdateEvent, Member, Mentionable, RoleId, Timestamp,
};

/// Roles in `after` but not `before`, then the other way round.
pub fn role_diff(before: &[RoleId], after: &[RoleId]) -> (Vec<RoleId>, Vec<RoleId>) {
    let added = after
        .iter()
        .filter(|role| !before.contains(role))
        .copied()
        .collect();
    let removed = before
        .iter()
        .filter(|role| !after.contains(role))
        .copied()
        .collect();

    (added, removed)
}

fn nickname_or_placeholder(nick: Option<&str>) -> String {
    format!("`{}`", nick.unwrap_or("[None] (Username)"))
}

/// Timeout changes go to the moderation log, everything else is a profile change.
pub async fn member_updated(
    ctx: &serenity::Context,
    data: &State,
    old: Option<&Member>,
    new: Option<&Member>,
    event: &GuildMemberUpdateEvent,
) -> Result<()> {
    // without the previous state there is nothing to compare against
    let Some(old) = old else {
        return Ok(());
    };

    if old.communication_disabled_until != event.communication_disabled_until {
        if let Some(until) = members::timeout_started(
            old.communication_disabled_until.as_ref(),
            event.communication_disabled_until.as_ref(),
            Utc::now(),
        ) {
            members::timeout_issued(ctx, data, event.guild_id, &event.user, until).await?;
        }

        return Ok(());
    }

    let guild_id = event.guild_id;
    let user = &event.user;
    let author = || CreateEmbedAuthor::new(&user.name).icon_url(user.face());
    let footer = || CreateEmbedFooter::new(format!("ID: {}", user.id));

    let mut embeds = Vec::new();

    if old.nick != event.nick {
        embeds.push(
            CreateEmbed::new()
                .title("🏷️ Nickname Changed")
                .colour(Colour::BLUE)
                .author(author())
                .field("Before", nickname_or_placeholder(old.nick.as_deref()), true)
                .field(
                    "After",
                    nickname_or_placeholder(event.nick.as_deref()),
                    true,
                ),
        );
    }

    if let Some(new) = new {
        let (before, after) = (old.face(), new.face());
        if before != after {
            embeds.push(
                CreateEmbed::new()
                    .title("🖼️ Avatar Changed")
                    .description(format!("{} updated their profile picture.", user.mention()))
                    .colour(Colour::GOLD)
                    .author(author())
                    .thumbnail(before)
                    .image(after),
            );
        }
    }

    let (added, removed) = role_diff(&old.roles, &event.roles);

    if !added.is_empty() {
        embeds.push(
            CreateEmbed::new()
                .title("📈 Role Added")
                .description(format!(
                    "{} was given the role(s): {}",
                    user.mention(),
                    added.iter().map(|role| role.mention()).join(", ")
                ))
                .colour(Colour::DARK_GREEN)
                .author(author()),
        );
    }

    if !removed.is_empty() {
        embeds.push(
            CreateEmbed::new()
                .title("📉 Role Removed")
                .description(format!(
                    "{} lost the role(s): {}",
                    user.mention(),
                    removed.iter().map(|role| role.mention()).join(", ")
                ))
                .colour(Colour::RED)
                .author(author()),
        );
    }

    for embed in embeds {
        let embed = embed.timestamp(Timestamp::now()).footer(footer());
        send_log(ctx, data, guild_id, LogKind::Profile, embed)
            .await
            .trace_err_ok();
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn diffs_roles_both_ways() {
        let before = [RoleId::new(1), RoleId::new(2), RoleId::new(3)];
        let after = [RoleId::new(2), RoleId::new(3), RoleId::new(4)];

        let (added, removed) = role_diff(&before, &after);

        assert_eq!(added, vec![RoleId::new(4)]);
        assert_eq!(removed, vec![RoleId::new(1)]);
    }

    #[test]
    fn reordered_roles_are_not_a_change() {
        let before = [RoleId::new(1), RoleId::new(2)];
        let after = [RoleId::new(2), RoleId::new(1)];

        assert_eq!(role_diff(&before, &after), (vec![], vec![]));
    }

    #[test]
    fn missing_nickname_has_placeholder() {
        assert_eq!(nickname_or_placeholder(None), "`[None] (Username)`");
        assert_eq!(nickname_or_placeholder(Some("Ash")), "`Ash`");
    }
}
