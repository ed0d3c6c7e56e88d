use super::{
    actor, clan_log, clan_of_channel, refuse, refuse_transition, requests::autocomplete_clan,
    revoke_access, ClanButton, ClanFlow,
};
use crate::{MentionableExt, data::PoiseContext, utils::{GetRelativeTimestamp, clip}};
use bot_db::{clans::Clan, pending::PendingRequest};
use bot_traits::ForwardRefToTracing;
use chrono::DateTime;
use color_eyre::eyre::{ContextCompat, Result, WrapErr};
use itertools::Itertools;
use poise::{
    CreateReply,
    serenity_prelude::{
        ButtonStyle, Colour, CreateActionRow, CreateButton, CreateEmbed, CreateEmbedFooter,
        CreateInteractionResponse, CreateInteractionResponseMessage, CreateMessage, Mentionable,
        Timestamp, User,
    },
};
use std::time::Duration;

const DISBAND_TIMEOUT: Duration = Duration::from_secs(30);
const LEADERBOARD_SIZE: usize = 20;

/// Leave the clan whose channel you're in
#[poise::command(slash_command, guild_only, ephemeral = true)]
pub async fn leave_clan(ctx: PoiseContext<'_>) -> Result<()> {
    let Some(clan) = clan_of_channel(ctx).await? else {
        return Ok(());
    };
    let user = ctx.author().id;

    let clan = match ctx.data().clans.leave(clan.channel(), user)? {
        Ok(clan) => clan,
        Err(refusal) => return refuse_transition(ctx, refusal).await,
    };

    let revoked = revoke_access(ctx.http(), &clan, user)
        .await
        .trace_warn_ok("closing the clan channel for a leaving member")
        .is_some();

    tracing::info!("{} left clan `{}`", ctx.author().name, clan.name);

    clan_log(
        ctx,
        ctx.data(),
        clan.guild(),
        "🚪 Member Left Clan",
        format!("{} left **{}**.", user.mention(), clan.name),
        Colour::ORANGE,
    )
    .await?;

    ctx.say(format!(
        "👋 You left **{}**.{}",
        clan.name,
        access_note(revoked)
    ))
    .await?;

    Ok(())
}

/// Remove a member from your clan
#[poise::command(slash_command, guild_only)]
pub async fn clan_kick(
    ctx: PoiseContext<'_>,
    #[description = "The member to remove"] member: User,
) -> Result<()> {
    let Some(clan) = clan_of_channel(ctx).await? else {
        return Ok(());
    };

    let clan = match ctx
        .data()
        .clans
        .kick(clan.channel(), actor(ctx).await, member.id)?
    {
        Ok(clan) => clan,
        Err(refusal) => return refuse_transition(ctx, refusal).await,
    };

    let revoked = revoke_access(ctx.http(), &clan, member.id)
        .await
        .trace_warn_ok("closing the clan channel for a kicked member")
        .is_some();

    tracing::info!(
        "{} kicked {} from clan `{}`",
        ctx.author().name,
        member.name,
        clan.name
    );

    clan_log(
        ctx,
        ctx.data(),
        clan.guild(),
        "👢 Member Kicked From Clan",
        format!(
            "{} was removed from **{}** by {}.",
            member.mention(),
            clan.name,
            ctx.author().mention()
        ),
        Colour::RED,
    )
    .await?;

    ctx.say(format!(
        "👢 {} has been removed from the clan.{}",
        member.mention(),
        access_note(revoked)
    ))
    .await?;

    Ok(())
}

/// Hand the clan over to another member
#[poise::command(slash_command, guild_only, ephemeral = true)]
pub async fn transfer_ownership(
    ctx: PoiseContext<'_>,
    #[description = "The member who should lead the clan"] new_leader: User,
) -> Result<()> {
    let Some(clan) = clan_of_channel(ctx).await? else {
        return Ok(());
    };
    let actor = actor(ctx).await;

    let clan = match ctx
        .data()
        .clans
        .check_transfer(clan.channel(), actor, new_leader.id)?
    {
        Ok(clan) => clan,
        Err(refusal) => return refuse_transition(ctx, refusal).await,
    };

    let request_id = ctx.data().pending.open(&PendingRequest::OwnershipTransfer {
        guild_id: clan.guild_id,
        clan_channel: clan.channel_id,
        requested_by: actor.user_id.get(),
        requested_by_admin: actor.is_admin,
        new_leader: new_leader.id.get(),
    })?;

    let embed = CreateEmbed::new()
        .title("👑 Leadership Transfer")
        .description(format!(
            "{} wants to make {} the leader of **{}**.\n\nOnly the nominee can accept.",
            actor.user_id.mention(),
            new_leader.mention(),
            clan.name
        ))
        .colour(Colour::GOLD)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(format!("Transfer #{request_id}")));

    let posted = clan
        .channel()
        .send_message(
            ctx,
            CreateMessage::new()
                .content(new_leader.mention().to_string())
                .embed(embed)
                .components(vec![ClanButton::row(ClanFlow::Transfer, request_id)]),
        )
        .await;

    if let Err(e) = posted {
        ctx.data().pending.take(request_id)?;
        return Err(e).wrap_err("Failed to post the transfer request");
    }

    ctx.say(format!(
        "✅ Asked {} to take over **{}**.",
        new_leader.mention(),
        clan.name
    ))
    .await?;

    Ok(())
}

/// Delete your clan, its role and its channel
#[poise::command(slash_command, guild_only)]
pub async fn disband_clan(ctx: PoiseContext<'_>) -> Result<()> {
    let Some(clan) = clan_of_channel(ctx).await? else {
        return Ok(());
    };
    let actor = actor(ctx).await;

    if let Err(refusal) = clan.authorize(actor) {
        return refuse_transition(ctx, refusal).await;
    }

    let confirm_id = format!("disband_confirm:{}", ctx.id());
    let cancel_id = format!("disband_cancel:{}", ctx.id());

    let reply = ctx
        .send(
            CreateReply::default()
                .content(format!(
                    "⚠️ Are you sure you want to disband **{}**? The role and this channel will be deleted.",
                    clan.name
                ))
                .components(vec![CreateActionRow::Buttons(vec![
                    CreateButton::new(&confirm_id)
                        .label("Disband")
                        .style(ButtonStyle::Danger),
                    CreateButton::new(&cancel_id)
                        .label("Cancel")
                        .style(ButtonStyle::Secondary),
                ])]),
        )
        .await?;

    let message = reply.into_message().await?;
    let interaction = message
        .await_component_interaction(ctx)
        .author_id(actor.user_id)
        .timeout(DISBAND_TIMEOUT)
        .await;

    let Some(interaction) = interaction else {
        message.delete(ctx).await.ok();
        return Ok(());
    };

    if interaction.data.custom_id != confirm_id {
        interaction
            .create_response(
                ctx,
                settle_confirmation("Disband cancelled."),
            )
            .await?;
        return Ok(());
    }

    let clan = match ctx.data().clans.disband(clan.channel(), actor)? {
        Ok(clan) => clan,
        Err(refusal) => {
            tracing::debug!("Refused disband confirmation: {:?}", refusal);
            interaction
                .create_response(
                    ctx,
                    settle_confirmation(format!("❌ {refusal}")),
                )
                .await?;
            return Ok(());
        }
    };

    interaction
        .create_response(
            ctx,
            settle_confirmation(format!("💥 Disbanding **{}**...", clan.name)),
        )
        .await?;

    let dropped = ctx.data().pending.discard_for_clan(clan.channel())?;
    tracing::info!(
        "{} disbanded clan `{}`, dropping {} pending requests",
        ctx.author().name,
        clan.name,
        dropped
    );

    clan_log(
        ctx,
        ctx.data(),
        clan.guild(),
        "💥 Clan Disbanded",
        format!(
            "**{}** was disbanded by {}.",
            clan.name,
            actor.user_id.mention()
        ),
        Colour::DARK_RED,
    )
    .await?;

    if let Some(role) = clan.role() {
        if let Err(e) = clan.guild().delete_role(ctx, role).await {
            tracing::warn!("Failed to delete role of clan `{}`: {:?}", clan.name, e);
        }
    }

    if let Err(e) = clan.channel().delete(ctx).await {
        tracing::warn!("Failed to delete channel of clan `{}`: {:?}", clan.name, e);
    }

    Ok(())
}

/// Answers the confirmation click by replacing the prompt and its buttons.
fn settle_confirmation(content: impl Into<String>) -> CreateInteractionResponse {
    CreateInteractionResponse::UpdateMessage(
        CreateInteractionResponseMessage::new()
            .content(content)
            .components(vec![]),
    )
}

/// Appended to replies when the channel overwrite could not be removed.
fn access_note(revoked: bool) -> &'static str {
    if revoked {
        ""
    } else {
        "\n⚠️ I could not remove their access to this channel, an admin has to do it."
    }
}

fn info_embed(clan: &Clan) -> CreateEmbed {
    let members = clan.member_ids();
    let created = DateTime::from_timestamp(clan.created_at, 0)
        .map(|created| created.discord_full_timestamp())
        .unwrap_or_else(|| "Unknown".to_owned());

    CreateEmbed::new()
        .title(format!("🛡️ {}", clan.name))
        .description(clip(&clan.description, 2048))
        .colour(Colour::BLUE)
        .field("👑 Leader", clan.leader().mention().to_string(), true)
        .field(
            "🎭 Role",
            clan.role()
                .map(|role| role.mention().to_string())
                .unwrap_or_else(|| "None".to_owned()),
            true,
        )
        .field("📅 Created", created, true)
        .field(
            format!("👥 Members ({})", members.len()),
            clip(&members.mention_all(), 1024),
            false,
        )
}

/// Show a clan, this channel's clan by default
#[poise::command(slash_command, guild_only)]
pub async fn clan_info(
    ctx: PoiseContext<'_>,
    #[description = "The clan to look up"]
    #[autocomplete = "autocomplete_clan"]
    clan_name: Option<String>,
) -> Result<()> {
    let guild_id = ctx.guild_id().wrap_err("No guild ID?")?;

    let clan = match clan_name {
        Some(name) => ctx.data().clans.find_by_name(guild_id, &name)?,
        None => ctx.data().clans.get(ctx.channel_id())?,
    };

    let Some(clan) = clan else {
        return refuse(ctx, "Clan not found.").await;
    };

    ctx.send(CreateReply::default().embed(info_embed(&clan)))
        .await?;

    Ok(())
}

fn leaderboard_lines(clans: &[Clan]) -> String {
    clans
        .iter()
        .take(LEADERBOARD_SIZE)
        .enumerate()
        .map(|(rank, clan)| {
            let members = clan.members.len();
            let plural = if members == 1 { "" } else { "s" };

            format!(
                "**{}.** {} • {members} member{plural} • led by {}",
                rank + 1,
                clan.name,
                clan.leader().mention()
            )
        })
        .join("\n")
}

/// The server's clans, biggest first
#[poise::command(slash_command, guild_only)]
pub async fn clan_list(ctx: PoiseContext<'_>) -> Result<()> {
    let guild_id = ctx.guild_id().wrap_err("No guild ID?")?;
    let clans = ctx.data().clans.leaderboard(guild_id)?;

    if clans.is_empty() {
        ctx.say("There are no clans yet. Be the first with `/create_clan`!")
            .await?;
        return Ok(());
    }

    let embed = CreateEmbed::new()
        .title("🏆 Clan Leaderboard")
        .description(leaderboard_lines(&clans))
        .colour(Colour::GOLD)
        .footer(CreateEmbedFooter::new(format!("{} clans", clans.len())));

    ctx.send(CreateReply::default().embed(embed)).await?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use bot_db::clans::ClanRefusal;
    use poise::serenity_prelude::{ChannelId, GuildId, UserId};

    #[test]
    fn refused_disband_still_answers_the_click() {
        let response =
            serde_json::to_value(settle_confirmation(format!("❌ {}", ClanRefusal::NotLeader)))
                .unwrap();

        // 7 = UPDATE_MESSAGE
        assert_eq!(response["type"], 7);
        assert_eq!(
            response["data"]["content"],
            format!("❌ {}", ClanRefusal::NotLeader)
        );
        assert_eq!(response["data"]["components"], serde_json::json!([]));
    }

    #[test]
    fn failed_revoke_is_reported() {
        assert_eq!(access_note(true), "");
        assert!(access_note(false).contains("could not remove their access"));
    }

    fn clan(name: &str, channel: u64, members: &[u64]) -> Clan {
        let mut clan = Clan::new(
            name,
            "",
            GuildId::new(1),
            UserId::new(members[0]),
            ChannelId::new(channel),
            None,
            0,
        );
        clan.members = members.to_vec();
        clan
    }

    #[test]
    fn leaderboard_ranks_and_pluralises() {
        let clans = vec![clan("Wolves", 10, &[1, 2]), clan("Owls", 11, &[3])];

        assert_eq!(
            leaderboard_lines(&clans),
            "**1.** Wolves • 2 members • led by <@1>\n**2.** Owls • 1 member • led by <@3>"
        );
    }

    #[test]
    fn leaderboard_is_capped() {
        let clans = (0..30)
            .map(|i| clan(&format!("Clan {i}"), 100 + i, &[i + 1]))
            .collect::<Vec<_>>();

        assert_eq!(leaderboard_lines(&clans).lines().count(), LEADERBOARD_SIZE);
    }
}
