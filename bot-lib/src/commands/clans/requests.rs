use super::{ClanButton, ClanFlow, refuse, validate_clan_name};
use crate::{data::PoiseContext, utils::clip};
use bot_db::{pending::PendingRequest, settings::keys};
use color_eyre::eyre::{ContextCompat, Result, WrapErr};
use poise::{
    CreateReply,
    serenity_prelude::{
        ChannelId, ChannelType, Colour, CreateChannel, CreateEmbed, CreateEmbedFooter,
        CreateMessage, Mentionable, PermissionOverwrite, PermissionOverwriteType, Permissions,
        Role, RoleId, Timestamp,
    },
};

const REQUEST_COLOUR: Colour = Colour(0xf1c40f);
const APPLICATION_COLOUR: Colour = Colour(0x3498db);
const SETUP_COLOUR: Colour = Colour(0x2ecc71);

/// Set up the categories and channels the clan system runs in
#[poise::command(
    slash_command,
    guild_only,
    ephemeral = true,
    required_permissions = "ADMINISTRATOR"
)]
pub async fn setup_clan_system(
    ctx: PoiseContext<'_>,
    #[description = "The role allowed to request clans"] leader_role: Role,
) -> Result<()> {
    let guild_id = ctx.guild_id().wrap_err("No guild ID?")?;
    let bot_id = ctx.serenity_context().cache.current_user().id;

    ctx.defer_ephemeral().await?;

    let hidden_from = |role: RoleId| PermissionOverwrite {
        allow: Permissions::empty(),
        deny: Permissions::VIEW_CHANNEL,
        kind: PermissionOverwriteType::Role(role),
    };

    let admin_only = vec![
        hidden_from(guild_id.everyone_role()),
        hidden_from(leader_role.id),
        PermissionOverwrite {
            allow: Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES,
            deny: Permissions::empty(),
            kind: PermissionOverwriteType::Member(bot_id),
        },
    ];

    let admin_category = guild_id
        .create_channel(
            ctx,
            CreateChannel::new("🔒 Clan Admin Logs")
                .kind(ChannelType::Category)
                .permissions(admin_only.clone()),
        )
        .await
        .wrap_err("Failed to create the clan admin category")?;

    let approvals = guild_id
        .create_channel(
            ctx,
            CreateChannel::new("📜・clan-approvals")
                .kind(ChannelType::Text)
                .category(admin_category.id)
                .permissions(admin_only.clone()),
        )
        .await
        .wrap_err("Failed to create the clan approvals channel")?;

    let log = guild_id
        .create_channel(
            ctx,
            CreateChannel::new("📋・clan-logs")
                .kind(ChannelType::Text)
                .category(admin_category.id)
                .permissions(admin_only),
        )
        .await
        .wrap_err("Failed to create the clan log channel")?;

    let clans_category = guild_id
        .create_channel(
            ctx,
            CreateChannel::new("🛡️ Clans").kind(ChannelType::Category),
        )
        .await
        .wrap_err("Failed to create the clans category")?;

    let settings = &ctx.data().settings;
    settings.set_id(guild_id, keys::CLAN_LEADER_ROLE, leader_role.id)?;
    settings.set_id(guild_id, keys::CLAN_APPROVE_CHANNEL, approvals.id)?;
    settings.set_id(guild_id, keys::CLAN_LOG_CHANNEL, log.id)?;
    settings.set_id(guild_id, keys::CLAN_CATEGORY, clans_category.id)?;

    tracing::info!("Clan system set up in {} by {}", guild_id, ctx.author().name);

    let embed = CreateEmbed::new()
        .title("✅ Clan System Setup Complete")
        .colour(SETUP_COLOUR)
        .field("Leader Role", leader_role.mention().to_string(), true)
        .field("Approvals", approvals.mention().to_string(), true)
        .field("Logs", log.mention().to_string(), true)
        .field("Clan Category", format!("**{}**", clans_category.name), true);

    ctx.send(CreateReply::default().embed(embed)).await?;

    Ok(())
}

/// Ask the admins for a new clan
#[poise::command(slash_command, guild_only, ephemeral = true)]
pub async fn create_clan(
    ctx: PoiseContext<'_>,
    #[description = "What the clan is called"] name: String,
    #[description = "What the clan is about"] description: String,
) -> Result<()> {
    let guild_id = ctx.guild_id().wrap_err("No guild ID?")?;
    let settings = ctx.data().settings.get(guild_id)?;

    let (Some(leader_role), Some(approvals)) = (
        settings.id(keys::CLAN_LEADER_ROLE),
        settings.id(keys::CLAN_APPROVE_CHANNEL),
    ) else {
        return refuse(ctx, "Clan system not setup.").await;
    };
    let leader_role = RoleId::new(leader_role);

    let has_role = ctx
        .author_member()
        .await
        .is_some_and(|member| member.roles.contains(&leader_role));

    if !has_role {
        return refuse(
            ctx,
            format!(
                "You need the {} role to create a clan.",
                leader_role.mention()
            ),
        )
        .await;
    }

    let name = match validate_clan_name(&name) {
        Ok(name) => name.to_owned(),
        Err(reason) => return refuse(ctx, reason).await,
    };

    if ctx.data().clans.find_by_name(guild_id, &name)?.is_some() {
        return refuse(ctx, format!("A clan called **{name}** already exists.")).await;
    }

    let requester = ctx.author();
    let request_id = ctx.data().pending.open(&PendingRequest::ClanCreation {
        guild_id: guild_id.get(),
        requester: requester.id.get(),
        name: name.clone(),
        description: description.clone(),
    })?;

    let embed = CreateEmbed::new()
        .title("🛡️ New Clan Request")
        .colour(REQUEST_COLOUR)
        .timestamp(Timestamp::now())
        .field("Clan Name", &name, true)
        .field("Requested By", requester.mention().to_string(), true)
        .field("Description", clip(&description, 1024), false)
        .footer(CreateEmbedFooter::new(format!("Request #{request_id}")));

    let posted = ChannelId::new(approvals)
        .send_message(
            ctx,
            CreateMessage::new()
                .embed(embed)
                .components(vec![ClanButton::row(ClanFlow::Creation, request_id)]),
        )
        .await;

    if let Err(e) = posted {
        ctx.data().pending.take(request_id)?;
        return Err(e).wrap_err("Failed to post the clan request");
    }

    tracing::info!("{} requested clan `{}` in {}", requester.name, name, guild_id);

    ctx.say("✅ Request Sent! The admins will review it shortly.")
        .await?;

    Ok(())
}

pub(super) async fn autocomplete_clan(ctx: PoiseContext<'_>, partial: &str) -> Vec<String> {
    let Some(guild_id) = ctx.guild_id() else {
        return Vec::new();
    };

    ctx.data()
        .clans
        .search_names(guild_id, partial)
        .unwrap_or_else(|e| {
            tracing::warn!("Clan autocomplete failed: {:?}", e);
            Vec::new()
        })
}

/// Apply to join a clan
#[poise::command(slash_command, guild_only, ephemeral = true)]
pub async fn apply_clan(
    ctx: PoiseContext<'_>,
    #[description = "The clan to join"]
    #[autocomplete = "autocomplete_clan"]
    clan_name: String,
    #[description = "Tell the leader why you want in"] message: String,
) -> Result<()> {
    let guild_id = ctx.guild_id().wrap_err("No guild ID?")?;
    let applicant = ctx.author().id;

    let Some(clan) = ctx.data().clans.find_by_name(guild_id, &clan_name)? else {
        return refuse(ctx, "Clan not found.").await;
    };

    if let Err(refusal) = clan.ensure_can_apply(applicant) {
        return refuse(ctx, refusal).await;
    }

    if ctx.data().pending.has_application(clan.channel(), applicant)? {
        return refuse(
            ctx,
            format!("You already applied to **{}**. Wait for the leader.", clan.name),
        )
        .await;
    }

    if clan.channel().to_channel(ctx).await.is_err() {
        return refuse(
            ctx,
            format!(
                "The channel for **{}** no longer exists (it may have been deleted).",
                clan.name
            ),
        )
        .await;
    }

    let request_id = ctx.data().pending.open(&PendingRequest::Membership {
        guild_id: guild_id.get(),
        clan_channel: clan.channel_id,
        applicant: applicant.get(),
        message: message.clone(),
    })?;

    let embed = CreateEmbed::new()
        .title("📩 New Membership Application")
        .colour(APPLICATION_COLOUR)
        .timestamp(Timestamp::now())
        .thumbnail(ctx.author().face())
        .field("Applicant", applicant.mention().to_string(), true)
        .field("Message", clip(&message, 1024), false)
        .footer(CreateEmbedFooter::new(format!("Application #{request_id}")));

    let posted = clan
        .channel()
        .send_message(
            ctx,
            CreateMessage::new()
                .content(clan.leader().mention().to_string())
                .embed(embed)
                .components(vec![ClanButton::row(ClanFlow::Application, request_id)]),
        )
        .await;

    if let Err(e) = posted {
        ctx.data().pending.take(request_id)?;
        return Err(e).wrap_err("Failed to post the clan application");
    }

    tracing::info!("{} applied to clan `{}`", ctx.author().name, clan.name);

    ctx.say(format!("✅ Application sent to **{}**!", clan.name))
        .await?;

    Ok(())
}
