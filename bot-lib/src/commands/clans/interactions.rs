//! Button presses on clan requests, applications and transfers.
//!
//! Authorization is checked while the request is still stored, so a refused click leaves it for
//! someone who may answer it. Whoever then takes it from the store first gets to act on it.

use super::{
    ClanButton, ClanFlow, clan_channel_name, clan_log, grant_access, leader_overwrite,
    member_overwrite, revoke_access,
};
use crate::{
    data::State,
    utils::{clip, is_missing_or_forbidden},
};
use bot_db::{
    clans::{Actor, Clan},
    pending::PendingRequest,
    settings::keys,
};
use bot_traits::ForwardRefToTracing;
use chrono::Utc;
use color_eyre::eyre::{Result, WrapErr};
use poise::serenity_prelude::{
    self as serenity, ChannelId, ChannelType, Colour, ComponentInteraction, CreateChannel,
    CreateEmbed, CreateEmbedFooter, CreateInteractionResponse, CreateInteractionResponseFollowup,
    CreateInteractionResponseMessage, CreateMessage, EditInteractionResponse, EditRole, GuildId,
    Mentionable, PermissionOverwrite, PermissionOverwriteType, Permissions, RoleId, UserId,
};

/// Who may answer a stored request. The verdict is the same for both buttons of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Verdict {
    Allowed,
    Refused(String),
    /// The application points at a clan that no longer exists.
    ClanGone,
}

fn judge_press(
    request: &PendingRequest,
    button: ClanButton,
    presser: Actor,
    clan: Option<&Clan>,
) -> Verdict {
    match (request, button.flow) {
        (PendingRequest::ClanCreation { .. }, ClanFlow::Creation) => {
            if presser.is_admin {
                Verdict::Allowed
            } else {
                Verdict::Refused("Only administrators can review clan requests.".to_owned())
            }
        }
        (PendingRequest::Membership { .. }, ClanFlow::Application) => match clan {
            Some(clan) => match clan.authorize(presser) {
                Ok(()) => Verdict::Allowed,
                Err(refusal) => Verdict::Refused(refusal.to_string()),
            },
            None => Verdict::ClanGone,
        },
        (PendingRequest::OwnershipTransfer { new_leader, .. }, ClanFlow::Transfer) => {
            if presser.user_id.get() == *new_leader {
                Verdict::Allowed
            } else {
                Verdict::Refused("Only the nominated member can answer this.".to_owned())
            }
        }
        (request, flow) => {
            tracing::warn!(
                "Button for {:?} pressed on mismatched request {:?}",
                flow,
                request
            );
            Verdict::Refused("This button is no longer valid.".to_owned())
        }
    }
}

pub async fn handle_component(
    ctx: &serenity::Context,
    data: &State,
    component: &ComponentInteraction,
) -> Result<()> {
    let Some(button) = ClanButton::parse(&component.data.custom_id) else {
        return Ok(());
    };

    let Some(request) = data.pending.get(button.request_id)? else {
        return respond_ephemeral(ctx, component, "❌ This request was already handled.").await;
    };

    let presser = Actor {
        user_id: component.user.id,
        is_admin: component
            .member
            .as_ref()
            .and_then(|member| member.permissions)
            .is_some_and(|permissions| permissions.administrator()),
    };

    let clan = match &request {
        PendingRequest::Membership { clan_channel, .. } => {
            data.clans.get(ChannelId::new(*clan_channel))?
        }
        _ => None,
    };

    match judge_press(&request, button, presser, clan.as_ref()) {
        Verdict::Allowed => {}
        Verdict::Refused(reason) => {
            return respond_ephemeral(ctx, component, format!("❌ {reason}")).await;
        }
        Verdict::ClanGone => {
            data.pending.take(button.request_id)?;
            return respond_ephemeral(ctx, component, "❌ This clan doesn't exist anymore.")
                .await;
        }
    }

    let Some(request) = data.pending.take(button.request_id)? else {
        return respond_ephemeral(ctx, component, "❌ This request was already handled.").await;
    };

    tracing::info!(
        "{} pressed {} on request {}",
        component.user.name,
        component.data.custom_id,
        button.request_id
    );

    // Answers only fail before they change anything, so the request can be answered again.
    let answered = match component
        .defer(ctx)
        .await
        .wrap_err("Failed to acknowledge clan button")
    {
        Ok(()) => answer(ctx, data, component, button, presser, request.clone()).await,
        Err(e) => Err(e),
    };

    if answered.is_err() {
        data.pending
            .restore(button.request_id, &request)
            .trace_err_ok();
    }

    answered
}

async fn answer(
    ctx: &serenity::Context,
    data: &State,
    component: &ComponentInteraction,
    button: ClanButton,
    presser: Actor,
    request: PendingRequest,
) -> Result<()> {
    match request {
        PendingRequest::ClanCreation {
            guild_id,
            requester,
            name,
            description,
        } => {
            let (guild_id, requester) = (GuildId::new(guild_id), UserId::new(requester));

            if button.approve {
                approve_creation(ctx, data, component, guild_id, requester, &name, &description)
                    .await
            } else {
                reject_creation(ctx, data, component, guild_id, requester, &name).await
            }
        }
        PendingRequest::Membership {
            guild_id,
            clan_channel,
            applicant,
            ..
        } => {
            let (guild_id, clan_channel, applicant) = (
                GuildId::new(guild_id),
                ChannelId::new(clan_channel),
                UserId::new(applicant),
            );

            if button.approve {
                accept_application(ctx, data, component, guild_id, clan_channel, presser, applicant)
                    .await
            } else {
                deny_application(ctx, data, component, guild_id, clan_channel, applicant).await
            }
        }
        PendingRequest::OwnershipTransfer {
            guild_id,
            clan_channel,
            requested_by,
            requested_by_admin,
            new_leader,
        } => {
            let requester = Actor {
                user_id: UserId::new(requested_by),
                is_admin: requested_by_admin,
            };
            let (guild_id, clan_channel, new_leader) = (
                GuildId::new(guild_id),
                ChannelId::new(clan_channel),
                UserId::new(new_leader),
            );

            if button.approve {
                accept_transfer(ctx, data, component, clan_channel, requester, new_leader).await
            } else {
                decline_transfer(ctx, data, component, guild_id, clan_channel, new_leader).await
            }
        }
    }
}

async fn respond_ephemeral(
    ctx: &serenity::Context,
    component: &ComponentInteraction,
    content: impl Into<String>,
) -> Result<()> {
    component
        .create_response(
            ctx,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await
        .wrap_err("Failed to answer clan button")
}

/// For use once the press has been deferred.
async fn follow_up_ephemeral(
    ctx: &serenity::Context,
    component: &ComponentInteraction,
    content: impl Into<String>,
) -> Result<()> {
    component
        .create_followup(
            ctx,
            CreateInteractionResponseFollowup::new()
                .content(content)
                .ephemeral(true),
        )
        .await
        .wrap_err("Failed to follow up on clan button")?;

    Ok(())
}

/// Stamps the request embed with the outcome and removes its buttons.
async fn close_request(
    ctx: &serenity::Context,
    component: &ComponentInteraction,
    title: &str,
    colour: Colour,
) -> Result<()> {
    let embed = component
        .message
        .embeds
        .first()
        .cloned()
        .map(CreateEmbed::from)
        .unwrap_or_default()
        .title(title)
        .colour(colour)
        .footer(CreateEmbedFooter::new(format!(
            "Handled by {}",
            component.user.name
        )));

    component
        .edit_response(
            ctx,
            EditInteractionResponse::new()
                .embed(embed)
                .components(vec![]),
        )
        .await
        .wrap_err("Failed to close clan request")?;

    Ok(())
}

async fn direct_message(ctx: &serenity::Context, user: UserId, content: String) {
    user.direct_message(ctx, CreateMessage::new().content(content))
        .await
        .trace_warn_ok("sending a clan DM");
}

/// Removes what an unfinished clan approval already created.
async fn undo_clan_creation(
    ctx: &serenity::Context,
    guild_id: GuildId,
    role: RoleId,
    channel: Option<ChannelId>,
) {
    if let Some(channel) = channel {
        channel
            .delete(ctx)
            .await
            .trace_warn_ok("deleting the channel of an unfinished clan");
    }

    guild_id
        .delete_role(ctx, role)
        .await
        .trace_warn_ok("deleting the role of an unfinished clan");
}

async fn approve_creation(
    ctx: &serenity::Context,
    data: &State,
    component: &ComponentInteraction,
    guild_id: GuildId,
    requester: UserId,
    name: &str,
    description: &str,
) -> Result<()> {
    if data.clans.find_by_name(guild_id, name)?.is_some() {
        close_request(ctx, component, "❌ Clan Rejected", Colour::RED).await?;
        follow_up_ephemeral(
            ctx,
            component,
            format!("❌ A clan called **{name}** was created in the meantime."),
        )
        .await
        .trace_err_ok();
        return Ok(());
    }

    let category = data
        .settings
        .get_id(guild_id, keys::CLAN_CATEGORY)?
        .map(ChannelId::new);
    let bot_id = ctx.cache.current_user().id;

    let role = guild_id
        .create_role(ctx, EditRole::new().name(name).mentionable(true))
        .await
        .wrap_err("Failed to create clan role")?;

    let overwrites = vec![
        PermissionOverwrite {
            allow: Permissions::empty(),
            deny: Permissions::VIEW_CHANNEL,
            kind: PermissionOverwriteType::Role(guild_id.everyone_role()),
        },
        PermissionOverwrite {
            allow: Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES,
            deny: Permissions::empty(),
            kind: PermissionOverwriteType::Role(role.id),
        },
        member_overwrite(bot_id),
        leader_overwrite(requester),
    ];

    let mut channel = CreateChannel::new(clan_channel_name(name))
        .kind(ChannelType::Text)
        .topic(clip(description, 1024))
        .permissions(overwrites);
    if let Some(category) = category {
        channel = channel.category(category);
    }

    let channel = match guild_id.create_channel(ctx, channel).await {
        Ok(channel) => channel,
        Err(e) => {
            undo_clan_creation(ctx, guild_id, role.id, None).await;
            return Err(e).wrap_err("Failed to create clan channel");
        }
    };

    let clan = Clan::new(
        name,
        description,
        guild_id,
        requester,
        channel.id,
        Some(role.id),
        Utc::now().timestamp(),
    );
    if let Err(e) = data.clans.create(&clan) {
        undo_clan_creation(ctx, guild_id, role.id, Some(channel.id)).await;
        return Err(e);
    }

    // The clan exists from here on, the rest is best-effort.
    let role_granted = ctx
        .http
        .add_member_role(guild_id, requester, role.id, Some("Approved clan leader"))
        .await
        .trace_warn_ok("granting the clan leader role")
        .is_some();

    channel
        .id
        .say(
            ctx,
            format!(
                "{}, your clan **{name}** is ready! 🎉\nRole: {}",
                requester.mention(),
                role.mention()
            ),
        )
        .await
        .trace_warn_ok("greeting the clan leader");

    if !role_granted {
        channel
            .id
            .say(
                ctx,
                "⚠️ I could not give the leader the clan role (My role might be below theirs).",
            )
            .await
            .trace_err_ok();
    }

    close_request(ctx, component, "✅ Clan Approved", Colour::DARK_GREEN)
        .await
        .trace_err_ok();

    clan_log(
        ctx,
        data,
        guild_id,
        "🛡️ Clan Created",
        format!(
            "**{name}** was approved by {}.\nLeader: {}\nChannel: {}",
            component.user.mention(),
            requester.mention(),
            channel.mention()
        ),
        Colour::DARK_GREEN,
    )
    .await
    .trace_err_ok();

    Ok(())
}

async fn reject_creation(
    ctx: &serenity::Context,
    data: &State,
    component: &ComponentInteraction,
    guild_id: GuildId,
    requester: UserId,
    name: &str,
) -> Result<()> {
    close_request(ctx, component, "❌ Clan Rejected", Colour::RED).await?;

    direct_message(
        ctx,
        requester,
        format!("Your request for the clan **{name}** was rejected by the admins."),
    )
    .await;

    clan_log(
        ctx,
        data,
        guild_id,
        "🚫 Clan Rejected",
        format!(
            "**{name}** requested by {} was rejected by {}.",
            requester.mention(),
            component.user.mention()
        ),
        Colour::RED,
    )
    .await
    .trace_err_ok();

    Ok(())
}

async fn accept_application(
    ctx: &serenity::Context,
    data: &State,
    component: &ComponentInteraction,
    guild_id: GuildId,
    clan_channel: ChannelId,
    actor: Actor,
    applicant: UserId,
) -> Result<()> {
    match guild_id.member(ctx, applicant).await {
        Ok(_) => {}
        Err(e) if is_missing_or_forbidden(&e) => {
            close_request(ctx, component, "⚠️ Applicant Left", Colour::LIGHT_GREY).await?;
            follow_up_ephemeral(
                ctx,
                component,
                "❌ That user is no longer in the server. The application was removed.",
            )
            .await
            .trace_err_ok();
            return Ok(());
        }
        Err(e) => return Err(e).wrap_err("Failed to look up the applicant"),
    }

    let Some(clan) = data.clans.get(clan_channel)? else {
        close_request(ctx, component, "❌ Application Closed", Colour::LIGHT_GREY).await?;
        follow_up_ephemeral(ctx, component, "❌ This clan doesn't exist anymore.")
            .await
            .trace_err_ok();
        return Ok(());
    };

    // Access first, so a failure here leaves the member list as it was.
    grant_access(&ctx.http, &clan, applicant).await?;

    let clan = match data.clans.accept_member(clan_channel, actor, applicant)? {
        Ok(clan) => clan,
        Err(refusal) => {
            if !clan.is_member(applicant) {
                revoke_access(&ctx.http, &clan, applicant)
                    .await
                    .trace_warn_ok("withdrawing access after a refused acceptance");
            }
            close_request(ctx, component, "❌ Application Closed", Colour::LIGHT_GREY)
                .await
                .trace_err_ok();
            follow_up_ephemeral(ctx, component, format!("❌ {refusal}"))
                .await
                .trace_err_ok();
            return Ok(());
        }
    };

    close_request(ctx, component, "✅ Application Accepted", Colour::DARK_GREEN)
        .await
        .trace_err_ok();

    clan.channel()
        .say(
            ctx,
            format!("Welcome {} to **{}**! 🎉", applicant.mention(), clan.name),
        )
        .await
        .trace_warn_ok("welcoming the new clan member");

    clan_log(
        ctx,
        data,
        guild_id,
        "👤 Member Joined Clan",
        format!(
            "{} joined **{}**, accepted by {}.",
            applicant.mention(),
            clan.name,
            actor.user_id.mention()
        ),
        Colour::DARK_GREEN,
    )
    .await
    .trace_err_ok();

    Ok(())
}

async fn deny_application(
    ctx: &serenity::Context,
    data: &State,
    component: &ComponentInteraction,
    guild_id: GuildId,
    clan_channel: ChannelId,
    applicant: UserId,
) -> Result<()> {
    let clan_name = data
        .clans
        .get(clan_channel)?
        .map(|clan| clan.name)
        .unwrap_or_else(|| "the clan".to_owned());

    close_request(ctx, component, "❌ Application Denied", Colour::RED).await?;

    direct_message(
        ctx,
        applicant,
        format!("Your application to **{clan_name}** was declined."),
    )
    .await;

    clan_log(
        ctx,
        data,
        guild_id,
        "📪 Application Denied",
        format!(
            "{}'s application to **{clan_name}** was denied by {}.",
            applicant.mention(),
            component.user.mention()
        ),
        Colour::RED,
    )
    .await
    .trace_err_ok();

    Ok(())
}

async fn accept_transfer(
    ctx: &serenity::Context,
    data: &State,
    component: &ComponentInteraction,
    clan_channel: ChannelId,
    requester: Actor,
    new_leader: UserId,
) -> Result<()> {
    let previous_leader = data.clans.get(clan_channel)?.map(|clan| clan.leader());

    let clan = match data
        .clans
        .transfer_ownership(clan_channel, requester, new_leader)?
    {
        Ok(clan) => clan,
        Err(refusal) => {
            close_request(ctx, component, "❌ Transfer Cancelled", Colour::LIGHT_GREY).await?;
            follow_up_ephemeral(ctx, component, format!("❌ {refusal}"))
                .await
                .trace_err_ok();
            return Ok(());
        }
    };

    clan_channel
        .create_permission(ctx, leader_overwrite(new_leader))
        .await
        .trace_warn_ok("granting the new leader's channel permissions");

    if let Some(previous) = previous_leader.filter(|previous| *previous != new_leader) {
        clan_channel
            .create_permission(ctx, member_overwrite(previous))
            .await
            .trace_warn_ok("demoting the previous leader's channel permissions");
    }

    close_request(ctx, component, "👑 Leadership Transferred", Colour::GOLD)
        .await
        .trace_err_ok();

    clan_channel
        .say(
            ctx,
            format!(
                "👑 {} is now the leader of **{}**!",
                new_leader.mention(),
                clan.name
            ),
        )
        .await
        .trace_err_ok();

    clan_log(
        ctx,
        data,
        clan.guild(),
        "👑 Ownership Transferred",
        format!(
            "**{}** is now led by {}{}.",
            clan.name,
            new_leader.mention(),
            previous_leader
                .map(|previous| format!(", taking over from {}", previous.mention()))
                .unwrap_or_default()
        ),
        Colour::GOLD,
    )
    .await
    .trace_err_ok();

    Ok(())
}

async fn decline_transfer(
    ctx: &serenity::Context,
    data: &State,
    component: &ComponentInteraction,
    guild_id: GuildId,
    clan_channel: ChannelId,
    new_leader: UserId,
) -> Result<()> {
    let clan_name = data
        .clans
        .get(clan_channel)?
        .map(|clan| clan.name)
        .unwrap_or_else(|| "the clan".to_owned());

    close_request(ctx, component, "❌ Transfer Declined", Colour::RED).await?;

    clan_log(
        ctx,
        data,
        guild_id,
        "🙅 Transfer Declined",
        format!(
            "{} declined the leadership of **{clan_name}**.",
            new_leader.mention()
        ),
        Colour::ORANGE,
    )
    .await
    .trace_err_ok();

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use bot_db::clans::ClanRefusal;

    const GUILD: GuildId = GuildId::new(1);
    const LEADER: UserId = UserId::new(10);
    const MEMBER: UserId = UserId::new(11);
    const ADMIN: UserId = UserId::new(13);

    fn clan() -> Clan {
        Clan::new(
            "Night Owls",
            "",
            GUILD,
            LEADER,
            ChannelId::new(100),
            None,
            0,
        )
    }

    fn application() -> PendingRequest {
        PendingRequest::Membership {
            guild_id: GUILD.get(),
            clan_channel: 100,
            applicant: 20,
            message: "hi".to_owned(),
        }
    }

    fn press(flow: ClanFlow, approve: bool) -> ClanButton {
        ClanButton {
            flow,
            approve,
            request_id: 1,
        }
    }

    #[test]
    fn only_leader_or_admin_answers_applications() {
        let clan = clan();

        for approve in [true, false] {
            let button = press(ClanFlow::Application, approve);

            assert_eq!(
                judge_press(&application(), button, Actor::member(MEMBER), Some(&clan)),
                Verdict::Refused(ClanRefusal::NotLeader.to_string())
            );
            assert_eq!(
                judge_press(&application(), button, Actor::member(LEADER), Some(&clan)),
                Verdict::Allowed
            );
            assert_eq!(
                judge_press(&application(), button, Actor::admin(ADMIN), Some(&clan)),
                Verdict::Allowed
            );
        }
    }

    #[test]
    fn application_to_vanished_clan_is_dropped() {
        assert_eq!(
            judge_press(
                &application(),
                press(ClanFlow::Application, false),
                Actor::member(LEADER),
                None
            ),
            Verdict::ClanGone
        );
    }

    #[test]
    fn only_admins_review_clan_requests() {
        let request = PendingRequest::ClanCreation {
            guild_id: GUILD.get(),
            requester: MEMBER.get(),
            name: "Night Owls".to_owned(),
            description: String::new(),
        };

        for approve in [true, false] {
            let button = press(ClanFlow::Creation, approve);

            assert!(matches!(
                judge_press(&request, button, Actor::member(MEMBER), None),
                Verdict::Refused(_)
            ));
            assert_eq!(
                judge_press(&request, button, Actor::admin(ADMIN), None),
                Verdict::Allowed
            );
        }
    }

    #[test]
    fn only_the_nominee_answers_a_transfer() {
        let request = PendingRequest::OwnershipTransfer {
            guild_id: GUILD.get(),
            clan_channel: 100,
            requested_by: LEADER.get(),
            requested_by_admin: false,
            new_leader: MEMBER.get(),
        };

        for approve in [true, false] {
            let button = press(ClanFlow::Transfer, approve);

            assert!(matches!(
                judge_press(&request, button, Actor::member(LEADER), None),
                Verdict::Refused(_)
            ));
            assert!(matches!(
                judge_press(&request, button, Actor::admin(ADMIN), None),
                Verdict::Refused(_)
            ));
            assert_eq!(
                judge_press(&request, button, Actor::member(MEMBER), None),
                Verdict::Allowed
            );
        }
    }

    #[test]
    fn mismatched_buttons_are_refused() {
        assert!(matches!(
            judge_press(
                &application(),
                press(ClanFlow::Transfer, true),
                Actor::admin(ADMIN),
                Some(&clan())
            ),
            Verdict::Refused(_)
        ));
    }
}
