use crate::{
    afk, audit, automod,
    commands::clans::handle_component,
    data::State,
    operator::{announce_startup, guild_joined, guild_left},
    streams, welcome,
};
use bot_traits::ForwardRefToTracing;
use color_eyre::eyre::{Error, Result};
use poise::serenity_prelude as serenity;

pub async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    framework: poise::FrameworkContext<'_, State, Error>,
    data: &State,
) -> Result<()> {
    match event {
        serenity::FullEvent::Ready { data_about_bot } => {
            tracing::info!(
                "Connected as {} to {} servers",
                data_about_bot.user.name,
                data_about_bot.guilds.len()
            );

            announce_startup(ctx, data, &framework.shard_manager())
                .await
                .trace_err_ok();
        }
        serenity::FullEvent::Message { new_message } => {
            data.recent_messages.remember(new_message);

            if new_message.author.bot {
                return Ok(());
            }

            let removed = automod::moderate_message(ctx, data, new_message)
                .await
                .trace_err_ok()
                .unwrap_or(false);

            if !removed {
                afk::handle_message(ctx, data, new_message)
                    .await
                    .trace_err_ok();
            }
        }
        serenity::FullEvent::MessageDelete {
            deleted_message_id,
            ..
        } => {
            audit::messages::message_deleted(ctx, data, *deleted_message_id)
                .await
                .trace_err_ok();
        }
        serenity::FullEvent::MessageUpdate { event, .. } => {
            audit::messages::message_edited(ctx, data, event)
                .await
                .trace_err_ok();
        }
        serenity::FullEvent::GuildMemberAddition { new_member } => {
            audit::members::member_joined(ctx, data, new_member)
                .await
                .trace_err_ok();

            welcome::greet_member(ctx, data, new_member)
                .await
                .trace_err_ok();
        }
        serenity::FullEvent::GuildMemberRemoval {
            guild_id,
            user,
            member_data_if_available,
        } => {
            audit::members::member_left(
                ctx,
                data,
                *guild_id,
                user,
                member_data_if_available.as_ref(),
            )
            .await
            .trace_err_ok();
        }
        serenity::FullEvent::GuildBanAddition {
            guild_id,
            banned_user,
        } => {
            audit::members::member_banned(ctx, data, *guild_id, banned_user)
                .await
                .trace_err_ok();
        }
        serenity::FullEvent::GuildMemberUpdate {
            old_if_available,
            new,
            event,
        } => {
            audit::profile::member_updated(
                ctx,
                data,
                old_if_available.as_ref(),
                new.as_ref(),
                event,
            )
            .await
            .trace_err_ok();
        }
        serenity::FullEvent::VoiceStateUpdate { old, new } => {
            audit::voice::voice_state_changed(ctx, data, old.as_ref(), new)
                .await
                .trace_err_ok();
        }
        serenity::FullEvent::PresenceUpdate { new_data } => {
            streams::handle_presence(ctx, data, new_data)
                .await
                .trace_err_ok();
        }
        serenity::FullEvent::GuildCreate { guild, is_new } => {
            if *is_new == Some(true) {
                guild_joined(ctx, data, guild).await.trace_err_ok();
            }
        }
        serenity::FullEvent::GuildDelete { incomplete, full } => {
            // an outage also removes the guild, only a real removal is reported
            if !incomplete.unavailable {
                guild_left(ctx, data, incomplete.id, full.as_ref())
                    .await
                    .trace_err_ok();
            }
        }
        serenity::FullEvent::InteractionCreate {
            interaction: serenity::Interaction::Component(component),
        } => {
            handle_component(ctx, data, component).await.trace_err_ok();
        }
        serenity::FullEvent::Ratelimit { data } => {
            tracing::warn!("Ratelimited: {:?}", data);
        }
        _ => {}
    };

    Ok(())
}
