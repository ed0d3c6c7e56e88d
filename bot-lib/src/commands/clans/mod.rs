//! Player clans: a role plus a private channel, run by a leader.

pub mod interactions;
pub mod manage;
pub mod requests;

use crate::{
    data::{PoiseContext, State},
    utils::SendReplyEphemeral,
};
use bot_db::{
    clans::{Actor, Clan, ClanRefusal},
    settings::keys,
};
use bot_traits::ForwardRefToTracing;
use color_eyre::eyre::{Result, WrapErr};
use poise::{
    serenity_prelude::{
        ButtonStyle, CacheHttp, ChannelId, Colour, CreateActionRow, CreateButton, CreateEmbed,
        CreateEmbedFooter, CreateMessage, GuildId, Http, PermissionOverwrite,
        PermissionOverwriteType, Permissions, Timestamp, UserId,
    },
};

pub use interactions::handle_component;

const MIN_NAME_LENGTH: usize = 2;
const MAX_NAME_LENGTH: usize = 32;

/// Which approval a button belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClanFlow {
    Creation,
    Application,
    Transfer,
}

impl ClanFlow {
    fn prefix(self) -> &'static str {
        match self {
            ClanFlow::Creation => "clan_req",
            ClanFlow::Application => "clan_app",
            ClanFlow::Transfer => "clan_xfer",
        }
    }

    fn verbs(self) -> (&'static str, &'static str) {
        match self {
            ClanFlow::Creation => ("approve", "reject"),
            ClanFlow::Application => ("accept", "deny"),
            ClanFlow::Transfer => ("accept", "decline"),
        }
    }

    fn labels(self) -> (&'static str, &'static str) {
        match self {
            ClanFlow::Creation => ("✅ Approve", "❌ Reject"),
            ClanFlow::Application => ("✅ Accept", "❌ Deny"),
            ClanFlow::Transfer => ("✅ Accept Leadership", "❌ Decline"),
        }
    }
}

/// A clan button press: `<flow>:<verb>:<pending request id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClanButton {
    pub flow: ClanFlow,
    pub approve: bool,
    pub request_id: u64,
}

impl ClanButton {
    pub fn custom_id(&self) -> String {
        let (yes, no) = self.flow.verbs();
        let verb = if self.approve { yes } else { no };

        format!("{}:{verb}:{}", self.flow.prefix(), self.request_id)
    }

    pub fn parse(custom_id: &str) -> Option<Self> {
        let mut parts = custom_id.splitn(3, ':');
        let (prefix, verb, id) = (parts.next()?, parts.next()?, parts.next()?);

        let flow = [ClanFlow::Creation, ClanFlow::Application, ClanFlow::Transfer]
            .into_iter()
            .find(|flow| flow.prefix() == prefix)?;

        let (yes, no) = flow.verbs();
        let approve = match verb {
            verb if verb == yes => true,
            verb if verb == no => false,
            _ => return None,
        };

        Some(ClanButton {
            flow,
            approve,
            request_id: id.parse().ok()?,
        })
    }

    /// The approve and refuse buttons for a request.
    pub fn row(flow: ClanFlow, request_id: u64) -> CreateActionRow {
        let (yes, no) = flow.labels();
        let button = |approve| ClanButton {
            flow,
            approve,
            request_id,
        };

        CreateActionRow::Buttons(vec![
            CreateButton::new(button(true).custom_id())
                .label(yes)
                .style(ButtonStyle::Success),
            CreateButton::new(button(false).custom_id())
                .label(no)
                .style(ButtonStyle::Danger),
        ])
    }
}

/// Checks length, returns the trimmed name.
pub fn validate_clan_name(name: &str) -> std::result::Result<&str, String> {
    let name = name.trim();
    let length = name.chars().count();

    if !(MIN_NAME_LENGTH..=MAX_NAME_LENGTH).contains(&length) {
        return Err(format!(
            "Clan names must be between {MIN_NAME_LENGTH} and {MAX_NAME_LENGTH} characters."
        ));
    }

    Ok(name)
}

pub fn clan_channel_name(clan_name: &str) -> String {
    let slug = clan_name
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");

    format!("🛡️・{slug}")
}

pub fn member_overwrite(user: UserId) -> PermissionOverwrite {
    PermissionOverwrite {
        allow: Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES,
        deny: Permissions::empty(),
        kind: PermissionOverwriteType::Member(user),
    }
}

pub fn leader_overwrite(user: UserId) -> PermissionOverwrite {
    PermissionOverwrite {
        allow: Permissions::VIEW_CHANNEL
            | Permissions::SEND_MESSAGES
            | Permissions::MENTION_EVERYONE,
        deny: Permissions::empty(),
        kind: PermissionOverwriteType::Member(user),
    }
}

/// Lets `user` into the clan channel and gives them the clan role.
///
/// The role is best-effort, the bot may sit below the member in the role list.
pub async fn grant_access(http: &Http, clan: &Clan, user: UserId) -> Result<()> {
    clan.channel()
        .create_permission(http, member_overwrite(user))
        .await
        .wrap_err("Failed to open the clan channel for the member")?;

    if let Some(role) = clan.role() {
        http.add_member_role(clan.guild(), user, role, Some("Joined clan"))
            .await
            .trace_warn_ok("granting the clan role");
    }

    Ok(())
}

pub async fn revoke_access(http: &Http, clan: &Clan, user: UserId) -> Result<()> {
    clan.channel()
        .delete_permission(http, PermissionOverwriteType::Member(user))
        .await
        .wrap_err("Failed to close the clan channel for the member")?;

    if let Some(role) = clan.role() {
        http.remove_member_role(clan.guild(), user, role, Some("Left clan"))
            .await
            .trace_warn_ok("removing the clan role");
    }

    Ok(())
}

/// Writes to the server's clan log, if it has one.
pub async fn clan_log(
    ctx: impl CacheHttp,
    data: &State,
    guild_id: GuildId,
    title: &str,
    description: String,
    colour: Colour,
) -> Result<()> {
    let Some(channel) = data.settings.get_id(guild_id, keys::CLAN_LOG_CHANNEL)? else {
        return Ok(());
    };

    let embed = CreateEmbed::new()
        .title(title)
        .description(description)
        .colour(colour)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new("Clan System Log"));

    ChannelId::new(channel)
        .send_message(ctx, CreateMessage::new().embed(embed))
        .await
        .wrap_err("Failed to write the clan log")?;

    Ok(())
}

/// The clan whose channel the command runs in. Tells the user when there is none.
async fn clan_of_channel(ctx: PoiseContext<'_>) -> Result<Option<Clan>> {
    let clan = ctx.data().clans.get(ctx.channel_id())?;

    if clan.is_none() {
        refuse(ctx, "Run this inside your clan channel.").await?;
    }

    Ok(clan)
}

async fn actor(ctx: PoiseContext<'_>) -> Actor {
    Actor {
        user_id: ctx.author().id,
        is_admin: super::author_is_admin(ctx).await,
    }
}

async fn refuse(ctx: PoiseContext<'_>, reason: impl std::fmt::Display) -> Result<()> {
    ctx.reply_ephemeral(format!("❌ {reason}")).await
}

async fn refuse_transition(ctx: PoiseContext<'_>, refusal: ClanRefusal) -> Result<()> {
    tracing::debug!("Refused /{}: {:?}", ctx.command().qualified_name, refusal);
    refuse(ctx, refusal).await
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn custom_ids_carry_the_request() {
        let button = ClanButton {
            flow: ClanFlow::Application,
            approve: false,
            request_id: 42,
        };

        assert_eq!(button.custom_id(), "clan_app:deny:42");
        assert_eq!(ClanButton::parse("clan_app:deny:42"), Some(button));
        assert_eq!(
            ClanButton::parse("clan_req:approve:7"),
            Some(ClanButton {
                flow: ClanFlow::Creation,
                approve: true,
                request_id: 7,
            })
        );
        assert_eq!(
            ClanButton::parse("clan_xfer:decline:9").map(|b| (b.flow, b.approve)),
            Some((ClanFlow::Transfer, false))
        );
    }

    #[test]
    fn foreign_custom_ids_are_ignored() {
        assert_eq!(ClanButton::parse("clan_req:approve"), None);
        assert_eq!(ClanButton::parse("clan_req:deny:1"), None);
        assert_eq!(ClanButton::parse("clan_app:accept:abc"), None);
        assert_eq!(ClanButton::parse("help_menu"), None);
    }

    #[test]
    fn names_are_length_checked() {
        assert_eq!(validate_clan_name("  Night Owls "), Ok("Night Owls"));
        assert!(validate_clan_name("a").is_err());
        assert!(validate_clan_name(&"x".repeat(33)).is_err());
        assert!(validate_clan_name(&"x".repeat(32)).is_ok());
    }

    #[test]
    fn channel_names_are_slugged() {
        assert_eq!(clan_channel_name("Night  Owls"), "🛡️・night-owls");
    }
}
