use crate::data::State;
use bot_db::settings::keys;
use color_eyre::eyre::{Result, WrapErr};
use poise::serenity_prelude::{
    self as serenity, ChannelId, Colour, CreateEmbed, CreateEmbedAuthor, CreateEmbedFooter,
    CreateMessage, Mentionable,
};

const WELCOME_COLOUR: Colour = Colour(0x2b2d31);

/// Mention of the first candidate the server has, else the first name as plain text.
fn channel_link(candidates: &[String], channels: &[(ChannelId, String)]) -> String {
    candidates
        .iter()
        .find_map(|candidate| {
            channels
                .iter()
                .find(|(_, name)| name == candidate)
                .map(|(id, _)| id.mention().to_string())
        })
        .unwrap_or_else(|| {
            format!(
                "#{}",
                candidates.first().map(String::as_str).unwrap_or("general")
            )
        })
}

pub async fn greet_member(
    ctx: &serenity::Context,
    data: &State,
    member: &serenity::Member,
) -> Result<()> {
    let guild_id = member.guild_id;

    let Some(channel_id) = data.settings.get_id(guild_id, keys::WELCOME_CHANNEL)? else {
        return Ok(());
    };

    let (guild_name, member_count, channels) = match ctx.cache.guild(guild_id) {
        Some(guild) => (
            guild.name.clone(),
            guild.member_count,
            guild
                .channels
                .values()
                .map(|channel| (channel.id, channel.name.clone()))
                .collect::<Vec<_>>(),
        ),
        None => ("the server".to_owned(), 0, Vec::new()),
    };

    let welcome = data.config.read().await.welcome.clone();

    let rules = channel_link(&welcome.rules_channels, &channels);
    let news = channel_link(&welcome.news_channels, &channels);
    let minecraft = channel_link(&welcome.minecraft_channels, &channels);
    let steam = channel_link(&welcome.steam_channels, &channels);

    let embed = CreateEmbed::new()
        .author(
            CreateEmbedAuthor::new(format!(
                "Welcome to {guild_name}, {}!",
                member.user.name
            ))
            .icon_url(member.face()),
        )
        .description(format!(
            "We're absolutely **thrilled** to have you join the **{guild_name} gaming community!** 🎉\n\n\
             We are dedicated to providing a fun, high-performance gaming experience for everyone.\n\n\
             *Dive in, explore, and **most importantly** have fun!*"
        ))
        .colour(WELCOME_COLOUR)
        .thumbnail(member.face())
        .field(
            "🚀 Get Started",
            format!("📜 **Rules:** {rules}\n📢 **News:** {news}"),
            false,
        )
        .field(
            "🎮 Gaming Zones",
            format!("⛏️ **Minecraft:** {minecraft}\n🚂 **Steam Codes:** {steam}"),
            false,
        )
        .field(
            "📺 Support Us",
            format!("[Subscribe to our YouTube Channel!]({})", welcome.support_url),
            false,
        )
        .footer(CreateEmbedFooter::new(format!(
            "{guild_name} • Member #{member_count}"
        )));

    ChannelId::new(channel_id)
        .send_message(
            ctx,
            CreateMessage::new()
                .content(format!("Welcome {}! 👋", member.mention()))
                .embed(embed),
        )
        .await
        .wrap_err("Failed to send welcome message")?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn links_first_existing_candidate() {
        let channels = vec![
            (ChannelId::new(10), "news".to_owned()),
            (ChannelId::new(11), "announcements".to_owned()),
        ];

        assert_eq!(
            channel_link(&names(&["updates", "news", "announcements"]), &channels),
            "<#10>"
        );
    }

    #[test]
    fn falls_back_to_plain_text() {
        assert_eq!(
            channel_link(&names(&["rules", "info"]), &[]),
            "#rules"
        );
        assert_eq!(channel_link(&[], &[]), "#general");
    }
}
