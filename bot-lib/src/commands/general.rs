use crate::{afk::afk_nickname, data::PoiseContext, utils::clip};
use bot_traits::ForwardRefToTracing;
use color_eyre::eyre::{ContextCompat, Result};
use itertools::Itertools;
use poise::{
    CreateReply,
    serenity_prelude::{Colour, CreateEmbed, EditMember, Mentionable},
};
use rand::{Rng, seq::SliceRandom};

/// Names separated by commas, or by spaces when there are no commas.
fn parse_names(input: &str) -> Vec<String> {
    let names: Box<dyn Iterator<Item = &str>> = if input.contains(',') {
        Box::new(input.split(','))
    } else {
        Box::new(input.split_whitespace())
    };

    names
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Shuffles and halves the names. `None` when there aren't enough for two teams.
fn split_into_teams(
    mut names: Vec<String>,
    rng: &mut impl Rng,
) -> Option<(Vec<String>, Vec<String>)> {
    if names.len() < 2 {
        return None;
    }

    names.shuffle(rng);
    let second = names.split_off(names.len().div_ceil(2));

    Some((names, second))
}

/// Embed field values are capped at 1024 characters.
fn team_field(team: &[String]) -> String {
    clip(&team.iter().map(|name| format!("• {name}")).join("\n"), 1024)
}

/// Split people into two random teams
#[poise::command(slash_command, prefix_command)]
pub async fn teams(
    ctx: PoiseContext<'_>,
    #[description = "Names separated by commas or spaces"]
    #[rest]
    names: String,
) -> Result<()> {
    let teams = split_into_teams(parse_names(&names), &mut rand::rng());

    let Some((red, blue)) = teams else {
        ctx.say("❌ I need at least two names to make teams.").await?;
        return Ok(());
    };

    let embed = CreateEmbed::new()
        .title("⚔️ Teams")
        .colour(Colour::BLURPLE)
        .field(format!("🔴 Red ({})", red.len()), team_field(&red), true)
        .field(format!("🔵 Blue ({})", blue.len()), team_field(&blue), true);

    ctx.send(CreateReply::default().embed(embed)).await?;

    Ok(())
}

/// Let people know you're away
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn afk(
    ctx: PoiseContext<'_>,
    #[description = "Why you're away"]
    #[rest]
    reason: Option<String>,
) -> Result<()> {
    let guild_id = ctx.guild_id().wrap_err("No guild ID?")?;
    let author = ctx.author();
    let reason = reason.unwrap_or_else(|| "AFK".to_owned());

    ctx.data().afk.set(guild_id, author.id, reason.clone());

    let display_name = ctx
        .author_member()
        .await
        .map(|member| member.display_name().to_owned())
        .unwrap_or_else(|| author.name.clone());

    if let Some(nickname) = afk_nickname(&display_name) {
        guild_id
            .edit_member(ctx, author.id, EditMember::new().nickname(nickname))
            .await
            .trace_warn_ok("setting the AFK nickname");
    }

    tracing::debug!("{} went AFK: {}", author.name, reason);

    ctx.say(format!("💤 {} is now AFK: {reason}", author.mention()))
        .await?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};
    use std::collections::HashSet;

    #[test]
    fn names_split_on_commas_first() {
        assert_eq!(
            parse_names("Pika, Ash, Misty, Brock"),
            vec!["Pika", "Ash", "Misty", "Brock"]
        );
        assert_eq!(parse_names("Ash Misty  Brock"), vec!["Ash", "Misty", "Brock"]);
        assert_eq!(parse_names("Mr Mime, Ash,,"), vec!["Mr Mime", "Ash"]);
    }

    #[test]
    fn teams_are_balanced_and_disjoint() {
        let names = parse_names("Pika, Ash, Misty, Brock");

        for seed in 0..20 {
            let (red, blue) =
                split_into_teams(names.clone(), &mut StdRng::seed_from_u64(seed)).unwrap();

            let red_set = red.iter().collect::<HashSet<_>>();
            let blue_set = blue.iter().collect::<HashSet<_>>();

            assert!(red_set.is_disjoint(&blue_set));
            assert_eq!(
                red_set.union(&blue_set).count(),
                names.len(),
                "every name lands in a team"
            );
            assert!(red.len().abs_diff(blue.len()) <= 1);
        }
    }

    #[test]
    fn odd_teams_differ_by_one() {
        let (red, blue) = split_into_teams(
            parse_names("a b c d e"),
            &mut StdRng::seed_from_u64(1),
        )
        .unwrap();

        assert_eq!((red.len(), blue.len()), (3, 2));
    }

    #[test]
    fn long_teams_fit_in_a_field() {
        let names = (0..400).map(|i| format!("player{i}")).collect::<Vec<_>>();
        let field = team_field(&names);

        assert_eq!(field.chars().count(), 1024);
        assert!(field.starts_with("• player0\n"));
        assert_eq!(team_field(&names[..2]), "• player0\n• player1");
    }

    #[test]
    fn one_name_is_not_enough() {
        assert_eq!(
            split_into_teams(parse_names("Pika"), &mut StdRng::seed_from_u64(0)),
            None
        );
        assert_eq!(
            split_into_teams(Vec::new(), &mut StdRng::seed_from_u64(0)),
            None
        );
    }
}
