use bot_lib::{
    commands::{
        clans::{
            manage::{
                clan_info, clan_kick, clan_list, disband_clan, leave_clan, transfer_ownership,
            },
            requests::{apply_clan, create_clan, setup_clan_system},
        },
        general::{afk, teams},
        help::help,
        moderation::{ban, kick, purge, timeout, untimeout},
        owner::owner,
        setup::setup,
        status::{setup_status, status},
        sync::sync,
    },
    config,
    data::{RawAppState, State},
    error::on_error,
    event_handler::event_handler,
    operator::{announce_shutdown, status_updater},
};
use bot_traits::ForwardRefToTracing;
use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use dotenvy::dotenv;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing_subscriber::util::SubscriberInitExt;

/// The cli arguments for the bot
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Don't start the discord bot
    #[arg(short, long, default_value = "false")]
    pub dry_run: bool,

    /// Path to the config file
    #[arg(short, long, default_value_t = String::from("config.toml"))]
    pub config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().wrap_err("Failed to load .env file. Add a file with the following contents: `DISCORD_TOKEN=\"your token\"` to a .env file in the root directory of the repo.")?;
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .finish()
        .init();

    let Args {
        dry_run,
        config: config_path,
    } = Args::parse();
    let token =
        std::env::var("DISCORD_TOKEN").wrap_err("Expected a discord token environment variable")?;
    let config =
        config::Config::create_from_file(&config_path).wrap_err("Failed to load config")?;

    let dev_guild = config.dev_guild();
    let state: State = Arc::new(RawAppState::new(config, config_path)?);

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                setup_clan_system(),
                create_clan(),
                apply_clan(),
                leave_clan(),
                clan_kick(),
                transfer_ownership(),
                disband_clan(),
                clan_info(),
                clan_list(),
                kick(),
                ban(),
                timeout(),
                untimeout(),
                purge(),
                setup(),
                owner(),
                status(),
                setup_status(),
                teams(),
                afk(),
                help(),
                sync(),
            ],
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some("!".into()),
                ..Default::default()
            },
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup({
            let state = Arc::clone(&state);

            move |ctx, _ready, framework| {
                Box::pin(async move {
                    let commands = &framework.options().commands;

                    match dev_guild {
                        Some(guild_id) => {
                            poise::builtins::register_in_guild(ctx, commands, guild_id).await?
                        }
                        None => poise::builtins::register_globally(ctx, commands).await?,
                    }

                    tokio::spawn(status_updater(
                        ctx.clone(),
                        Arc::clone(&state),
                        framework.shard_manager().clone(),
                    ));

                    Ok(state)
                })
            }
        });

    let mut client = serenity::ClientBuilder::new(
        token,
        serenity::GatewayIntents::non_privileged()
            | serenity::GatewayIntents::MESSAGE_CONTENT
            | serenity::GatewayIntents::GUILD_MEMBERS
            | serenity::GatewayIntents::GUILD_PRESENCES,
    )
    .framework(framework.build())
    .await
    .wrap_err("Failed to start bot (serenity)")?;

    if dry_run {
        println!("Bot setup worked, dry run enabled, exiting");
        return Ok(());
    }

    {
        let shard_manager = client.shard_manager.clone();
        let http = Arc::clone(&client.http);
        let state = Arc::clone(&state);

        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for ctrl-c: {:?}", e);
                return;
            }

            tracing::info!("Shutting down");
            announce_shutdown(&*http, &state).await.trace_err_ok();
            state.db.flush().trace_err_ok();
            shard_manager.shutdown_all().await;
        });
    }

    tracing::info!("Starting bot");

    client
        .start()
        .await
        .wrap_err("Failed to start bot (startup)")
}
