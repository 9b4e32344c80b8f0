mod cache;
mod commands;
mod config;
mod curve;
mod handler;
mod leveling;
mod roles;
mod store;
mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use dotenv::dotenv;
use octocrab::Octocrab;
use poise::serenity_prelude as serenity;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cache::{DocCache, spawn_flusher};
use crate::config::Config;
use crate::leveling::Leveling;
use crate::store::GithubStore;
use crate::types::BotState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let octocrab = Octocrab::builder()
        .personal_token(config.github_token.clone())
        .build()
        .context("failed to build github client")?;
    let store = Arc::new(GithubStore::new(
        octocrab,
        config.github_owner.clone(),
        config.github_repo.clone(),
    ));
    let cache = Arc::new(DocCache::new(store));
    let leveling = Leveling::new(cache.clone());
    let state = Arc::new(BotState {
        config: config.clone(),
        cache: cache.clone(),
        leveling,
    });

    let flusher = spawn_flusher(cache.clone());

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                commands::xp(),
                commands::ranking(),
                commands::xp_control(),
                commands::level_control(),
            ],
            event_handler: |ctx, event, framework, data| {
                Box::pin(handler::event_handler(ctx, event, framework, data))
            },
            on_error: |error| Box::pin(handler::on_error(error)),
            ..Default::default()
        })
        .setup({
            let state = state.clone();
            move |ctx, _ready, framework| {
                Box::pin(async move {
                    poise::builtins::register_in_guild(
                        ctx,
                        &framework.options().commands,
                        state.config.guild_id,
                    )
                    .await?;
                    info!(guild = %state.config.guild_id, "commands registered");

                    roles::ensure_level_roles(ctx, state.config.guild_id, &state.cache).await?;
                    spawn_status_rotation(ctx.clone());
                    Ok(state)
                })
            }
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MEMBERS;
    let mut client = serenity::ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .await
        .context("failed to build discord client")?;

    tokio::select! {
        result = client.start() => {
            result.context("discord client stopped")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    // Block exit on one last flush so a clean stop loses no staged xp.
    flusher.abort();
    cache.flush_all().await;
    info!("final flush complete, exiting");
    Ok(())
}

fn spawn_status_rotation(ctx: serenity::Context) {
    const ACTIVITIES: [&str; 5] = [
        "🎮 xp roll in",
        "⚡ the level ladder",
        "🏆 the ranking shuffle",
        "📊 the stats tick over",
        "🚀 users level up",
    ];
    const ROTATION: Duration = Duration::from_secs(12);

    tokio::spawn(async move {
        let mut index = 0;
        loop {
            ctx.set_activity(Some(serenity::ActivityData::watching(ACTIVITIES[index])));
            index = (index + 1) % ACTIVITIES.len();
            tokio::time::sleep(ROTATION).await;
        }
    });
}
