use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::roles::apply_level_change;
use crate::types::{BotState, Error};

pub async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Arc<BotState>, Error>,
    data: &Arc<BotState>,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Ready { data_about_bot } => {
            info!(user = data_about_bot.user.name.as_str(), "connected to gateway");
        }
        serenity::FullEvent::Message { new_message } => {
            handle_message(ctx, data, new_message).await;
        }
        _ => {}
    }
    Ok(())
}

/// Every non-bot message in the configured guild is an xp opportunity;
/// the leveling service's cooldown decides whether it counts.
async fn handle_message(
    ctx: &serenity::Context,
    data: &Arc<BotState>,
    message: &serenity::Message,
) {
    if message.author.bot || message.guild_id != Some(data.config.guild_id) {
        return;
    }

    match data.leveling.grant_message_xp(message.author.id).await {
        Ok(Some(outcome)) => {
            if let Some(level_up) = outcome.level_up {
                info!(
                    user = %message.author.id,
                    level = level_up.new_level,
                    "user leveled up"
                );
                apply_level_change(
                    ctx,
                    data,
                    message.author.id,
                    level_up.old_level,
                    level_up.new_level,
                )
                .await;
            }
        }
        Ok(None) => {} // on cooldown
        Err(err) => warn!(user = %message.author.id, error = %err, "failed to stage xp grant"),
    }
}

/// Top-level command error hook: log the detail, tell the user only
/// that something broke, keep the process running.
pub async fn on_error(error: poise::FrameworkError<'_, Arc<BotState>, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!(
                command = ctx.command().name.as_str(),
                error = %error,
                "command failed"
            );
            let _ = ctx
                .send(
                    poise::CreateReply::default()
                        .content("Something went wrong running that command.")
                        .ephemeral(true),
                )
                .await;
        }
        other => {
            if let Err(err) = poise::builtins::on_error(other).await {
                error!(error = %err, "error while reporting a framework error");
            }
        }
    }
}
