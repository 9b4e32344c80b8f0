use poise::serenity_prelude as serenity;
use tracing::{info, warn};

use crate::cache::DocCache;
use crate::curve::{MAX_LEVEL, MIN_LEVEL};
use crate::types::{BotState, Error, ROLES_DOC, RolesDoc};

/// Role colour per level tier, matching the ladder's look: grey up to
/// 20, then green, blue, purple, and gold for the top bracket.
pub fn level_colour(level: u32) -> u32 {
    match level {
        ..=20 => 0x95A5A6,
        21..=40 => 0x57F287,
        41..=60 => 0x3498DB,
        61..=80 => 0x9B59B6,
        _ => 0xF1C40F,
    }
}

fn role_id(roles: &RolesDoc, level: u32) -> Option<serenity::RoleId> {
    roles
        .get(&level.to_string())
        .and_then(|id| id.parse::<u64>().ok())
        .map(serenity::RoleId::new)
}

/// Creates any `LEVEL <n>` guild roles missing from `roles.json` and
/// records their ids. Idempotent; runs once at startup. Roles are never
/// deleted. A single failed creation is skipped, not fatal.
pub async fn ensure_level_roles(
    ctx: &serenity::Context,
    guild: serenity::GuildId,
    cache: &DocCache,
) -> Result<(), Error> {
    let mut roles: RolesDoc = cache.get_as(ROLES_DOC).await;
    let mut created = 0u32;

    for level in MIN_LEVEL..=MAX_LEVEL {
        if roles.contains_key(&level.to_string()) {
            continue;
        }
        let builder = serenity::EditRole::new()
            .name(format!("LEVEL {level}"))
            .colour(level_colour(level));
        match guild.create_role(ctx, builder).await {
            Ok(role) => {
                roles.insert(level.to_string(), role.id.to_string());
                created += 1;
            }
            Err(err) => warn!(level, error = %err, "failed to create level role"),
        }
    }

    if created > 0 {
        info!(created, "created missing level roles");
        cache.put_as(ROLES_DOC, &roles).await?;
    }
    Ok(())
}

/// Moves a member onto the role for their new level: strips the level
/// roles they hold up to the old level, adds the new one, and announces
/// the change when it was an increase. Every platform call in here is
/// non-critical — failures are logged and the rest of the sync carries
/// on, and the xp update this follows has already been persisted.
pub async fn apply_level_change(
    ctx: &serenity::Context,
    state: &BotState,
    user_id: serenity::UserId,
    old_level: u32,
    new_level: u32,
) {
    let roles: RolesDoc = state.cache.get_as(ROLES_DOC).await;
    let guild = state.config.guild_id;

    let member = match guild.member(ctx, user_id).await {
        Ok(member) => member,
        Err(err) => {
            warn!(user = %user_id, error = %err, "member fetch failed, skipping role sync");
            return;
        }
    };

    for level in MIN_LEVEL..=old_level {
        let Some(role) = role_id(&roles, level) else {
            continue;
        };
        if member.roles.contains(&role) {
            if let Err(err) = member.remove_role(ctx, role).await {
                warn!(user = %user_id, level, error = %err, "failed to remove level role");
            }
        }
    }

    match role_id(&roles, new_level) {
        Some(role) => {
            if let Err(err) = member.add_role(ctx, role).await {
                warn!(user = %user_id, level = new_level, error = %err, "failed to add level role");
            }
        }
        None => warn!(level = new_level, "no role recorded for level"),
    }

    if new_level > old_level {
        announce_level_up(ctx, state, &member, new_level).await;
    }
}

async fn announce_level_up(
    ctx: &serenity::Context,
    state: &BotState,
    member: &serenity::Member,
    new_level: u32,
) {
    if state.config.level_up_channels.is_empty() {
        return;
    }
    let embed = serenity::CreateEmbed::new()
        .title("🎉 LEVEL UP!")
        .description(format!("{} reached **LEVEL {new_level}**!", member))
        .colour(0x57F287)
        .thumbnail(member.face())
        .timestamp(serenity::Timestamp::now());

    for channel in &state.config.level_up_channels {
        let message = serenity::CreateMessage::new().embed(embed.clone());
        if let Err(err) = channel.send_message(ctx, message).await {
            warn!(channel = %channel, error = %err, "failed to post level-up announcement");
        }
    }
}
