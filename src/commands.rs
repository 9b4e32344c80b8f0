use poise::serenity_prelude as serenity;

use crate::curve::{MAX_LEVEL, xp_for_level};
use crate::leveling::AdjustMode;
use crate::roles::{apply_level_change, level_colour};
use crate::types::{Context, Error};

// --- Helpers ---

/// Admins are members with the Administrator permission or one of the
/// configured admin roles. Replies with a short refusal when the check
/// fails so callers can just return.
async fn ensure_admin(ctx: &Context<'_>) -> Result<bool, Error> {
    let allowed = match ctx.author_member().await {
        Some(member) => {
            member.permissions.is_some_and(|p| p.administrator())
                || member
                    .roles
                    .iter()
                    .any(|role| ctx.data().config.admin_roles.contains(role))
        }
        None => false,
    };
    if !allowed {
        ctx.send(
            poise::CreateReply::default()
                .content("❌ You don't have permission to use this command.")
                .ephemeral(true),
        )
        .await?;
    }
    Ok(allowed)
}

/// 20-cell progress bar, e.g. `[████░░░░░░░░░░░░░░░░]` at 20%.
fn progress_bar(percentage: u64) -> String {
    const CELLS: u64 = 20;
    let filled = (percentage.min(100) * CELLS / 100) as usize;
    format!(
        "[{}{}]",
        "█".repeat(filled),
        "░".repeat(CELLS as usize - filled)
    )
}

fn mode_verb(mode: AdjustMode) -> &'static str {
    match mode {
        AdjustMode::Add => "Added",
        AdjustMode::Remove => "Removed",
        AdjustMode::Set => "Set",
    }
}

async fn display_name(ctx: &Context<'_>, user_id: &str) -> String {
    let Ok(id) = user_id.parse::<u64>() else {
        return "Unknown user".to_string();
    };
    match serenity::UserId::new(id).to_user(ctx).await {
        Ok(user) => user
            .global_name
            .as_deref()
            .unwrap_or(&user.name)
            .to_string(),
        Err(_) => "Unknown user".to_string(),
    }
}

// --- Commands ---

/// Show a user's xp, level and ranking
#[poise::command(slash_command, guild_only)]
pub async fn xp(
    ctx: Context<'_>,
    #[description = "User to look up (defaults to you)"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let target = user.unwrap_or_else(|| ctx.author().clone());
    let state = ctx.data();

    let Some(record) = state.leveling.user_record(target.id).await else {
        let message = if target.id == ctx.author().id {
            "You don't have any xp yet — send a few messages first!".to_string()
        } else {
            format!("{} doesn't have any xp yet.", target.name)
        };
        ctx.send(
            poise::CreateReply::default()
                .content(message)
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    };

    let standings = state.leveling.standings().await;
    let rank = standings
        .iter()
        .position(|(id, _)| *id == target.id.to_string())
        .map(|index| index + 1)
        .unwrap_or(standings.len());

    let progress_field = if record.level >= MAX_LEVEL {
        format!("{}\nMaxed out at **LEVEL {MAX_LEVEL}**!", progress_bar(100))
    } else {
        let floor = xp_for_level(record.level);
        let next = xp_for_level(record.level + 1);
        let span = next - floor;
        let into_level = record.xp.saturating_sub(floor).min(span);
        let percentage = into_level * 100 / span;
        format!(
            "{}\n**{into_level}** / **{span}** XP ({percentage}%)\n**{}** XP to **LEVEL {}**",
            progress_bar(percentage),
            next.saturating_sub(record.xp),
            record.level + 1,
        )
    };

    let embed = serenity::CreateEmbed::new()
        .title("📊 XP")
        .description(format!("**{}**", target.name))
        .field("🏆 Level", format!("**{}**", record.level), true)
        .field("⚡ Total XP", format!("**{}**", record.xp), true)
        .field("📈 Rank", format!("**#{rank}**"), true)
        .field("🎯 Progress", progress_field, false)
        .colour(level_colour(record.level))
        .thumbnail(target.face())
        .timestamp(serenity::Timestamp::now());

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Show the top 10 users by xp
#[poise::command(slash_command, guild_only)]
pub async fn ranking(ctx: Context<'_>) -> Result<(), Error> {
    let standings = ctx.data().leveling.standings().await;
    if standings.is_empty() {
        ctx.send(
            poise::CreateReply::default()
                .content("Nobody is on the board yet!")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    ctx.defer().await?;
    let medals = ["🥇", "🥈", "🥉"];
    let mut lines = Vec::new();
    for (index, (user_id, record)) in standings.iter().take(10).enumerate() {
        let place = medals
            .get(index)
            .map(|m| m.to_string())
            .unwrap_or_else(|| format!("**{}.**", index + 1));
        let name = display_name(&ctx, user_id).await;
        lines.push(format!(
            "{place} {name}\n📊 Level **{}** • ⚡ **{}** XP",
            record.level, record.xp
        ));
    }

    let embed = serenity::CreateEmbed::new()
        .title("🏆 Level Ranking")
        .description(lines.join("\n\n"))
        .colour(0xF1C40F)
        .footer(serenity::CreateEmbedFooter::new(format!(
            "Top {} users",
            lines.len()
        )))
        .timestamp(serenity::Timestamp::now());

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Adjust a user's xp (admins only)
#[poise::command(slash_command, guild_only, rename = "xp-control")]
pub async fn xp_control(
    ctx: Context<'_>,
    #[description = "User to modify"] user: serenity::User,
    #[description = "What to do"] mode: AdjustMode,
    #[description = "Amount of xp"]
    #[min = 0]
    amount: u64,
) -> Result<(), Error> {
    if !ensure_admin(&ctx).await? {
        return Ok(());
    }
    let state = ctx.data();
    let adjustment = state.leveling.adjust_xp(user.id, mode, amount).await?;

    if adjustment.level_changed() {
        apply_level_change(
            ctx.serenity_context(),
            state,
            user.id,
            adjustment.old_level,
            adjustment.record.level,
        )
        .await;
    }

    let embed = serenity::CreateEmbed::new()
        .title("⚙️ XP adjusted")
        .field("👤 User", user.to_string(), true)
        .field("🔧 Action", mode_verb(mode), true)
        .field("⚡ Amount", amount.to_string(), true)
        .field("📊 XP", format!("{} → {}", adjustment.old_xp, adjustment.record.xp), true)
        .field(
            "🏆 Level",
            format!("{} → {}", adjustment.old_level, adjustment.record.level),
            true,
        )
        .colour(0x57F287)
        .timestamp(serenity::Timestamp::now());
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Adjust a user's level (admins only)
#[poise::command(slash_command, guild_only, rename = "level-control")]
pub async fn level_control(
    ctx: Context<'_>,
    #[description = "User to modify"] user: serenity::User,
    #[description = "What to do"] mode: AdjustMode,
    #[description = "Number of levels"]
    #[min = 1]
    #[max = 100]
    amount: u32,
) -> Result<(), Error> {
    if !ensure_admin(&ctx).await? {
        return Ok(());
    }
    let state = ctx.data();
    let adjustment = state.leveling.adjust_level(user.id, mode, amount).await?;

    if adjustment.level_changed() {
        apply_level_change(
            ctx.serenity_context(),
            state,
            user.id,
            adjustment.old_level,
            adjustment.record.level,
        )
        .await;
    }

    let embed = serenity::CreateEmbed::new()
        .title("⚙️ Level adjusted")
        .field("👤 User", user.to_string(), true)
        .field("🔧 Action", mode_verb(mode), true)
        .field("📊 Amount", amount.to_string(), true)
        .field(
            "🏆 Level",
            format!("{} → {}", adjustment.old_level, adjustment.record.level),
            true,
        )
        .field("⚡ XP", adjustment.record.xp.to_string(), true)
        .colour(0xFEE75C)
        .timestamp(serenity::Timestamp::now());
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn progress_bar_fills_proportionally() {
        assert_eq!(progress_bar(0), format!("[{}]", "░".repeat(20)));
        assert_eq!(progress_bar(100), format!("[{}]", "█".repeat(20)));
        assert_eq!(progress_bar(50), format!("[{}{}]", "█".repeat(10), "░".repeat(10)));
        // Over-100 inputs clamp instead of overflowing the bar.
        assert_eq!(progress_bar(250), progress_bar(100));
    }
}
