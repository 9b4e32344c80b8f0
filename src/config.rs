use anyhow::{Context as _, bail};
use poise::serenity_prelude as serenity;
use std::env;

/// Runtime configuration, read once at startup from the environment
/// (`.env` supported via dotenv).
#[derive(Clone, Debug)]
pub struct Config {
    pub discord_token: String,
    pub github_token: String,
    pub github_owner: String,
    pub github_repo: String,
    pub guild_id: serenity::GuildId,
    /// Channels that receive level-up announcements. May be empty.
    pub level_up_channels: Vec<serenity::ChannelId>,
    /// Roles allowed to use the admin commands, in addition to members
    /// with the Administrator permission. May be empty.
    pub admin_roles: Vec<serenity::RoleId>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let discord_token = env::var("DISCORD_TOKEN").context("missing DISCORD_TOKEN")?;
        let github_token = env::var("GITHUB_TOKEN").context("missing GITHUB_TOKEN")?;

        let repo = env::var("GITHUB_REPO").context("missing GITHUB_REPO (owner/name)")?;
        let Some((owner, name)) = repo.split_once('/') else {
            bail!("GITHUB_REPO must be in owner/name form, got {repo:?}");
        };
        if owner.is_empty() || name.is_empty() {
            bail!("GITHUB_REPO must be in owner/name form, got {repo:?}");
        }

        let guild_id = env::var("GUILD_ID")
            .context("missing GUILD_ID")?
            .parse::<u64>()
            .context("GUILD_ID must be a numeric id")?;

        Ok(Self {
            discord_token,
            github_token,
            github_owner: owner.to_string(),
            github_repo: name.to_string(),
            guild_id: serenity::GuildId::new(guild_id),
            level_up_channels: parse_id_list(&env::var("LEVEL_UP_CHANNELS").unwrap_or_default())
                .into_iter()
                .map(serenity::ChannelId::new)
                .collect(),
            admin_roles: parse_id_list(&env::var("ADMIN_ROLES").unwrap_or_default())
                .into_iter()
                .map(serenity::RoleId::new)
                .collect(),
        })
    }
}

/// Parses a comma-separated id list, skipping blanks and junk.
fn parse_id_list(raw: &str) -> Vec<u64> {
    raw.split(',')
        .filter_map(|part| part.trim().parse::<u64>().ok())
        .collect()
}
