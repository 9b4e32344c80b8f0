use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::DocCache;
use crate::config::Config;
use crate::leveling::Leveling;

/// Remote document holding every user's progression, keyed by Discord
/// user id (stringified, as it appears on the wire).
pub const USERS_DOC: &str = "users.json";

/// Remote document mapping level number to the guild role id for that
/// level, both stringified.
pub const ROLES_DOC: &str = "roles.json";

/// One user's progression. `level` is denormalized from `xp` so the two
/// admin controls can move independently; normal message grants keep
/// them in sync.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub xp: u64,
    #[serde(default = "default_level")]
    pub level: u32,
}

fn default_level() -> u32 {
    crate::curve::MIN_LEVEL
}

impl Default for UserRecord {
    fn default() -> Self {
        Self { xp: 0, level: default_level() }
    }
}

/// In-memory shape of `users.json`.
pub type UsersDoc = BTreeMap<String, UserRecord>;

/// In-memory shape of `roles.json`. Keys are level numbers as strings
/// (JSON object keys); values are role ids as strings.
pub type RolesDoc = BTreeMap<String, String>;

pub struct BotState {
    pub config: Config,
    pub cache: Arc<DocCache>,
    pub leveling: Leveling,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Arc<BotState>, Error>;
