use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use poise::serenity_prelude as serenity;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::cache::DocCache;
use crate::curve::{MAX_LEVEL, MIN_LEVEL, level_from_xp, xp_for_level};
use crate::types::{USERS_DOC, UserRecord, UsersDoc};

/// Minimum gap between two xp grants for the same user. Advisory only:
/// the map is in-memory and resets with the process.
const MESSAGE_COOLDOWN: Duration = Duration::from_secs(60);

/// Bounds of the random xp gain per eligible message, inclusive.
const XP_GAIN_MIN: u64 = 5;
const XP_GAIN_MAX: u64 = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, poise::ChoiceParameter)]
pub enum AdjustMode {
    #[name = "Add"]
    Add,
    #[name = "Remove"]
    Remove,
    #[name = "Set"]
    Set,
}

/// A level increase produced by an xp grant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelUp {
    pub old_level: u32,
    pub new_level: u32,
}

/// What a message grant did, so the caller can drive the role-sync and
/// announcement side effects explicitly.
#[derive(Clone, Debug)]
pub struct GrantOutcome {
    pub gained: u64,
    pub record: UserRecord,
    pub level_up: Option<LevelUp>,
}

/// Before/after view of an admin adjustment.
#[derive(Clone, Debug)]
pub struct Adjustment {
    pub old_xp: u64,
    pub old_level: u32,
    pub record: UserRecord,
}

impl Adjustment {
    pub fn level_changed(&self) -> bool {
        self.record.level != self.old_level
    }
}

/// Reads and updates user progression through the document cache. Owns
/// the per-user cooldown map; both maps live for the whole process and
/// are torn down by the shutdown flush in `main`.
pub struct Leveling {
    cache: Arc<DocCache>,
    cooldowns: Mutex<HashMap<serenity::UserId, Instant>>,
}

impl Leveling {
    pub fn new(cache: Arc<DocCache>) -> Self {
        Self {
            cache,
            cooldowns: Mutex::new(HashMap::new()),
        }
    }

    /// Grants a random xp amount for a message. Returns `None` while
    /// the user is on cooldown; that is the normal case, not an error.
    ///
    /// The stored level only ever moves up here. If an admin has pushed
    /// the level above what the xp warrants, message grants leave it
    /// alone until the xp catches up.
    pub async fn grant_message_xp(
        &self,
        user_id: serenity::UserId,
    ) -> Result<Option<GrantOutcome>, serde_json::Error> {
        {
            let mut cooldowns = self.cooldowns.lock().await;
            let now = Instant::now();
            if let Some(until) = cooldowns.get(&user_id) {
                if now < *until {
                    return Ok(None);
                }
            }
            cooldowns.insert(user_id, now + MESSAGE_COOLDOWN);
        }

        let mut users: UsersDoc = self.cache.get_as(USERS_DOC).await;
        let record = users.entry(user_id.to_string()).or_default();

        let gained = rand::thread_rng().gen_range(XP_GAIN_MIN..=XP_GAIN_MAX);
        record.xp = record.xp.saturating_add(gained);

        let old_level = record.level;
        let new_level = level_from_xp(record.xp);
        let level_up = if new_level > old_level {
            record.level = new_level;
            Some(LevelUp { old_level, new_level })
        } else {
            None
        };

        let outcome = GrantOutcome {
            gained,
            record: record.clone(),
            level_up,
        };
        self.cache.put_as(USERS_DOC, &users).await?;
        Ok(Some(outcome))
    }

    /// Admin xp adjustment. The level is recomputed from the new xp;
    /// the xp itself is never resynced from the level on this path.
    pub async fn adjust_xp(
        &self,
        user_id: serenity::UserId,
        mode: AdjustMode,
        amount: u64,
    ) -> Result<Adjustment, serde_json::Error> {
        let mut users: UsersDoc = self.cache.get_as(USERS_DOC).await;
        let record = users.entry(user_id.to_string()).or_default();
        let old_xp = record.xp;
        let old_level = record.level;

        record.xp = match mode {
            AdjustMode::Add => record.xp.saturating_add(amount),
            AdjustMode::Remove => record.xp.saturating_sub(amount),
            AdjustMode::Set => amount,
        };
        record.level = level_from_xp(record.xp);

        let adjustment = Adjustment {
            old_xp,
            old_level,
            record: record.clone(),
        };
        self.cache.put_as(USERS_DOC, &users).await?;
        Ok(adjustment)
    }

    /// Admin level adjustment. Unlike the xp path, the stored xp is
    /// re-synced to exactly the new level's threshold.
    pub async fn adjust_level(
        &self,
        user_id: serenity::UserId,
        mode: AdjustMode,
        amount: u32,
    ) -> Result<Adjustment, serde_json::Error> {
        let mut users: UsersDoc = self.cache.get_as(USERS_DOC).await;
        let record = users.entry(user_id.to_string()).or_default();
        let old_xp = record.xp;
        let old_level = record.level;

        record.level = match mode {
            AdjustMode::Add => record.level.saturating_add(amount).min(MAX_LEVEL),
            AdjustMode::Remove => record.level.saturating_sub(amount).max(MIN_LEVEL),
            AdjustMode::Set => amount.clamp(MIN_LEVEL, MAX_LEVEL),
        };
        record.xp = xp_for_level(record.level);

        let adjustment = Adjustment {
            old_xp,
            old_level,
            record: record.clone(),
        };
        self.cache.put_as(USERS_DOC, &users).await?;
        Ok(adjustment)
    }

    /// Current record for one user, if any.
    pub async fn user_record(&self, user_id: serenity::UserId) -> Option<UserRecord> {
        let users: UsersDoc = self.cache.get_as(USERS_DOC).await;
        users.get(&user_id.to_string()).cloned()
    }

    /// All records sorted by xp, highest first.
    pub async fn standings(&self) -> Vec<(String, UserRecord)> {
        let users: UsersDoc = self.cache.get_as(USERS_DOC).await;
        let mut standings: Vec<_> = users.into_iter().collect();
        standings.sort_by(|(_, a), (_, b)| b.xp.cmp(&a.xp));
        standings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::RecordingStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn leveling() -> Leveling {
        Leveling::new(Arc::new(DocCache::new(Arc::new(RecordingStore::default()))))
    }

    fn leveling_with_users(doc: serde_json::Value) -> Leveling {
        let store = Arc::new(RecordingStore::with_doc(USERS_DOC, doc));
        Leveling::new(Arc::new(DocCache::new(store)))
    }

    const USER: serenity::UserId = serenity::UserId::new(42);

    #[tokio::test(start_paused = true)]
    async fn first_grant_creates_a_level_one_record() {
        let leveling = leveling();
        let outcome = leveling.grant_message_xp(USER).await.unwrap().unwrap();

        assert!((XP_GAIN_MIN..=XP_GAIN_MAX).contains(&outcome.gained));
        assert_eq!(outcome.record.xp, outcome.gained);
        assert_eq!(outcome.record.level, 1);
        assert_eq!(outcome.level_up, None);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_gates_to_one_grant_per_minute() {
        let leveling = leveling();
        let first = leveling.grant_message_xp(USER).await.unwrap().unwrap();
        assert!(leveling.grant_message_xp(USER).await.unwrap().is_none());

        let record = leveling.user_record(USER).await.unwrap();
        assert_eq!(record.xp, first.gained);

        tokio::time::advance(MESSAGE_COOLDOWN + Duration::from_secs(1)).await;
        assert!(leveling.grant_message_xp(USER).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn cooldowns_are_per_user() {
        let leveling = leveling();
        leveling.grant_message_xp(USER).await.unwrap().unwrap();
        let other = serenity::UserId::new(43);
        assert!(leveling.grant_message_xp(other).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_grants_level_up_exactly_once_at_the_threshold() {
        let leveling = leveling();
        let mut level_ups = Vec::new();

        // xp_for_level(2) is 150; at 5..=20 per grant that is at most
        // 30 grants away.
        for _ in 0..40 {
            if let Some(outcome) = leveling.grant_message_xp(USER).await.unwrap() {
                if let Some(level_up) = outcome.level_up {
                    level_ups.push(level_up);
                }
                if outcome.record.level >= 2 {
                    break;
                }
            }
            tokio::time::advance(MESSAGE_COOLDOWN + Duration::from_secs(1)).await;
        }

        assert_eq!(
            level_ups,
            vec![LevelUp { old_level: 1, new_level: 2 }]
        );
        let record = leveling.user_record(USER).await.unwrap();
        assert!(record.xp >= 150);
        assert_eq!(record.level, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn grants_never_demote_an_admin_boosted_level() {
        let leveling = leveling_with_users(json!({"42": {"xp": 0, "level": 50}}));
        let outcome = leveling.grant_message_xp(USER).await.unwrap().unwrap();
        assert_eq!(outcome.record.level, 50);
        assert_eq!(outcome.level_up, None);
    }

    #[tokio::test(start_paused = true)]
    async fn xp_removal_clamps_at_zero() {
        let leveling = leveling_with_users(json!({"42": {"xp": 50, "level": 1}}));
        let adjustment = leveling
            .adjust_xp(USER, AdjustMode::Remove, 10_000_000)
            .await
            .unwrap();
        assert_eq!(adjustment.record.xp, 0);
        assert_eq!(adjustment.record.level, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn xp_set_recomputes_the_level() {
        let leveling = leveling();
        let adjustment = leveling.adjust_xp(USER, AdjustMode::Set, 225).await.unwrap();
        assert_eq!(adjustment.record.xp, 225);
        assert_eq!(adjustment.record.level, 3);
        assert!(adjustment.level_changed());
    }

    #[tokio::test(start_paused = true)]
    async fn level_addition_clamps_at_one_hundred() {
        let leveling = leveling_with_users(json!({"42": {"xp": 500, "level": 4}}));
        let adjustment = leveling
            .adjust_level(USER, AdjustMode::Add, 1000)
            .await
            .unwrap();
        assert_eq!(adjustment.record.level, 100);
        assert_eq!(adjustment.record.xp, xp_for_level(100));
    }

    #[tokio::test(start_paused = true)]
    async fn level_removal_clamps_at_one() {
        let leveling = leveling_with_users(json!({"42": {"xp": 500, "level": 4}}));
        let adjustment = leveling
            .adjust_level(USER, AdjustMode::Remove, 99)
            .await
            .unwrap();
        assert_eq!(adjustment.record.level, 1);
        assert_eq!(adjustment.record.xp, xp_for_level(1));
    }

    #[tokio::test(start_paused = true)]
    async fn standings_sort_by_xp_descending() {
        let leveling = leveling_with_users(json!({
            "1": {"xp": 10, "level": 1},
            "2": {"xp": 500, "level": 4},
            "3": {"xp": 150, "level": 2},
        }));
        let standings = leveling.standings().await;
        let order: Vec<&str> = standings.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(order, vec!["2", "3", "1"]);
    }
}
