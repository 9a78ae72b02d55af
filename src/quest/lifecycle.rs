//! Quest Lifecycle Manager
//!
//! Owns the quest log: creation, accept/complete/delete transitions,
//! capacity checks, the daily reset and object cooldowns.
//!
//! ```text
//! Pending -> Accepted -> Completed
//!    \          \
//!     +----------+----> Deleted
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, info};

use super::definition::{NewQuest, ObjectQuestTemplate, Quest, QuestTemplate};
use super::state::ObjectCooldowns;
use crate::config::GamePolicy;
use crate::error::{HabitError, HabitResult};
use crate::progression::{recalculate_reward_unlocks, Player, ProgressionReport};
use crate::reward::RewardVault;

/// Result of a successful completion
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestCompletion {
    pub quest: Quest,
    pub report: ProgressionReport,
}

/// Result of a daily reset
#[derive(Debug, Clone, Default)]
pub struct DailyReset {
    pub removed: Vec<Quest>,
    pub created: Vec<Quest>,
}

/// Advisory capacity answers for the parent UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityReport {
    pub level: u32,
    pub incomplete_at_level: usize,
    pub total_incomplete: usize,
    pub can_add_to_level: bool,
    pub should_warn: bool,
}

/// The player's quests plus the bookkeeping that gates them
#[derive(Debug, Clone, Default)]
pub struct QuestLog {
    pub quests: Vec<Quest>,
    pub cooldowns: ObjectCooldowns,
    pub last_daily_reset: Option<NaiveDate>,
}

impl QuestLog {
#[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

#[cfg(test)]
    pub fn get(&self, id: &str) -> Option<&Quest> {
        self.quests.iter().find(|q| q.id == id)
    }

    fn get_mut(&mut self, id: &str) -> HabitResult<&mut Quest> {
        self.quests
            .iter_mut()
            .find(|q| q.id == id)
            .ok_or_else(|| HabitError::quest_not_found(id))
    }

#[cfg(test)]
    pub fn len(&self) -> usize {
        self.quests.len()
    }

#[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.quests.is_empty()
    }

    /// Validate and add a quest. Capacity is not enforced here.
    pub fn create_quest(&mut self, new_quest: NewQuest, now: DateTime<Utc>) -> HabitResult<Quest> {
        let quest = Quest::from_new(new_quest, now)?;
        info!(
            "Created quest '{}' ({}, {} XP, {} gems)",
            quest.name,
            quest.difficulty.as_str(),
            quest.xp_reward,
            quest.gem_reward
        );
        self.quests.push(quest.clone());
        Ok(quest)
    }

    pub fn accept_quest(&mut self, id: &str) -> HabitResult<Quest> {
        let quest = self.get_mut(id)?;
        if quest.completed {
            return Err(HabitError::AlreadyCompleted);
        }
        if quest.accepted_by_player {
            return Err(HabitError::AlreadyAccepted);
        }

        quest.accepted_by_player = true;
        info!("Quest '{}' accepted", quest.name);
        Ok(quest.clone())
    }

    /// Complete an accepted quest and pay out its reward.
    ///
    /// All checks run before anything is touched, and nothing after them can
    /// fail, so a rejected completion leaves player, log and vault unchanged.
    pub fn complete_quest(
        &mut self,
        id: &str,
        now: DateTime<Utc>,
        player: &mut Player,
        vault: &mut RewardVault,
        policy: &GamePolicy,
    ) -> HabitResult<QuestCompletion> {
        let quest = self.get_mut(id)?;
        if quest.completed {
            return Err(HabitError::AlreadyCompleted);
        }
        if !quest.accepted_by_player {
            return Err(HabitError::NotAccepted);
        }

        quest.completed = true;
        quest.completed_at = Some(now);
        let quest = quest.clone();

        player.record_task_completion();
        if let Some(source_id) = quest.cooldown_key() {
            self.cooldowns.record(source_id, now, policy.object_cooldown());
        }

        let mut report =
            player.apply_quest_reward(quest.xp_reward, quest.gem_reward, policy.tasks_per_level);
        report.unlocked_rewards = recalculate_reward_unlocks(player, vault);

        info!(
            "Quest '{}' completed: +{} XP, +{} gems (level {}, {} XP, {} gems)",
            quest.name, quest.xp_reward, quest.gem_reward, player.level, player.xp, player.gems
        );
        Ok(QuestCompletion { quest, report })
    }

    /// Remove a quest in any state; daily quests are protected
    pub fn delete_quest(&mut self, id: &str) -> HabitResult<Quest> {
        let pos = self
            .quests
            .iter()
            .position(|q| q.id == id)
            .ok_or_else(|| HabitError::quest_not_found(id))?;

        if self.quests[pos].is_daily {
            return Err(HabitError::DailyQuestProtected);
        }

        let quest = self.quests.remove(pos);
        info!("Quest '{}' deleted ({})", quest.name, quest.status().as_str());
        Ok(quest)
    }

    pub fn incomplete_count_at_level(&self, level: u32) -> usize {
        self.quests
            .iter()
            .filter(|q| !q.completed && q.required_player_level == level)
            .count()
    }

    pub fn total_incomplete_count(&self) -> usize {
        self.quests.iter().filter(|q| !q.completed).count()
    }

    pub fn can_add_tasks_to_level(&self, level: u32, count: usize, policy: &GamePolicy) -> bool {
        self.incomplete_count_at_level(level) + count <= policy.per_level_task_cap
    }

    pub fn should_warn_about_task_limit(&self, additional: usize, policy: &GamePolicy) -> bool {
        self.total_incomplete_count() + additional >= policy.task_warning_threshold
    }

    pub fn capacity_report(&self, level: u32, count: usize, policy: &GamePolicy) -> CapacityReport {
        CapacityReport {
            level,
            incomplete_at_level: self.incomplete_count_at_level(level),
            total_incomplete: self.total_incomplete_count(),
            can_add_to_level: self.can_add_tasks_to_level(level, count, policy),
            should_warn: self.should_warn_about_task_limit(count, policy),
        }
    }

    /// Swap yesterday's daily quests for a fresh set. No-op if already done today.
    pub fn reset_daily_quests(
        &mut self,
        today: NaiveDate,
        templates: &[QuestTemplate],
        now: DateTime<Utc>,
    ) -> HabitResult<Option<DailyReset>> {
        if self.last_daily_reset == Some(today) {
            return Ok(None);
        }

        let created = templates
            .iter()
            .map(|t| Quest::from_new(t.to_daily_quest(), now))
            .collect::<HabitResult<Vec<_>>>()?;

        let (removed, kept): (Vec<Quest>, Vec<Quest>) =
            self.quests.drain(..).partition(|q| q.is_daily);
        self.quests = kept;
        self.quests.extend(created.iter().cloned());
        self.last_daily_reset = Some(today);

        info!(
            "Daily reset for {}: removed {}, created {}",
            today,
            removed.len(),
            created.len()
        );
        Ok(Some(DailyReset { removed, created }))
    }

    pub fn can_accept_object_quest(&self, source_id: &str, now: DateTime<Utc>, policy: &GamePolicy) -> bool {
        self.cooldowns.can_accept(source_id, now, policy.object_cooldown())
    }

    /// Offer the chore attached to an object.
    ///
    /// Picks the highest tier the player qualifies for, at random among
    /// templates of that tier.
    pub fn offer_object_quest(
        &mut self,
        object_id: &str,
        templates: &[ObjectQuestTemplate],
        player_level: u32,
        now: DateTime<Utc>,
        policy: &GamePolicy,
    ) -> HabitResult<Quest> {
        if let Some(remaining) = self
            .cooldowns
            .remaining(object_id, now, policy.object_cooldown())
        {
            return Err(HabitError::CoolingDown {
                remaining_secs: remaining.num_seconds(),
            });
        }

        let busy = self
            .quests
            .iter()
            .any(|q| !q.completed && q.cooldown_key() == Some(object_id));
        if busy {
            return Err(HabitError::ObjectBusy);
        }

        let eligible: Vec<&ObjectQuestTemplate> =
            templates.iter().filter(|t| t.tier <= player_level).collect();
        let top_tier = eligible
            .iter()
            .map(|t| t.tier)
            .max()
            .ok_or_else(|| HabitError::NotFound {
                kind: "object quest",
                id: object_id.to_string(),
            })?;
        let candidates: Vec<&ObjectQuestTemplate> =
            eligible.into_iter().filter(|t| t.tier == top_tier).collect();

        let template = candidates
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| HabitError::NotFound {
                kind: "object quest",
                id: object_id.to_string(),
            })?;

        debug!(
            "Object {} offers tier {} quest '{}'",
            object_id, template.tier, template.quest.name
        );
        self.create_quest(template.to_object_quest(object_id), now)
    }
}
