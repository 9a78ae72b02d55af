//! Parent dashboard summary.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::game::GameState;
use crate::quest::{Difficulty, Quest, QuestStatus};
use crate::reward::Reward;

/// Completed quests shown on the dashboard
const RECENT_COMPLETIONS: usize = 10;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardQuest {
    pub id: String,
    pub name: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub xp_reward: u64,
    pub gem_reward: u64,
    pub irl_reward: Option<String>,
    pub status: QuestStatus,
    /// 0 not started, 50 accepted, 100 completed
    pub progress: u8,
    /// Player level is high enough to take it on
    pub available: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DashboardQuest {
    fn new(quest: &Quest, player_level: u32) -> Self {
        let status = quest.status();
        Self {
            id: quest.id.clone(),
            name: quest.name.clone(),
            description: quest.description.clone(),
            difficulty: quest.difficulty,
            xp_reward: quest.xp_reward,
            gem_reward: quest.gem_reward,
            irl_reward: quest.irl_reward.clone(),
            status,
            progress: status.progress_percent(),
            available: quest.is_available_to(player_level),
            completed_at: quest.completed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub level: u32,
    pub xp: u64,
    pub xp_needed: u64,
    pub gems: u64,
    pub completed_count: usize,
    pub active_quests: Vec<DashboardQuest>,
    /// Unlocked rewards waiting for the parent to grant them
    pub pending_rewards: Vec<Reward>,
    /// Newest first
    pub recent_completions: Vec<DashboardQuest>,
    pub pet_name: Option<String>,
    pub current_room: String,
    pub revision: u64,
}

impl DashboardSummary {
    pub fn from_state(state: &GameState) -> Self {
        let player = &state.player;
        let quests = &state.quests.quests;

        let active_quests = quests
            .iter()
            .filter(|q| !q.status().is_terminal())
            .map(|q| DashboardQuest::new(q, player.level))
            .collect();

        let mut completed: Vec<&Quest> = quests.iter().filter(|q| q.completed).collect();
        completed.sort_by(|a, b| b.completed_at.cmp(&a.completed_at).then_with(|| b.id.cmp(&a.id)));
        let recent_completions = completed
            .iter()
            .take(RECENT_COMPLETIONS)
            .map(|q| DashboardQuest::new(q, player.level))
            .collect();

        Self {
            level: player.level,
            xp: player.xp,
            xp_needed: player.xp_needed(),
            gems: player.gems,
            completed_count: completed.len(),
            active_quests,
            pending_rewards: state.vault.pending().cloned().collect(),
            recent_completions,
            pet_name: state.pet_name.clone(),
            current_room: player.current_room.to_string(),
            revision: state.revision,
        }
    }
}
