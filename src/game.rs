use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::GamePolicy;
use crate::dashboard::DashboardSummary;
use crate::error::{HabitError, HabitResult, StorageError};
use crate::progression::{Player, RoomId};
use crate::quest::{CapacityReport, NewQuest, ObjectCooldowns, Quest, QuestCatalog, QuestCompletion, QuestLog, RoomDefinition};
use crate::reward::{Reward, RewardVault};
use crate::storage::{Clock, Storage, StorageKey};
use crate::sync::{Broadcaster, SyncEvent};

/// Longest pet name accepted
pub const MAX_PET_NAME_LEN: usize = 30;

// ============================================================================
// Game State
// ============================================================================

/// Everything the game persists, as one value
#[derive(Debug, Clone, Default)]
pub struct GameState {
    pub player: Player,
    pub quests: QuestLog,
    pub vault: RewardVault,
    pub pet_name: Option<String>,
    pub revision: u64,
}

/// Full state as sent to clients
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub player: Player,
    pub xp_needed: u64,
    pub tasks_at_current_level: u32,
    pub tasks_completed_at_level: BTreeMap<u32, u32>,
    pub quests: Vec<Quest>,
    pub rewards: Vec<Reward>,
    pub pet_name: Option<String>,
    pub last_daily_reset: Option<NaiveDate>,
    pub revision: u64,
}

impl GameState {
    /// Read every key. Missing keys get defaults; an unreadable one fails
    /// the load so nothing is written over it.
    pub async fn load(storage: &Storage) -> HabitResult<Self> {
        let mut player: Player = load_or_default(storage, StorageKey::Player).await?;
        let tasks: BTreeMap<u32, u32> = load_or_default(storage, StorageKey::TasksCompleted).await?;
        if !tasks.is_empty() {
            player.tasks_completed_at_level = tasks;
        }
        player.tasks_completed_at_level.entry(player.level).or_insert(0);

        let quests = QuestLog {
            quests: load_or_default(storage, StorageKey::Quests).await?,
            cooldowns: load_or_default::<ObjectCooldowns>(storage, StorageKey::ObjectCooldowns).await?,
            last_daily_reset: load_or_default(storage, StorageKey::LastDailyReset).await?,
        };

        Ok(Self {
            player,
            quests,
            vault: load_or_default(storage, StorageKey::RewardVault).await?,
            pet_name: load_or_default(storage, StorageKey::PetName).await?,
            revision: load_or_default(storage, StorageKey::Revision).await?,
        })
    }

    pub fn to_entries(&self) -> Result<Vec<(StorageKey, Value)>, StorageError> {
        Ok(vec![
            (StorageKey::Player, serde_json::to_value(&self.player)?),
            (
                StorageKey::TasksCompleted,
                serde_json::to_value(&self.player.tasks_completed_at_level)?,
            ),
            (StorageKey::Quests, serde_json::to_value(&self.quests.quests)?),
            (StorageKey::ObjectCooldowns, serde_json::to_value(&self.quests.cooldowns)?),
            (StorageKey::LastDailyReset, serde_json::to_value(self.quests.last_daily_reset)?),
            (StorageKey::RewardVault, serde_json::to_value(&self.vault)?),
            (StorageKey::PetName, serde_json::to_value(&self.pet_name)?),
            (StorageKey::Revision, serde_json::to_value(self.revision)?),
        ])
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            player: self.player.clone(),
            xp_needed: self.player.xp_needed(),
            tasks_at_current_level: self.player.tasks_at_current_level(),
            tasks_completed_at_level: self.player.tasks_completed_at_level.clone(),
            quests: self.quests.quests.clone(),
            rewards: self.vault.all().to_vec(),
            pet_name: self.pet_name.clone(),
            last_daily_reset: self.quests.last_daily_reset,
            revision: self.revision,
        }
    }

    fn player_updated(&self) -> SyncEvent {
        SyncEvent::PlayerUpdated {
            player: self.player.clone(),
            pet_name: self.pet_name.clone(),
        }
    }
}

async fn load_or_default<T>(storage: &Storage, key: StorageKey) -> Result<T, StorageError>
where
    T: DeserializeOwned + Default,
{
    let Some(value) = storage.load(key).await? else {
        return Ok(T::default());
    };
    if value.is_null() {
        return Ok(T::default());
    }

    serde_json::from_value(value).map_err(|e| {
        error!("Stored {} is unreadable: {}", key.as_str(), e);
        StorageError::from(e)
    })
}

// ============================================================================
// Game Service
// ============================================================================

/// A freshly created quest with the capacity answers at creation time
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedQuest {
    pub quest: Quest,
    pub capacity: CapacityReport,
}

/// Cooldown answer for one clickable object
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectCooldownStatus {
    pub object_id: String,
    pub can_accept: bool,
    pub remaining_secs: Option<i64>,
}

/// Runs game operations against storage.
///
/// Each mutation loads the stored snapshot, applies the lazy daily reset and
/// the operation, then writes every key back in one `save_all`. Events go
/// out only after the write succeeded. Mutations are serialized through one
/// lock; separate processes sharing a database get last-write-wins.
pub struct GameService {
    storage: Storage,
    catalog: Arc<QuestCatalog>,
    broadcaster: Broadcaster,
    clock: Arc<dyn Clock>,
    policy: GamePolicy,
    write_lock: Mutex<()>,
}

impl GameService {
    pub fn new(
        storage: Storage,
        catalog: Arc<QuestCatalog>,
        broadcaster: Broadcaster,
        clock: Arc<dyn Clock>,
        policy: GamePolicy,
    ) -> Self {
        Self {
            storage,
            catalog,
            broadcaster,
            clock,
            policy,
            write_lock: Mutex::new(()),
        }
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    async fn mutate<T, F>(&self, op: F) -> HabitResult<T>
    where
        F: FnOnce(&mut GameState, DateTime<Utc>, &mut Vec<SyncEvent>) -> HabitResult<T>,
    {
        let _guard = self.write_lock.lock().await;
        let now = self.clock.now();

        let mut state = GameState::load(&self.storage).await?;
        let mut events = Vec::new();
        self.apply_daily_reset(&mut state, now, &mut events).await?;

        let value = op(&mut state, now, &mut events)?;

        state.revision += 1;
        self.persist(&state).await?;
        self.broadcaster.emit_all(state.revision, events);
        Ok(value)
    }

    async fn persist(&self, state: &GameState) -> HabitResult<()> {
        let entries = state.to_entries()?;
        if let Err(e) = self.storage.save_all(entries).await {
            error!("Failed to persist game state (revision {}): {}", state.revision, e);
            return Err(e.into());
        }
        Ok(())
    }

    async fn apply_daily_reset(
        &self,
        state: &mut GameState,
        now: DateTime<Utc>,
        events: &mut Vec<SyncEvent>,
    ) -> HabitResult<bool> {
        let today = self.clock.today();
        if state.quests.last_daily_reset == Some(today) {
            return Ok(false);
        }

        let templates = self.catalog.daily_templates().await;
        let Some(reset) = state.quests.reset_daily_quests(today, &templates, now)? else {
            return Ok(false);
        };

        events.extend(reset.removed.into_iter().map(|q| SyncEvent::QuestDeleted { quest_id: q.id }));
        events.extend(reset.created.into_iter().map(SyncEvent::QuestCreated));
        Ok(true)
    }

    /// Current state; persists the daily reset if it was due
    pub async fn current_state(&self) -> HabitResult<GameState> {
        let _guard = self.write_lock.lock().await;
        let now = self.clock.now();

        let mut state = GameState::load(&self.storage).await?;
        let mut events = Vec::new();
        if self.apply_daily_reset(&mut state, now, &mut events).await? {
            state.revision += 1;
            self.persist(&state).await?;
            self.broadcaster.emit_all(state.revision, events);
        }
        Ok(state)
    }

    pub async fn snapshot(&self) -> HabitResult<GameSnapshot> {
        Ok(self.current_state().await?.snapshot())
    }

    pub async fn dashboard(&self) -> HabitResult<DashboardSummary> {
        Ok(DashboardSummary::from_state(&self.current_state().await?))
    }

    /// Capacity for `count` more quests at `level`, or at the player's level
    pub async fn capacity(&self, level: Option<u32>, count: usize) -> HabitResult<CapacityReport> {
        let state = self.current_state().await?;
        let level = level.unwrap_or(state.player.level);
        Ok(state.quests.capacity_report(level, count, &self.policy))
    }

    pub async fn rooms(&self) -> Vec<RoomDefinition> {
        self.catalog.rooms().await
    }

    // ========================================================================
    // Quests
    // ========================================================================

    pub async fn create_quest(&self, new_quest: NewQuest) -> HabitResult<CreatedQuest> {
        let policy = &self.policy;
        self.mutate(|state, now, events| {
            let capacity = state
                .quests
                .capacity_report(new_quest.required_player_level, 1, policy);
            if !capacity.can_add_to_level {
                warn!(
                    "Level {} already has {} unfinished quests (cap {}), creating anyway",
                    capacity.level, capacity.incomplete_at_level, policy.per_level_task_cap
                );
            }

            let quest = state.quests.create_quest(new_quest, now)?;
            events.push(SyncEvent::QuestCreated(quest.clone()));
            Ok(CreatedQuest { quest, capacity })
        })
        .await
    }

    pub async fn accept_quest(&self, id: &str) -> HabitResult<Quest> {
        self.mutate(|state, _, events| {
            let quest = state.quests.accept_quest(id)?;
            events.push(SyncEvent::QuestAccepted(quest.clone()));
            Ok(quest)
        })
        .await
    }

    pub async fn complete_quest(&self, id: &str) -> HabitResult<QuestCompletion> {
        let policy = &self.policy;
        self.mutate(|state, now, events| {
            let GameState { player, quests, vault, .. } = &mut *state;
            let completion = quests.complete_quest(id, now, player, vault, policy)?;
            if completion.report.levels_gained() > 0 {
                info!("Level up! Player is now level {}", player.level);
            }

            events.push(SyncEvent::QuestCompleted {
                quest: completion.quest.clone(),
                level: player.level,
                xp: player.xp,
                gems: player.gems,
                signals: completion.report.signals.clone(),
            });
            events.extend(
                completion
                    .report
                    .unlocked_rewards
                    .iter()
                    .cloned()
                    .map(SyncEvent::RewardUnlocked),
            );
            events.push(state.player_updated());
            Ok(completion)
        })
        .await
    }

    pub async fn delete_quest(&self, id: &str) -> HabitResult<Quest> {
        self.mutate(|state, _, events| {
            let quest = state.quests.delete_quest(id)?;
            events.push(SyncEvent::QuestDeleted { quest_id: quest.id.clone() });
            Ok(quest)
        })
        .await
    }

    pub async fn object_cooldown(&self, object_id: &str) -> HabitResult<ObjectCooldownStatus> {
        let state = self.current_state().await?;
        let now = self.clock.now();
        let remaining = state
            .quests
            .cooldowns
            .remaining(object_id, now, self.policy.object_cooldown());

        Ok(ObjectCooldownStatus {
            object_id: object_id.to_string(),
            can_accept: state.quests.can_accept_object_quest(object_id, now, &self.policy),
            remaining_secs: remaining.map(|d| d.num_seconds()),
        })
    }

    /// Offer the chore attached to a clicked object
    pub async fn offer_object_quest(
        &self,
        object_id: &str,
        room: &RoomId,
        object_type: &str,
    ) -> HabitResult<Quest> {
        if object_id.trim().is_empty() {
            return Err(HabitError::validation("object id must not be empty"));
        }
        if !self.catalog.has_room(room).await {
            return Err(HabitError::NotFound { kind: "room", id: room.to_string() });
        }
        let templates = self.catalog.object_templates(room, object_type).await;

        let policy = &self.policy;
        self.mutate(|state, now, events| {
            let level = state.player.level;
            let quest = state
                .quests
                .offer_object_quest(object_id, &templates, level, now, policy)?;
            events.push(SyncEvent::QuestCreated(quest.clone()));
            Ok(quest)
        })
        .await
    }

    // ========================================================================
    // Rewards
    // ========================================================================

    pub async fn create_reward(&self, name: &str, gem_cost: u64) -> HabitResult<Reward> {
        self.mutate(|state, now, events| {
            let reward = state
                .vault
                .create_reward(name, gem_cost, state.player.gems, now)?;
            events.push(SyncEvent::RewardCreated(reward.clone()));
            Ok(reward)
        })
        .await
    }

    pub async fn claim_reward(&self, id: &str) -> HabitResult<Reward> {
        self.mutate(|state, now, events| {
            let reward = state.vault.claim_reward(id, now)?;
            events.push(SyncEvent::RewardClaimed(reward.clone()));
            Ok(reward)
        })
        .await
    }

    pub async fn delete_reward(&self, id: &str) -> HabitResult<Reward> {
        self.mutate(|state, _, events| {
            let reward = state.vault.delete_reward(id)?;
            events.push(SyncEvent::RewardDeleted { reward_id: reward.id.clone() });
            Ok(reward)
        })
        .await
    }

    // ========================================================================
    // Player
    // ========================================================================

    pub async fn set_pet_name(&self, name: &str) -> HabitResult<String> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(HabitError::validation("pet name must not be empty"));
        }
        if name.chars().count() > MAX_PET_NAME_LEN {
            return Err(HabitError::validation(format!(
                "pet name must be at most {} characters",
                MAX_PET_NAME_LEN
            )));
        }

        self.mutate(|state, _, events| {
            info!("Pet renamed to '{}'", name);
            state.pet_name = Some(name.clone());
            events.push(state.player_updated());
            Ok(name)
        })
        .await
    }

    pub async fn change_room(&self, room: &RoomId) -> HabitResult<Player> {
        if !self.catalog.has_room(room).await {
            return Err(HabitError::NotFound { kind: "room", id: room.to_string() });
        }

        self.mutate(|state, _, events| {
            state.player.current_room = room.clone();
            events.push(state.player_updated());
            Ok(state.player.clone())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::quest::Difficulty;
    use crate::storage::ManualClock;
    use chrono::Duration;
    use tempfile::TempDir;

    struct Harness {
        service: GameService,
        storage: Storage,
        clock: Arc<ManualClock>,
        broadcaster: Broadcaster,
    }

    fn start_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn harness_with(storage: Storage) -> Harness {
        let clock = Arc::new(ManualClock::new(start_time()));
        let broadcaster = Broadcaster::new(64);
        let service = GameService::new(
            storage.clone(),
            Arc::new(QuestCatalog::builtin()),
            broadcaster.clone(),
            clock.clone(),
            GamePolicy::default(),
        );
        Harness { service, storage, clock, broadcaster }
    }

    fn harness() -> Harness {
        harness_with(Storage::memory())
    }

    fn chore(name: &str, xp: u64) -> NewQuest {
        NewQuest {
            name: name.to_string(),
            description: format!("Please {}", name),
            difficulty: Difficulty::Easy,
            xp_reward: xp,
            ..NewQuest::default()
        }
    }

    async fn accept_and_complete(service: &GameService, new_quest: NewQuest) -> QuestCompletion {
        let created = service.create_quest(new_quest).await.unwrap();
        service.accept_quest(&created.quest.id).await.unwrap();
        service.complete_quest(&created.quest.id).await.unwrap()
    }

    #[tokio::test]
    async fn test_first_load_creates_defaults_and_dailies() {
        let h = harness();
        let snapshot = h.service.snapshot().await.unwrap();

        assert_eq!(snapshot.player.level, 1);
        assert_eq!(snapshot.player.current_room.as_str(), "kitchen");
        assert_eq!(snapshot.quests.iter().filter(|q| q.is_daily).count(), 3);
        assert_eq!(snapshot.last_daily_reset, Some(start_time().date_naive()));
        assert_eq!(snapshot.revision, 1);

        // Same day: no second reset
        let again = h.service.snapshot().await.unwrap();
        assert_eq!(again.revision, 1);
        assert_eq!(again.quests.len(), 3);
    }

    #[tokio::test]
    async fn test_five_easy_quests_level_up_and_persist() {
        let h = harness();
        for i in 0..5 {
            accept_and_complete(&h.service, chore(&format!("chore {}", i), 25)).await;
        }

        let state = GameState::load(&h.storage).await.unwrap();
        assert_eq!(state.player.level, 2);
        assert_eq!(state.player.xp, 25);
        assert_eq!(state.player.gems, 5);
        assert_eq!(state.player.tasks_completed_at_level.get(&2), Some(&0));
        assert_eq!(state.player.tasks_completed_at_level.get(&1), Some(&5));
    }

    #[tokio::test]
    async fn test_completion_unlocks_reward_and_broadcasts() {
        let h = harness();
        h.service.snapshot().await.unwrap();
        let reward = h.service.create_reward("Ice cream", 2).await.unwrap();
        assert!(!reward.unlocked);

        let mut rx = h.broadcaster.subscribe();
        accept_and_complete(&h.service, chore("dishes", 10)).await;
        let completion = accept_and_complete(&h.service, chore("laundry", 10)).await;
        assert_eq!(completion.report.unlocked_rewards.len(), 1);

        let mut names = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            names.push(msg.event.name());
        }
        assert!(names.contains(&"reward:unlocked"));
        assert_eq!(names.iter().filter(|n| **n == "quest:completed").count(), 2);

        let claimed = h.service.claim_reward(&reward.id).await.unwrap();
        assert!(claimed.claimed);
        // Claiming never deducts gems
        let state = GameState::load(&h.storage).await.unwrap();
        assert_eq!(state.player.gems, 2);
    }

    #[tokio::test]
    async fn test_reward_unlocks_at_five_gems_and_claim_keeps_gems() {
        let h = harness();
        for i in 0..3 {
            accept_and_complete(&h.service, chore(&format!("chore {}", i), 25)).await;
        }
        assert_eq!(GameState::load(&h.storage).await.unwrap().player.gems, 3);

        let reward = h.service.create_reward("Movie night", 5).await.unwrap();
        assert!(!reward.unlocked);
        assert!(matches!(h.service.claim_reward(&reward.id).await, Err(HabitError::Locked)));

        accept_and_complete(&h.service, chore("chore 3", 25)).await;
        let last = accept_and_complete(&h.service, chore("chore 4", 25)).await;
        assert_eq!(last.report.unlocked_rewards.len(), 1);
        assert_eq!(last.report.unlocked_rewards[0].id, reward.id);

        let state = GameState::load(&h.storage).await.unwrap();
        assert_eq!(state.player.gems, 5);
        assert_eq!(state.player.level, 2);
        assert!(state.vault.get(&reward.id).unwrap().unlocked);

        let claimed = h.service.claim_reward(&reward.id).await.unwrap();
        assert!(claimed.claimed);
        let state = GameState::load(&h.storage).await.unwrap();
        assert_eq!(state.player.gems, 5);
        assert!(matches!(
            h.service.claim_reward(&reward.id).await,
            Err(HabitError::AlreadyClaimed)
        ));
    }

    #[tokio::test]
    async fn test_failed_operation_changes_nothing() {
        let h = harness();
        let created = h.service.create_quest(chore("bed", 10)).await.unwrap();
        let before = GameState::load(&h.storage).await.unwrap();

        let mut rx = h.broadcaster.subscribe();
        let err = h.service.complete_quest(&created.quest.id).await.unwrap_err();
        assert!(matches!(err, HabitError::NotAccepted));

        let after = GameState::load(&h.storage).await.unwrap();
        assert_eq!(after.revision, before.revision);
        assert_eq!(after.player, before.player);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_revision_increments_per_mutation() {
        let h = harness();
        let created = h.service.create_quest(chore("bed", 10)).await.unwrap();
        let mut rx = h.broadcaster.subscribe();

        h.service.accept_quest(&created.quest.id).await.unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.event.name(), "quest:accepted");

        let state = GameState::load(&h.storage).await.unwrap();
        assert_eq!(msg.revision, Some(state.revision));
    }

    #[tokio::test]
    async fn test_daily_reset_on_new_day() {
        let h = harness();
        let first = h.service.snapshot().await.unwrap();
        let first_daily: Vec<String> = first
            .quests
            .iter()
            .filter(|q| q.is_daily)
            .map(|q| q.id.clone())
            .collect();

        h.clock.advance(Duration::days(1));
        let second = h.service.snapshot().await.unwrap();
        let second_daily: Vec<&Quest> = second.quests.iter().filter(|q| q.is_daily).collect();

        assert_eq!(second_daily.len(), 3);
        assert!(second_daily.iter().all(|q| !first_daily.contains(&q.id)));
        assert_eq!(second.revision, first.revision + 1);
    }

    #[tokio::test]
    async fn test_object_quest_cooldown_with_clock() {
        let h = harness();
        let kitchen = RoomId::new("kitchen");

        let quest = h
            .service
            .offer_object_quest("kitchen_table_1", &kitchen, "table")
            .await
            .unwrap();
        h.service.accept_quest(&quest.id).await.unwrap();
        h.service.complete_quest(&quest.id).await.unwrap();

        h.clock.advance(Duration::hours(23));
        let status = h.service.object_cooldown("kitchen_table_1").await.unwrap();
        assert!(!status.can_accept);
        assert_eq!(status.remaining_secs, Some(3600));
        assert!(matches!(
            h.service.offer_object_quest("kitchen_table_1", &kitchen, "table").await,
            Err(HabitError::CoolingDown { .. })
        ));

        h.clock.advance(Duration::hours(1));
        assert!(h.service.object_cooldown("kitchen_table_1").await.unwrap().can_accept);
        assert!(h
            .service
            .offer_object_quest("kitchen_table_1", &kitchen, "table")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_unknown_room_and_object() {
        let h = harness();
        assert!(matches!(
            h.service.offer_object_quest("x", &RoomId::new("dungeon"), "chest").await,
            Err(HabitError::NotFound { kind: "room", .. })
        ));
        assert!(matches!(
            h.service.offer_object_quest("x", &RoomId::new("kitchen"), "piano").await,
            Err(HabitError::NotFound { .. })
        ));
        assert!(matches!(
            h.service.change_room(&RoomId::new("dungeon")).await,
            Err(HabitError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_pet_and_room() {
        let h = harness();
        assert!(matches!(h.service.set_pet_name("   ").await, Err(HabitError::Validation(_))));
        assert_eq!(h.service.set_pet_name(" Sparky ").await.unwrap(), "Sparky");

        let player = h.service.change_room(&RoomId::new("garden")).await.unwrap();
        assert_eq!(player.current_room.as_str(), "garden");

        let snapshot = h.service.snapshot().await.unwrap();
        assert_eq!(snapshot.pet_name.as_deref(), Some("Sparky"));
        assert_eq!(snapshot.player.current_room.as_str(), "garden");
    }

    #[tokio::test]
    async fn test_create_reports_capacity_softly() {
        let h = harness();
        let service = GameService::new(
            h.storage.clone(),
            Arc::new(QuestCatalog::builtin()),
            h.broadcaster.clone(),
            h.clock.clone(),
            GamePolicy {
                per_level_task_cap: 4,
                ..GamePolicy::default()
            },
        );

        // Three dailies already sit at level 1
        let ok = service.create_quest(chore("one", 10)).await.unwrap();
        assert!(ok.capacity.can_add_to_level);

        let over = service.create_quest(chore("two", 10)).await.unwrap();
        assert!(!over.capacity.can_add_to_level);
        assert_eq!(service.snapshot().await.unwrap().quests.len(), 5);
    }

    #[tokio::test]
    async fn test_capacity_defaults_to_current_level() {
        let h = harness();
        let fresh = h.service.capacity(None, 1).await.unwrap();
        assert_eq!(fresh.level, 1);
        assert_eq!(fresh.incomplete_at_level, 3);

        for i in 0..5 {
            accept_and_complete(&h.service, chore(&format!("chore {}", i), 25)).await;
        }

        let current = h.service.capacity(None, 1).await.unwrap();
        assert_eq!(current.level, 2);
        assert_eq!(current.incomplete_at_level, 0);
        assert!(current.can_add_to_level);

        let explicit = h.service.capacity(Some(1), 1).await.unwrap();
        assert_eq!(explicit.level, 1);
        assert_eq!(explicit.incomplete_at_level, 3);
    }

    #[tokio::test]
    async fn test_unreadable_value_fails_without_overwriting() {
        let h = harness();
        h.service.create_quest(chore("keep me", 10)).await.unwrap();

        let mut quests = h.storage.load(StorageKey::Quests).await.unwrap().unwrap();
        assert_eq!(quests.as_array().unwrap().len(), 4);
        quests[0]["xpReward"] = serde_json::json!("ten");
        h.storage
            .save_all(vec![(StorageKey::Quests, quests.clone())])
            .await
            .unwrap();
        let revision = h.storage.load(StorageKey::Revision).await.unwrap();

        let mut rx = h.broadcaster.subscribe();
        assert!(matches!(h.service.set_pet_name("Rex").await, Err(HabitError::Storage(_))));
        assert!(matches!(h.service.snapshot().await, Err(HabitError::Storage(_))));
        assert!(rx.try_recv().is_err());

        assert_eq!(h.storage.load(StorageKey::Quests).await.unwrap(), Some(quests));
        assert_eq!(h.storage.load(StorageKey::Revision).await.unwrap(), revision);
        assert_ne!(
            h.storage.load(StorageKey::PetName).await.unwrap(),
            Some(serde_json::json!("Rex"))
        );
    }

    #[tokio::test]
    async fn test_sqlite_state_survives_restart_and_closed_db_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("game.db").display());

        let db = Arc::new(Database::new(&url).await.unwrap());
        let h = harness_with(Storage::Sqlite(db.clone()));
        accept_and_complete(&h.service, chore("bed", 40)).await;
        db.close().await;

        assert!(matches!(
            h.service.create_quest(chore("dishes", 10)).await,
            Err(HabitError::Storage(_))
        ));

        let reopened = Arc::new(Database::new(&url).await.unwrap());
        let state = GameState::load(&Storage::Sqlite(reopened)).await.unwrap();
        assert_eq!(state.player.xp, 40);
        assert_eq!(state.player.tasks_completed_at_level.get(&1), Some(&1));
        assert!(state.quests.quests.iter().all(|q| q.name != "dishes"));
    }
}
