//! Quest Definition Structures
//!
//! Raw catalog structures are deserialized from TOML files and resolved into
//! templates. Templates are turned into concrete [`Quest`] instances by the
//! lifecycle manager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{HabitError, HabitResult};
use crate::progression::RoomId;

/// A catalog file as it appears on disk
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCatalogFile {
    #[serde(default)]
    pub room: Vec<RawRoom>,
    #[serde(default)]
    pub daily: Vec<RawQuestTemplate>,
    #[serde(default)]
    pub object: Vec<RawObjectTemplate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRoom {
    pub id: String,
    pub name: String,
}

/// Raw quest template as it appears in TOML
#[derive(Debug, Clone, Deserialize)]
pub struct RawQuestTemplate {
    pub name: String,
    pub description: String,
    pub difficulty: String,
    pub xp_reward: u64,
    /// Overrides the difficulty default
    pub gem_reward: Option<u64>,
    pub irl_reward: Option<String>,
}

/// Raw object-tier template: a chore attached to a clickable object
#[derive(Debug, Clone, Deserialize)]
pub struct RawObjectTemplate {
    pub room: String,
    pub object_type: String,
    #[serde(default = "default_tier")]
    pub tier: u32,
    #[serde(flatten)]
    pub quest: RawQuestTemplate,
}

fn default_tier() -> u32 {
    1
}

/// Upper bound on the XP or gems a single quest may award
pub const MAX_QUEST_REWARD: u64 = 1_000_000;

// ============================================================================
// Resolved Structures
// ============================================================================

/// Difficulty tier of a quest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// Gem reward when the author does not set one
    pub fn default_gem_reward(&self) -> u64 {
        match self {
            Difficulty::Easy => 1,
            Difficulty::Medium => 2,
            Difficulty::Hard => 3,
        }
    }
}

/// Whether a quest was generated from a clickable object or authored by hand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestOrigin {
    Object,
    Npc,
}

/// Where a quest comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OriginRef {
    /// An NPC or object placed in a room
    #[serde(rename_all = "camelCase")]
    Placed { npc_id: String, room: RoomId },
    /// Written by the parent, not tied to anything in the world
    FreeForm,
}

impl OriginRef {
    pub fn source_id(&self) -> Option<&str> {
        match self {
            OriginRef::Placed { npc_id, .. } => Some(npc_id),
            OriginRef::FreeForm => None,
        }
    }

#[cfg(test)]
    pub fn room(&self) -> Option<&RoomId> {
        match self {
            OriginRef::Placed { room, .. } => Some(room),
            OriginRef::FreeForm => None,
        }
    }
}

impl Default for OriginRef {
    fn default() -> Self {
        OriginRef::FreeForm
    }
}

/// A quest template from the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestTemplate {
    pub name: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub xp_reward: u64,
    pub gem_reward: u64,
    pub irl_reward: Option<String>,
}

impl QuestTemplate {
    pub fn from_raw(raw: &RawQuestTemplate) -> Result<Self, String> {
        let difficulty = Difficulty::from_str(&raw.difficulty)
            .ok_or_else(|| format!("Invalid difficulty '{}' for '{}'", raw.difficulty, raw.name))?;

        if raw.name.trim().is_empty() || raw.description.trim().is_empty() {
            return Err("Quest template needs a name and a description".to_string());
        }
        if raw.xp_reward == 0 {
            return Err(format!("Quest template '{}' has no XP reward", raw.name));
        }
        if raw.gem_reward == Some(0) {
            return Err(format!("Quest template '{}' has a zero gem reward", raw.name));
        }
        if raw.xp_reward > MAX_QUEST_REWARD || raw.gem_reward.is_some_and(|g| g > MAX_QUEST_REWARD) {
            return Err(format!(
                "Quest template '{}' rewards more than {}",
                raw.name, MAX_QUEST_REWARD
            ));
        }

        Ok(Self {
            name: raw.name.clone(),
            description: raw.description.clone(),
            difficulty,
            xp_reward: raw.xp_reward,
            gem_reward: raw.gem_reward.unwrap_or_else(|| difficulty.default_gem_reward()),
            irl_reward: raw.irl_reward.clone(),
        })
    }

    /// Build a daily quest instance
    pub fn to_daily_quest(&self) -> NewQuest {
        NewQuest {
            name: self.name.clone(),
            description: self.description.clone(),
            difficulty: self.difficulty,
            xp_reward: self.xp_reward,
            gem_reward: Some(self.gem_reward),
            irl_reward: self.irl_reward.clone(),
            is_daily: true,
            ..NewQuest::default()
        }
    }
}

/// An object-tier template: the chore offered by one kind of object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectQuestTemplate {
    pub room: RoomId,
    pub object_type: String,
    pub tier: u32,
    pub quest: QuestTemplate,
}

impl ObjectQuestTemplate {
    pub fn from_raw(raw: &RawObjectTemplate) -> Result<Self, String> {
        if raw.tier == 0 {
            return Err(format!("Object quest '{}' has tier 0", raw.quest.name));
        }
        Ok(Self {
            room: RoomId::new(raw.room.clone()),
            object_type: raw.object_type.to_lowercase(),
            tier: raw.tier,
            quest: QuestTemplate::from_raw(&raw.quest)?,
        })
    }

    /// Build a quest bound to one placed object
    pub fn to_object_quest(&self, object_id: &str) -> NewQuest {
        NewQuest {
            name: self.quest.name.clone(),
            description: self.quest.description.clone(),
            source: OriginRef::Placed {
                npc_id: object_id.to_string(),
                room: self.room.clone(),
            },
            origin: QuestOrigin::Object,
            difficulty_tier: self.tier,
            required_player_level: 1,
            difficulty: self.quest.difficulty,
            xp_reward: self.quest.xp_reward,
            gem_reward: Some(self.quest.gem_reward),
            irl_reward: self.quest.irl_reward.clone(),
            is_daily: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomDefinition {
    pub id: RoomId,
    pub name: String,
}

/// Everything needed to create a quest
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuest {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub source: OriginRef,
    #[serde(default = "default_origin")]
    pub origin: QuestOrigin,
    #[serde(default = "default_tier")]
    pub difficulty_tier: u32,
    #[serde(default = "default_tier")]
    pub required_player_level: u32,
    pub difficulty: Difficulty,
    pub xp_reward: u64,
    #[serde(default)]
    pub gem_reward: Option<u64>,
    #[serde(default)]
    pub irl_reward: Option<String>,
    #[serde(default)]
    pub is_daily: bool,
}

fn default_origin() -> QuestOrigin {
    QuestOrigin::Npc
}

impl Default for NewQuest {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            source: OriginRef::FreeForm,
            origin: QuestOrigin::Npc,
            difficulty_tier: 1,
            required_player_level: 1,
            difficulty: Difficulty::Easy,
            xp_reward: 0,
            gem_reward: None,
            irl_reward: None,
            is_daily: false,
        }
    }
}

impl NewQuest {
    pub fn validate(&self) -> HabitResult<()> {
        if self.name.trim().is_empty() {
            return Err(HabitError::validation("quest name must not be empty"));
        }
        if self.description.trim().is_empty() {
            return Err(HabitError::validation("quest description must not be empty"));
        }
        if self.xp_reward == 0 {
            return Err(HabitError::validation("XP reward must be greater than zero"));
        }
        if self.gem_reward == Some(0) {
            return Err(HabitError::validation("gem reward must be greater than zero"));
        }
        if self.xp_reward > MAX_QUEST_REWARD || self.gem_reward.is_some_and(|g| g > MAX_QUEST_REWARD) {
            return Err(HabitError::validation(format!(
                "rewards must be at most {}",
                MAX_QUEST_REWARD
            )));
        }
        if self.difficulty_tier == 0 || self.required_player_level == 0 {
            return Err(HabitError::validation("levels start at 1"));
        }
        if self.origin == QuestOrigin::Object && self.source.source_id().is_none() {
            return Err(HabitError::validation("object quests need a placed source"));
        }
        Ok(())
    }
}

/// A concrete quest in the player's quest log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    /// UUIDv7: time-ordered, so ids sort in creation order
    pub id: String,
    pub name: String,
    pub description: String,
    pub source: OriginRef,
    pub origin: QuestOrigin,
    pub difficulty_tier: u32,
    pub required_player_level: u32,
    pub difficulty: Difficulty,
    pub xp_reward: u64,
    pub gem_reward: u64,
    #[serde(default)]
    pub irl_reward: Option<String>,
    pub accepted_by_player: bool,
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub is_daily: bool,
    pub created_at: DateTime<Utc>,
}

impl Quest {
    /// Create a Quest after validating the request
    pub fn from_new(new_quest: NewQuest, now: DateTime<Utc>) -> HabitResult<Self> {
        new_quest.validate()?;

        let gem_reward = new_quest
            .gem_reward
            .unwrap_or_else(|| new_quest.difficulty.default_gem_reward());
        let irl_reward = new_quest
            .irl_reward
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        Ok(Self {
            id: Uuid::now_v7().to_string(),
            name: new_quest.name.trim().to_string(),
            description: new_quest.description.trim().to_string(),
            source: new_quest.source,
            origin: new_quest.origin,
            difficulty_tier: new_quest.difficulty_tier,
            required_player_level: new_quest.required_player_level,
            difficulty: new_quest.difficulty,
            xp_reward: new_quest.xp_reward,
            gem_reward,
            irl_reward,
            accepted_by_player: false,
            completed: false,
            completed_at: None,
            is_daily: new_quest.is_daily,
            created_at: now,
        })
    }

    pub fn is_object_quest(&self) -> bool {
        self.origin == QuestOrigin::Object
    }

    /// Source id used for the object cooldown, if this quest has one
    pub fn cooldown_key(&self) -> Option<&str> {
        if self.is_object_quest() {
            self.source.source_id()
        } else {
            None
        }
    }

    pub fn is_available_to(&self, player_level: u32) -> bool {
        player_level >= self.required_player_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chore(name: &str, description: &str) -> NewQuest {
        NewQuest {
            name: name.to_string(),
            description: description.to_string(),
            xp_reward: 25,
            ..NewQuest::default()
        }
    }

    #[test]
    fn test_difficulty_parsing() {
        assert_eq!(Difficulty::from_str("easy"), Some(Difficulty::Easy));
        assert_eq!(Difficulty::from_str("MEDIUM"), Some(Difficulty::Medium));
        assert_eq!(Difficulty::from_str("hard"), Some(Difficulty::Hard));
        assert_eq!(Difficulty::from_str("legendary"), None);
    }

    #[test]
    fn test_gem_reward_defaults_from_difficulty() {
        let now = Utc::now();
        for (difficulty, gems) in [
            (Difficulty::Easy, 1),
            (Difficulty::Medium, 2),
            (Difficulty::Hard, 3),
        ] {
            let quest = Quest::from_new(NewQuest { difficulty, ..chore("Dishes", "Wash up") }, now).unwrap();
            assert_eq!(quest.gem_reward, gems);
        }

        let custom = Quest::from_new(
            NewQuest { gem_reward: Some(7), ..chore("Dishes", "Wash up") },
            now,
        )
        .unwrap();
        assert_eq!(custom.gem_reward, 7);
    }

    #[test]
    fn test_new_quest_starts_pending() {
        let quest = Quest::from_new(chore("  Feed the cat ", "Fill the bowl"), Utc::now()).unwrap();
        assert_eq!(quest.name, "Feed the cat");
        assert!(!quest.accepted_by_player);
        assert!(!quest.completed);
        assert!(quest.completed_at.is_none());
        assert!(quest.cooldown_key().is_none());
    }

    #[test]
    fn test_validation_errors() {
        let now = Utc::now();
        assert!(matches!(Quest::from_new(chore("", "x"), now), Err(HabitError::Validation(_))));
        assert!(matches!(Quest::from_new(chore("x", "  "), now), Err(HabitError::Validation(_))));
        assert!(matches!(
            Quest::from_new(NewQuest { xp_reward: 0, ..chore("x", "y") }, now),
            Err(HabitError::Validation(_))
        ));
        assert!(matches!(
            Quest::from_new(NewQuest { origin: QuestOrigin::Object, ..chore("x", "y") }, now),
            Err(HabitError::Validation(_))
        ));
    }

    #[test]
    fn test_rewards_are_capped() {
        let now = Utc::now();
        assert!(matches!(
            Quest::from_new(NewQuest { xp_reward: u64::MAX, ..chore("x", "y") }, now),
            Err(HabitError::Validation(_))
        ));
        assert!(matches!(
            Quest::from_new(NewQuest { gem_reward: Some(MAX_QUEST_REWARD + 1), ..chore("x", "y") }, now),
            Err(HabitError::Validation(_))
        ));
        assert!(Quest::from_new(
            NewQuest { xp_reward: MAX_QUEST_REWARD, gem_reward: Some(MAX_QUEST_REWARD), ..chore("x", "y") },
            now,
        )
        .is_ok());

        let raw: RawQuestTemplate = toml::from_str(
            r#"
name = "Greedy"
description = "Too generous"
difficulty = "easy"
xp_reward = 1000001
"#,
        )
        .unwrap();
        assert!(QuestTemplate::from_raw(&raw).is_err());
    }

    #[test]
    fn test_ids_sort_in_creation_order() {
        let now = Utc::now();
        let first = Quest::from_new(chore("a", "b"), now).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = Quest::from_new(chore("a", "b"), now).unwrap();
        assert_ne!(first.id, second.id);
        assert!(first.id < second.id);
    }

    #[test]
    fn test_object_template_resolves_quest() {
        let raw: RawObjectTemplate = toml::from_str(
            r#"
room = "kitchen"
object_type = "Sink"
tier = 2
name = "Dish Duty"
description = "Wash the dishes in the sink"
difficulty = "medium"
xp_reward = 40
"#,
        )
        .unwrap();

        let template = ObjectQuestTemplate::from_raw(&raw).unwrap();
        assert_eq!(template.object_type, "sink");
        assert_eq!(template.quest.gem_reward, 2);

        let quest = Quest::from_new(template.to_object_quest("kitchen_sink_1"), Utc::now()).unwrap();
        assert_eq!(quest.origin, QuestOrigin::Object);
        assert_eq!(quest.difficulty_tier, 2);
        assert_eq!(quest.required_player_level, 1);
        assert_eq!(quest.cooldown_key(), Some("kitchen_sink_1"));
        assert_eq!(quest.source.room(), Some(&RoomId::new("kitchen")));
    }
}
