//! Quest System Module
//!
//! TOML-authored catalog (rooms, daily templates, object tiers), concrete
//! quests in the player's log, and the lifecycle rules that move them from
//! pending to completed.

pub mod catalog;
pub mod definition;
pub mod lifecycle;
pub mod state;

pub use catalog::{HotReloadEvent, QuestCatalog};
pub use definition::{Difficulty, NewQuest, Quest, RoomDefinition};
pub use lifecycle::{CapacityReport, QuestCompletion, QuestLog};
pub use state::{ObjectCooldowns, QuestStatus};
