//! Points quest board: the flat title/points quest list with a running total.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::Database;
use crate::error::{HabitError, HabitResult, StorageError};
use crate::storage::Clock;
use crate::sync::{Broadcaster, SyncEvent};

/// A row of the points board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsQuest {
    pub id: i64,
    pub title: String,
    pub points: i64,
    pub completed: bool,
    pub created_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPointsQuest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub points: i64,
}

impl NewPointsQuest {
    pub fn validate(&self) -> HabitResult<()> {
        if self.title.trim().is_empty() || self.points <= 0 {
            return Err(HabitError::validation("Title and points are required"));
        }
        Ok(())
    }
}

/// Quest plus the total after a completion change
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsUpdate {
    pub quest: PointsQuest,
    pub total_points: i64,
}

pub struct PointsBoard {
    db: Arc<Database>,
    broadcaster: Broadcaster,
    clock: Arc<dyn Clock>,
}

impl PointsBoard {
    pub fn new(db: Arc<Database>, broadcaster: Broadcaster, clock: Arc<dyn Clock>) -> Self {
        Self { db, broadcaster, clock }
    }

    pub async fn list(&self) -> HabitResult<Vec<PointsQuest>> {
        Ok(self.db.list_points_quests().await.map_err(StorageError::from)?)
    }

    pub async fn total_points(&self) -> HabitResult<i64> {
        Ok(self.db.total_points().await.map_err(StorageError::from)?)
    }

    pub async fn create(&self, new: NewPointsQuest) -> HabitResult<PointsQuest> {
        new.validate()?;
        let quest = self
            .db
            .create_points_quest(new.title.trim(), new.points, self.clock.now())
            .await
            .map_err(StorageError::from)?;

        self.broadcaster.emit(SyncEvent::PointsQuestCreated(quest.clone()));
        Ok(quest)
    }

    pub async fn complete(&self, id: i64) -> HabitResult<PointsUpdate> {
        let (quest, total_points) = self
            .db
            .complete_points_quest(id, self.clock.now())
            .await
            .map_err(StorageError::from)?
            .ok_or_else(|| HabitError::NotFound {
                kind: "incomplete quest",
                id: id.to_string(),
            })?;

        info!("Points quest {} completed, total {}", id, total_points);
        let update = PointsUpdate { quest, total_points };
        self.broadcaster.emit(SyncEvent::PointsQuestCompleted(update.clone()));
        self.broadcaster.emit(SyncEvent::PointsUpdated { total_points });
        Ok(update)
    }

    pub async fn uncomplete(&self, id: i64) -> HabitResult<PointsUpdate> {
        let (quest, total_points) = self
            .db
            .uncomplete_points_quest(id)
            .await
            .map_err(StorageError::from)?
            .ok_or_else(|| HabitError::NotFound {
                kind: "completed quest",
                id: id.to_string(),
            })?;

        info!("Points quest {} uncompleted, total {}", id, total_points);
        let update = PointsUpdate { quest, total_points };
        self.broadcaster.emit(SyncEvent::PointsQuestUncompleted(update.clone()));
        self.broadcaster.emit(SyncEvent::PointsUpdated { total_points });
        Ok(update)
    }

    pub async fn delete(&self, id: i64) -> HabitResult<()> {
        let removed = self
            .db
            .delete_points_quest(id)
            .await
            .map_err(StorageError::from)?;
        if !removed {
            return Err(HabitError::NotFound { kind: "quest", id: id.to_string() });
        }

        self.broadcaster.emit(SyncEvent::PointsQuestDeleted { quest_id: id });
        Ok(())
    }
}
