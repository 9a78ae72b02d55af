//! Error types for the quest, progression and reward core.

use thiserror::Error;

/// Failures of the storage adapter. Always fatal to the operation that hit them.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors returned by game operations.
///
/// A rejected operation never leaves a partial mutation behind.
#[derive(Debug, Error)]
pub enum HabitError {
    /// Bad input on creation (empty name, zero cost, ...)
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("quest has not been accepted yet")]
    NotAccepted,

    #[error("quest was already accepted")]
    AlreadyAccepted,

    #[error("quest is already completed")]
    AlreadyCompleted,

    #[error("daily quests cannot be deleted")]
    DailyQuestProtected,

    #[error("reward is still locked")]
    Locked,

    #[error("reward was already claimed")]
    AlreadyClaimed,

    /// Object-sourced quest offered again inside its cooldown window
    #[error("object is cooling down for another {remaining_secs}s")]
    CoolingDown { remaining_secs: i64 },

    #[error("object already has an unfinished quest")]
    ObjectBusy,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl HabitError {
    pub fn validation(msg: impl Into<String>) -> Self {
        HabitError::Validation(msg.into())
    }

    pub fn quest_not_found(id: &str) -> Self {
        HabitError::NotFound { kind: "quest", id: id.to_string() }
    }

    pub fn reward_not_found(id: &str) -> Self {
        HabitError::NotFound { kind: "reward", id: id.to_string() }
    }

    /// Stable snake_case code used in HTTP error bodies
    pub fn code(&self) -> &'static str {
        match self {
            HabitError::Validation(_) => "validation",
            HabitError::NotFound { .. } => "not_found",
            HabitError::NotAccepted => "not_accepted",
            HabitError::AlreadyAccepted => "already_accepted",
            HabitError::AlreadyCompleted => "already_completed",
            HabitError::DailyQuestProtected => "daily_protected",
            HabitError::Locked => "locked",
            HabitError::AlreadyClaimed => "already_claimed",
            HabitError::CoolingDown { .. } => "cooling_down",
            HabitError::ObjectBusy => "object_busy",
            HabitError::Storage(_) => "storage",
        }
    }
}

pub type HabitResult<T> = Result<T, HabitError>;
