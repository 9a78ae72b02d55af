//! Quest State Tracking
//!
//! Lifecycle status of a quest and the per-object cooldown records.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::definition::Quest;

/// Status of a quest in the player's log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    /// Created, not yet accepted
    Pending,
    /// Accepted by the player, in progress
    Accepted,
    /// Done (terminal)
    Completed,
}

impl QuestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestStatus::Pending => "pending",
            QuestStatus::Accepted => "accepted",
            QuestStatus::Completed => "completed",
        }
    }

    /// Position on the dashboard hill chart
    pub fn progress_percent(&self) -> u8 {
        match self {
            QuestStatus::Pending => 0,
            QuestStatus::Accepted => 50,
            QuestStatus::Completed => 100,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QuestStatus::Completed)
    }
}

impl Quest {
    pub fn status(&self) -> QuestStatus {
        if self.completed {
            QuestStatus::Completed
        } else if self.accepted_by_player {
            QuestStatus::Accepted
        } else {
            QuestStatus::Pending
        }
    }
}

/// Last completion time per object-sourced quest source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectCooldowns {
    last_completed: BTreeMap<String, DateTime<Utc>>,
}

impl ObjectCooldowns {
    /// Record a completion and forget sources whose window has passed
    pub fn record(&mut self, source_id: &str, at: DateTime<Utc>, cooldown: Duration) {
        self.last_completed.retain(|_, last| at - *last < cooldown);
        self.last_completed.insert(source_id.to_string(), at);
    }

    pub fn last_completed(&self, source_id: &str) -> Option<DateTime<Utc>> {
        self.last_completed.get(source_id).copied()
    }

    /// True if the source was never completed or the window has passed
    pub fn can_accept(&self, source_id: &str, now: DateTime<Utc>, cooldown: Duration) -> bool {
        self.remaining(source_id, now, cooldown).is_none()
    }

    /// Time left in the cooldown window, if any
    pub fn remaining(&self, source_id: &str, now: DateTime<Utc>, cooldown: Duration) -> Option<Duration> {
        let last = self.last_completed(source_id)?;
        let elapsed = now - last;
        if elapsed >= cooldown {
            None
        } else {
            Some(cooldown - elapsed)
        }
    }
}
