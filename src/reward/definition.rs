//! Reward Definition Structures
//!
//! A reward is something the parent promises in real life (a movie night,
//! extra screen time). It unlocks once the child has enough gems.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A parent-defined redeemable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub id: String,
    pub name: String,
    pub gem_cost: u64,
    /// One-way: never goes back to false
    pub unlocked: bool,
    pub claimed: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
}

impl Reward {
    pub fn new(name: &str, gem_cost: u64, player_gems: u64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            name: name.trim().to_string(),
            gem_cost,
            unlocked: player_gems >= gem_cost,
            claimed: false,
            created_at: now,
            claimed_at: None,
        }
    }

    pub fn is_affordable(&self, gems: u64) -> bool {
        gems >= self.gem_cost
    }

    /// Unlocked and waiting for the parent to grant it
    pub fn is_pending(&self) -> bool {
        self.unlocked && !self.claimed
    }
}
