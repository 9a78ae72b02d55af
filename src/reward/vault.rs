//! Reward Vault
//!
//! Holds the parent's reward catalog and its unlock/claim state.
//! Claiming is a notification to the parent; gems are never deducted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::definition::Reward;
use crate::error::{HabitError, HabitResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RewardVault {
    rewards: Vec<Reward>,
}

impl RewardVault {
#[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reward; it starts unlocked if the player can already afford it
    pub fn create_reward(
        &mut self,
        name: &str,
        gem_cost: u64,
        player_gems: u64,
        now: DateTime<Utc>,
    ) -> HabitResult<Reward> {
        if name.trim().is_empty() {
            return Err(HabitError::validation("reward name must not be empty"));
        }
        if gem_cost == 0 {
            return Err(HabitError::validation("gem cost must be greater than zero"));
        }

        let reward = Reward::new(name, gem_cost, player_gems, now);
        info!(
            "Created reward '{}' ({} gems, unlocked: {})",
            reward.name, reward.gem_cost, reward.unlocked
        );
        self.rewards.push(reward.clone());
        Ok(reward)
    }

    pub fn claim_reward(&mut self, id: &str, now: DateTime<Utc>) -> HabitResult<Reward> {
        let reward = self
            .get_mut(id)
            .ok_or_else(|| HabitError::reward_not_found(id))?;

        if !reward.unlocked {
            return Err(HabitError::Locked);
        }
        if reward.claimed {
            return Err(HabitError::AlreadyClaimed);
        }

        reward.claimed = true;
        reward.claimed_at = Some(now);
        info!("Reward '{}' claimed", reward.name);
        Ok(reward.clone())
    }

    /// Remove a reward in any state
    pub fn delete_reward(&mut self, id: &str) -> HabitResult<Reward> {
        let pos = self
            .rewards
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| HabitError::reward_not_found(id))?;
        Ok(self.rewards.remove(pos))
    }

    /// Unlock every locked reward covered by `gems`, returning the new unlocks
    pub fn unlock_affordable(&mut self, gems: u64) -> Vec<Reward> {
        let mut newly_unlocked = Vec::new();
        for reward in self.rewards.iter_mut().filter(|r| !r.unlocked) {
            if reward.is_affordable(gems) {
                reward.unlocked = true;
                newly_unlocked.push(reward.clone());
            }
        }
        if !newly_unlocked.is_empty() {
            info!("Unlocked {} reward(s) at {} gems", newly_unlocked.len(), gems);
        }
        newly_unlocked
    }

#[cfg(test)]
    pub fn get(&self, id: &str) -> Option<&Reward> {
        self.rewards.iter().find(|r| r.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Reward> {
        self.rewards.iter_mut().find(|r| r.id == id)
    }

    pub fn all(&self) -> &[Reward] {
        &self.rewards
    }

    /// Unlocked rewards the parent has not granted yet
    pub fn pending(&self) -> impl Iterator<Item = &Reward> {
        self.rewards.iter().filter(|r| r.is_pending())
    }

#[cfg(test)]
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

#[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_unlocks_immediately_when_affordable() {
        let mut vault = RewardVault::new();
        let now = Utc::now();

        let cheap = vault.create_reward("Sticker", 3, 5, now).unwrap();
        let pricey = vault.create_reward("Movie night", 20, 5, now).unwrap();

        assert!(cheap.unlocked);
        assert!(!pricey.unlocked);
        assert_eq!(vault.len(), 2);
    }

    #[test]
    fn test_create_validation() {
        let mut vault = RewardVault::new();
        let now = Utc::now();

        assert!(matches!(
            vault.create_reward("   ", 5, 0, now),
            Err(HabitError::Validation(_))
        ));
        assert!(matches!(
            vault.create_reward("Ice cream", 0, 0, now),
            Err(HabitError::Validation(_))
        ));
        assert!(vault.is_empty());
    }

    #[test]
    fn test_unlock_is_idempotent_and_one_way() {
        let mut vault = RewardVault::new();
        let now = Utc::now();
        vault.create_reward("Park trip", 5, 0, now).unwrap();
        vault.create_reward("Bike ride", 8, 0, now).unwrap();

        let first = vault.unlock_affordable(6);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].name, "Park trip");

        assert!(vault.unlock_affordable(6).is_empty());

        // Fewer gems later never re-locks anything
        assert!(vault.unlock_affordable(0).is_empty());
        assert_eq!(vault.all().iter().filter(|r| r.unlocked).count(), 1);
    }

    #[test]
    fn test_claim_state_machine() {
        let mut vault = RewardVault::new();
        let now = Utc::now();
        let locked = vault.create_reward("Pizza", 10, 0, now).unwrap();

        assert!(matches!(vault.claim_reward(&locked.id, now), Err(HabitError::Locked)));

        vault.unlock_affordable(10);
        let claimed = vault.claim_reward(&locked.id, now).unwrap();
        assert!(claimed.claimed);
        assert_eq!(claimed.claimed_at, Some(now));

        assert!(matches!(
            vault.claim_reward(&locked.id, now),
            Err(HabitError::AlreadyClaimed)
        ));
        assert!(matches!(
            vault.claim_reward("missing", now),
            Err(HabitError::NotFound { .. })
        ));
    }

    #[test]
    fn test_delete_in_any_state() {
        let mut vault = RewardVault::new();
        let now = Utc::now();
        let reward = vault.create_reward("Zoo", 1, 1, now).unwrap();
        vault.claim_reward(&reward.id, now).unwrap();

        let removed = vault.delete_reward(&reward.id).unwrap();
        assert_eq!(removed.id, reward.id);
        assert!(vault.is_empty());
        assert!(vault.delete_reward(&reward.id).is_err());
    }
}
