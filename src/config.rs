//! Server configuration
//!
//! Loaded from a TOML file whose path comes from `HABIT_HERO_CONFIG`
//! (default `habit-hero.toml`). Every field has a default, so a missing
//! file just means a default server.

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::Deserialize;
use tracing::{info, warn};

pub const CONFIG_ENV_VAR: &str = "HABIT_HERO_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "habit-hero.toml";

/// Special `database_url` value that keeps game state in memory only
pub const MEMORY_DATABASE: &str = "memory";

/// Longest object cooldown accepted from config (one year)
const MAX_OBJECT_COOLDOWN_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// sqlx connection string, or `memory` for pure in-memory game storage
    pub database_url: String,
    /// Root of the data directory (the quest catalog lives in `<data_dir>/catalog`)
    pub data_dir: PathBuf,
    /// Shared parent password. Stored in plain text in the config file.
    pub parent_password: String,
    pub parent_session_secs: u64,
    pub policy: GamePolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            database_url: "sqlite:habit-hero.db?mode=rwc".to_string(),
            data_dir: PathBuf::from("data"),
            parent_password: "parent".to_string(),
            parent_session_secs: 3600,
            policy: GamePolicy::default(),
        }
    }
}

/// Tunable rules of the game.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GamePolicy {
    /// Completions needed at a level before XP can carry the player past it
    pub tasks_per_level: u32,
    /// Hard cap on unfinished quests per required level
    pub per_level_task_cap: usize,
    /// Total unfinished quests at which the parent gets a soft warning
    pub task_warning_threshold: usize,
    pub object_cooldown_hours: i64,
    pub broadcast_capacity: usize,
}

impl Default for GamePolicy {
    fn default() -> Self {
        Self {
            tasks_per_level: 5,
            per_level_task_cap: 15,
            task_warning_threshold: 10,
            object_cooldown_hours: 24,
            broadcast_capacity: 256,
        }
    }
}

impl GamePolicy {
    pub fn object_cooldown(&self) -> Duration {
        Duration::hours(self.object_cooldown_hours)
    }
}

impl ServerConfig {
    /// Load from the path in `HABIT_HERO_CONFIG`, or the default path
    pub fn load() -> Result<Self, String> {
        let path = std::env::var(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            warn!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
        let config = Self::from_toml(&content)
            .map_err(|e| format!("Failed to parse {:?}: {}", path, e))?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, String> {
        let config: ServerConfig = toml::from_str(content).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.parent_password.is_empty() {
            return Err("parent_password must not be empty".to_string());
        }
        if self.policy.tasks_per_level == 0 {
            return Err("policy.tasks_per_level must be at least 1".to_string());
        }
        if self.policy.object_cooldown_hours < 0 {
            return Err("policy.object_cooldown_hours must not be negative".to_string());
        }
        if self.policy.object_cooldown_hours > MAX_OBJECT_COOLDOWN_HOURS {
            return Err(format!(
                "policy.object_cooldown_hours must be at most {}",
                MAX_OBJECT_COOLDOWN_HOURS
            ));
        }
        if self.policy.broadcast_capacity == 0 {
            return Err("policy.broadcast_capacity must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn uses_memory_storage(&self) -> bool {
        self.database_url == MEMORY_DATABASE
    }

    pub fn catalog_dir(&self) -> PathBuf {
        self.data_dir.join("catalog")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_file_missing() {
        let config = ServerConfig::load_from(Path::new("/nonexistent/habit-hero.toml")).unwrap();
        assert_eq!(config.policy.tasks_per_level, 5);
        assert_eq!(config.policy.per_level_task_cap, 15);
        assert_eq!(config.policy.task_warning_threshold, 10);
        assert_eq!(config.policy.object_cooldown(), Duration::hours(24));
    }

    #[test]
    fn test_partial_policy_override() {
        let config = ServerConfig::from_toml(
            r#"
bind_addr = "127.0.0.1:8080"
database_url = "memory"

[policy]
per_level_task_cap = 5
"#,
        )
        .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert!(config.uses_memory_storage());
        assert_eq!(config.policy.per_level_task_cap, 5);
        // Untouched fields keep their defaults
        assert_eq!(config.policy.tasks_per_level, 5);
        assert_eq!(config.parent_session_secs, 3600);
    }

    #[test]
    fn test_rejects_empty_password() {
        assert!(ServerConfig::from_toml("parent_password = \"\"").is_err());
    }

    #[test]
    fn test_object_cooldown_is_bounded() {
        let year = ServerConfig::from_toml("[policy]\nobject_cooldown_hours = 8760").unwrap();
        assert_eq!(year.policy.object_cooldown(), Duration::hours(24 * 365));

        assert!(ServerConfig::from_toml("[policy]\nobject_cooldown_hours = 8761").is_err());
        assert!(ServerConfig::from_toml("[policy]\nobject_cooldown_hours = 9223372036854775807").is_err());
        assert!(ServerConfig::from_toml("[policy]\nobject_cooldown_hours = -1").is_err());
    }
}
