//! Storage adapter and clock.
//!
//! Game state is persisted as one JSON document per key. The in-memory
//! backend serves tests and `database_url = "memory"`; the SQLite backend
//! writes a whole snapshot in one transaction.

use std::collections::HashMap;
#[cfg(test)]
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::db::Database;
use crate::error::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    Player,
    Quests,
    RewardVault,
    PetName,
    TasksCompleted,
    LastDailyReset,
    ObjectCooldowns,
    Revision,
}

impl StorageKey {
    #[cfg(test)]
    pub const ALL: [StorageKey; 8] = [
        StorageKey::Player,
        StorageKey::Quests,
        StorageKey::RewardVault,
        StorageKey::PetName,
        StorageKey::TasksCompleted,
        StorageKey::LastDailyReset,
        StorageKey::ObjectCooldowns,
        StorageKey::Revision,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::Player => "habitHeroPlayer",
            StorageKey::Quests => "habitHeroQuests",
            StorageKey::RewardVault => "habitHeroRewardVault",
            StorageKey::PetName => "habitHeroPetName",
            StorageKey::TasksCompleted => "habitHeroTasksCompleted",
            StorageKey::LastDailyReset => "habitHeroLastDailyReset",
            StorageKey::ObjectCooldowns => "habitHeroObjectCooldowns",
            StorageKey::Revision => "habitHeroRevision",
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryStorage {
    values: Arc<RwLock<HashMap<StorageKey, Value>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Clone)]
pub enum Storage {
    Memory(MemoryStorage),
    Sqlite(Arc<Database>),
}

impl Storage {
    pub fn memory() -> Self {
        Storage::Memory(MemoryStorage::new())
    }

    pub async fn load(&self, key: StorageKey) -> Result<Option<Value>, StorageError> {
        match self {
            Storage::Memory(mem) => Ok(mem.values.read().await.get(&key).cloned()),
            Storage::Sqlite(db) => match db.load_value(key.as_str()).await? {
                Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
                None => Ok(None),
            },
        }
    }

    /// Persist every entry or none
    pub async fn save_all(&self, entries: Vec<(StorageKey, Value)>) -> Result<(), StorageError> {
        match self {
            Storage::Memory(mem) => {
                let mut values = mem.values.write().await;
                values.extend(entries);
                Ok(())
            }
            Storage::Sqlite(db) => {
                let encoded = entries
                    .iter()
                    .map(|(key, value)| Ok((key.as_str(), serde_json::to_string(value)?)))
                    .collect::<Result<Vec<_>, serde_json::Error>>()?;
                db.save_values(&encoded).await?;
                Ok(())
            }
        }
    }
}

// ============================================================================
// Clock
// ============================================================================

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Calendar day used by the daily reset
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests
#[cfg(test)]
pub struct ManualClock {
    millis: AtomicI64,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: chrono::Duration) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use tempfile::TempDir;

    async fn exercise(storage: Storage) {
        assert_eq!(storage.load(StorageKey::Player).await.unwrap(), None);

        storage
            .save_all(vec![
                (StorageKey::Player, json!({"level": 2})),
                (StorageKey::PetName, json!("Sparky")),
            ])
            .await
            .unwrap();
        storage
            .save_all(vec![(StorageKey::PetName, Value::Null)])
            .await
            .unwrap();

        assert_eq!(
            storage.load(StorageKey::Player).await.unwrap(),
            Some(json!({"level": 2}))
        );
        assert_eq!(storage.load(StorageKey::PetName).await.unwrap(), Some(Value::Null));
    }

    #[tokio::test]
    async fn test_memory_storage() {
        exercise(Storage::memory()).await;
    }

    #[tokio::test]
    async fn test_sqlite_storage() {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("kv.db").display());
        let db = Arc::new(Database::new(&url).await.unwrap());
        exercise(Storage::Sqlite(db)).await;
    }

    #[test]
    fn test_keys_are_distinct() {
        let mut names: Vec<&str> = StorageKey::ALL.iter().map(|k| k.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), StorageKey::ALL.len());
        assert!(names.iter().all(|n| n.starts_with("habitHero")));
    }

    #[test]
    fn test_manual_clock() {
        let start = DateTime::parse_from_rfc3339("2026-03-01T23:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::hours(1));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
    }
}
