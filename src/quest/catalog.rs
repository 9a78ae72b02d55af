//! Quest Catalog
//!
//! Loads rooms, daily templates and object-tier templates from TOML files.
//! Falls back to a built-in catalog when the directory is missing or holds
//! nothing usable. Supports hot-reloading during development.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::definition::{ObjectQuestTemplate, QuestTemplate, RawCatalogFile, RoomDefinition};
use crate::progression::RoomId;

/// Catalog shipped with the server
const BUILTIN_CATALOG: &str = r#"
[[room]]
id = "kitchen"
name = "Kitchen"

[[room]]
id = "bedroom"
name = "Bedroom"

[[room]]
id = "bathroom"
name = "Bathroom"

[[room]]
id = "living_room"
name = "Living Room"

[[room]]
id = "garden"
name = "Garden"

[[daily]]
name = "Brush Your Teeth"
description = "Brush your teeth in the morning and before bed"
difficulty = "easy"
xp_reward = 10

[[daily]]
name = "Make Your Bed"
description = "Straighten the sheets and fluff the pillow"
difficulty = "easy"
xp_reward = 15

[[daily]]
name = "Reading Time"
description = "Read a book for twenty minutes"
difficulty = "medium"
xp_reward = 25

[[object]]
room = "kitchen"
object_type = "sink"
tier = 1
name = "Rinse the Cups"
description = "Rinse your cup and put it next to the sink"
difficulty = "easy"
xp_reward = 15

[[object]]
room = "kitchen"
object_type = "sink"
tier = 3
name = "Dish Duty"
description = "Wash and dry the dishes after dinner"
difficulty = "medium"
xp_reward = 40

[[object]]
room = "kitchen"
object_type = "table"
tier = 1
name = "Set the Table"
description = "Put out plates, cups and forks for everyone"
difficulty = "easy"
xp_reward = 20

[[object]]
room = "bedroom"
object_type = "toybox"
tier = 1
name = "Toy Round-Up"
description = "Put every toy on the floor back in the toy box"
difficulty = "easy"
xp_reward = 20

[[object]]
room = "bedroom"
object_type = "closet"
tier = 2
name = "Fold the Laundry"
description = "Fold your clean clothes and put them away"
difficulty = "medium"
xp_reward = 35

[[object]]
room = "bathroom"
object_type = "bathtub"
tier = 2
name = "Scrub the Tub"
description = "Help scrub the bathtub until it shines"
difficulty = "hard"
xp_reward = 50

[[object]]
room = "living_room"
object_type = "couch"
tier = 1
name = "Cushion Patrol"
description = "Put the couch cushions and blankets back in place"
difficulty = "easy"
xp_reward = 15

[[object]]
room = "garden"
object_type = "plant"
tier = 1
name = "Water the Plants"
description = "Give every plant in the garden a drink"
difficulty = "easy"
xp_reward = 20

[[object]]
room = "garden"
object_type = "plant"
tier = 4
name = "Weed Warrior"
description = "Pull the weeds from one flower bed"
difficulty = "hard"
xp_reward = 60
"#;

#[derive(Debug, Clone, Default)]
struct CatalogData {
    rooms: Vec<RoomDefinition>,
    daily: Vec<QuestTemplate>,
    objects: Vec<ObjectQuestTemplate>,
}

impl CatalogData {
    fn is_empty(&self) -> bool {
        self.rooms.is_empty() && self.daily.is_empty() && self.objects.is_empty()
    }

    /// Merge one parsed file. Bad entries are skipped, not fatal.
    fn absorb(&mut self, raw: RawCatalogFile, origin: &str) {
        for room in raw.room {
            if room.id.trim().is_empty() {
                warn!("Skipping room with empty id in {}", origin);
                continue;
            }
            let id = RoomId::new(room.id);
            self.rooms.retain(|r| r.id != id);
            self.rooms.push(RoomDefinition { id, name: room.name });
        }

        for raw_daily in &raw.daily {
            match QuestTemplate::from_raw(raw_daily) {
                Ok(template) => self.daily.push(template),
                Err(e) => warn!("Skipping daily template in {}: {}", origin, e),
            }
        }

        for raw_object in &raw.object {
            match ObjectQuestTemplate::from_raw(raw_object) {
                Ok(template) => self.objects.push(template),
                Err(e) => warn!("Skipping object template in {}: {}", origin, e),
            }
        }
    }

    fn builtin() -> Self {
        let mut data = Self::default();
        match toml::from_str::<RawCatalogFile>(BUILTIN_CATALOG) {
            Ok(raw) => data.absorb(raw, "built-in catalog"),
            Err(e) => error!("Built-in catalog failed to parse: {}", e),
        }
        data
    }
}

/// Registry of rooms and quest templates
pub struct QuestCatalog {
    data: RwLock<CatalogData>,
    /// Directory holding catalog TOML files
    catalog_dir: PathBuf,
}

impl QuestCatalog {
    pub fn new(catalog_dir: &Path) -> Self {
        Self {
            data: RwLock::new(CatalogData::builtin()),
            catalog_dir: catalog_dir.to_path_buf(),
        }
    }

    /// Catalog with only the built-in content and no directory behind it
    #[cfg(test)]
    pub fn builtin() -> Self {
        Self::new(Path::new(""))
    }

    /// Load all catalog files, replacing the current content in one swap
    pub async fn load_all(&self) -> Result<(), String> {
        info!("Loading quest catalog from {:?}", self.catalog_dir);

        if !self.catalog_dir.is_dir() {
            warn!(
                "Catalog directory {:?} does not exist, using built-in catalog",
                self.catalog_dir
            );
            *self.data.write().await = CatalogData::builtin();
            return Ok(());
        }

        // Collect all TOML files first, then parse them
        let mut paths = Vec::new();
        collect_toml_files(&self.catalog_dir, &mut paths)?;
        paths.sort();

        let mut data = CatalogData::default();
        let mut file_count = 0;
        for path in &paths {
            match load_catalog_file(path) {
                Ok(raw) => {
                    data.absorb(raw, &path.to_string_lossy());
                    file_count += 1;
                }
                Err(e) => warn!("Failed to load catalog file {:?}: {}", path, e),
            }
        }

        if data.is_empty() {
            warn!("No usable catalog entries found, using built-in catalog");
            data = CatalogData::builtin();
        } else {
            info!(
                "Loaded {} catalog files: {} rooms, {} daily templates, {} object templates",
                file_count,
                data.rooms.len(),
                data.daily.len(),
                data.objects.len()
            );
        }

        *self.data.write().await = data;
        Ok(())
    }

    pub async fn rooms(&self) -> Vec<RoomDefinition> {
        self.data.read().await.rooms.clone()
    }

    pub async fn has_room(&self, room: &RoomId) -> bool {
        self.data.read().await.rooms.iter().any(|r| &r.id == room)
    }

    pub async fn daily_templates(&self) -> Vec<QuestTemplate> {
        self.data.read().await.daily.clone()
    }

    /// Templates for one kind of object in one room (type match is case-insensitive)
    pub async fn object_templates(&self, room: &RoomId, object_type: &str) -> Vec<ObjectQuestTemplate> {
        let object_type = object_type.to_lowercase();
        self.data
            .read()
            .await
            .objects
            .iter()
            .filter(|t| &t.room == room && t.object_type == object_type)
            .cloned()
            .collect()
    }

    /// Start file watcher for hot-reload.
    /// Returns a channel receiver that signals when reloads occur.
    pub fn start_file_watcher(
        self: &Arc<Self>,
    ) -> Result<tokio::sync::mpsc::Receiver<HotReloadEvent>, String> {
        use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
        use std::time::Duration;

        if !self.catalog_dir.is_dir() {
            return Err(format!("Catalog directory {:?} does not exist", self.catalog_dir));
        }

        let (tx, rx) = tokio::sync::mpsc::channel(32);
        let catalog = Arc::clone(self);
        let catalog_dir = self.catalog_dir.clone();
        let rt = tokio::runtime::Handle::try_current()
            .map_err(|e| format!("File watcher needs a tokio runtime: {}", e))?;

        // notify is sync, so the watcher lives on its own thread
        std::thread::spawn(move || {
            let (notify_tx, notify_rx) = std::sync::mpsc::channel();

            let mut watcher = match RecommendedWatcher::new(
                move |res: Result<notify::Event, notify::Error>| {
                    if let Ok(event) = res {
                        let _ = notify_tx.send(event);
                    }
                },
                Config::default().with_poll_interval(Duration::from_secs(1)),
            ) {
                Ok(w) => w,
                Err(e) => {
                    error!("Failed to create file watcher: {}", e);
                    return;
                }
            };

            if let Err(e) = watcher.watch(&catalog_dir, RecursiveMode::Recursive) {
                error!("Failed to watch catalog directory: {}", e);
                return;
            }

            info!("Catalog hot-reload watcher started for {:?}", catalog_dir);

            while let Ok(event) = notify_rx.recv() {
                if !matches!(
                    event.kind,
                    EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                ) {
                    continue;
                }

                let Some(path) = event
                    .paths
                    .iter()
                    .find(|p| p.extension().map_or(false, |ext| ext == "toml"))
                    .cloned()
                else {
                    continue;
                };

                info!("Detected change in {:?}, reloading catalog", path);
                let catalog = Arc::clone(&catalog);
                let tx = tx.clone();
                rt.spawn(async move {
                    let result = match catalog.load_all().await {
                        Ok(()) => HotReloadEvent::Reloaded(path.to_string_lossy().to_string()),
                        Err(e) => {
                            error!("Catalog hot-reload failed: {}", e);
                            HotReloadEvent::Error(e)
                        }
                    };
                    let _ = tx.send(result).await;
                });
            }
        });

        Ok(rx)
    }
}

/// Recursively collect TOML files (non-async to avoid boxing)
fn collect_toml_files(dir: &Path, paths: &mut Vec<PathBuf>) -> Result<(), String> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| format!("Failed to read directory {:?}: {}", dir, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| format!("Failed to read entry: {}", e))?;
        let path = entry.path();

        if path.is_dir() {
            collect_toml_files(&path, paths)?;
        } else if path.extension().map_or(false, |ext| ext == "toml") {
            paths.push(path);
        }
    }

    Ok(())
}

fn load_catalog_file(path: &Path) -> Result<RawCatalogFile, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
    toml::from_str(&content).map_err(|e| format!("Failed to parse {:?}: {}", path, e))
}

/// Events from the hot-reload watcher
#[derive(Debug, Clone)]
pub enum HotReloadEvent {
    /// The catalog was reloaded after a change to this file
    Reloaded(String),
    /// An error occurred during reload
    Error(String),
}
