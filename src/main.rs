use std::{net::SocketAddr, sync::Arc};

use tracing::{error, info, warn};

mod auth;
mod config;
mod dashboard;
mod db;
mod error;
mod game;
mod http;
mod points;
mod progression;
mod quest;
mod reward;
mod storage;
mod sync;

use auth::ParentAuth;
use config::ServerConfig;
use db::Database;
use game::GameService;
use points::PointsBoard;
use quest::{HotReloadEvent, QuestCatalog};
use storage::{Clock, Storage, SystemClock};
use sync::Broadcaster;

/// Points board database used when game state is kept in memory
const MEMORY_POINTS_DATABASE: &str = "sqlite::memory:";

fn start_catalog_watcher(catalog: &Arc<QuestCatalog>) {
    match catalog.start_file_watcher() {
        Ok(mut rx) => {
            // Spawn task to log reload events
            tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    match event {
                        HotReloadEvent::Reloaded(path) => {
                            info!("Catalog hot-reload: {}", path);
                        }
                        HotReloadEvent::Error(e) => {
                            error!("Catalog hot-reload error: {}", e);
                        }
                    }
                }
            });
            info!("Catalog hot-reload enabled");
        }
        Err(e) => {
            warn!("Failed to start catalog hot-reload: {}", e);
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

#[tokio::main]
async fn main() {
    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "habit_hero=info".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Game state goes to the same database as the points board unless
    // configured for memory
    let database_url = if config.uses_memory_storage() {
        MEMORY_POINTS_DATABASE
    } else {
        config.database_url.as_str()
    };
    let db = match Database::new(database_url).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to initialize database {}: {}", database_url, e);
            std::process::exit(1);
        }
    };
    let storage = if config.uses_memory_storage() {
        info!("Game state is kept in memory only");
        Storage::memory()
    } else {
        Storage::Sqlite(Arc::clone(&db))
    };

    // Load the quest catalog from TOML files
    let catalog = Arc::new(QuestCatalog::new(&config.catalog_dir()));
    if let Err(e) = catalog.load_all().await {
        error!("Failed to load quest catalog: {}", e);
    }
    if cfg!(debug_assertions) {
        start_catalog_watcher(&catalog);
    }

    let parent_auth = match ParentAuth::new(&config.parent_password, config.parent_session_secs) {
        Ok(auth) => auth,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let broadcaster = Broadcaster::new(config.policy.broadcast_capacity);
    let game = Arc::new(GameService::new(
        storage,
        catalog,
        broadcaster.clone(),
        Arc::clone(&clock),
        config.policy.clone(),
    ));
    let points = Arc::new(PointsBoard::new(Arc::clone(&db), broadcaster, clock));

    // Apply a due daily reset before the first client shows up
    match game.current_state().await {
        Ok(state) => info!(
            "Loaded game state: level {}, {} quests, revision {}",
            state.player.level,
            state.quests.quests.len(),
            state.revision
        ),
        Err(e) => warn!("Failed to load game state: {}", e),
    }

    let app = http::build_router(http::AppState::new(game, points, parent_auth));

    let listener = match tokio::net::TcpListener::bind(&config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", config.bind_addr, e);
            std::process::exit(1);
        }
    };
    info!("Habit Hero server listening on http://{}", config.bind_addr);

    if let Err(e) = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }

    db.close().await;
    info!("Database closed");
}
