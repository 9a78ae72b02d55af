use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::points::PointsQuest;

const TOTAL_POINTS_KEY: &str = "total_points";

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = if database_url.contains(":memory:") || database_url.contains("mode=memory") {
            // Every connection to an in-memory database is a separate database
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = options.connect(database_url).await?;

        // Run migrations
        Self::migrate(&pool).await?;

        Ok(Self { pool })
    }

    async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        // Game snapshot, one JSON document per storage key
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        // Points quest board
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                points INTEGER NOT NULL,
                completed INTEGER DEFAULT 0,
                created_at TEXT NOT NULL,
                completed_at TEXT
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, '0')")
            .bind(TOTAL_POINTS_KEY)
            .execute(pool)
            .await?;

        tracing::info!("Database migrations complete");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ========================================================================
    // Key/value snapshot
    // ========================================================================

    pub async fn load_value(&self, key: &str) -> Result<Option<String>, sqlx::Error> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get("value")))
    }

    /// Write every entry or none of them
    pub async fn save_values(&self, entries: &[(&str, String)]) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        for (key, value) in entries {
            sqlx::query(
                r#"INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP"#,
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    // ========================================================================
    // Points quests
    // ========================================================================

    pub async fn list_points_quests(&self) -> Result<Vec<PointsQuest>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, title, points, completed, created_at, completed_at FROM quests ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_points_quest).collect())
    }

    pub async fn create_points_quest(
        &self,
        title: &str,
        points: i64,
        now: DateTime<Utc>,
    ) -> Result<PointsQuest, sqlx::Error> {
        let created_at = timestamp(now);
        let result = sqlx::query(
            "INSERT INTO quests (title, points, completed, created_at) VALUES (?, ?, 0, ?)",
        )
        .bind(title)
        .bind(points)
        .bind(&created_at)
        .execute(&self.pool)
        .await?;

        tracing::info!("Created points quest: {} (id: {})", title, result.last_insert_rowid());
        Ok(PointsQuest {
            id: result.last_insert_rowid(),
            title: title.to_string(),
            points,
            completed: false,
            created_at,
            completed_at: None,
        })
    }

    /// Mark done and add its points to the total in one transaction.
    /// Returns `None` if the quest is missing or already completed.
    pub async fn complete_points_quest(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<(PointsQuest, i64)>, sqlx::Error> {
        self.set_points_quest_completed(id, Some(timestamp(now))).await
    }

    /// Reverse a completion and subtract its points in one transaction.
    /// Returns `None` if the quest is missing or not completed.
    pub async fn uncomplete_points_quest(&self, id: i64) -> Result<Option<(PointsQuest, i64)>, sqlx::Error> {
        self.set_points_quest_completed(id, None).await
    }

    async fn set_points_quest_completed(
        &self,
        id: i64,
        completed_at: Option<String>,
    ) -> Result<Option<(PointsQuest, i64)>, sqlx::Error> {
        let completing = completed_at.is_some();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT points, completed FROM quests WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let points: i64 = row.get("points");
        let completed: bool = row.get::<i64, _>("completed") != 0;
        if completed == completing {
            return Ok(None);
        }

        sqlx::query("UPDATE quests SET completed = ?, completed_at = ? WHERE id = ?")
            .bind(completing as i64)
            .bind(&completed_at)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let delta = if completing { points } else { -points };
        sqlx::query("UPDATE settings SET value = CAST(CAST(value AS INTEGER) + ? AS TEXT) WHERE key = ?")
            .bind(delta)
            .bind(TOTAL_POINTS_KEY)
            .execute(&mut *tx)
            .await?;

        let quest_row = sqlx::query(
            "SELECT id, title, points, completed, created_at, completed_at FROM quests WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        let total = read_total_points(&mut *tx).await?;

        tx.commit().await?;
        Ok(Some((row_to_points_quest(&quest_row), total)))
    }

    pub async fn delete_points_quest(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM quests WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn total_points(&self) -> Result<i64, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        read_total_points(&mut *conn).await
    }
}

async fn read_total_points(conn: &mut sqlx::SqliteConnection) -> Result<i64, sqlx::Error> {
    let value: Option<String> = sqlx::query("SELECT value FROM settings WHERE key = ?")
        .bind(TOTAL_POINTS_KEY)
        .fetch_optional(&mut *conn)
        .await?
        .map(|r| r.get("value"));

    Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
}

fn row_to_points_quest(r: &sqlx::sqlite::SqliteRow) -> PointsQuest {
    PointsQuest {
        id: r.get("id"),
        title: r.get("title"),
        points: r.get("points"),
        completed: r.get::<i64, _>("completed") != 0,
        created_at: r.get("created_at"),
        completed_at: r.get("completed_at"),
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
