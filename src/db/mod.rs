//! SQLite persistence for the playback queue.
//!
//! Uses SQLx with SQLite for lightweight, embedded storage. The queue lives
//! in two tables:
//! - `queue_entries`: one row per occurrence, keyed by position
//! - `queue_state`: a single row holding the cursor
//!
//! Every save rewrites both inside one transaction, so a crash mid-write
//! leaves the previous queue intact.
//!
//! # Example
//!
//! ```ignore
//! use queue_minder::db::{init_db, SqliteBackend};
//!
//! let pool = init_db("sqlite:queue.db").await?;
//! let backend = Arc::new(SqliteBackend::new(pool));
//! let controller = QueueController::spawn(backend, ControllerOptions::default()).await?;
//! ```

use async_trait::async_trait;
use sqlx::FromRow;
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::error::{Result, ResultExt};
use crate::queue::{OccurrenceKey, PersistedQueue, PositionCursor, QueueBackend, TrackId, TrackRef};

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "queue_minder.db";

/// Build a SQLite database URL from an optional path.
///
/// If no path is provided, uses [`DEFAULT_DB_NAME`] in the current directory.
pub fn db_url(path: Option<&std::path::Path>) -> String {
    match path {
        Some(p) => format!("sqlite:{}", p.display()),
        None => format!("sqlite:{}", DEFAULT_DB_NAME),
    }
}

/// Initialize the database connection pool and run migrations.
///
/// Creates the database file if it doesn't exist, establishes a connection
/// pool with up to 5 connections, and runs all pending migrations.
///
/// # Errors
///
/// Returns an error if:
/// - Database creation fails
/// - Connection cannot be established
/// - Migration fails
pub async fn init_db(db_url: &str) -> std::result::Result<SqlitePool, sqlx::Error> {
    if !sqlx::Sqlite::database_exists(db_url).await.unwrap_or(false) {
        sqlx::Sqlite::create_database(db_url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

#[derive(Debug, FromRow)]
struct QueueEntryRow {
    position: i64,
    track_id: i64,
    occurrence_key: String,
}

/// [`QueueBackend`] storing the queue in SQLite.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueueBackend for SqliteBackend {
    async fn load(&self) -> Result<Option<PersistedQueue>> {
        let state: Option<(Option<i64>,)> =
            sqlx::query_as("SELECT cursor FROM queue_state WHERE id = 1")
                .fetch_optional(&self.pool)
                .await
                .with_context("Failed to read queue state")?;

        let rows = sqlx::query_as::<_, QueueEntryRow>(
            "SELECT position, track_id, occurrence_key FROM queue_entries ORDER BY position",
        )
        .fetch_all(&self.pool)
        .await
        .with_context("Failed to read queue entries")?;

        if state.is_none() && rows.is_empty() {
            return Ok(None);
        }

        let tracks = rows
            .into_iter()
            .map(|row| {
                let key = OccurrenceKey::parse(&row.occurrence_key).unwrap_or_else(|| {
                    tracing::warn!(
                        position = row.position,
                        key = %row.occurrence_key,
                        "Unreadable occurrence key, minting a new one"
                    );
                    OccurrenceKey::new()
                });
                TrackRef::from_parts(TrackId(row.track_id), key)
            })
            .collect();

        let cursor = match state.and_then(|(c,)| c) {
            Some(c) if c >= 0 => PositionCursor::at(c as usize),
            _ => PositionCursor::NONE,
        };

        Ok(Some(PersistedQueue { tracks, cursor }))
    }

    async fn save(&self, tracks: &[TrackRef], cursor: PositionCursor) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .with_context("Failed to start queue transaction")?;

        sqlx::query("DELETE FROM queue_entries")
            .execute(&mut *tx)
            .await
            .with_context("Failed to clear queue entries")?;

        for (position, track) in tracks.iter().enumerate() {
            sqlx::query(
                "INSERT INTO queue_entries (position, track_id, occurrence_key) VALUES (?, ?, ?)",
            )
            .bind(position as i64)
            .bind(track.track_id().0)
            .bind(track.occurrence_key().to_string())
            .execute(&mut *tx)
            .await
            .with_context("Failed to write queue entry")?;
        }

        sqlx::query(
            r#"
            INSERT INTO queue_state (id, cursor, updated_at)
            VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                cursor = excluded.cursor,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(cursor.current().map(|c| c as i64))
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .with_context("Failed to write queue cursor")?;

        tx.commit()
            .await
            .with_context("Failed to commit queue transaction")?;

        tracing::trace!(len = tracks.len(), cursor = ?cursor.current(), "Queue saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::mint_refs;
    use crate::test_utils::temp_db;

    #[tokio::test]
    async fn test_init_db_creates_database() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db_url = format!("sqlite:{}", db_path.display());

        let pool = init_db(&db_url).await.expect("Failed to init db");
        assert!(db_path.exists());

        let backend = SqliteBackend::new(pool);
        assert!(backend.load().await.unwrap().is_none());
    }

    #[test]
    fn test_db_url() {
        assert_eq!(db_url(None), "sqlite:queue_minder.db");
        assert_eq!(
            db_url(Some(std::path::Path::new("/tmp/q.db"))),
            "sqlite:/tmp/q.db"
        );
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (pool, _dir) = temp_db().await;
        let backend = SqliteBackend::new(pool);
        let tracks = mint_refs([TrackId(4), TrackId(8), TrackId(4)]);

        backend.save(&tracks, PositionCursor::at(2)).await.unwrap();

        let loaded = backend.load().await.unwrap().unwrap();
        assert_eq!(loaded.tracks, tracks);
        assert_eq!(loaded.cursor, PositionCursor::at(2));
    }

    #[tokio::test]
    async fn test_save_replaces_previous_queue() {
        let (pool, _dir) = temp_db().await;
        let backend = SqliteBackend::new(pool);

        backend
            .save(&mint_refs([TrackId(1), TrackId(2), TrackId(3)]), PositionCursor::at(0))
            .await
            .unwrap();
        let shorter = mint_refs([TrackId(9)]);
        backend.save(&shorter, PositionCursor::NONE).await.unwrap();

        let loaded = backend.load().await.unwrap().unwrap();
        assert_eq!(loaded.tracks, shorter);
        assert_eq!(loaded.cursor, PositionCursor::NONE);
    }

    #[tokio::test]
    async fn test_empty_queue_is_still_persisted() {
        let (pool, _dir) = temp_db().await;
        let backend = SqliteBackend::new(pool);

        backend.save(&[], PositionCursor::NONE).await.unwrap();

        let loaded = backend.load().await.unwrap().unwrap();
        assert!(loaded.tracks.is_empty());
        assert_eq!(loaded.cursor, PositionCursor::NONE);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_previous_rows() {
        let (pool, _dir) = temp_db().await;
        let backend = SqliteBackend::new(pool);
        let tracks = mint_refs([TrackId(1), TrackId(2)]);
        backend.save(&tracks, PositionCursor::at(1)).await.unwrap();

        // Duplicate occurrence keys violate the UNIQUE constraint mid-transaction
        let dup = tracks[0];
        let err = backend
            .save(&[dup, dup], PositionCursor::at(0))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("queue entry"));

        let loaded = backend.load().await.unwrap().unwrap();
        assert_eq!(loaded.tracks, tracks);
        assert_eq!(loaded.cursor, PositionCursor::at(1));
    }

    #[tokio::test]
    async fn test_queue_survives_restart() {
        use crate::queue::{ControllerOptions, QueueController};
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let url = db_url(Some(&dir.path().join("queue.db")));

        let before = {
            let pool = init_db(&url).await.unwrap();
            let queue = QueueController::spawn(Arc::new(SqliteBackend::new(pool.clone())), ControllerOptions::default())
                .await
                .unwrap();
            queue
                .play_now(vec![TrackId(1), TrackId(2), TrackId(3)], 1)
                .await
                .unwrap();
            queue.move_item(0, 2).await.unwrap();
            let snapshot = queue.reader().snapshot();
            pool.close().await;
            snapshot
        };

        let pool = init_db(&url).await.unwrap();
        let queue = QueueController::spawn(Arc::new(SqliteBackend::new(pool)), ControllerOptions::default())
            .await
            .unwrap();
        let after = queue.reader().snapshot();
        assert_eq!(after.tracks(), before.tracks());
        assert_eq!(after.cursor(), Some(0));
        assert_eq!(after.current().unwrap().track_id(), TrackId(2));
    }
}
