//! Test utilities and fixtures for queue-minder tests.
//!
//! This module provides common test helpers to reduce boilerplate in tests.
//!
//! # Example
//!
//! ```ignore
//! use queue_minder::test_utils::{memory_controller, track_order};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (queue, _backend) = memory_controller(&[1, 2, 3], 0).await;
//!     assert_eq!(track_order(&queue.reader().snapshot()), vec![1, 2, 3]);
//! }
//! ```

use sqlx::sqlite::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;

use crate::queue::{ControllerOptions, MemoryBackend, QueueController, QueueSnapshot, TrackId};

/// Creates a temporary database for testing.
///
/// The database is created in a temporary directory that is automatically
/// cleaned up when the returned `TempDir` is dropped. Migrations are run
/// automatically.
///
/// Keep the TempDir alive for the duration of your test.
pub async fn temp_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("test.db");
    let db_url = format!("sqlite:{}", db_path.display());

    let pool = crate::db::init_db(&db_url)
        .await
        .expect("Failed to initialize test database");

    (pool, dir)
}

/// Track ids from plain integers.
pub fn track_ids(ids: &[i64]) -> Vec<TrackId> {
    ids.iter().copied().map(TrackId).collect()
}

/// Track ids of a snapshot, in queue order.
pub fn track_order(snapshot: &QueueSnapshot) -> Vec<i64> {
    snapshot.tracks().iter().map(|t| t.track_id().0).collect()
}

/// Controller over a [`MemoryBackend`], pre-loaded with `ids`.
///
/// An empty `ids` leaves the queue empty with no cursor.
pub async fn memory_controller(ids: &[i64], start: usize) -> (QueueController, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    let controller = QueueController::spawn(backend.clone(), ControllerOptions::default())
        .await
        .expect("Failed to start controller");
    if !ids.is_empty() {
        controller
            .play_now(track_ids(ids), start)
            .await
            .expect("Failed to seed queue");
    }
    (controller, backend)
}
