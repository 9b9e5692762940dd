//! Queue mutation commands.

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{debug, info};

use crate::config;
use crate::db::{self, SqliteBackend};
use crate::queue::{ControllerOptions, QueueController, TrackId};

/// Open the persisted queue behind a controller.
///
/// `db_path` overrides the configured database file.
pub(super) async fn open_queue(db_path: Option<&Path>) -> anyhow::Result<QueueController> {
    let config = config::load();
    let path = db_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.queue.database_path());

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let url = db::db_url(Some(&path));
    debug!("Opening queue database {}", url);
    let pool = db::init_db(&url)
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))?;

    let controller = QueueController::spawn(
        Arc::new(SqliteBackend::new(pool)),
        ControllerOptions::from(&config),
    )
    .await?;
    Ok(controller)
}

fn track_ids(ids: &[i64]) -> Vec<TrackId> {
    ids.iter().copied().map(TrackId).collect()
}

/// Print the one-line state summary after a mutation.
fn print_summary(queue: &QueueController) {
    let snapshot = queue.reader().snapshot();
    match snapshot.current() {
        Some(track) => println!(
            "{} tracks queued, playing #{} (track {})",
            snapshot.len(),
            snapshot.cursor().unwrap_or_default(),
            track.track_id()
        ),
        None if snapshot.is_empty() => println!("Queue is empty"),
        None => println!("{} tracks queued, nothing playing", snapshot.len()),
    }
}

/// Replace the queue and start at `start`
pub fn cmd_play(rt: &Runtime, db_path: Option<&Path>, ids: &[i64], start: usize) -> anyhow::Result<()> {
    rt.block_on(async {
        let queue = open_queue(db_path).await?;
        queue.play_now(track_ids(ids), start).await?;
        info!(count = ids.len(), start, "Started new queue");
        print_summary(&queue);
        Ok(())
    })
}

/// Append to the end of the queue
pub fn cmd_add(rt: &Runtime, db_path: Option<&Path>, ids: &[i64]) -> anyhow::Result<()> {
    rt.block_on(async {
        let queue = open_queue(db_path).await?;
        queue.enqueue(track_ids(ids)).await?;
        println!("Added {} tracks", ids.len());
        print_summary(&queue);
        Ok(())
    })
}

/// Insert after the current entry, or move a queued entry there
pub fn cmd_next(
    rt: &Runtime,
    db_path: Option<&Path>,
    ids: &[i64],
    from_queue: Option<usize>,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let queue = open_queue(db_path).await?;
        if let Some(index) = from_queue {
            queue.play_next_from_queue(index).await?;
            println!("Moved #{} to play next", index);
        } else {
            queue.play_next(track_ids(ids)).await?;
            println!("{} tracks will play next", ids.len());
        }
        print_summary(&queue);
        Ok(())
    })
}

/// Remove one entry
pub fn cmd_remove(rt: &Runtime, db_path: Option<&Path>, index: usize) -> anyhow::Result<()> {
    rt.block_on(async {
        let queue = open_queue(db_path).await?;
        let removed = queue.remove_at(index).await?;
        println!("Removed #{} (track {})", index, removed.track_id());
        print_summary(&queue);
        Ok(())
    })
}

/// Move one entry
pub fn cmd_move(rt: &Runtime, db_path: Option<&Path>, from: usize, to: usize) -> anyhow::Result<()> {
    rt.block_on(async {
        let queue = open_queue(db_path).await?;
        queue.move_item(from, to).await?;
        println!("Moved #{} to #{}", from, to);
        print_summary(&queue);
        Ok(())
    })
}

/// Point the cursor at an entry
pub fn cmd_jump(rt: &Runtime, db_path: Option<&Path>, index: usize) -> anyhow::Result<()> {
    rt.block_on(async {
        let queue = open_queue(db_path).await?;
        queue.jump_to(index).await?;
        print_summary(&queue);
        Ok(())
    })
}

/// Empty the queue
pub fn cmd_clear(rt: &Runtime, db_path: Option<&Path>) -> anyhow::Result<()> {
    rt.block_on(async {
        let queue = open_queue(db_path).await?;
        queue.clear().await?;
        print_summary(&queue);
        Ok(())
    })
}

/// Shuffle the upcoming entries
pub fn cmd_shuffle(rt: &Runtime, db_path: Option<&Path>) -> anyhow::Result<()> {
    rt.block_on(async {
        let queue = open_queue(db_path).await?;
        queue.shuffle_upcoming().await?;
        println!("Shuffled upcoming tracks");
        print_summary(&queue);
        Ok(())
    })
}

/// Advance the cursor
pub fn cmd_skip(rt: &Runtime, db_path: Option<&Path>) -> anyhow::Result<()> {
    rt.block_on(async {
        let queue = open_queue(db_path).await?;
        if queue.skip_forward().await?.is_none() {
            println!("Already at the end of the queue");
        }
        print_summary(&queue);
        Ok(())
    })
}

/// Step the cursor back
pub fn cmd_back(rt: &Runtime, db_path: Option<&Path>) -> anyhow::Result<()> {
    rt.block_on(async {
        let queue = open_queue(db_path).await?;
        if queue.skip_back().await?.is_none() {
            println!("Already at the start of the queue");
        }
        print_summary(&queue);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_persist_between_runs() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("queue.db");
        let rt = Runtime::new().unwrap();

        cmd_play(&rt, Some(&db), &[10, 20, 30], 0).unwrap();
        cmd_add(&rt, Some(&db), &[40]).unwrap();
        cmd_move(&rt, Some(&db), 3, 1).unwrap();
        cmd_skip(&rt, Some(&db)).unwrap();

        let snapshot = rt.block_on(async {
            let queue = open_queue(Some(&db)).await.unwrap();
            queue.reader().snapshot()
        });
        let ids: Vec<i64> = snapshot.tracks().iter().map(|t| t.track_id().0).collect();
        assert_eq!(ids, vec![10, 40, 20, 30]);
        assert_eq!(snapshot.cursor(), Some(1));
    }

    #[test]
    fn test_rejected_index_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("queue.db");
        let rt = Runtime::new().unwrap();

        cmd_play(&rt, Some(&db), &[1, 2], 0).unwrap();
        assert!(cmd_remove(&rt, Some(&db), 5).is_err());
        assert!(cmd_next(&rt, Some(&db), &[], Some(9)).is_err());
    }
}
