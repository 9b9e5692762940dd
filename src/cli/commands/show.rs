//! Queue display command.

use serde::Serialize;
use std::path::Path;
use tokio::runtime::Runtime;

use super::queue::open_queue;
use crate::queue::{QueueSnapshot, TrackRef};

#[derive(Serialize)]
struct QueueView<'a> {
    cursor: Option<usize>,
    tracks: &'a [TrackRef],
}

fn render_text(snapshot: &QueueSnapshot) -> String {
    if snapshot.is_empty() {
        return "Queue is empty".to_string();
    }

    let mut out = String::new();
    for (i, track) in snapshot.tracks().iter().enumerate() {
        let marker = if snapshot.cursor() == Some(i) { "▶" } else { " " };
        out.push_str(&format!("{} {:>3}  {}\n", marker, i, track.track_id()));
    }
    out.push_str(&format!("{} tracks", snapshot.len()));
    out
}

/// Print the queue
pub fn cmd_show(rt: &Runtime, db_path: Option<&Path>, json: bool) -> anyhow::Result<()> {
    rt.block_on(async {
        let queue = open_queue(db_path).await?;
        let snapshot = queue.reader().snapshot();

        if json {
            let view = QueueView {
                cursor: snapshot.cursor(),
                tracks: snapshot.tracks(),
            };
            println!("{}", serde_json::to_string_pretty(&view)?);
        } else {
            println!("{}", render_text(&snapshot));
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::memory_controller;

    #[tokio::test]
    async fn test_render_marks_current() {
        let (queue, _) = memory_controller(&[7, 9], 1).await;

        let text = render_text(&queue.reader().snapshot());
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("    0"));
        assert!(lines[1].starts_with("▶   1"));
        assert!(lines[1].ends_with('9'));
        assert_eq!(lines[2], "2 tracks");
    }

    #[tokio::test]
    async fn test_json_view_shape() {
        let (queue, _) = memory_controller(&[], 0).await;
        queue.enqueue(vec![crate::queue::TrackId(3)]).await.unwrap();
        let snapshot = queue.reader().snapshot();

        let view = QueueView {
            cursor: snapshot.cursor(),
            tracks: snapshot.tracks(),
        };
        let value = serde_json::to_value(&view).unwrap();
        assert!(value["cursor"].is_null());
        assert_eq!(value["tracks"][0]["track_id"], 3);
        assert!(value["tracks"][0]["occurrence_key"].is_string());
    }

    #[test]
    fn test_render_empty() {
        let dir = tempfile::tempdir().unwrap();
        let rt = Runtime::new().unwrap();
        let db = dir.path().join("queue.db");
        cmd_show(&rt, Some(&db), false).unwrap();
        cmd_show(&rt, Some(&db), true).unwrap();
    }
}
