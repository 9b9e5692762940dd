//! Queue Minder - the playback queue of a media player.
//!
//! Holds the ordered list of tracks awaiting playback and the pointer to the
//! one currently playing, keeps both durable across restarts, and lets a UI
//! and a playback engine observe and edit them concurrently.
//!
//! Start with [`queue::QueueController`]; [`db::SqliteBackend`] provides the
//! on-disk storage.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod queue;
#[cfg(test)]
pub mod test_utils;
