//! The playback queue.
//!
//! # Architecture
//!
//! - [`QueueController`]: the single writer. Mutations are serialized
//!   through one task and validated against the length they actually see.
//! - [`QueueStore`]: authoritative order plus cursor, written through a
//!   [`QueueBackend`] before any change becomes visible.
//! - [`PositionCursor`]: the current-entry pointer and its adjustment rules.
//! - [`ChangeNotifier`]: fan-out of [`QueueEvent`]s to the UI and the
//!   playback engine, with catch-up for slow subscribers.
//! - [`DragReorderSession`]: drag-to-reorder state that commits one move.
//!
//! Readers (UI, engine) hold a [`QueueReader`] and take immutable
//! [`QueueSnapshot`]s without ever waiting on a write.

mod controller;
mod cursor;
mod drag;
mod notifier;
mod store;
mod track;

pub use controller::{ControllerOptions, QueueController};
pub use cursor::{Mutation, PositionCursor};
pub use drag::{DragReorderSession, DragState, scroll_velocity, speed_for_weight};
pub use notifier::{ChangeNotifier, QueueEvent, Subscription, SubscriptionId};
pub use store::{
    Applied, MemoryBackend, PersistedQueue, QueueBackend, QueueReader, QueueSnapshot, QueueStore,
};
pub use track::{OccurrenceKey, TrackId, TrackRef, mint_refs};
