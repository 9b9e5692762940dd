//! Durable ordered storage for the queue.
//!
//! [`QueueStore`] keeps the authoritative sequence of [`TrackRef`]s and the
//! cursor together. Every mutation builds the new state on the side, writes
//! it through the [`QueueBackend`], and only then publishes it. A failed
//! write therefore leaves memory exactly at the last durable state.
//!
//! Readers hold a [`QueueReader`] and take `Arc<QueueSnapshot>` clones; they
//! never wait on the backend.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use super::cursor::{Mutation, PositionCursor};
use super::track::{OccurrenceKey, TrackRef};
use crate::error::{Error, Result};

/// Queue content and cursor as written to durable storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedQueue {
    pub tracks: Vec<TrackRef>,
    pub cursor: PositionCursor,
}

/// Durable storage for the queue.
///
/// `save` must be all-or-nothing: after an error the previously saved
/// state is still what `load` returns.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Load the persisted queue. `None` means nothing was ever saved.
    async fn load(&self) -> Result<Option<PersistedQueue>>;

    /// Replace the persisted queue and cursor.
    async fn save(&self, tracks: &[TrackRef], cursor: PositionCursor) -> Result<()>;
}

/// Process-local backend.
///
/// Used for ephemeral sessions and tests; saves can be made to fail on demand.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<Option<PersistedQueue>>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an already persisted queue.
    pub fn with_state(state: PersistedQueue) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            ..Self::default()
        }
    }

    /// Make every following save fail (or succeed again).
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// What a restart would load.
    pub fn persisted(&self) -> Option<PersistedQueue> {
        self.state.lock().clone()
    }
}

#[async_trait]
impl QueueBackend for MemoryBackend {
    async fn load(&self) -> Result<Option<PersistedQueue>> {
        Ok(self.state.lock().clone())
    }

    async fn save(&self, tracks: &[TrackRef], cursor: PositionCursor) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::persistence("memory backend rejected the write"));
        }
        *self.state.lock() = Some(PersistedQueue {
            tracks: tracks.to_vec(),
            cursor,
        });
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Immutable view of the queue after some completed mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    tracks: Vec<TrackRef>,
    cursor: PositionCursor,
    version: u64,
}

impl QueueSnapshot {
    pub fn tracks(&self) -> &[TrackRef] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor.current()
    }

    /// Entry under the cursor.
    pub fn current(&self) -> Option<&TrackRef> {
        self.cursor().and_then(|i| self.tracks.get(i))
    }

    /// Number of completed mutations since the store was opened.
    pub fn version(&self) -> u64 {
        self.version
    }
}

/// Cheap, clonable read-only handle on the latest snapshot.
#[derive(Debug, Clone)]
pub struct QueueReader {
    shared: Arc<RwLock<Arc<QueueSnapshot>>>,
}

impl QueueReader {
    pub fn snapshot(&self) -> Arc<QueueSnapshot> {
        Arc::clone(&self.shared.read())
    }

    pub fn len(&self) -> usize {
        self.shared.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of a successful store mutation.
#[derive(Debug, Clone)]
pub struct Applied {
    pub mutation: Mutation,
    /// Cursor before the mutation
    pub previous_cursor: Option<usize>,
    /// Entry the cursor pointed at before the mutation
    pub previous_current: Option<OccurrenceKey>,
    /// State after the mutation
    pub snapshot: Arc<QueueSnapshot>,
}

impl Applied {
    /// Whether the cursor index or the entry under it changed.
    pub fn cursor_changed(&self) -> bool {
        self.previous_cursor != self.snapshot.cursor()
            || self.previous_current != self.snapshot.current().map(TrackRef::occurrence_key)
    }
}

/// The single source of truth for queue order.
pub struct QueueStore {
    backend: Arc<dyn QueueBackend>,
    shared: Arc<RwLock<Arc<QueueSnapshot>>>,
    persist_timeout: Duration,
}

impl std::fmt::Debug for QueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueStore")
            .field("snapshot", &self.snapshot())
            .field("persist_timeout", &self.persist_timeout)
            .finish()
    }
}

impl QueueStore {
    /// Open the store, recovering whatever the backend holds.
    ///
    /// A missing persisted queue is an empty queue with no cursor.
    pub async fn open(backend: Arc<dyn QueueBackend>, persist_timeout: Duration) -> Result<Self> {
        let persisted = backend.load().await?.unwrap_or_default();
        let PersistedQueue { tracks, mut cursor } = persisted;

        check_unique(&tracks, &[])?;
        if cursor.normalize(tracks.len()) {
            tracing::warn!(
                len = tracks.len(),
                cursor = ?cursor.current(),
                "Persisted cursor was out of range, reset"
            );
        }
        tracing::info!(len = tracks.len(), cursor = ?cursor.current(), "Queue restored");

        let snapshot = QueueSnapshot {
            tracks,
            cursor,
            version: 0,
        };
        Ok(Self {
            backend,
            shared: Arc::new(RwLock::new(Arc::new(snapshot))),
            persist_timeout,
        })
    }

    pub fn reader(&self) -> QueueReader {
        QueueReader {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn snapshot(&self) -> Arc<QueueSnapshot> {
        Arc::clone(&self.shared.read())
    }

    pub fn len(&self) -> usize {
        self.shared.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append to the tail.
    pub async fn append(&mut self, tracks: Vec<TrackRef>) -> Result<Applied> {
        let index = self.len();
        self.insert_at(index, tracks).await
    }

    /// Insert before `index` (`index == len` appends).
    pub async fn insert_at(&mut self, index: usize, tracks: Vec<TrackRef>) -> Result<Applied> {
        let current = self.snapshot();
        if index > current.len() {
            return Err(Error::out_of_range(index, current.len()));
        }
        check_unique(&tracks, current.tracks())?;

        let count = tracks.len();
        let mut draft = current.tracks.clone();
        draft.splice(index..index, tracks);
        self.apply(&current, draft, Mutation::Inserted { index, count })
            .await
    }

    /// Remove and return the entry at `index`.
    pub async fn remove_at(&mut self, index: usize) -> Result<(TrackRef, Applied)> {
        let current = self.snapshot();
        let Some(removed) = current.tracks.get(index).copied() else {
            return Err(Error::out_of_range(index, current.len()));
        };

        let mut draft = current.tracks.clone();
        draft.remove(index);
        let applied = self
            .apply(&current, draft, Mutation::Removed { index, count: 1 })
            .await?;
        Ok((removed, applied))
    }

    /// Move the block `[from, from + count)` so it starts at `to`.
    ///
    /// `to` is an index into the resulting queue, so `to + count <= len`.
    pub async fn move_range(&mut self, from: usize, to: usize, count: usize) -> Result<Applied> {
        let current = self.snapshot();
        let len = current.len();
        if count == 0 {
            return Err(Error::invalid_argument("cannot move an empty range"));
        }
        if from >= len || count > len - from {
            return Err(Error::out_of_range(from, len));
        }
        if to >= len || count > len - to {
            return Err(Error::out_of_range(to, len));
        }

        let mut draft = current.tracks.clone();
        let block: Vec<TrackRef> = draft.drain(from..from + count).collect();
        draft.splice(to..to, block);
        self.apply(&current, draft, Mutation::Moved { from, to, count })
            .await
    }

    /// Replace everything; cursor goes to `0` (or `None` if empty).
    pub async fn replace_all(&mut self, tracks: Vec<TrackRef>) -> Result<Applied> {
        check_unique(&tracks, &[])?;
        let current = self.snapshot();
        self.apply(&current, tracks, Mutation::Replaced).await
    }

    /// Replace everything and point the cursor at `start`.
    pub async fn replace_all_at(&mut self, tracks: Vec<TrackRef>, start: usize) -> Result<Applied> {
        if start >= tracks.len() {
            return Err(Error::out_of_range(start, tracks.len()));
        }
        check_unique(&tracks, &[])?;

        let current = self.snapshot();
        let cursor = PositionCursor::at(start);
        self.commit(&current, tracks, cursor, Mutation::Replaced)
            .await
    }

    /// Reorder to `order`, which must hold exactly the current entries.
    pub async fn permute(&mut self, order: Vec<TrackRef>) -> Result<Applied> {
        let current = self.snapshot();
        let before: HashSet<_> = current.tracks.iter().collect();
        let after: HashSet<_> = order.iter().collect();
        if order.len() != current.len() || before != after {
            return Err(Error::invalid_argument(
                "permutation must contain exactly the queued entries",
            ));
        }
        self.apply(&current, order, Mutation::Permuted).await
    }

    /// Point the cursor at `index` without reordering.
    pub async fn set_cursor(&mut self, index: usize) -> Result<Applied> {
        let current = self.snapshot();
        let mut cursor = current.cursor;
        cursor.set_to(index, current.len())?;
        let draft = current.tracks.clone();
        self.commit(&current, draft, cursor, Mutation::Selected { index })
            .await
    }

    async fn apply(
        &mut self,
        current: &QueueSnapshot,
        draft: Vec<TrackRef>,
        mutation: Mutation,
    ) -> Result<Applied> {
        let mut cursor = current.cursor;
        cursor.adjust_for_mutation(&mutation, current.tracks(), &draft);
        self.commit(current, draft, cursor, mutation).await
    }

    /// Write `draft` through to the backend, then publish it.
    async fn commit(
        &mut self,
        current: &QueueSnapshot,
        draft: Vec<TrackRef>,
        cursor: PositionCursor,
        mutation: Mutation,
    ) -> Result<Applied> {
        // The write runs as its own task so a slow save is never dropped
        // halfway; memory is published or kept only once its outcome is known.
        let backend = Arc::clone(&self.backend);
        let tracks = draft.clone();
        let mut write = tokio::spawn(async move { backend.save(&tracks, cursor).await });

        let outcome = match tokio::time::timeout(self.persist_timeout, &mut write).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.persist_timeout.as_millis() as u64,
                    ?mutation,
                    "Queue write is slow, waiting for it to settle"
                );
                write.await
            }
        };

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(error = %e, ?mutation, "Queue write failed, keeping last durable state");
                return Err(match e {
                    Error::Persistence(_) => e,
                    other => Error::persistence(other.to_string()),
                });
            }
            Err(e) => {
                tracing::error!(error = %e, ?mutation, "Queue write task aborted, keeping last durable state");
                return Err(Error::persistence(format!("write task aborted: {e}")));
            }
        }

        let snapshot = Arc::new(QueueSnapshot {
            tracks: draft,
            cursor,
            version: current.version + 1,
        });
        *self.shared.write() = Arc::clone(&snapshot);

        tracing::debug!(?mutation, len = snapshot.len(), cursor = ?snapshot.cursor(), "Queue mutated");
        Ok(Applied {
            mutation,
            previous_cursor: current.cursor(),
            previous_current: current.current().map(TrackRef::occurrence_key),
            snapshot,
        })
    }
}

/// Reject duplicate occurrence keys within `new` or against `existing`.
fn check_unique(new: &[TrackRef], existing: &[TrackRef]) -> Result<()> {
    let mut seen: HashSet<OccurrenceKey> =
        existing.iter().map(TrackRef::occurrence_key).collect();
    for track in new {
        if !seen.insert(track.occurrence_key()) {
            return Err(Error::invalid_argument(format!(
                "duplicate occurrence key {}",
                track.occurrence_key()
            )));
        }
    }
    Ok(())
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::queue::track::{TrackId, mint_refs};
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Append(usize),
        Insert(usize, usize),
        Remove(usize),
        Move(usize, usize, usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1usize..4).prop_map(Op::Append),
            (0usize..12, 1usize..4).prop_map(|(i, n)| Op::Insert(i, n)),
            (0usize..12).prop_map(Op::Remove),
            (0usize..12, 0usize..12, 1usize..3).prop_map(|(f, t, n)| Op::Move(f, t, n)),
        ]
    }

    proptest! {
        /// Length equals inserted minus removed, counting only accepted operations
        #[test]
        fn length_tracks_net_inserts(ops in prop::collection::vec(op(), 0..40)) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let mut store = QueueStore::open(Arc::new(MemoryBackend::new()), Duration::from_secs(1))
                    .await
                    .unwrap();
                let mut expected: usize = 0;

                for op in ops {
                    let new = |n: usize| mint_refs((0..n as i64).map(TrackId));
                    match op {
                        Op::Append(n) => {
                            store.append(new(n)).await.unwrap();
                            expected += n;
                        }
                        Op::Insert(i, n) => {
                            if store.insert_at(i, new(n)).await.is_ok() {
                                expected += n;
                            }
                        }
                        Op::Remove(i) => {
                            if store.remove_at(i).await.is_ok() {
                                expected -= 1;
                            }
                        }
                        Op::Move(f, t, n) => {
                            let _ = store.move_range(f, t, n).await;
                        }
                    }

                    let snapshot = store.snapshot();
                    prop_assert_eq!(snapshot.len(), expected);
                    if let Some(c) = snapshot.cursor() {
                        prop_assert!(c < snapshot.len());
                    }
                }
                Ok(())
            })?;
        }

        /// Moving a range never loses or duplicates entries
        #[test]
        fn move_range_is_a_permutation(len in 1usize..10, from in 0usize..10, to in 0usize..10, count in 1usize..4) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let mut store = QueueStore::open(Arc::new(MemoryBackend::new()), Duration::from_secs(1))
                    .await
                    .unwrap();
                store.append(mint_refs((0..len as i64).map(TrackId))).await.unwrap();
                let before = store.snapshot();

                if store.move_range(from, to, count).await.is_ok() {
                    let after = store.snapshot();
                    let mut a: Vec<_> = before.tracks().iter().map(|t| t.occurrence_key().to_string()).collect();
                    let mut b: Vec<_> = after.tracks().iter().map(|t| t.occurrence_key().to_string()).collect();
                    a.sort();
                    b.sort();
                    prop_assert_eq!(a, b);
                    prop_assert_eq!(&after.tracks()[to..to + count], &before.tracks()[from..from + count]);
                } else {
                    let unchanged = store.snapshot();
                    prop_assert_eq!(before.tracks(), unchanged.tracks());
                }
                Ok(())
            })?;
        }
    }
}
