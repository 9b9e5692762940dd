//! The only writer of the queue.
//!
//! [`QueueController`] is a cheap, clonable handle. Every mutation is sent
//! as a command to one background task that applies them strictly one at a
//! time, so index arguments are always checked against the length the
//! mutation actually sees. Once a command is accepted it runs to completion
//! even if the caller stops waiting for the reply.
//!
//! ```text
//!  UI / engine ──► QueueController ──mpsc──► QueueActor ──► QueueStore ──► backend
//!                                                 │
//!                                                 └──► ChangeNotifier ──► subscribers
//! ```

use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use super::notifier::{ChangeNotifier, QueueEvent, Subscription};
use super::store::{Applied, QueueBackend, QueueReader, QueueStore};
use super::track::{TrackId, TrackRef, mint_refs};
use crate::config::Config;
use crate::error::{Error, Result};

/// Tuning for a controller instance.
#[derive(Debug, Clone, Copy)]
pub struct ControllerOptions {
    pub persist_timeout: Duration,
    pub command_buffer: usize,
    pub subscriber_capacity: usize,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for ControllerOptions {
    fn from(config: &Config) -> Self {
        Self {
            persist_timeout: config.queue.persist_timeout(),
            command_buffer: config.queue.command_buffer.max(1),
            subscriber_capacity: config.notifier.subscriber_capacity,
        }
    }
}

#[derive(Debug)]
enum Command {
    PlayNow { tracks: Vec<TrackId>, start: usize },
    PlayNext(Vec<TrackId>),
    Enqueue(Vec<TrackId>),
    RemoveAt(usize),
    MoveItem { from: usize, to: usize },
    PlayNextFromQueue(usize),
    JumpTo(usize),
    SkipForward,
    SkipBack,
    ShuffleUpcoming,
    Clear,
}

#[derive(Debug)]
enum Reply {
    Done,
    Removed(TrackRef),
    Cursor(Option<usize>),
}

type Request = (Command, oneshot::Sender<Result<Reply>>);

/// Handle for mutating the queue and observing it.
#[derive(Debug, Clone)]
pub struct QueueController {
    tx: mpsc::Sender<Request>,
    reader: QueueReader,
    notifier: ChangeNotifier,
}

impl QueueController {
    /// Open the store on `backend` and start the controller task.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn spawn(backend: Arc<dyn QueueBackend>, options: ControllerOptions) -> Result<Self> {
        let store = QueueStore::open(backend, options.persist_timeout).await?;
        let notifier = ChangeNotifier::new(options.subscriber_capacity);
        let reader = store.reader();
        let (tx, rx) = mpsc::channel(options.command_buffer.max(1));

        let actor = QueueActor {
            store,
            notifier: notifier.clone(),
        };
        tokio::spawn(actor.run(rx));

        Ok(Self {
            tx,
            reader,
            notifier,
        })
    }

    /// Read-only view for the UI and the playback engine.
    pub fn reader(&self) -> QueueReader {
        self.reader.clone()
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn subscribe(&self) -> Subscription {
        self.notifier.subscribe()
    }

    /// Subscribe after a gap; the first event is a `Replaced` catch-up.
    pub fn subscribe_catching_up(&self) -> Subscription {
        self.notifier.subscribe_catching_up()
    }

    /// Replace the queue with `tracks` and start at `start_index`.
    pub async fn play_now(&self, tracks: Vec<TrackId>, start_index: usize) -> Result<()> {
        self.request(Command::PlayNow {
            tracks,
            start: start_index,
        })
        .await
        .map(|_| ())
    }

    /// Insert right after the current entry (or at the head with no cursor).
    pub async fn play_next(&self, tracks: Vec<TrackId>) -> Result<()> {
        self.request(Command::PlayNext(tracks)).await.map(|_| ())
    }

    /// Append to the tail.
    pub async fn enqueue(&self, tracks: Vec<TrackId>) -> Result<()> {
        self.request(Command::Enqueue(tracks)).await.map(|_| ())
    }

    /// Remove the entry at `index` and return it.
    pub async fn remove_at(&self, index: usize) -> Result<TrackRef> {
        match self.request(Command::RemoveAt(index)).await? {
            Reply::Removed(track) => Ok(track),
            other => Err(unexpected(other)),
        }
    }

    /// Move one entry. `from == to` is acknowledged and still published.
    pub async fn move_item(&self, from: usize, to: usize) -> Result<()> {
        self.request(Command::MoveItem { from, to })
            .await
            .map(|_| ())
    }

    /// Move an already queued entry to play right after the current one.
    pub async fn play_next_from_queue(&self, index: usize) -> Result<()> {
        self.request(Command::PlayNextFromQueue(index))
            .await
            .map(|_| ())
    }

    /// Point the cursor at `index` without reordering.
    pub async fn jump_to(&self, index: usize) -> Result<()> {
        self.request(Command::JumpTo(index)).await.map(|_| ())
    }

    /// Advance to the next entry. `None` at the end of the queue.
    pub async fn skip_forward(&self) -> Result<Option<usize>> {
        match self.request(Command::SkipForward).await? {
            Reply::Cursor(c) => Ok(c),
            other => Err(unexpected(other)),
        }
    }

    /// Step back to the previous entry. `None` at the start of the queue.
    pub async fn skip_back(&self) -> Result<Option<usize>> {
        match self.request(Command::SkipBack).await? {
            Reply::Cursor(c) => Ok(c),
            other => Err(unexpected(other)),
        }
    }

    /// Randomize everything after the current entry.
    pub async fn shuffle_upcoming(&self) -> Result<()> {
        self.request(Command::ShuffleUpcoming).await.map(|_| ())
    }

    /// Empty the queue.
    pub async fn clear(&self) -> Result<()> {
        self.request(Command::Clear).await.map(|_| ())
    }

    async fn request(&self, command: Command) -> Result<Reply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((command, reply_tx))
            .await
            .map_err(|_| Error::ControllerClosed)?;
        reply_rx.await.map_err(|_| Error::ControllerClosed)?
    }
}

fn unexpected(reply: Reply) -> Error {
    Error::invalid_argument(format!("unexpected controller reply {reply:?}"))
}

/// Owns the store; runs on its own task.
struct QueueActor {
    store: QueueStore,
    notifier: ChangeNotifier,
}

impl QueueActor {
    async fn run(mut self, mut rx: mpsc::Receiver<Request>) {
        tracing::info!(len = self.store.len(), "Queue controller started");

        while let Some((command, reply)) = rx.recv().await {
            tracing::debug!(?command, "Applying queue command");
            let result = self.handle(command).await;
            if let Err(e) = &result {
                tracing::debug!(error = %e, "Queue command rejected");
            }
            // The caller may have stopped waiting; the mutation stands either way.
            let _ = reply.send(result);
        }

        self.notifier.close();
        tracing::info!("Queue controller stopped");
    }

    async fn handle(&mut self, command: Command) -> Result<Reply> {
        match command {
            Command::PlayNow { tracks, start } => {
                let applied = self.store.replace_all_at(mint_refs(tracks), start).await?;
                self.publish(&applied);
                Ok(Reply::Done)
            }
            Command::PlayNext(tracks) => {
                if tracks.is_empty() {
                    return Ok(Reply::Done);
                }
                let index = self.store.snapshot().cursor().map_or(0, |c| c + 1);
                let applied = self.store.insert_at(index, mint_refs(tracks)).await?;
                self.publish(&applied);
                Ok(Reply::Done)
            }
            Command::Enqueue(tracks) => {
                if tracks.is_empty() {
                    return Ok(Reply::Done);
                }
                let applied = self.store.append(mint_refs(tracks)).await?;
                self.publish(&applied);
                Ok(Reply::Done)
            }
            Command::RemoveAt(index) => {
                let (removed, applied) = self.store.remove_at(index).await?;
                self.publish(&applied);
                Ok(Reply::Removed(removed))
            }
            Command::MoveItem { from, to } => {
                let applied = self.store.move_range(from, to, 1).await?;
                self.publish(&applied);
                Ok(Reply::Done)
            }
            Command::PlayNextFromQueue(index) => {
                let snapshot = self.store.snapshot();
                if index >= snapshot.len() {
                    return Err(Error::out_of_range(index, snapshot.len()));
                }
                let to = match snapshot.cursor() {
                    None => 0,
                    Some(c) if index <= c => c,
                    Some(c) => c + 1,
                };
                let applied = self.store.move_range(index, to, 1).await?;
                self.publish(&applied);
                Ok(Reply::Done)
            }
            Command::JumpTo(index) => {
                let applied = self.store.set_cursor(index).await?;
                self.publish(&applied);
                Ok(Reply::Done)
            }
            Command::SkipForward => {
                let snapshot = self.store.snapshot();
                let next = match snapshot.cursor() {
                    None if !snapshot.is_empty() => 0,
                    Some(c) if c + 1 < snapshot.len() => c + 1,
                    _ => {
                        tracing::debug!("Cannot skip forward, already at end of queue");
                        return Ok(Reply::Cursor(None));
                    }
                };
                let applied = self.store.set_cursor(next).await?;
                self.publish(&applied);
                Ok(Reply::Cursor(Some(next)))
            }
            Command::SkipBack => {
                let Some(c) = self.store.snapshot().cursor().filter(|&c| c > 0) else {
                    tracing::debug!("Cannot skip back, already at start of queue");
                    return Ok(Reply::Cursor(None));
                };
                let applied = self.store.set_cursor(c - 1).await?;
                self.publish(&applied);
                Ok(Reply::Cursor(Some(c - 1)))
            }
            Command::ShuffleUpcoming => {
                let snapshot = self.store.snapshot();
                let start = snapshot.cursor().map_or(0, |c| c + 1);
                if snapshot.len().saturating_sub(start) < 2 {
                    return Ok(Reply::Done);
                }
                let mut order = snapshot.tracks().to_vec();
                order[start..].shuffle(&mut rand::rng());
                let applied = self.store.permute(order).await?;
                self.publish(&applied);
                Ok(Reply::Done)
            }
            Command::Clear => {
                let applied = self.store.replace_all(Vec::new()).await?;
                self.publish(&applied);
                self.notifier.publish(QueueEvent::Exhausted);
                Ok(Reply::Done)
            }
        }
    }

    /// Publish the events for one applied mutation, in order.
    fn publish(&self, applied: &Applied) {
        let structural = QueueEvent::for_mutation(&applied.mutation);
        if let Some(event) = structural {
            self.notifier.publish(event);
        }

        // A Replaced tells observers to re-read everything, cursor included.
        let wholesale = structural == Some(QueueEvent::Replaced);
        if !wholesale && (structural.is_none() || applied.cursor_changed()) {
            self.notifier.publish(QueueEvent::CursorChanged {
                new_index: applied.snapshot.cursor(),
            });
        }

        if applied.snapshot.is_empty() && !wholesale {
            self.notifier.publish(QueueEvent::Exhausted);
        }
    }
}
