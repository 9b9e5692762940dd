//! Queue change events and their delivery to observers.
//!
//! Each subscriber owns a bounded inbox. Publishing never waits on a
//! subscriber: when an inbox is full its pending events collapse into a
//! single [`QueueEvent::Replaced`] catch-up and the subscriber's dirty flag
//! is raised. Later events are absorbed into that pending catch-up until the
//! subscriber takes it, since the fresh snapshot it pulls already covers them.
//!
//! A [`Subscription`] is a scoped handle: dropping it unsubscribes.

use futures::Stream;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;

use super::cursor::Mutation;
use super::store::{QueueReader, QueueSnapshot};

/// Something observers need to know about the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueueEvent {
    Inserted { index: usize, count: usize },
    Removed { index: usize, count: usize },
    Moved { from: usize, to: usize, count: usize },
    /// Content changed wholesale, or a catch-up: re-read the snapshot
    Replaced,
    CursorChanged { new_index: Option<usize> },
    /// The queue ran empty; playback should stop
    Exhausted,
}

impl QueueEvent {
    /// Event describing a structural mutation, if it has one.
    ///
    /// `Selected` has no structural event; it surfaces as `CursorChanged`.
    pub fn for_mutation(mutation: &Mutation) -> Option<Self> {
        match *mutation {
            Mutation::Inserted { index, count } => Some(Self::Inserted { index, count }),
            Mutation::Removed { index, count } => Some(Self::Removed { index, count }),
            Mutation::Moved { from, to, count } => Some(Self::Moved { from, to, count }),
            Mutation::Permuted | Mutation::Replaced => Some(Self::Replaced),
            Mutation::Selected { .. } => None,
        }
    }
}

/// Identifies one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Default)]
struct Inbox {
    events: VecDeque<QueueEvent>,
    /// A `Replaced` catch-up is queued and absorbing newer events
    catch_up_pending: bool,
    dirty: bool,
    paused: bool,
    closed: bool,
}

impl Inbox {
    fn push(&mut self, event: QueueEvent, capacity: usize) -> bool {
        if self.paused {
            self.dirty = true;
            return false;
        }
        if self.catch_up_pending && event != QueueEvent::Exhausted {
            return false;
        }
        if self.events.len() >= capacity {
            self.queue_catch_up();
            if event == QueueEvent::Exhausted {
                self.events.push_back(event);
            }
            return true;
        }
        self.events.push_back(event);
        true
    }

    fn queue_catch_up(&mut self) {
        self.events.clear();
        self.events.push_back(QueueEvent::Replaced);
        self.catch_up_pending = true;
        self.dirty = true;
    }

    fn pop(&mut self) -> Option<QueueEvent> {
        let event = self.events.pop_front()?;
        if event == QueueEvent::Replaced {
            self.catch_up_pending = false;
        }
        Some(event)
    }
}

#[derive(Debug)]
struct Slot {
    inbox: Mutex<Inbox>,
    notify: Notify,
}

#[derive(Debug)]
struct NotifierInner {
    subscribers: Mutex<HashMap<SubscriptionId, Arc<Slot>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl NotifierInner {
    fn remove(&self, id: SubscriptionId) {
        if self.subscribers.lock().remove(&id).is_some() {
            tracing::debug!(subscriber = id.0, "Subscriber removed");
        }
    }
}

/// Fans queue events out to subscribers in mutation order.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    inner: Arc<NotifierInner>,
}

impl ChangeNotifier {
    /// Create a notifier whose subscribers hold at most `capacity` pending events.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(NotifierInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> Subscription {
        self.register(Inbox::default())
    }

    /// Subscribe after a gap: the first event is a `Replaced` catch-up.
    pub fn subscribe_catching_up(&self) -> Subscription {
        let mut inbox = Inbox::default();
        inbox.queue_catch_up();
        self.register(inbox)
    }

    fn register(&self, inbox: Inbox) -> Subscription {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let slot = Arc::new(Slot {
            inbox: Mutex::new(inbox),
            notify: Notify::new(),
        });
        self.inner.subscribers.lock().insert(id, Arc::clone(&slot));
        tracing::debug!(subscriber = id.0, "Subscriber added");

        Subscription {
            id,
            slot,
            notifier: Arc::downgrade(&self.inner),
        }
    }

    /// Explicitly end a subscription. Dropping it does the same.
    pub fn unsubscribe(&self, subscription: Subscription) {
        drop(subscription);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Deliver `event` to every subscriber. Never blocks on a subscriber.
    pub(crate) fn publish(&self, event: QueueEvent) {
        let slots: Vec<(SubscriptionId, Arc<Slot>)> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .map(|(id, slot)| (*id, Arc::clone(slot)))
            .collect();

        for (id, slot) in slots {
            let (queued, collapsed) = {
                let mut inbox = slot.inbox.lock();
                let was_pending = inbox.catch_up_pending;
                let queued = inbox.push(event, self.inner.capacity);
                (queued, !was_pending && inbox.catch_up_pending)
            };
            if collapsed {
                tracing::warn!(
                    subscriber = id.0,
                    capacity = self.inner.capacity,
                    "Subscriber fell behind, collapsed pending events into a resync"
                );
            }
            if queued {
                slot.notify.notify_one();
            }
        }
    }

    /// Wake every subscriber for the last time; `recv` returns `None` once drained.
    pub(crate) fn close(&self) {
        let slots: Vec<Arc<Slot>> = self.inner.subscribers.lock().values().cloned().collect();
        for slot in slots {
            slot.inbox.lock().closed = true;
            slot.notify.notify_one();
        }
    }
}

/// A live subscription to queue events.
///
/// Dropping the handle unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    slot: Arc<Slot>,
    notifier: Weak<NotifierInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next event. `None` once the queue controller has shut down.
    pub async fn recv(&mut self) -> Option<QueueEvent> {
        loop {
            {
                let mut inbox = self.slot.inbox.lock();
                if let Some(event) = inbox.pop() {
                    return Some(event);
                }
                if inbox.closed || self.notifier.strong_count() == 0 {
                    return None;
                }
            }
            self.slot.notify.notified().await;
        }
    }

    /// Take the next event if one is waiting.
    pub fn try_recv(&mut self) -> Option<QueueEvent> {
        self.slot.inbox.lock().pop()
    }

    /// Drain everything currently waiting.
    pub fn drain(&mut self) -> Vec<QueueEvent> {
        let mut inbox = self.slot.inbox.lock();
        std::iter::from_fn(|| inbox.pop()).collect()
    }

    /// Whether events were missed since the last resync.
    pub fn is_dirty(&self) -> bool {
        self.slot.inbox.lock().dirty
    }

    /// Stop queueing events (e.g. the view went to the background).
    ///
    /// Mutations while paused only raise the dirty flag.
    pub fn pause(&self) {
        self.slot.inbox.lock().paused = true;
    }

    /// Start queueing again; if anything was missed a `Replaced` catch-up comes first.
    pub fn resume(&self) {
        let mut inbox = self.slot.inbox.lock();
        inbox.paused = false;
        if inbox.dirty && !inbox.catch_up_pending {
            inbox.queue_catch_up();
            drop(inbox);
            self.slot.notify.notify_one();
        }
    }

    /// Pull a fresh snapshot and clear the dirty flag.
    pub fn resync(&self, reader: &QueueReader) -> Arc<QueueSnapshot> {
        let snapshot = reader.snapshot();
        self.slot.inbox.lock().dirty = false;
        snapshot
    }

    /// Explicitly unsubscribe.
    pub fn unsubscribe(self) {}

    /// Adapt into a [`Stream`] of events.
    pub fn into_stream(self) -> impl Stream<Item = QueueEvent> {
        futures::stream::unfold(self, |mut sub| async move {
            let event = sub.recv().await?;
            Some((event, sub))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.notifier.upgrade() {
            inner.remove(self.id);
        }
    }
}
