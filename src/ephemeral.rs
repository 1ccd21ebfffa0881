//! Additive, ordered collection of independently expiring entries.
//!
//! Backs both the notification stack and the floating XP layer. Unlike a
//! celebration channel, entries accumulate: every push appends to the tail
//! and arms its own removal timer. Removing an entry never reorders the rest.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::scheduler::{Scheduler, TimerHandle};

/// Identifier of a queued entry, unique for the queue's lifetime.
pub type EntryId = String;

/// A queued payload plus its bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ephemeral<T> {
    pub id: EntryId,
    pub created_at: DateTime<Utc>,
    /// Lifetime in milliseconds; zero means the entry stays until removed.
    pub duration_ms: u64,
    #[serde(flatten)]
    pub payload: T,
}

/// Callback receiving the full list after every change.
pub type ListObserver<T> = Arc<dyn Fn(&[Ephemeral<T>]) + Send + Sync>;

struct QueueState<T> {
    entries: Vec<Ephemeral<T>>,
    timers: HashMap<EntryId, TimerHandle>,
    observers: Vec<(u64, ListObserver<T>)>,
}

struct QueueInner<T> {
    state: Mutex<QueueState<T>>,
    scheduler: Arc<dyn Scheduler>,
    prefix: String,
    default_duration: Duration,
    next_seq: AtomicU64,
    next_observer_id: AtomicU64,
}

impl<T> Drop for QueueInner<T> {
    fn drop(&mut self) {
        for (_, timer) in self.state.get_mut().timers.drain() {
            timer.cancel();
        }
    }
}

impl<T: Clone> QueueInner<T> {
    fn snapshot(state: &QueueState<T>) -> (Vec<Ephemeral<T>>, Vec<ListObserver<T>>) {
        (
            state.entries.clone(),
            state.observers.iter().map(|(_, o)| Arc::clone(o)).collect(),
        )
    }

    fn remove(&self, id: &str) -> bool {
        let (entries, observers) = {
            let mut state = self.state.lock();
            let Some(pos) = state.entries.iter().position(|e| e.id == id) else {
                return false;
            };
            state.entries.remove(pos);
            if let Some(timer) = state.timers.remove(id) {
                timer.cancel();
            }
            Self::snapshot(&state)
        };
        notify(&self.prefix, &observers, &entries);
        true
    }
}

fn notify<T>(prefix: &str, observers: &[ListObserver<T>], entries: &[Ephemeral<T>]) {
    for observer in observers {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| observer(entries)));
        if let Err(e) = result {
            log::error!("[{prefix}] list observer panicked: {e:?}");
        }
    }
}

/// Ordered queue of self-expiring entries. Clones share state.
pub struct EphemeralQueue<T> {
    inner: Arc<QueueInner<T>>,
}

impl<T> Clone for EphemeralQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> EphemeralQueue<T> {
    /// `prefix` starts every id; `default_duration` applies when a push gives none.
    pub fn new(
        prefix: impl Into<String>,
        default_duration: Duration,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    entries: Vec::new(),
                    timers: HashMap::new(),
                    observers: Vec::new(),
                }),
                scheduler,
                prefix: prefix.into(),
                default_duration,
                next_seq: AtomicU64::new(1),
                next_observer_id: AtomicU64::new(1),
            }),
        }
    }

    /// Append `payload` and arm its removal timer. Returns the new id.
    ///
    /// A zero duration keeps the entry until [`remove`](Self::remove) or
    /// [`clear`](Self::clear).
    pub fn push(&self, payload: T, duration: Option<Duration>) -> EntryId {
        let duration = duration.unwrap_or(self.inner.default_duration);
        let created_at = Utc::now();
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let id = format!(
            "{}-{}-{}",
            self.inner.prefix,
            created_at.timestamp_millis(),
            seq
        );

        let (entries, observers) = {
            let mut state = self.inner.state.lock();
            state.entries.push(Ephemeral {
                id: id.clone(),
                created_at,
                duration_ms: duration.as_millis() as u64,
                payload,
            });

            if !duration.is_zero() {
                let weak: Weak<QueueInner<T>> = Arc::downgrade(&self.inner);
                let timer_id = id.clone();
                let timer = self.inner.scheduler.schedule(
                    duration,
                    Box::new(move || {
                        if let Some(inner) = weak.upgrade() {
                            inner.remove(&timer_id);
                        }
                    }),
                );
                state.timers.insert(id.clone(), timer);
            }
            QueueInner::snapshot(&state)
        };

        log::debug!("[{}] push {id} ({} queued)", self.inner.prefix, entries.len());
        notify(&self.inner.prefix, &observers, &entries);
        id
    }

    /// Remove `id` if present. Returns whether anything was removed; never fails.
    pub fn remove(&self, id: &str) -> bool {
        self.inner.remove(id)
    }

    /// Drop every entry and cancel every pending removal timer.
    pub fn clear(&self) {
        let observers = {
            let mut state = self.inner.state.lock();
            for (_, timer) in state.timers.drain() {
                timer.cancel();
            }
            state.entries.clear();
            QueueInner::snapshot(&state).1
        };
        notify(&self.inner.prefix, &observers, &[]);
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> Vec<Ephemeral<T>> {
        self.inner.state.lock().entries.clone()
    }

    pub fn get(&self, id: &str) -> Option<Ephemeral<T>> {
        self.inner
            .state
            .lock()
            .entries
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removal timers not yet fired or cancelled.
    pub fn pending_timers(&self) -> usize {
        self.inner
            .state
            .lock()
            .timers
            .values()
            .filter(|t| t.is_pending())
            .count()
    }

    /// Register `observer` and replay the current list to it immediately.
    pub fn subscribe(
        &self,
        observer: impl Fn(&[Ephemeral<T>]) + Send + Sync + 'static,
    ) -> QueueSubscription<T> {
        let observer: ListObserver<T> = Arc::new(observer);
        let id = self.inner.next_observer_id.fetch_add(1, Ordering::Relaxed);
        let entries = {
            let mut state = self.inner.state.lock();
            state.observers.push((id, Arc::clone(&observer)));
            state.entries.clone()
        };
        notify(&self.inner.prefix, std::slice::from_ref(&observer), &entries);
        QueueSubscription {
            queue: Arc::downgrade(&self.inner),
            id,
            active: AtomicBool::new(true),
        }
    }

    pub fn observer_count(&self) -> usize {
        self.inner.state.lock().observers.len()
    }
}

impl<T> fmt::Debug for EphemeralQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralQueue")
            .field("prefix", &self.inner.prefix)
            .field("len", &self.inner.state.lock().entries.len())
            .finish()
    }
}

/// List observer registration. Dropping it unsubscribes.
#[must_use = "dropping a QueueSubscription unsubscribes its observer"]
pub struct QueueSubscription<T> {
    queue: Weak<QueueInner<T>>,
    id: u64,
    active: AtomicBool,
}

impl<T> QueueSubscription<T> {
    /// Remove the observer. Idempotent.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            if let Some(inner) = self.queue.upgrade() {
                inner.state.lock().observers.retain(|(oid, _)| *oid != self.id);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl<T> Drop for QueueSubscription<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
