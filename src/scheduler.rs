//! Deferred, cancellable callbacks.
//!
//! Every timer in the engine (celebration auto-clear, notification expiry,
//! floating XP expiry) goes through the [`Scheduler`] trait so hosts choose
//! the clock: [`TokioScheduler`] for real time, [`ManualScheduler`] for a
//! virtual clock driven explicitly by tests or a frame loop.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use crate::error::{FeedbackError, Result};

/// A one-shot deferred callback.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Schedules one-shot callbacks after a delay.
pub trait Scheduler: Send + Sync {
    /// Run `task` once after `delay` unless the returned handle is cancelled first.
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle;
}

#[derive(Debug, Default)]
struct TimerState {
    cancelled: AtomicBool,
    fired: AtomicBool,
}

impl TimerState {
    /// Returns `true` exactly once, and only if the timer was not cancelled.
    fn claim(&self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return false;
        }
        !self.fired.swap(true, Ordering::SeqCst)
    }
}

/// Handle to a scheduled callback.
#[derive(Clone)]
pub struct TimerHandle {
    state: Arc<TimerState>,
    abort: Option<AbortHandle>,
}

impl TimerHandle {
    fn detached(state: Arc<TimerState>, abort: Option<AbortHandle>) -> Self {
        Self { state, abort }
    }

    /// Cancel the callback. Idempotent; a no-op once it has fired.
    pub fn cancel(&self) {
        if !self.state.cancelled.swap(true, Ordering::SeqCst) {
            if let Some(abort) = &self.abort {
                abort.abort();
            }
        }
    }

    /// Whether [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Whether the callback has run.
    pub fn has_fired(&self) -> bool {
        self.state.fired.load(Ordering::SeqCst)
    }

    /// Neither fired nor cancelled.
    pub fn is_pending(&self) -> bool {
        !self.is_cancelled() && !self.has_fired()
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancelled", &self.is_cancelled())
            .field("fired", &self.has_fired())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TokioScheduler
// ---------------------------------------------------------------------------

/// Real-time scheduler: one tokio task per timer, aborted on cancel.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Spawn timers onto the given runtime.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Spawn timers onto the runtime driving the current thread.
    pub fn try_current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| FeedbackError::NoRuntime)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let state = Arc::new(TimerState::default());
        let task_state = Arc::clone(&state);
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if task_state.claim() {
                task();
            }
        });
        TimerHandle::detached(state, Some(join.abort_handle()))
    }
}

// ---------------------------------------------------------------------------
// ManualScheduler
// ---------------------------------------------------------------------------

struct Scheduled {
    state: Arc<TimerState>,
    task: Task,
}

#[derive(Default)]
struct ManualClock {
    now: Duration,
    next_seq: u64,
    // Keyed by (deadline, scheduling order) so ties fire first-in first-out.
    queue: BTreeMap<(Duration, u64), Scheduled>,
}

/// Virtual-clock scheduler. Time only moves when [`advance`](Self::advance) is called.
#[derive(Default)]
pub struct ManualScheduler {
    clock: Mutex<ManualClock>,
}

impl ManualScheduler {
    /// Create a scheduler at virtual time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.clock.lock().now
    }

    /// Number of timers that are neither fired nor cancelled.
    pub fn pending(&self) -> usize {
        self.clock
            .lock()
            .queue
            .values()
            .filter(|s| !s.state.cancelled.load(Ordering::SeqCst))
            .count()
    }

    /// Entries held in the queue, including cancelled ones not yet purged.
    pub fn queued(&self) -> usize {
        self.clock.lock().queue.len()
    }

    /// Move the clock forward, running every due callback in deadline order.
    ///
    /// Callbacks run without the clock lock held, so they may schedule
    /// further timers; those fire in the same call if they fall due.
    /// Returns the number of callbacks that ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.clock.lock().now + by;
        let mut ran = 0;

        loop {
            let next = {
                let mut clock = self.clock.lock();
                let due = matches!(
                    clock.queue.first_key_value(),
                    Some((&(deadline, _), _)) if deadline <= target
                );
                if !due {
                    break;
                }
                match clock.queue.pop_first() {
                    Some(((deadline, _), scheduled)) => {
                        clock.now = deadline;
                        scheduled
                    }
                    None => break,
                }
            };

            if next.state.claim() {
                (next.task)();
                ran += 1;
            }
        }

        let mut clock = self.clock.lock();
        if clock.now < target {
            clock.now = target;
        }
        ran
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let state = Arc::new(TimerState::default());
        let mut clock = self.clock.lock();
        // Cancelled entries would otherwise hold their closures until their deadline.
        clock
            .queue
            .retain(|_, s| !s.state.cancelled.load(Ordering::SeqCst));
        let key = (clock.now + delay, clock.next_seq);
        clock.next_seq += 1;
        clock.queue.insert(
            key,
            Scheduled {
                state: Arc::clone(&state),
                task,
            },
        );
        TimerHandle::detached(state, None)
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clock = self.clock.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &clock.now)
            .field("queued", &clock.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Task) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let make = move |name: &'static str| -> Task {
            let sink = Arc::clone(&sink);
            Box::new(move || sink.lock().push(name))
        };
        (log, make)
    }

    #[test]
    fn test_manual_fires_in_deadline_order() {
        let scheduler = ManualScheduler::new();
        let (log, task) = recorder();
        scheduler.schedule(Duration::from_millis(300), task("late"));
        scheduler.schedule(Duration::from_millis(100), task("early"));
        scheduler.schedule(Duration::from_millis(100), task("early-second"));

        assert_eq!(scheduler.advance(Duration::from_millis(99)), 0);
        assert_eq!(scheduler.advance(Duration::from_millis(1)), 2);
        assert_eq!(*log.lock(), vec!["early", "early-second"]);
        assert_eq!(scheduler.advance(Duration::from_secs(1)), 1);
        assert_eq!(scheduler.now(), Duration::from_millis(1100));
    }

    #[test]
    fn test_manual_cancel_is_idempotent() {
        let scheduler = ManualScheduler::new();
        let (log, task) = recorder();
        let handle = scheduler.schedule(Duration::from_millis(10), task("never"));
        assert!(handle.is_pending());
        handle.cancel();
        handle.cancel();
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.advance(Duration::from_millis(50)), 0);
        assert!(log.lock().is_empty());
        assert!(handle.is_cancelled());
        assert!(!handle.has_fired());
    }

    #[test]
    fn test_manual_nested_scheduling() {
        let scheduler = Arc::new(ManualScheduler::new());
        let count = Arc::new(AtomicUsize::new(0));
        let inner_sched = Arc::clone(&scheduler);
        let inner_count = Arc::clone(&count);
        scheduler.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                inner_count.fetch_add(1, Ordering::SeqCst);
                let c = Arc::clone(&inner_count);
                inner_sched.schedule(
                    Duration::from_millis(10),
                    Box::new(move || {
                        c.fetch_add(1, Ordering::SeqCst);
                    }),
                );
            }),
        );

        assert_eq!(scheduler.advance(Duration::from_millis(25)), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_manual_purges_cancelled_entries_on_schedule() {
        let scheduler = ManualScheduler::new();
        let (log, task) = recorder();
        for _ in 0..100 {
            scheduler
                .schedule(Duration::from_secs(3_600), task("cancelled"))
                .cancel();
        }
        assert_eq!(scheduler.pending(), 0);

        let live = scheduler.schedule(Duration::from_millis(10), task("live"));
        assert_eq!(scheduler.queued(), 1);
        assert_eq!(scheduler.advance(Duration::from_millis(10)), 1);
        assert!(live.has_fired());
        assert_eq!(*log.lock(), vec!["live"]);
    }

    #[test]
    fn test_try_current_outside_runtime() {
        assert!(matches!(
            TokioScheduler::try_current(),
            Err(FeedbackError::NoRuntime)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_fires_and_cancels() {
        let scheduler = TokioScheduler::try_current().unwrap();
        let (log, task) = recorder();
        let kept = scheduler.schedule(Duration::from_millis(500), task("kept"));
        let dropped = scheduler.schedule(Duration::from_millis(200), task("dropped"));
        dropped.cancel();

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(*log.lock(), vec!["kept"]);
        assert!(kept.has_fired());
        assert!(!dropped.has_fired());
    }
}
