//! Single-slot-per-channel broadcast registry.
//!
//! Each channel holds at most one active [`CelebrationKind`] and a monotonic
//! generation counter. Publishing replaces the active kind, notifies every
//! observer synchronously in subscription order and schedules one auto-clear
//! timer. The timer captures the generation it was scheduled under and only
//! clears the channel if no later publish or clear has happened since, so an
//! earlier celebration's timer can never cut a later one short.
//!
//! Observers are invoked without the registry lock held; they may subscribe,
//! unsubscribe or publish from inside a notification.
//!
//! Every state change takes a per-channel commit sequence under the lock.
//! Delivery is serialized per channel and a commit is never delivered after a
//! newer one, so when producers and timers run on different threads the last
//! value an observer sees is always the channel's current value.

use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};

use crate::celebration::{CelebrationKind, DEFAULT_CHANNELS};
use crate::config::{CelebrationTimings, FeedbackConfig};
use crate::error::{FeedbackError, FeedbackMode, Result};
use crate::scheduler::{Scheduler, TimerHandle};

/// Callback receiving every value a channel takes.
pub type Observer = Arc<dyn Fn(CelebrationKind) + Send + Sync>;

/// Sequence of the last commit handed to observers. Reentrant so an observer
/// can publish on its own channel from inside a notification.
type DeliveryLock = ReentrantMutex<Cell<u64>>;

struct ChannelState {
    active: CelebrationKind,
    generation: u64,
    commits: u64,
    delivery: Arc<DeliveryLock>,
    observers: Vec<(u64, Observer)>,
    timers: Vec<TimerHandle>,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            active: CelebrationKind::None,
            generation: 0,
            commits: 0,
            delivery: Arc::new(ReentrantMutex::new(Cell::new(0))),
            observers: Vec::new(),
            timers: Vec::new(),
        }
    }
}

impl ChannelState {
    /// Record the current `active` value as a new commit for every observer.
    fn commit(&mut self) -> Commit {
        self.commits += 1;
        Commit {
            seq: self.commits,
            kind: self.active,
            observers: self.observers.iter().map(|(_, o)| Arc::clone(o)).collect(),
            delivery: Arc::clone(&self.delivery),
        }
    }

    /// The current value as seen by one new observer.
    fn replay(&self, observer: Observer) -> Commit {
        Commit {
            seq: self.commits,
            kind: self.active,
            observers: vec![observer],
            delivery: Arc::clone(&self.delivery),
        }
    }

    fn cancel_timers(&mut self) {
        for timer in self.timers.drain(..) {
            timer.cancel();
        }
    }
}

struct RegistryInner {
    channels: Mutex<HashMap<String, ChannelState>>,
    scheduler: Arc<dyn Scheduler>,
    timings: CelebrationTimings,
    mode: FeedbackMode,
    next_observer_id: AtomicU64,
}

impl RegistryInner {
    fn unknown(&self, channel: &str) -> FeedbackError {
        FeedbackError::UnknownChannel {
            channel: channel.to_string(),
        }
    }

    /// Auto-clear callback body.
    fn expire(&self, channel: &str, generation: u64) {
        let commit = {
            let mut channels = self.channels.lock();
            let Some(state) = channels.get_mut(channel) else {
                return;
            };
            state.timers.retain(TimerHandle::is_pending);
            if state.generation != generation {
                log::debug!(
                    "[celebration] stale auto-clear on '{channel}' ignored (gen {generation}, now {})",
                    state.generation
                );
                return;
            }
            if !state.active.is_active() {
                return;
            }
            log::debug!("[celebration] auto-clear '{channel}' ({})", state.active);
            state.active = CelebrationKind::None;
            state.commit()
        };
        commit.deliver(channel);
    }

    fn remove_observer(&self, channel: &str, id: u64) {
        let mut channels = self.channels.lock();
        if let Some(state) = channels.get_mut(channel) {
            state.observers.retain(|(oid, _)| *oid != id);
        }
    }
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        for state in self.channels.get_mut().values_mut() {
            state.cancel_timers();
        }
    }
}

/// A committed channel value waiting to be handed to observers.
struct Commit {
    seq: u64,
    kind: CelebrationKind,
    observers: Vec<Observer>,
    delivery: Arc<DeliveryLock>,
}

impl Commit {
    /// Notify the snapshot of observers unless a newer commit got there first.
    fn deliver(self, channel: &str) {
        let delivered = self.delivery.lock();
        if delivered.get() > self.seq {
            log::debug!(
                "[celebration] '{channel}' = {} superseded before delivery (commit {})",
                self.kind,
                self.seq
            );
            return;
        }
        delivered.set(self.seq);
        for observer in &self.observers {
            // An observer published on this channel re-entrantly.
            if delivered.get() != self.seq {
                break;
            }
            call(channel, observer, self.kind);
        }
    }

    /// Replay to a newly registered observer. Commits after `seq` already
    /// include it in their snapshot, so only those can make the replay stale.
    fn replay(self, channel: &str) {
        let delivered = self.delivery.lock();
        if delivered.get() > self.seq {
            return;
        }
        for observer in &self.observers {
            call(channel, observer, self.kind);
        }
    }
}

fn call(channel: &str, observer: &Observer, kind: CelebrationKind) {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| observer(kind)));
    if let Err(e) = result {
        log::error!("[celebration] observer on '{channel}' panicked: {e:?}");
    }
}

/// Broadcast registry for celebration channels.
///
/// Cheap to clone; clones share state. Build one per client at the
/// composition root and hand clones to producers and renderers.
#[derive(Clone)]
pub struct CelebrationRegistry {
    inner: Arc<RegistryInner>,
}

impl CelebrationRegistry {
    /// Build a registry that knows exactly `channels`.
    pub fn new<I, S>(
        channels: I,
        timings: CelebrationTimings,
        mode: FeedbackMode,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let channels = channels
            .into_iter()
            .map(|name| (name.into(), ChannelState::default()))
            .collect();
        Self {
            inner: Arc::new(RegistryInner {
                channels: Mutex::new(channels),
                scheduler,
                timings,
                mode,
                next_observer_id: AtomicU64::new(1),
            }),
        }
    }

    /// Registry with the `celebration` and `confetti` channels.
    pub fn with_default_channels(config: &FeedbackConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        Self::new(DEFAULT_CHANNELS, config.celebrations, config.mode, scheduler)
    }

    /// Names of the known channels, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.channels.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn mode(&self) -> FeedbackMode {
        self.inner.mode
    }

    // -----------------------------------------------------------------------
    // Subscription
    // -----------------------------------------------------------------------

    /// Register `observer` on `channel` and immediately replay the current value.
    ///
    /// A renderer mounting mid-celebration receives the in-flight kind; one
    /// mounting after the auto-clear receives [`CelebrationKind::None`].
    pub fn subscribe(
        &self,
        channel: &str,
        observer: impl Fn(CelebrationKind) + Send + Sync + 'static,
    ) -> Result<Subscription> {
        let observer: Observer = Arc::new(observer);
        let id = self.inner.next_observer_id.fetch_add(1, Ordering::Relaxed);

        let replay = {
            let mut channels = self.inner.channels.lock();
            match channels.get_mut(channel) {
                Some(state) => {
                    state.observers.push((id, Arc::clone(&observer)));
                    state.replay(observer)
                }
                None => {
                    self.inner.mode.misuse(self.inner.unknown(channel))?;
                    return Ok(Subscription::inert(channel));
                }
            }
        };

        replay.replay(channel);

        Ok(Subscription {
            registry: Arc::downgrade(&self.inner),
            channel: channel.to_string(),
            id,
            active: AtomicBool::new(true),
        })
    }

    // -----------------------------------------------------------------------
    // Publishing
    // -----------------------------------------------------------------------

    /// Make `kind` the channel's active value and schedule its auto-clear.
    ///
    /// Publishing [`CelebrationKind::None`] is the same as [`clear`](Self::clear).
    pub fn publish(&self, channel: &str, kind: CelebrationKind) -> Result<()> {
        if !kind.is_active() {
            return self.clear(channel);
        }

        let commit = {
            let mut channels = self.inner.channels.lock();
            let Some(state) = channels.get_mut(channel) else {
                return self.inner.mode.misuse(self.inner.unknown(channel));
            };

            state.active = kind;
            state.generation += 1;
            let generation = state.generation;
            state.timers.retain(TimerHandle::is_pending);

            if let Some(timing) = self.inner.timings.for_kind(kind) {
                let weak = Arc::downgrade(&self.inner);
                let name = channel.to_string();
                let timer = self.inner.scheduler.schedule(
                    timing.duration(),
                    Box::new(move || {
                        if let Some(inner) = weak.upgrade() {
                            inner.expire(&name, generation);
                        }
                    }),
                );
                state.timers.push(timer);
            }

            log::debug!(
                "[celebration] publish '{channel}' = {kind} (gen {generation}, {} observers)",
                state.observers.len()
            );
            state.commit()
        };

        commit.deliver(channel);
        Ok(())
    }

    /// Reset the channel to `None` now and cancel its pending auto-clear timers.
    pub fn clear(&self, channel: &str) -> Result<()> {
        let commit = {
            let mut channels = self.inner.channels.lock();
            let Some(state) = channels.get_mut(channel) else {
                return self.inner.mode.misuse(self.inner.unknown(channel));
            };
            state.cancel_timers();
            state.generation += 1;
            state.active = CelebrationKind::None;
            log::debug!("[celebration] clear '{channel}' (gen {})", state.generation);
            state.commit()
        };

        commit.deliver(channel);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// Current value of `channel`; unknown channels read as `None`.
    pub fn current(&self, channel: &str) -> CelebrationKind {
        self.inner
            .channels
            .lock()
            .get(channel)
            .map(|s| s.active)
            .unwrap_or_default()
    }

    /// Generation counter of `channel`; zero until the first publish or clear.
    pub fn generation(&self, channel: &str) -> u64 {
        self.inner
            .channels
            .lock()
            .get(channel)
            .map(|s| s.generation)
            .unwrap_or(0)
    }

    pub fn observer_count(&self, channel: &str) -> usize {
        self.inner
            .channels
            .lock()
            .get(channel)
            .map(|s| s.observers.len())
            .unwrap_or(0)
    }

    /// Auto-clear timers of `channel` that have neither fired nor been cancelled.
    pub fn pending_timers(&self, channel: &str) -> usize {
        self.inner
            .channels
            .lock()
            .get(channel)
            .map(|s| s.timers.iter().filter(|t| t.is_pending()).count())
            .unwrap_or(0)
    }
}

impl fmt::Debug for CelebrationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CelebrationRegistry")
            .field("channels", &self.channels())
            .field("mode", &self.inner.mode)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Observer registration. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes its observer"]
pub struct Subscription {
    registry: Weak<RegistryInner>,
    channel: String,
    id: u64,
    active: AtomicBool,
}

impl Subscription {
    fn inert(channel: &str) -> Self {
        Self {
            registry: Weak::new(),
            channel: channel.to_string(),
            id: 0,
            active: AtomicBool::new(false),
        }
    }

    /// Remove the observer. Idempotent.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            if let Some(inner) = self.registry.upgrade() {
                inner.remove_observer(&self.channel, self.id);
            }
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::celebration::{CELEBRATION_CHANNEL, CONFETTI_CHANNEL};
    use crate::scheduler::ManualScheduler;
    use std::time::Duration;

    const CH: &str = CONFETTI_CHANNEL;

    fn setup(mode: FeedbackMode) -> (Arc<ManualScheduler>, CelebrationRegistry) {
        let scheduler = Arc::new(ManualScheduler::new());
        let config = FeedbackConfig {
            mode,
            ..FeedbackConfig::default()
        };
        let registry = CelebrationRegistry::with_default_channels(&config, scheduler.clone());
        (scheduler, registry)
    }

    fn record(
        registry: &CelebrationRegistry,
        channel: &str,
    ) -> (Arc<Mutex<Vec<CelebrationKind>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = registry
            .subscribe(channel, move |kind| sink.lock().push(kind))
            .unwrap();
        (seen, sub)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_publish_notifies_in_subscription_order() {
        let (_, registry) = setup(FeedbackMode::Development);
        let order = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (Arc::clone(&order), Arc::clone(&order));
        let _s1 = registry.subscribe(CH, move |k| a.lock().push(("first", k))).unwrap();
        let _s2 = registry.subscribe(CH, move |k| b.lock().push(("second", k))).unwrap();
        order.lock().clear();

        registry.publish(CH, CelebrationKind::Achievement).unwrap();
        assert_eq!(
            *order.lock(),
            vec![
                ("first", CelebrationKind::Achievement),
                ("second", CelebrationKind::Achievement)
            ]
        );
        assert_eq!(registry.current(CH), CelebrationKind::Achievement);
        assert_eq!(registry.generation(CH), 1);
    }

    #[test]
    fn test_auto_clear_after_kind_duration() {
        let (scheduler, registry) = setup(FeedbackMode::Development);
        let (seen, _sub) = record(&registry, CH);

        registry.publish(CH, CelebrationKind::LevelUp).unwrap();
        scheduler.advance(ms(8_499));
        assert_eq!(registry.current(CH), CelebrationKind::LevelUp);
        scheduler.advance(ms(1));
        assert_eq!(registry.current(CH), CelebrationKind::None);
        assert_eq!(
            *seen.lock(),
            vec![
                CelebrationKind::None,
                CelebrationKind::LevelUp,
                CelebrationKind::None
            ]
        );
    }

    #[test]
    fn test_stale_timer_does_not_clear_later_publish() {
        let (scheduler, registry) = setup(FeedbackMode::Development);

        registry.publish(CH, CelebrationKind::Default).unwrap();
        scheduler.advance(ms(5_000));
        registry.publish(CH, CelebrationKind::Mega).unwrap();

        // The first publish's 7.5s timer fires here and must be ignored.
        scheduler.advance(ms(2_600));
        assert_eq!(registry.current(CH), CelebrationKind::Mega);

        // Mega's own 10s timer: 5s + 10s = 15s.
        scheduler.advance(ms(7_399));
        assert_eq!(registry.current(CH), CelebrationKind::Mega);
        scheduler.advance(ms(1));
        assert_eq!(registry.current(CH), CelebrationKind::None);
    }

    #[test]
    fn test_longer_first_timer_cannot_cut_shorter_second() {
        let (scheduler, registry) = setup(FeedbackMode::Development);

        registry.publish(CH, CelebrationKind::Mega).unwrap();
        scheduler.advance(ms(9_000));
        registry.publish(CH, CelebrationKind::Default).unwrap();
        scheduler.advance(ms(1_500));
        assert_eq!(registry.current(CH), CelebrationKind::Default);
        scheduler.advance(ms(6_000));
        assert_eq!(registry.current(CH), CelebrationKind::None);
    }

    #[test]
    fn test_late_subscriber_replay() {
        let (scheduler, registry) = setup(FeedbackMode::Development);
        registry.publish(CH, CelebrationKind::Achievement).unwrap();
        scheduler.advance(ms(1_000));

        let (mid, _mid_sub) = record(&registry, CH);
        assert_eq!(*mid.lock(), vec![CelebrationKind::Achievement]);

        scheduler.advance(ms(10_000));
        let (late, _late_sub) = record(&registry, CH);
        assert_eq!(*late.lock(), vec![CelebrationKind::None]);
    }

    #[test]
    fn test_clear_cancels_pending_timer() {
        let (scheduler, registry) = setup(FeedbackMode::Development);
        let (seen, _sub) = record(&registry, CH);

        registry.publish(CH, CelebrationKind::Mega).unwrap();
        assert_eq!(registry.pending_timers(CH), 1);
        registry.clear(CH).unwrap();
        assert_eq!(registry.pending_timers(CH), 0);
        assert_eq!(registry.current(CH), CelebrationKind::None);
        assert_eq!(scheduler.advance(ms(20_000)), 0);
        assert_eq!(seen.lock().last(), Some(&CelebrationKind::None));
        assert_eq!(seen.lock().len(), 3);
    }

    #[test]
    fn test_channels_are_independent() {
        let (scheduler, registry) = setup(FeedbackMode::Development);
        registry.publish(CELEBRATION_CHANNEL, CelebrationKind::Mega).unwrap();
        registry.publish(CONFETTI_CHANNEL, CelebrationKind::Default).unwrap();
        scheduler.advance(ms(7_500));
        assert_eq!(registry.current(CONFETTI_CHANNEL), CelebrationKind::None);
        assert_eq!(registry.current(CELEBRATION_CHANNEL), CelebrationKind::Mega);
    }

    #[test]
    fn test_unknown_channel_by_mode() {
        let (_, dev) = setup(FeedbackMode::Development);
        let err = dev.publish("sparkles", CelebrationKind::Default).unwrap_err();
        assert!(matches!(err, FeedbackError::UnknownChannel { .. }));
        assert!(dev.subscribe("sparkles", |_| {}).is_err());
        assert!(dev.clear("sparkles").is_err());

        let (scheduler, prod) = setup(FeedbackMode::Production);
        prod.publish("sparkles", CelebrationKind::Default).unwrap();
        let sub = prod.subscribe("sparkles", |_| {}).unwrap();
        assert!(!sub.is_active());
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_unsubscribe_is_idempotent_and_drop_unsubscribes() {
        let (_, registry) = setup(FeedbackMode::Development);
        let (seen, sub) = record(&registry, CH);
        assert_eq!(registry.observer_count(CH), 1);

        sub.unsubscribe();
        sub.unsubscribe();
        assert_eq!(registry.observer_count(CH), 0);
        registry.publish(CH, CelebrationKind::Default).unwrap();
        assert_eq!(*seen.lock(), vec![CelebrationKind::None]);

        let (_, other) = record(&registry, CH);
        assert_eq!(registry.observer_count(CH), 1);
        drop(other);
        assert_eq!(registry.observer_count(CH), 0);
    }

    #[test]
    fn test_panicking_observer_does_not_block_others() {
        let (_, registry) = setup(FeedbackMode::Development);
        let _bad = registry
            .subscribe(CH, |kind| {
                if kind.is_active() {
                    panic!("render failure");
                }
            })
            .unwrap();
        let (seen, _good) = record(&registry, CH);
        registry.publish(CH, CelebrationKind::Default).unwrap();
        assert_eq!(seen.lock().last(), Some(&CelebrationKind::Default));
    }

    #[test]
    fn test_observer_may_publish_reentrantly() {
        let (_, registry) = setup(FeedbackMode::Development);
        let chained = registry.clone();
        let _sub = registry
            .subscribe(CELEBRATION_CHANNEL, move |kind| {
                if kind == CelebrationKind::Mega {
                    let _ = chained.publish(CONFETTI_CHANNEL, CelebrationKind::LevelUp);
                }
            })
            .unwrap();
        registry.publish(CELEBRATION_CHANNEL, CelebrationKind::Mega).unwrap();
        assert_eq!(registry.current(CONFETTI_CHANNEL), CelebrationKind::LevelUp);
    }

    #[test]
    fn test_reentrant_publish_supersedes_outer_delivery() {
        let (_, registry) = setup(FeedbackMode::Development);
        let chained = registry.clone();
        let _first = registry
            .subscribe(CH, move |kind| {
                if kind == CelebrationKind::Default {
                    let _ = chained.publish(CH, CelebrationKind::Achievement);
                }
            })
            .unwrap();
        let (seen, _second) = record(&registry, CH);

        registry.publish(CH, CelebrationKind::Default).unwrap();
        assert_eq!(registry.current(CH), CelebrationKind::Achievement);
        assert_eq!(
            *seen.lock(),
            vec![CelebrationKind::None, CelebrationKind::Achievement]
        );
    }

    #[test]
    fn test_auto_clear_on_timer_thread_cannot_land_after_newer_publish() {
        let (scheduler, registry) = setup(FeedbackMode::Development);
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let entered_tx = Mutex::new(entered_tx);
        // A slow renderer holds up the auto-clear delivery on the timer thread.
        let _slow = registry
            .subscribe(CH, move |kind| {
                if kind == CelebrationKind::None && std::thread::current().name() == Some("timer") {
                    let _ = entered_tx.lock().send(());
                    std::thread::sleep(ms(50));
                }
            })
            .unwrap();
        let (seen, _renderer) = record(&registry, CH);
        registry.publish(CH, CelebrationKind::Default).unwrap();

        let timer = std::thread::Builder::new()
            .name("timer".into())
            .spawn({
                let scheduler = Arc::clone(&scheduler);
                move || scheduler.advance(ms(7_500))
            })
            .unwrap();
        entered_rx.recv_timeout(ms(5_000)).unwrap();
        registry.publish(CH, CelebrationKind::Mega).unwrap();
        assert_eq!(timer.join().unwrap(), 1);

        assert_eq!(registry.current(CH), CelebrationKind::Mega);
        assert_eq!(
            *seen.lock(),
            vec![
                CelebrationKind::None,
                CelebrationKind::Default,
                CelebrationKind::None,
                CelebrationKind::Mega,
            ]
        );
    }

    #[test]
    fn test_dropped_registry_timers_are_inert() {
        let (scheduler, registry) = setup(FeedbackMode::Development);
        registry.publish(CH, CelebrationKind::Default).unwrap();
        drop(registry);
        assert_eq!(scheduler.pending(), 0);
        assert_eq!(scheduler.advance(ms(10_000)), 0);
    }

    #[test]
    fn test_publish_none_clears() {
        let (_, registry) = setup(FeedbackMode::Development);
        registry.publish(CH, CelebrationKind::Default).unwrap();
        registry.publish(CH, CelebrationKind::None).unwrap();
        assert_eq!(registry.current(CH), CelebrationKind::None);
        assert_eq!(registry.pending_timers(CH), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_guard_on_tokio_clock() {
        let scheduler = Arc::new(crate::scheduler::TokioScheduler::try_current().unwrap());
        let registry =
            CelebrationRegistry::with_default_channels(&FeedbackConfig::default(), scheduler);

        registry.publish(CH, CelebrationKind::Default).unwrap();
        tokio::time::sleep(ms(4_000)).await;
        registry.publish(CH, CelebrationKind::Achievement).unwrap();
        tokio::time::sleep(ms(4_000)).await;
        assert_eq!(registry.current(CH), CelebrationKind::Achievement);
        tokio::time::sleep(ms(4_100)).await;
        assert_eq!(registry.current(CH), CelebrationKind::None);
    }
}
