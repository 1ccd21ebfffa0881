//! Floating "+N XP" animations.
//!
//! Any number may be on screen at once, each removing itself when its
//! float-up animation ends.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::FeedbackConfig;
use crate::ephemeral::{Ephemeral, EntryId, EphemeralQueue, QueueSubscription};
use crate::error::{FeedbackError, FeedbackMode, Result};
use crate::scheduler::Scheduler;

/// Where an animation starts.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Anchor {
    #[default]
    ViewportCenter,
    Point { x: f64, y: f64 },
}

impl Anchor {
    /// Pixel position inside a `width` x `height` viewport.
    pub fn resolve(self, width: f64, height: f64) -> (f64, f64) {
        match self {
            Anchor::ViewportCenter => (width / 2.0, height / 2.0),
            Anchor::Point { x, y } => (x, y),
        }
    }
}

/// Colour tier of the floating label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XpTone {
    Low,
    Medium,
    High,
    Epic,
}

impl XpTone {
    pub fn for_amount(amount: i64) -> Self {
        match amount {
            100.. => XpTone::Epic,
            50..=99 => XpTone::High,
            25..=49 => XpTone::Medium,
            _ => XpTone::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloatingXp {
    pub amount: i64,
    pub anchor: Anchor,
    pub tone: XpTone,
}

pub type FloatingXpEntry = Ephemeral<FloatingXp>;

/// Live floating animations. Clones share state.
#[derive(Clone, Debug)]
pub struct FloatingXpQueue {
    queue: EphemeralQueue<FloatingXp>,
    mode: FeedbackMode,
}

impl FloatingXpQueue {
    pub fn new(duration: Duration, mode: FeedbackMode, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            queue: EphemeralQueue::new("float", duration, scheduler),
            mode,
        }
    }

    pub fn from_config(config: &FeedbackConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        Self::new(config.floating_xp_duration(), config.mode, scheduler)
    }

    /// Start a "+`amount` XP" animation at `anchor`.
    ///
    /// Non-positive amounts are malformed; production skips them and
    /// returns `Ok(None)`.
    pub fn trigger(&self, amount: i64, anchor: Anchor) -> Result<Option<EntryId>> {
        if amount <= 0 {
            self.mode.misuse(FeedbackError::MalformedEntry {
                reason: format!("floating xp amount must be positive, got {amount}"),
            })?;
            return Ok(None);
        }
        let payload = FloatingXp {
            amount,
            anchor,
            tone: XpTone::for_amount(amount),
        };
        Ok(Some(self.queue.push(payload, None)))
    }

    pub fn remove(&self, id: &str) -> bool {
        self.queue.remove(id)
    }

    pub fn clear(&self) {
        self.queue.clear();
    }

    pub fn entries(&self) -> Vec<FloatingXpEntry> {
        self.queue.entries()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn subscribe(
        &self,
        observer: impl Fn(&[FloatingXpEntry]) + Send + Sync + 'static,
    ) -> QueueSubscription<FloatingXp> {
        self.queue.subscribe(observer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;

    #[test]
    fn test_tone_tiers() {
        assert_eq!(XpTone::for_amount(150), XpTone::Epic);
        assert_eq!(XpTone::for_amount(100), XpTone::Epic);
        assert_eq!(XpTone::for_amount(60), XpTone::High);
        assert_eq!(XpTone::for_amount(25), XpTone::Medium);
        assert_eq!(XpTone::for_amount(24), XpTone::Low);
    }

    #[test]
    fn test_concurrent_animations_expire_independently() {
        let scheduler = Arc::new(ManualScheduler::new());
        let floats = FloatingXpQueue::new(
            Duration::from_millis(2_100),
            FeedbackMode::Development,
            scheduler.clone(),
        );
        floats.trigger(60, Anchor::ViewportCenter).unwrap();
        scheduler.advance(Duration::from_millis(1_000));
        floats
            .trigger(10, Anchor::Point { x: 12.0, y: 40.0 })
            .unwrap();
        assert_eq!(floats.len(), 2);

        scheduler.advance(Duration::from_millis(1_100));
        let left = floats.entries();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].payload.amount, 10);

        scheduler.advance(Duration::from_millis(1_000));
        assert!(floats.is_empty());
    }

    #[test]
    fn test_non_positive_amount_by_mode() {
        let scheduler = Arc::new(ManualScheduler::new());
        let dev = FloatingXpQueue::new(Duration::from_secs(2), FeedbackMode::Development, scheduler.clone());
        assert!(dev.trigger(0, Anchor::default()).is_err());

        let prod = FloatingXpQueue::new(Duration::from_secs(2), FeedbackMode::Production, scheduler);
        assert_eq!(prod.trigger(-5, Anchor::default()).unwrap(), None);
        assert!(prod.is_empty());
    }

    #[test]
    fn test_anchor_resolution() {
        assert_eq!(Anchor::ViewportCenter.resolve(800.0, 600.0), (400.0, 300.0));
        assert_eq!(Anchor::Point { x: 5.0, y: 7.0 }.resolve(800.0, 600.0), (5.0, 7.0));
    }
}
