//! # Gamification Orchestrator
//!
//! Single decision point turning one server-reported [`ActivityOutcome`]
//! into feedback. Branches are mutually exclusive, first match wins:
//!
//! ```text
//! leveledUp            → celebration channel: LevelUp | Achievement | Mega
//!                        + level-up toast + profile refresh
//! xpEarned > 0         → floating "+N XP" + confetti (Light | Medium | Abundant)
//!                        + XP toast + profile refresh
//! otherwise            → nothing (refresh only if the caller asked for it)
//! ```
//!
//! Refreshes are fire-and-forget, so the animated amount may briefly
//! disagree with the cached profile total.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::celebration::{
    CelebrationKind, CelebrationRegistry, ConfettiIntensity, CELEBRATION_CHANNEL, CONFETTI_CHANNEL,
};
use crate::config::{FeedbackConfig, LevelTiers, XpIntensityThresholds};
use crate::ephemeral::EntryId;
use crate::error::{FeedbackMode, Result};
use crate::floating_xp::{Anchor, FloatingXpQueue};
use crate::notifications::{BadgeUnlock, LevelUpInfo, NotificationDraft, NotificationQueue};
use crate::profile::{level_title, RefreshRequester};
use crate::scheduler::Scheduler;

/// Action label for level-up toasts when the caller gives none.
pub const LEVEL_UP_ACTION: &str = "Level up";

/// Action label for XP toasts when the caller gives none.
pub const XP_GAIN_ACTION: &str = "Activity recorded";

/// Result of a create/update call as reported by the server.
///
/// Every field is optional on the wire; a missing `xpEarned` means there is
/// nothing to celebrate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityOutcome {
    pub xp_earned: Option<i64>,
    pub leveled_up: bool,
    pub previous_level: Option<u32>,
    pub new_level: Option<u32>,
    pub title: Option<String>,
    pub badge_unlocked: Option<BadgeUnlock>,
}

impl ActivityOutcome {
    pub fn xp(xp_earned: i64) -> Self {
        Self {
            xp_earned: Some(xp_earned),
            ..Default::default()
        }
    }

    pub fn level_up(new_level: u32) -> Self {
        Self {
            leveled_up: true,
            new_level: Some(new_level),
            ..Default::default()
        }
    }

    /// Reported new level, else one above the previous level.
    pub fn resolved_new_level(&self) -> Option<u32> {
        self.new_level
            .or_else(|| self.previous_level.map(|l| l.saturating_add(1)))
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessOptions {
    /// Toast label; defaults depend on the branch taken.
    pub action: Option<String>,
    /// Where the floating XP animation starts.
    pub anchor: Anchor,
    /// Refresh the profile even when nothing is celebrated.
    pub refresh_when_idle: bool,
}

impl ProcessOptions {
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn at(mut self, anchor: Anchor) -> Self {
        self.anchor = anchor;
        self
    }
}

/// The feedback chosen for one outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum FeedbackAction {
    LevelUp {
        tier: CelebrationKind,
        notification: Option<EntryId>,
    },
    XpGain {
        amount: i64,
        intensity: ConfettiIntensity,
        animation: Option<EntryId>,
        notification: Option<EntryId>,
    },
    Idle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackReport {
    pub action: FeedbackAction,
    pub refresh_requested: bool,
}

/// Maps outcomes onto the celebration registry, the toast queue and the
/// floating XP layer.
#[derive(Clone)]
pub struct GamificationOrchestrator {
    registry: CelebrationRegistry,
    notifications: NotificationQueue,
    floating: FloatingXpQueue,
    refresher: Arc<dyn RefreshRequester>,
    xp_intensity: XpIntensityThresholds,
    level_tiers: LevelTiers,
    mode: FeedbackMode,
}

impl GamificationOrchestrator {
    pub fn new(
        config: &FeedbackConfig,
        registry: CelebrationRegistry,
        notifications: NotificationQueue,
        floating: FloatingXpQueue,
        refresher: Arc<dyn RefreshRequester>,
    ) -> Self {
        Self {
            registry,
            notifications,
            floating,
            refresher,
            xp_intensity: config.xp_intensity,
            level_tiers: config.level_tiers,
            mode: config.mode,
        }
    }

    /// Build the registry and both queues from `config` on one scheduler.
    pub fn from_config(
        config: &FeedbackConfig,
        scheduler: Arc<dyn Scheduler>,
        refresher: Arc<dyn RefreshRequester>,
    ) -> Self {
        Self::new(
            config,
            CelebrationRegistry::with_default_channels(config, Arc::clone(&scheduler)),
            NotificationQueue::from_config(config, Arc::clone(&scheduler)),
            FloatingXpQueue::from_config(config, scheduler),
            refresher,
        )
    }

    pub fn registry(&self) -> &CelebrationRegistry {
        &self.registry
    }

    pub fn notifications(&self) -> &NotificationQueue {
        &self.notifications
    }

    pub fn floating_xp(&self) -> &FloatingXpQueue {
        &self.floating
    }

    /// Dispatch feedback for one outcome.
    ///
    /// Errors only surface in development mode; in production a failed step
    /// is logged and the remaining steps still run.
    pub fn process(&self, outcome: &ActivityOutcome, options: ProcessOptions) -> Result<FeedbackReport> {
        if outcome.leveled_up {
            return self.level_up(outcome, options);
        }
        match outcome.xp_earned {
            Some(amount) if amount > 0 => self.xp_gain(outcome, amount, options),
            other => {
                match other {
                    None => log::warn!("[orchestrator] outcome without xpEarned, skipping feedback"),
                    Some(xp) if xp < 0 => log::warn!("[orchestrator] negative xpEarned {xp}, skipping feedback"),
                    Some(_) => log::debug!("[orchestrator] nothing to celebrate"),
                }
                if options.refresh_when_idle {
                    self.refresher.request_refresh();
                }
                Ok(FeedbackReport {
                    action: FeedbackAction::Idle,
                    refresh_requested: options.refresh_when_idle,
                })
            }
        }
    }

    fn level_up(&self, outcome: &ActivityOutcome, options: ProcessOptions) -> Result<FeedbackReport> {
        let new_level = outcome.resolved_new_level();
        let tier = CelebrationKind::for_new_level(new_level, &self.level_tiers);
        log::info!("[orchestrator] level up to {new_level:?}: {tier} celebration");

        let level_up = new_level.map(|level| LevelUpInfo {
            new_level: level,
            title: outcome
                .title
                .clone()
                .unwrap_or_else(|| level_title(level).to_string()),
        });
        let draft = NotificationDraft {
            xp_gained: outcome.xp_earned.unwrap_or(0),
            action: options.action.unwrap_or_else(|| LEVEL_UP_ACTION.to_string()),
            level_up,
            badge_unlocked: outcome.badge_unlocked.clone(),
            duration_ms: None,
        };
        self.notifications.check(&draft)?;

        self.settle("publish level-up", self.registry.publish(CELEBRATION_CHANNEL, tier))?;
        let notification = self.settle("push level-up toast", self.notifications.push(draft))?;

        self.refresher.request_refresh();
        Ok(FeedbackReport {
            action: FeedbackAction::LevelUp { tier, notification },
            refresh_requested: true,
        })
    }

    fn xp_gain(&self, outcome: &ActivityOutcome, amount: i64, options: ProcessOptions) -> Result<FeedbackReport> {
        let intensity = ConfettiIntensity::from_xp(amount, &self.xp_intensity);
        log::info!("[orchestrator] +{amount} xp ({intensity:?} confetti)");

        let draft = NotificationDraft {
            xp_gained: amount,
            action: options.action.unwrap_or_else(|| XP_GAIN_ACTION.to_string()),
            level_up: None,
            badge_unlocked: outcome.badge_unlocked.clone(),
            duration_ms: None,
        };
        self.notifications.check(&draft)?;

        // Publish first: in development a failure here must leave nothing queued.
        self.settle(
            "publish confetti",
            self.registry.publish(CONFETTI_CHANNEL, intensity.celebration_kind()),
        )?;
        let animation = self
            .settle("trigger floating xp", self.floating.trigger(amount, options.anchor))?
            .flatten();

        let notification = self.settle("push xp toast", self.notifications.push(draft))?;

        self.refresher.request_refresh();
        Ok(FeedbackReport {
            action: FeedbackAction::XpGain {
                amount,
                intensity,
                animation,
                notification,
            },
            refresh_requested: true,
        })
    }

    /// Development: propagate. Production: log and keep going.
    fn settle<T>(&self, step: &str, result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if self.mode == FeedbackMode::Production => {
                log::warn!("[orchestrator] {step} failed: {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for GamificationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GamificationOrchestrator")
            .field("registry", &self.registry)
            .field("notifications", &self.notifications.len())
            .field("floating", &self.floating.len())
            .field("mode", &self.mode)
            .finish()
    }
}
