//! # gamify-feedback
//!
//! Client-side gamification feedback engine for a professional-development
//! tracker. Users log goals, competencies and activities; this crate turns
//! the XP the server awards into celebratory feedback.
//!
//! - [`scoring`]: pure XP previews for drafts, one static rule set per activity kind.
//! - [`celebration`]: named broadcast channels, each holding at most one active
//!   celebration that auto-clears after a per-kind duration.
//! - [`notifications`] / [`floating_xp`]: additive queues of self-expiring entries.
//! - [`orchestrator`]: maps one server-reported outcome to exactly one feedback action.
//! - [`profile`]: last known gamification profile and the refresh seam.
//!
//! Timers go through the [`scheduler::Scheduler`] trait, so the same engine
//! runs on a tokio runtime or on a manually driven virtual clock.

pub mod celebration;
pub mod config;
pub mod ephemeral;
pub mod error;
pub mod floating_xp;
pub mod notifications;
pub mod orchestrator;
pub mod profile;
pub mod scheduler;
pub mod scoring;

pub use celebration::{CelebrationKind, CelebrationRegistry, ConfettiIntensity, Subscription};
pub use config::FeedbackConfig;
pub use ephemeral::{Ephemeral, EntryId, EphemeralQueue};
pub use error::{FeedbackError, FeedbackMode, Result};
pub use floating_xp::{Anchor, FloatingXpQueue};
pub use notifications::{NotificationDraft, NotificationQueue, XpNotification};
pub use orchestrator::{ActivityOutcome, FeedbackAction, FeedbackReport, GamificationOrchestrator, ProcessOptions};
pub use profile::{GamificationProfile, ProfileCache, ProfileSource, RefreshRequester};
pub use scheduler::{ManualScheduler, Scheduler, TokioScheduler};
pub use scoring::{score, ActivityKind, RuleSet, ScoreResult, Scored, Validate};
