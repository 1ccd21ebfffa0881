//! XP toast notifications.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::FeedbackConfig;
use crate::ephemeral::{Ephemeral, EntryId, EphemeralQueue, QueueSubscription};
use crate::error::{FeedbackError, FeedbackMode, Result};
use crate::profile::BadgeRarity;
use crate::scheduler::Scheduler;

/// Action label used when a production push arrives without one.
pub const FALLBACK_ACTION: &str = "activity";

const BLANK_ACTION: &str = "notification action is blank";
const LEVEL_ZERO: &str = "level-up notification for level 0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelUpInfo {
    pub new_level: u32,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeUnlock {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub rarity: BadgeRarity,
}

/// Payload of one toast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XpNotification {
    pub xp_gained: i64,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_up: Option<LevelUpInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge_unlocked: Option<BadgeUnlock>,
}

/// A queued toast.
pub type NotificationEntry = Ephemeral<XpNotification>;

/// What callers hand to [`NotificationQueue::push`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationDraft {
    pub xp_gained: i64,
    pub action: String,
    pub level_up: Option<LevelUpInfo>,
    pub badge_unlocked: Option<BadgeUnlock>,
    /// Overrides the configured lifetime; `Some(0)` makes the toast sticky.
    pub duration_ms: Option<u64>,
}

impl NotificationDraft {
    pub fn new(xp_gained: i64, action: impl Into<String>) -> Self {
        Self {
            xp_gained,
            action: action.into(),
            ..Default::default()
        }
    }

    pub fn with_level_up(mut self, info: LevelUpInfo) -> Self {
        self.level_up = Some(info);
        self
    }

    pub fn with_badge(mut self, badge: BadgeUnlock) -> Self {
        self.badge_unlocked = Some(badge);
        self
    }

    /// First reason `push` would reject this draft in development.
    pub fn defect(&self) -> Option<&'static str> {
        if self.action.trim().is_empty() {
            Some(BLANK_ACTION)
        } else if self.level_up.as_ref().is_some_and(|l| l.new_level == 0) {
            Some(LEVEL_ZERO)
        } else {
            None
        }
    }

    pub fn sticky(mut self) -> Self {
        self.duration_ms = Some(0);
        self
    }
}

/// Ordered stack of self-expiring XP toasts. Clones share state.
#[derive(Clone, Debug)]
pub struct NotificationQueue {
    queue: EphemeralQueue<XpNotification>,
    mode: FeedbackMode,
}

impl NotificationQueue {
    pub fn new(default_duration: Duration, mode: FeedbackMode, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            queue: EphemeralQueue::new("xp", default_duration, scheduler),
            mode,
        }
    }

    pub fn from_config(config: &FeedbackConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        Self::new(config.notification_duration(), config.mode, scheduler)
    }

    /// Append a toast and arm its removal timer.
    ///
    /// A blank action or a level-up to level zero is malformed: an error in
    /// development, repaired and logged in production.
    pub fn push(&self, draft: NotificationDraft) -> Result<EntryId> {
        let NotificationDraft {
            xp_gained,
            mut action,
            mut level_up,
            badge_unlocked,
            duration_ms,
        } = draft;

        if action.trim().is_empty() {
            self.mode.misuse(FeedbackError::MalformedEntry {
                reason: BLANK_ACTION.into(),
            })?;
            action = FALLBACK_ACTION.to_string();
        }
        if level_up.as_ref().is_some_and(|l| l.new_level == 0) {
            self.mode.misuse(FeedbackError::MalformedEntry {
                reason: LEVEL_ZERO.into(),
            })?;
            level_up = None;
        }

        let payload = XpNotification {
            xp_gained,
            action,
            level_up,
            badge_unlocked,
        };
        Ok(self
            .queue
            .push(payload, duration_ms.map(Duration::from_millis)))
    }

    /// Dismiss a toast. Unknown ids are ignored.
    /// Reject a malformed draft up front in development without queueing it.
    /// Production always passes; `push` repairs the draft there.
    pub fn check(&self, draft: &NotificationDraft) -> Result<()> {
        match (self.mode, draft.defect()) {
            (FeedbackMode::Development, Some(reason)) => Err(FeedbackError::MalformedEntry {
                reason: reason.into(),
            }),
            _ => Ok(()),
        }
    }

    pub fn remove(&self, id: &str) -> bool {
        self.queue.remove(id)
    }

    pub fn clear(&self) {
        self.queue.clear();
    }

    pub fn entries(&self) -> Vec<NotificationEntry> {
        self.queue.entries()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Observe the list; the current list is replayed immediately.
    pub fn subscribe(
        &self,
        observer: impl Fn(&[NotificationEntry]) + Send + Sync + 'static,
    ) -> QueueSubscription<XpNotification> {
        self.queue.subscribe(observer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;

    fn queue(mode: FeedbackMode) -> (Arc<ManualScheduler>, NotificationQueue) {
        let scheduler = Arc::new(ManualScheduler::new());
        let q = NotificationQueue::new(Duration::from_millis(4_000), mode, scheduler.clone());
        (scheduler, q)
    }

    #[test]
    fn test_toast_expires_after_configured_duration() {
        let (scheduler, q) = queue(FeedbackMode::Development);
        let id = q.push(NotificationDraft::new(60, "Goal updated")).unwrap();
        assert!(id.starts_with("xp-"));

        scheduler.advance(Duration::from_millis(3_999));
        assert_eq!(q.len(), 1);
        scheduler.advance(Duration::from_millis(1));
        assert!(q.is_empty());
    }

    #[test]
    fn test_sticky_toast_stays() {
        let (scheduler, q) = queue(FeedbackMode::Development);
        let id = q.push(NotificationDraft::new(10, "Pinned").sticky()).unwrap();
        scheduler.advance(Duration::from_secs(30));
        assert_eq!(q.entries()[0].id, id);
        assert!(q.remove(&id));
        assert!(!q.remove(&id));
    }

    #[test]
    fn test_blank_action_rejected_in_development() {
        let (_, q) = queue(FeedbackMode::Development);
        let err = q.push(NotificationDraft::new(10, "  ")).unwrap_err();
        assert!(matches!(err, FeedbackError::MalformedEntry { .. }));
        assert!(q.is_empty());
    }

    #[test]
    fn test_check_matches_push_without_queueing() {
        let (_, dev) = queue(FeedbackMode::Development);
        let blank = NotificationDraft::new(10, "  ");
        assert!(matches!(
            dev.check(&blank),
            Err(FeedbackError::MalformedEntry { .. })
        ));
        assert!(dev.check(&NotificationDraft::new(10, "Goal created")).is_ok());
        assert!(dev.is_empty());

        let (_, prod) = queue(FeedbackMode::Production);
        assert!(prod.check(&blank).is_ok());
        assert!(prod.is_empty());
    }

    #[test]
    fn test_blank_action_repaired_in_production() {
        let (_, q) = queue(FeedbackMode::Production);
        q.push(NotificationDraft::new(10, "")).unwrap();
        q.push(
            NotificationDraft::new(0, "Level up").with_level_up(LevelUpInfo {
                new_level: 0,
                title: "Rising Talent".into(),
            }),
        )
        .unwrap();
        let entries = q.entries();
        assert_eq!(entries[0].payload.action, FALLBACK_ACTION);
        assert!(entries[1].payload.level_up.is_none());
    }

    #[test]
    fn test_entry_json_flattens_payload() {
        let (_, q) = queue(FeedbackMode::Development);
        q.push(
            NotificationDraft::new(150, "Certification").with_badge(BadgeUnlock {
                id: "cert-1".into(),
                name: "Certified".into(),
                rarity: BadgeRarity::Legendary,
            }),
        )
        .unwrap();
        let json = serde_json::to_value(&q.entries()[0]).unwrap();
        assert_eq!(json["xpGained"], 150);
        assert_eq!(json["durationMs"], 4_000);
        assert_eq!(json["badgeUnlocked"]["rarity"], "legendary");
        assert!(json.get("levelUp").is_none());
    }
}
