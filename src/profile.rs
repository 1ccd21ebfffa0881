//! Player profile snapshot and the refresh seam the orchestrator calls
//! after every processed outcome.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use crate::error::Result;

/// Badge tier, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeRarity {
    #[default]
    Common,
    Rare,
    Epic,
    Legendary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Badge {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub rarity: BadgeRarity,
    pub category: String,
    pub unlocked_at: Option<DateTime<Utc>>,
}

/// Server-side gamification state for the current user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GamificationProfile {
    pub level: u32,
    #[serde(rename = "currentXP")]
    pub current_xp: i64,
    #[serde(rename = "totalXP")]
    pub total_xp: i64,
    #[serde(rename = "nextLevelXP")]
    pub next_level_xp: i64,
    pub streak: u32,
    pub badges: Vec<Badge>,
}

impl GamificationProfile {
    /// Progress towards the next level in `[0, 1]`.
    pub fn progress_ratio(&self) -> f64 {
        if self.next_level_xp <= 0 {
            return 0.0;
        }
        (self.current_xp as f64 / self.next_level_xp as f64).clamp(0.0, 1.0)
    }

    pub fn title(&self) -> &'static str {
        level_title(self.level)
    }
}

/// Display title for a level.
pub fn level_title(level: u32) -> &'static str {
    match level {
        20.. => "Master Professional",
        15..=19 => "Senior Expert",
        10..=14 => "Advanced Practitioner",
        5..=9 => "Growing Professional",
        _ => "Rising Talent",
    }
}

/// Where profiles come from (usually the REST API).
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn fetch_profile(&self) -> Result<GamificationProfile>;
}

/// Fire-and-forget profile refresh.
pub trait RefreshRequester: Send + Sync {
    /// Ask for a refresh without waiting for it. Failures are logged, never returned.
    fn request_refresh(&self);
}

struct CacheInner {
    source: Arc<dyn ProfileSource>,
    /// Stored profile with the sequence of the request that produced it.
    profile: RwLock<Option<(u64, GamificationProfile)>>,
    requested: AtomicU64,
    completed: AtomicU64,
}

/// Last known profile. Clones share state.
#[derive(Clone)]
pub struct ProfileCache {
    inner: Arc<CacheInner>,
}

impl ProfileCache {
    pub fn new(source: Arc<dyn ProfileSource>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                source,
                profile: RwLock::new(None),
                requested: AtomicU64::new(0),
                completed: AtomicU64::new(0),
            }),
        }
    }

    /// Fetch from the source and store the result.
    ///
    /// On failure the previous snapshot is kept. A response is only stored
    /// if no later-started refresh has stored one already; the fetched
    /// profile is returned either way.
    pub async fn refresh(&self) -> Result<GamificationProfile> {
        let seq = self.next_request();
        self.refresh_as(seq).await
    }

    fn next_request(&self) -> u64 {
        self.inner.requested.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn refresh_as(&self, seq: u64) -> Result<GamificationProfile> {
        let profile = self.inner.source.fetch_profile().await?;
        {
            let mut stored = self.inner.profile.write();
            if let Some((newer, _)) = stored.as_ref().filter(|(s, _)| *s > seq) {
                log::debug!("[profile] dropping response to request {seq}, already have {newer}");
                return Ok(profile);
            }
            *stored = Some((seq, profile.clone()));
        }
        self.inner.completed.fetch_add(1, Ordering::SeqCst);
        log::debug!(
            "[profile] refreshed: level {} ({}/{} xp)",
            profile.level,
            profile.current_xp,
            profile.next_level_xp
        );
        Ok(profile)
    }

    pub fn snapshot(&self) -> Option<GamificationProfile> {
        self.inner.profile.read().as_ref().map(|(_, p)| p.clone())
    }

    /// Number of refreshes whose result was stored.
    pub fn refresh_count(&self) -> u64 {
        self.inner.completed.load(Ordering::SeqCst)
    }
}

impl RefreshRequester for ProfileCache {
    fn request_refresh(&self) {
        match Handle::try_current() {
            Ok(handle) => {
                let cache = self.clone();
                let seq = self.next_request();
                handle.spawn(async move {
                    if let Err(e) = cache.refresh_as(seq).await {
                        log::warn!("[profile] background refresh failed: {e}");
                    }
                });
            }
            Err(_) => log::debug!("[profile] no tokio runtime, skipping refresh"),
        }
    }
}

impl std::fmt::Debug for ProfileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileCache")
            .field("profile", &self.snapshot())
            .field("refreshes", &self.refresh_count())
            .finish()
    }
}
