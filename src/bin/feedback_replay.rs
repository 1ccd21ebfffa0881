//! feedback-replay: drive the feedback engine from recorded outcomes.
//!
//! Reads a JSON array of activity outcomes and replays them one second
//! apart through a tokio-backed orchestrator, logging every celebration
//! channel change and every notification list change.
//!
//! # Usage
//!
//! ```bash
//! feedback-replay outcomes.json [feedback.yaml]
//! ```
//!
//! # Environment Variables
//!
//! - `GAMIFY_FEEDBACK_MODE`: "development" or "production"
//! - `RUST_LOG`: Tracing filter (default: "info,gamify_feedback=debug")

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;

use gamify_feedback::profile::level_title;
use gamify_feedback::{
    ActivityOutcome, FeedbackConfig, GamificationOrchestrator, GamificationProfile, ProcessOptions,
    ProfileCache, ProfileSource, Scheduler, Subscription, TokioScheduler,
};

/// Stands in for the profile endpoint: accumulates replayed XP.
#[derive(Default)]
struct ReplayProfiles {
    profile: Mutex<GamificationProfile>,
}

impl ReplayProfiles {
    fn apply(&self, outcome: &ActivityOutcome) {
        let mut profile = self.profile.lock();
        let xp = outcome.xp_earned.unwrap_or(0);
        profile.total_xp += xp;
        profile.current_xp += xp;
        if outcome.leveled_up {
            let next = profile.level + 1;
            profile.level = outcome.resolved_new_level().unwrap_or(next);
            profile.current_xp = 0;
        }
        profile.next_level_xp = 100 * i64::from(profile.level.max(1));
    }
}

#[async_trait]
impl ProfileSource for ReplayProfiles {
    async fn fetch_profile(&self) -> gamify_feedback::Result<GamificationProfile> {
        Ok(self.profile.lock().clone())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gamify_feedback=debug".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let outcomes_path = args
        .next()
        .context("usage: feedback-replay <outcomes.json> [feedback.yaml]")?;
    let config = match args.next() {
        Some(path) => FeedbackConfig::from_file(&path)
            .with_context(|| format!("loading config from {path}"))?,
        None => FeedbackConfig::default(),
    }
    .with_env_overrides();

    let raw = std::fs::read_to_string(&outcomes_path)
        .with_context(|| format!("reading {outcomes_path}"))?;
    let outcomes: Vec<ActivityOutcome> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {outcomes_path}"))?;
    tracing::info!(count = outcomes.len(), mode = ?config.mode, "replaying outcomes");

    let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::try_current()?);
    let profiles = Arc::new(ReplayProfiles::default());
    let cache = ProfileCache::new(profiles.clone());
    let orchestrator =
        GamificationOrchestrator::from_config(&config, scheduler, Arc::new(cache.clone()));

    let registry = orchestrator.registry();
    let _channels = registry
        .channels()
        .into_iter()
        .map(|channel| {
            let name = channel.clone();
            registry.subscribe(&channel, move |kind| {
                tracing::info!(channel = %name, %kind, "celebration changed");
            })
        })
        .collect::<gamify_feedback::Result<Vec<Subscription>>>()?;
    let _toasts = orchestrator.notifications().subscribe(|entries| {
        let actions: Vec<&str> = entries.iter().map(|e| e.payload.action.as_str()).collect();
        tracing::info!(count = entries.len(), ?actions, "notifications changed");
    });
    let _floats = orchestrator.floating_xp().subscribe(|entries| {
        let amounts: Vec<i64> = entries.iter().map(|e| e.payload.amount).collect();
        tracing::debug!(?amounts, "floating xp changed");
    });

    for (index, outcome) in outcomes.iter().enumerate() {
        profiles.apply(outcome);
        let report = orchestrator.process(outcome, ProcessOptions::default())?;
        tracing::info!(index, action = ?report.action, refresh = report.refresh_requested, "processed");
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    // Let the longest celebration and the last toasts run out.
    let drain = config
        .celebrations
        .mega
        .duration()
        .max(config.notification_duration());
    tokio::time::sleep(drain).await;

    match cache.snapshot() {
        Some(profile) => tracing::info!(
            level = profile.level,
            title = level_title(profile.level),
            total_xp = profile.total_xp,
            progress = profile.progress_ratio(),
            "final profile"
        ),
        None => tracing::info!("no profile refresh completed"),
    }

    orchestrator.notifications().clear();
    orchestrator.floating_xp().clear();
    Ok(())
}
