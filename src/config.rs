//! Feedback engine configuration.
//!
//! Loaded once at the composition root, usually from YAML:
//!
//! ```yaml
//! mode: production
//! notification_duration_ms: 4000
//! celebrations:
//!   mega:
//!     duration_ms: 12000
//!     effect: { max_start_delay_ms: 2500, max_effect_ms: 6000, safety_margin_ms: 1000 }
//! ```
//!
//! Every field is optional; missing values fall back to the defaults below.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::celebration::CelebrationKind;
use crate::error::{FeedbackError, FeedbackMode, Result};

/// Environment variable overriding [`FeedbackConfig::mode`].
pub const MODE_ENV_VAR: &str = "GAMIFY_FEEDBACK_MODE";

/// Timing envelope of the longest animation a renderer plays for one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectProfile {
    /// Latest start offset of any particle/effect.
    pub max_start_delay_ms: u64,
    /// Longest single effect duration.
    pub max_effect_ms: u64,
    /// Slack before the renderer may unmount.
    pub safety_margin_ms: u64,
}

impl EffectProfile {
    /// Time the renderer needs before every effect has finished.
    pub fn required_ms(&self) -> u64 {
        self.max_start_delay_ms + self.max_effect_ms + self.safety_margin_ms
    }
}

/// Auto-clear timing for one celebration kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CelebrationTiming {
    /// How long the channel keeps the kind active before auto-clearing.
    pub duration_ms: u64,
    /// Envelope the duration must cover.
    pub effect: EffectProfile,
}

impl CelebrationTiming {
    const fn new(duration_ms: u64, delay: u64, effect: u64, margin: u64) -> Self {
        Self {
            duration_ms,
            effect: EffectProfile {
                max_start_delay_ms: delay,
                max_effect_ms: effect,
                safety_margin_ms: margin,
            },
        }
    }

    /// Auto-clear delay.
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Per-kind auto-clear timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CelebrationTimings {
    pub default: CelebrationTiming,
    pub level_up: CelebrationTiming,
    pub achievement: CelebrationTiming,
    pub mega: CelebrationTiming,
}

impl Default for CelebrationTimings {
    fn default() -> Self {
        Self {
            default: CelebrationTiming::new(7_500, 1_500, 5_000, 500),
            level_up: CelebrationTiming::new(8_500, 2_000, 5_500, 500),
            achievement: CelebrationTiming::new(8_000, 2_000, 5_000, 500),
            mega: CelebrationTiming::new(10_000, 2_500, 6_000, 1_000),
        }
    }
}

impl CelebrationTimings {
    /// Timing for `kind`; `None` has nothing to clear.
    pub fn for_kind(&self, kind: CelebrationKind) -> Option<&CelebrationTiming> {
        match kind {
            CelebrationKind::None => None,
            CelebrationKind::Default => Some(&self.default),
            CelebrationKind::LevelUp => Some(&self.level_up),
            CelebrationKind::Achievement => Some(&self.achievement),
            CelebrationKind::Mega => Some(&self.mega),
        }
    }

    fn entries(&self) -> [(CelebrationKind, &CelebrationTiming); 4] {
        [
            (CelebrationKind::Default, &self.default),
            (CelebrationKind::LevelUp, &self.level_up),
            (CelebrationKind::Achievement, &self.achievement),
            (CelebrationKind::Mega, &self.mega),
        ]
    }
}

/// XP thresholds for the secondary confetti burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct XpIntensityThresholds {
    /// At or above: abundant confetti.
    pub abundant: i64,
    /// At or above: medium confetti.
    pub medium: i64,
}

impl Default for XpIntensityThresholds {
    fn default() -> Self {
        Self {
            abundant: 100,
            medium: 50,
        }
    }
}

/// New-level thresholds for the level-up celebration tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelTiers {
    /// At or above: mega.
    pub mega: u32,
    /// At or above: achievement.
    pub achievement: u32,
}

impl Default for LevelTiers {
    fn default() -> Self {
        Self {
            mega: 10,
            achievement: 5,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub mode: FeedbackMode,
    pub celebrations: CelebrationTimings,
    pub notification_duration_ms: u64,
    pub floating_xp_duration_ms: u64,
    pub xp_intensity: XpIntensityThresholds,
    pub level_tiers: LevelTiers,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            mode: FeedbackMode::default(),
            celebrations: CelebrationTimings::default(),
            notification_duration_ms: 4_000,
            floating_xp_duration_ms: 2_100,
            xp_intensity: XpIntensityThresholds::default(),
            level_tiers: LevelTiers::default(),
        }
    }
}

impl FeedbackConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: FeedbackConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Apply `GAMIFY_FEEDBACK_MODE` if it is set to a known mode.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var(MODE_ENV_VAR) {
            match FeedbackMode::parse(&value) {
                Some(mode) => self.mode = mode,
                None => log::warn!("[feedback] ignoring unknown {MODE_ENV_VAR}={value:?}"),
            }
        }
        self
    }

    /// Check timing envelopes and threshold ordering.
    pub fn validate(&self) -> Result<()> {
        for (kind, timing) in self.celebrations.entries() {
            let required = timing.effect.required_ms();
            if timing.duration_ms <= required {
                return Err(FeedbackError::Config(format!(
                    "{kind} celebration lasts {}ms but its effects need more than {required}ms",
                    timing.duration_ms
                )));
            }
        }
        if self.xp_intensity.medium <= 0 || self.xp_intensity.medium >= self.xp_intensity.abundant {
            return Err(FeedbackError::Config(format!(
                "xp_intensity thresholds must satisfy 0 < medium < abundant (got {} / {})",
                self.xp_intensity.medium, self.xp_intensity.abundant
            )));
        }
        if self.level_tiers.achievement >= self.level_tiers.mega {
            return Err(FeedbackError::Config(format!(
                "level_tiers must satisfy achievement < mega (got {} / {})",
                self.level_tiers.achievement, self.level_tiers.mega
            )));
        }
        Ok(())
    }

    pub fn notification_duration(&self) -> Duration {
        Duration::from_millis(self.notification_duration_ms)
    }

    pub fn floating_xp_duration(&self) -> Duration {
        Duration::from_millis(self.floating_xp_duration_ms)
    }
}
