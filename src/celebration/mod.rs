//! Celebration kinds, tiers and the broadcast registry that drives them.
//!
//! Producers publish a [`CelebrationKind`] on a named channel; renderers
//! subscribe to the channel without holding a reference to the producer.

pub mod registry;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{LevelTiers, XpIntensityThresholds};

pub use registry::{CelebrationRegistry, Observer, Subscription};

/// Channel for level-up overlays (badge, rings, trophy, fireworks).
pub const CELEBRATION_CHANNEL: &str = "celebration";

/// Channel for secondary confetti bursts accompanying plain XP gains.
pub const CONFETTI_CHANNEL: &str = "confetti";

/// Channels a registry built by [`CelebrationRegistry::with_default_channels`] knows.
pub const DEFAULT_CHANNELS: [&str; 2] = [CELEBRATION_CHANNEL, CONFETTI_CHANNEL];

/// What a channel is currently celebrating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CelebrationKind {
    #[default]
    None,
    Default,
    LevelUp,
    Achievement,
    Mega,
}

impl CelebrationKind {
    pub fn is_active(self) -> bool {
        self != CelebrationKind::None
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CelebrationKind::None => "none",
            CelebrationKind::Default => "default",
            CelebrationKind::LevelUp => "level_up",
            CelebrationKind::Achievement => "achievement",
            CelebrationKind::Mega => "mega",
        }
    }

    /// Tier for reaching `new_level`.
    ///
    /// A missing level is treated as the lowest tier.
    pub fn for_new_level(new_level: Option<u32>, tiers: &LevelTiers) -> Self {
        match new_level {
            Some(level) if level >= tiers.mega => CelebrationKind::Mega,
            Some(level) if level >= tiers.achievement => CelebrationKind::Achievement,
            _ => CelebrationKind::LevelUp,
        }
    }
}

impl fmt::Display for CelebrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much confetti accompanies a plain XP gain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfettiIntensity {
    Light,
    Medium,
    Abundant,
}

impl ConfettiIntensity {
    pub fn from_xp(xp: i64, thresholds: &XpIntensityThresholds) -> Self {
        if xp >= thresholds.abundant {
            ConfettiIntensity::Abundant
        } else if xp >= thresholds.medium {
            ConfettiIntensity::Medium
        } else {
            ConfettiIntensity::Light
        }
    }

    /// Confetti preset published for this intensity.
    pub fn celebration_kind(self) -> CelebrationKind {
        match self {
            ConfettiIntensity::Light => CelebrationKind::Default,
            ConfettiIntensity::Medium => CelebrationKind::Achievement,
            ConfettiIntensity::Abundant => CelebrationKind::LevelUp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_tiers() {
        let tiers = LevelTiers::default();
        let tier = |l| CelebrationKind::for_new_level(l, &tiers);
        assert_eq!(tier(Some(12)), CelebrationKind::Mega);
        assert_eq!(tier(Some(10)), CelebrationKind::Mega);
        assert_eq!(tier(Some(9)), CelebrationKind::Achievement);
        assert_eq!(tier(Some(5)), CelebrationKind::Achievement);
        assert_eq!(tier(Some(4)), CelebrationKind::LevelUp);
        assert_eq!(tier(None), CelebrationKind::LevelUp);
    }

    #[test]
    fn test_confetti_intensity_boundaries() {
        let t = XpIntensityThresholds::default();
        assert_eq!(ConfettiIntensity::from_xp(100, &t), ConfettiIntensity::Abundant);
        assert_eq!(ConfettiIntensity::from_xp(99, &t), ConfettiIntensity::Medium);
        assert_eq!(ConfettiIntensity::from_xp(60, &t), ConfettiIntensity::Medium);
        assert_eq!(ConfettiIntensity::from_xp(50, &t), ConfettiIntensity::Medium);
        assert_eq!(ConfettiIntensity::from_xp(49, &t), ConfettiIntensity::Light);
        assert_eq!(
            ConfettiIntensity::Medium.celebration_kind(),
            CelebrationKind::Achievement
        );
    }

    #[test]
    fn test_kind_serde_names() {
        let json = serde_json::to_string(&CelebrationKind::LevelUp).unwrap();
        assert_eq!(json, "\"level_up\"");
        assert_eq!(CelebrationKind::Mega.to_string(), "mega");
        assert!(!CelebrationKind::None.is_active());
    }
}
