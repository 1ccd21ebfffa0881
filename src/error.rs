//! Error types for the feedback engine.
//!
//! Caller misuse is reported through [`FeedbackError`] only in
//! [`FeedbackMode::Development`]; in production the same conditions are
//! logged and swallowed so a cosmetic subsystem never takes the host down.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience result alias used across the crate.
pub type Result<T> = std::result::Result<T, FeedbackError>;

/// Errors raised by the feedback engine.
#[derive(Debug, Error)]
pub enum FeedbackError {
    /// A publish/clear/subscribe named a channel the registry was not built with.
    #[error("Unknown celebration channel: {channel}")]
    UnknownChannel { channel: String },

    /// A pushed entry failed its shape checks.
    #[error("Malformed entry: {reason}")]
    MalformedEntry { reason: String },

    /// Configuration failed validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// YAML parsing failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A tokio-backed component was created outside of a runtime.
    #[error("No tokio runtime is running on this thread")]
    NoRuntime,

    /// The profile source failed to deliver a profile.
    #[error("Profile fetch failed: {0}")]
    ProfileFetch(String),
}

/// How caller misuse is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackMode {
    /// Fail fast with a descriptive error.
    Development,
    /// Log a warning and carry on with a no-op.
    Production,
}

impl Default for FeedbackMode {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            FeedbackMode::Development
        } else {
            FeedbackMode::Production
        }
    }
}

impl FeedbackMode {
    /// Parse a mode name as used by the `GAMIFY_FEEDBACK_MODE` variable.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(FeedbackMode::Development),
            "production" | "prod" => Some(FeedbackMode::Production),
            _ => None,
        }
    }

    /// Route a misuse error according to the mode.
    ///
    /// Development returns the error; production logs it and returns `Ok(())`.
    pub fn misuse(self, err: FeedbackError) -> Result<()> {
        match self {
            FeedbackMode::Development => Err(err),
            FeedbackMode::Production => {
                log::warn!("[feedback] ignoring caller misuse: {err}");
                Ok(())
            }
        }
    }
}
