//! Confidence tiers and the thresholds that define them.

use serde::{Deserialize, Serialize};

/// Coarse confidence bucket used to drive review emphasis.
///
/// - `High`: near-certain, can be accepted without review
/// - `Medium`: reasonable, should be reviewed
/// - `Low`: weak, needs manual confirmation
/// - `Unresolved`: no target assigned
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    Unresolved,
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::High => "high confidence - likely correct",
            Self::Medium => "medium confidence - should review",
            Self::Low => "low confidence - needs verification",
            Self::Unresolved => "unresolved - no target assigned",
        }
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Unresolved => "unresolved",
        }
    }
}

/// Boundaries between confidence tiers.
///
/// - `0.0`: [`ConfidenceTier::Unresolved`]
/// - above zero, below `medium`: [`ConfidenceTier::Low`]
/// - `medium` to `high`: [`ConfidenceTier::Medium`]
/// - at or above `high`: [`ConfidenceTier::High`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    /// Minimum confidence for high tier (default: 0.8).
    pub high: f32,
    /// Minimum confidence for medium tier (default: 0.5).
    pub medium: f32,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            high: 0.8,
            medium: 0.5,
        }
    }
}

impl ConfidenceThresholds {
    #[must_use]
    pub fn strict() -> Self {
        Self {
            high: 0.9,
            medium: 0.7,
        }
    }

    #[must_use]
    pub fn relaxed() -> Self {
        Self {
            high: 0.7,
            medium: 0.4,
        }
    }

    #[must_use]
    pub fn categorize(&self, confidence: f32) -> ConfidenceTier {
        let confidence = clamp_confidence(confidence);
        if confidence <= 0.0 {
            ConfidenceTier::Unresolved
        } else if confidence >= self.high {
            ConfidenceTier::High
        } else if confidence >= self.medium {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }
}

/// Clamp a raw score into `[0, 1]`, mapping NaN to zero.
#[must_use]
pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
