//! Service layer types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Scores at or above this are classified as fire.
pub const FIRE_THRESHOLD: f32 = 0.5;

/// Classifier output label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Label {
    #[serde(rename = "FIRE")]
    Fire,
    #[serde(rename = "NOTFIRE")]
    NotFire,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Fire => "FIRE",
            Label::NotFire => "NOTFIRE",
        }
    }

    /// Output unit index the label corresponds to.
    pub fn index(&self) -> usize {
        match self {
            Label::NotFire => 0,
            Label::Fire => 1,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholded prediction for one image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: Label,
    /// Probability of the chosen label, always in [0.5, 1.0].
    pub confidence: f32,
    /// Unthresholded fire probability in [0, 1].
    pub raw_score: f32,
}

impl ClassificationResult {
    /// Apply the threshold policy to a fire probability.
    ///
    /// Returns `None` if the score is NaN or outside [0, 1].
    pub fn from_score(raw_score: f32) -> Option<Self> {
        if !(0.0..=1.0).contains(&raw_score) {
            return None;
        }

        let (label, confidence) = if raw_score >= FIRE_THRESHOLD {
            (Label::Fire, raw_score)
        } else {
            (Label::NotFire, 1.0 - raw_score)
        };

        Some(Self {
            label,
            confidence,
            raw_score,
        })
    }
}
