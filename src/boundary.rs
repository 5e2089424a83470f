//! Boundary candidates and validation verdicts.
//!
//! A [`BoundaryCandidate`] is what the oracle (or the heuristic detector) claims; it has
//! no effect on the document until it has been turned into an accepted verdict.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A claimed section location: lines `[start_line, end_line)`, 0-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryCandidate {
    pub start_line: usize,
    pub end_line: usize,
    /// Certainty in `[0, 1]`.
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl BoundaryCandidate {
    /// Creates a candidate; confidence is clamped into `[0, 1]`.
    pub fn new(start_line: usize, end_line: usize, confidence: f64) -> Self {
        Self {
            start_line,
            end_line,
            confidence: clamp_confidence(confidence),
            rationale: None,
        }
    }

    /// Attaches the detector's explanation.
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    /// Number of lines the candidate spans (0 for an inverted range).
    pub fn len(&self) -> usize {
        self.end_line.saturating_sub(self.start_line)
    }

    /// Returns true if the candidate spans no lines.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Clamps a confidence into `[0, 1]`, mapping NaN to 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Why a candidate was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectionReason {
    PositionTooEarly,
    PositionTooLate,
    InvalidRange,
    OutOfBounds,
    ExcessiveRemoval,
    SectionTooSmall,
    LowConfidence,
    MissingExpectedPattern,
    /// A proposed pattern does not compile or matches the empty string.
    InvalidPattern,
}

impl RejectionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectionReason::PositionTooEarly => "position-too-early",
            RejectionReason::PositionTooLate => "position-too-late",
            RejectionReason::InvalidRange => "invalid-range",
            RejectionReason::OutOfBounds => "out-of-bounds",
            RejectionReason::ExcessiveRemoval => "excessive-removal",
            RejectionReason::SectionTooSmall => "section-too-small",
            RejectionReason::LowConfidence => "low-confidence",
            RejectionReason::MissingExpectedPattern => "missing-expected-pattern",
            RejectionReason::InvalidPattern => "invalid-pattern",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a validation phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "verdict", content = "reason")]
pub enum ValidationVerdict {
    Accepted,
    Rejected(RejectionReason),
}

impl ValidationVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationVerdict::Accepted)
    }

    /// The rejection reason, if any.
    pub fn reason(&self) -> Option<RejectionReason> {
        match self {
            ValidationVerdict::Accepted => None,
            ValidationVerdict::Rejected(reason) => Some(*reason),
        }
    }
}

impl fmt::Display for ValidationVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationVerdict::Accepted => f.write_str("accepted"),
            ValidationVerdict::Rejected(reason) => write!(f, "rejected ({})", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_clamps_confidence() {
        assert_eq!(BoundaryCandidate::new(0, 5, 1.7).confidence, 1.0);
        assert_eq!(BoundaryCandidate::new(0, 5, -0.2).confidence, 0.0);
        assert_eq!(BoundaryCandidate::new(0, 5, f64::NAN).confidence, 0.0);
    }

    #[test]
    fn test_candidate_len() {
        assert_eq!(BoundaryCandidate::new(300, 400, 0.8).len(), 100);
        assert!(BoundaryCandidate::new(10, 4, 0.8).is_empty());
    }

    #[test]
    fn test_verdict_serialization() {
        let json =
            serde_json::to_string(&ValidationVerdict::Rejected(RejectionReason::PositionTooEarly))
                .unwrap();
        assert_eq!(json, r#"{"verdict":"rejected","reason":"position-too-early"}"#);
        assert_eq!(
            ValidationVerdict::Rejected(RejectionReason::LowConfidence).to_string(),
            "rejected (low-confidence)"
        );
    }
}
