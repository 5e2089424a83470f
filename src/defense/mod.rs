//! The defense chain between oracle answers and destructive edits.
//!
//! An oracle answer only reaches the document after Phase A ([`validator`]) and
//! Phase B ([`verifier`]) accept it. When either rejects, or the oracle fails, Phase C
//! ([`heuristic`]) gets one conservative attempt; if that finds nothing, nothing is
//! removed. Pattern-detected sections run the same three phases in [`pattern_guard`].

pub mod heuristic;
pub mod pattern_guard;
pub mod validator;
pub mod verifier;

pub use heuristic::HEURISTIC_CONFIDENCE;
pub use validator::validate;
pub use verifier::verify;

use crate::boundary::{BoundaryCandidate, RejectionReason, ValidationVerdict};
use crate::config::PipelineConfig;
use crate::error::OracleError;
use crate::patterns::DetectionSource;
use crate::section::SectionType;
use crate::transform::lines::line_count;
use regex::Regex;

/// What the oracle said about one section.
#[derive(Debug, Clone)]
pub enum OracleAnswer<T> {
    /// The oracle located the section.
    Found(T),
    /// The oracle explicitly reported that the section is not there.
    Absent,
    /// No usable oracle answer (call failed, or only a local analysis is available).
    Unavailable(Option<OracleError>),
}

/// A pattern set proposed for a pattern-detected section.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternProposal {
    pub sources: Vec<String>,
    pub confidence: f64,
}

/// Outcome of running a boundary through the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryDecision {
    /// Lines to remove; `None` means leave the document alone.
    pub candidate: Option<BoundaryCandidate>,
    pub source: DetectionSource,
    /// Confidence of the decision (0 when nothing was removed).
    pub confidence: f64,
    /// Why the oracle's answer was refused, if it was.
    pub rejection: Option<RejectionReason>,
    /// Human-readable account of the path through the chain.
    pub note: String,
}

/// Outcome of running a pattern set through the chain.
#[derive(Debug, Clone)]
pub struct PatternDecision {
    /// Patterns to apply; empty means leave the document alone.
    pub patterns: Vec<Regex>,
    pub source: DetectionSource,
    pub confidence: f64,
    pub rejection: Option<RejectionReason>,
    pub note: String,
}

/// Runs a boundary answer through Phases A, B and (if needed) C.
pub fn resolve_boundary(
    text: &str,
    section: SectionType,
    answer: OracleAnswer<BoundaryCandidate>,
) -> BoundaryDecision {
    let total = line_count(text);

    let rejection = match answer {
        OracleAnswer::Absent => {
            return BoundaryDecision {
                candidate: None,
                source: DetectionSource::Oracle,
                confidence: 0.0,
                rejection: None,
                note: format!("oracle found no {}", section),
            };
        }
        OracleAnswer::Found(candidate) => {
            let phase_a = validate(&candidate, section, total);
            let verdict = if phase_a.is_accepted() {
                let phase_b = verifier::inspect(text, &candidate, section);
                if phase_b.verdict.is_accepted() {
                    let confidence = (candidate.confidence + phase_b.confidence) / 2.0;
                    let note = format!(
                        "oracle boundary {}..{} verified ({})",
                        candidate.start_line,
                        candidate.end_line,
                        phase_b.markers_found.join(", ")
                    );
                    return BoundaryDecision {
                        candidate: Some(candidate),
                        source: DetectionSource::Oracle,
                        confidence,
                        rejection: None,
                        note,
                    };
                }
                phase_b.verdict
            } else {
                phase_a
            };

            tracing::warn!(
                section = %section,
                start = candidate.start_line,
                end = candidate.end_line,
                confidence = candidate.confidence,
                total_lines = total,
                verdict = %verdict,
                "oracle boundary rejected"
            );
            verdict.reason()
        }
        OracleAnswer::Unavailable(err) => {
            if let Some(err) = err {
                tracing::warn!(section = %section, error = %err, "boundary detection failed");
            }
            None
        }
    };

    match heuristic::detect(text, section) {
        Some(candidate) => BoundaryDecision {
            note: format!(
                "heuristic boundary {}..{}",
                candidate.start_line, candidate.end_line
            ),
            confidence: candidate.confidence,
            candidate: Some(candidate),
            source: DetectionSource::Heuristic,
            rejection,
        },
        None => BoundaryDecision {
            candidate: None,
            source: DetectionSource::Heuristic,
            confidence: 0.0,
            rejection,
            note: format!("no {} found by heuristics", section),
        },
    }
}

/// Runs a pattern proposal through Phases A, B and (if needed) C.
pub fn resolve_patterns(
    text: &str,
    section: SectionType,
    answer: OracleAnswer<PatternProposal>,
    config: &PipelineConfig,
) -> PatternDecision {
    let rejection = match answer {
        OracleAnswer::Absent => {
            return PatternDecision {
                patterns: Vec::new(),
                source: DetectionSource::Oracle,
                confidence: 0.0,
                rejection: None,
                note: format!("oracle found no {}", section),
            };
        }
        OracleAnswer::Found(proposal) => {
            let evaluation =
                pattern_guard::validate_patterns(text, &proposal.sources, section, proposal.confidence);
            let verdict = if evaluation.verdict.is_accepted() {
                let phase_b = pattern_guard::verify_matches(text, &evaluation.patterns, section);
                if phase_b.is_accepted() {
                    return PatternDecision {
                        note: format!(
                            "{} oracle pattern(s), {} match(es)",
                            evaluation.patterns.len(),
                            evaluation.matches
                        ),
                        patterns: evaluation.patterns,
                        source: DetectionSource::Oracle,
                        confidence: proposal.confidence,
                        rejection: None,
                    };
                }
                phase_b
            } else {
                evaluation.verdict
            };

            tracing::warn!(
                section = %section,
                patterns = proposal.sources.len(),
                removal = evaluation.removal_fraction,
                verdict = %verdict,
                "oracle patterns rejected"
            );
            verdict.reason()
        }
        OracleAnswer::Unavailable(err) => {
            if let Some(err) = err {
                tracing::warn!(section = %section, error = %err, "pattern detection failed");
            }
            None
        }
    };

    let patterns = pattern_guard::heuristic_patterns(text, section, config);
    let note = if patterns.is_empty() {
        format!("no {} found by heuristics", section)
    } else {
        format!("{} heuristic pattern(s)", patterns.len())
    };
    let confidence = if patterns.is_empty() {
        0.0
    } else {
        HEURISTIC_CONFIDENCE
    };

    PatternDecision {
        patterns,
        source: DetectionSource::Heuristic,
        confidence,
        rejection,
        note,
    }
}

/// Verdicts of each phase for one candidate, for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainReport {
    pub phase_a: ValidationVerdict,
    pub phase_b: Option<verifier::Verification>,
    pub phase_c: Option<Option<BoundaryCandidate>>,
}

/// Runs every phase that would run for `candidate` and reports each verdict.
pub fn explain(text: &str, candidate: &BoundaryCandidate, section: SectionType) -> ChainReport {
    let phase_a = validate(candidate, section, line_count(text));
    let phase_b = phase_a
        .is_accepted()
        .then(|| verifier::inspect(text, candidate, section));
    let needs_fallback = phase_b
        .as_ref()
        .map_or(true, |verification| !verification.verdict.is_accepted());
    let phase_c = needs_fallback.then(|| heuristic::detect(text, section));

    ChainReport {
        phase_a,
        phase_b,
        phase_c,
    }
}
