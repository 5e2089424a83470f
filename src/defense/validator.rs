//! Phase A: position, size and confidence constraints.

use crate::boundary::{BoundaryCandidate, RejectionReason, ValidationVerdict};
use crate::section::{PositionBound, SectionType};

/// Checks a candidate against its section's constraint profile.
///
/// The first violated constraint wins, checked in this order: out-of-bounds indices,
/// inverted or empty range, position, removal fraction, minimum size, confidence.
pub fn validate(
    candidate: &BoundaryCandidate,
    section: SectionType,
    total_lines: usize,
) -> ValidationVerdict {
    let profile = section.profile();
    let start = candidate.start_line;
    let end = candidate.end_line;

    if end > total_lines {
        return ValidationVerdict::Rejected(RejectionReason::OutOfBounds);
    }
    if start >= end {
        return ValidationVerdict::Rejected(RejectionReason::InvalidRange);
    }

    match profile.position {
        PositionBound::StartWithinLast(_) if start < profile.earliest_start(total_lines) => {
            return ValidationVerdict::Rejected(RejectionReason::PositionTooEarly);
        }
        PositionBound::EndWithinFirst(_) if end > profile.latest_end(total_lines) => {
            return ValidationVerdict::Rejected(RejectionReason::PositionTooLate);
        }
        _ => {}
    }

    let size = end - start;
    if size > profile.max_lines(total_lines) {
        return ValidationVerdict::Rejected(RejectionReason::ExcessiveRemoval);
    }
    if size < profile.min_size {
        return ValidationVerdict::Rejected(RejectionReason::SectionTooSmall);
    }
    if candidate.confidence < profile.min_confidence {
        return ValidationVerdict::Rejected(RejectionReason::LowConfidence);
    }

    ValidationVerdict::Accepted
}
