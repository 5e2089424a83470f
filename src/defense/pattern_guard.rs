//! The three defense phases for pattern-detected sections (citations, footnotes,
//! running headers and footers).
//!
//! Instead of a line range, the oracle proposes regexes. Line-scoped sections remove
//! whole lines the patterns fully match; citations are removed inline.

use super::heuristic::HEURISTIC_CONFIDENCE;
use crate::boundary::{RejectionReason, ValidationVerdict};
use crate::config::PipelineConfig;
use crate::patterns::{builtin_citation_patterns, builtin_footnote_patterns};
use crate::section::SectionType;
use crate::transform::lines::{
    count_inline_matches, count_matching_lines, fenced_line_mask, full_match, line_count,
    repeated_line_patterns, split_lines, word_count,
};
use regex::Regex;
use std::sync::LazyLock;

/// Share of matched fragments that must look like the section.
const CONFORMING_SHARE: f64 = 0.8;

static RE_NOTE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\[\d{1,3}\]|[¹²³⁴⁵⁶⁷⁸⁹⁰]+|\d{1,3}[.)]?|\*{1,3}|†|‡)\s*\S").unwrap()
});

/// What a pattern set removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternScope {
    /// Whole lines fully matched by a pattern.
    Lines,
    /// Inline matches.
    Inline,
}

/// Removal scope of a section's patterns.
pub fn scope(section: SectionType) -> PatternScope {
    match section {
        SectionType::Citations => PatternScope::Inline,
        SectionType::FrontMatter
        | SectionType::TableOfContents
        | SectionType::AuxiliaryLists
        | SectionType::Index
        | SectionType::BackMatter
        | SectionType::Footnotes
        | SectionType::RunningElements => PatternScope::Lines,
    }
}

/// Phase A result for a pattern set.
#[derive(Debug, Clone)]
pub struct PatternEvaluation {
    pub verdict: ValidationVerdict,
    /// Compiled patterns (empty if any source was invalid).
    pub patterns: Vec<Regex>,
    /// Lines or inline matches the set would remove.
    pub matches: usize,
    /// Share of lines (or characters, for inline scope) the set would remove.
    pub removal_fraction: f64,
}

/// Compiles pattern sources, refusing any that fail to compile or match the empty string.
pub fn compile_patterns(sources: &[String]) -> Result<Vec<Regex>, RejectionReason> {
    sources
        .iter()
        .map(|source| match Regex::new(source) {
            Ok(re) if !re.is_match("") => Ok(re),
            Ok(_) => {
                tracing::debug!(pattern = %source, "pattern matches the empty string");
                Err(RejectionReason::InvalidPattern)
            }
            Err(err) => {
                tracing::debug!(pattern = %source, error = %err, "pattern does not compile");
                Err(RejectionReason::InvalidPattern)
            }
        })
        .collect()
}

/// Measures what `patterns` would remove from `text`: (matches, removal fraction).
pub fn measure(text: &str, patterns: &[Regex], section: SectionType) -> (usize, f64) {
    match scope(section) {
        PatternScope::Lines => {
            let matches = count_matching_lines(text, patterns);
            let total = line_count(text).max(1);
            (matches, matches as f64 / total as f64)
        }
        PatternScope::Inline => {
            let (matches, chars) = count_inline_matches(text, patterns);
            let total = text.len().max(1);
            (matches, chars as f64 / total as f64)
        }
    }
}

/// Phase A for pattern sets.
///
/// Rejects, in order: invalid pattern, excessive removal, no matches, low confidence.
pub fn validate_patterns(
    text: &str,
    sources: &[String],
    section: SectionType,
    confidence: f64,
) -> PatternEvaluation {
    let profile = section.profile();
    let patterns = match compile_patterns(sources) {
        Ok(patterns) => patterns,
        Err(reason) => {
            return PatternEvaluation {
                verdict: ValidationVerdict::Rejected(reason),
                patterns: Vec::new(),
                matches: 0,
                removal_fraction: 0.0,
            }
        }
    };

    let (matches, removal_fraction) = measure(text, &patterns, section);
    let verdict = if removal_fraction > profile.max_removal_fraction {
        ValidationVerdict::Rejected(RejectionReason::ExcessiveRemoval)
    } else if matches < profile.min_size {
        ValidationVerdict::Rejected(RejectionReason::SectionTooSmall)
    } else if confidence < profile.min_confidence {
        ValidationVerdict::Rejected(RejectionReason::LowConfidence)
    } else {
        ValidationVerdict::Accepted
    };

    PatternEvaluation {
        verdict,
        patterns,
        matches,
        removal_fraction,
    }
}

/// Phase B for pattern sets: at least 80% of the matched fragments must look like the
/// section.
pub fn verify_matches(text: &str, patterns: &[Regex], section: SectionType) -> ValidationVerdict {
    let fragments = matched_fragments(text, patterns, section);
    if fragments.is_empty() {
        return ValidationVerdict::Rejected(RejectionReason::MissingExpectedPattern);
    }

    let conforming = fragments.iter().filter(|f| conforms(f, section)).count();
    if conforming as f64 >= fragments.len() as f64 * CONFORMING_SHARE {
        ValidationVerdict::Accepted
    } else {
        tracing::debug!(
            section = %section,
            conforming,
            total = fragments.len(),
            "matched fragments do not look like the section"
        );
        ValidationVerdict::Rejected(RejectionReason::MissingExpectedPattern)
    }
}

fn matched_fragments<'a>(text: &'a str, patterns: &[Regex], section: SectionType) -> Vec<&'a str> {
    let lines = split_lines(text);
    let mask = fenced_line_mask(&lines);
    let mut fragments = Vec::new();

    for (line, fenced) in lines.into_iter().zip(mask) {
        if fenced {
            continue;
        }
        match scope(section) {
            PatternScope::Lines => {
                let trimmed = line.trim();
                if !trimmed.is_empty() && patterns.iter().any(|re| full_match(re, trimmed)) {
                    fragments.push(trimmed);
                }
            }
            PatternScope::Inline => {
                for re in patterns {
                    fragments.extend(
                        re.find_iter(line)
                            .map(|m| m.as_str())
                            .filter(|s| !s.is_empty()),
                    );
                }
            }
        }
    }

    fragments
}

fn conforms(fragment: &str, section: SectionType) -> bool {
    match section {
        SectionType::Citations => {
            let lowered = fragment.to_lowercase();
            fragment.chars().any(|c| c.is_ascii_digit())
                || lowered.contains("et al")
                || lowered.contains("ibid")
        }
        SectionType::Footnotes => RE_NOTE_MARKER.is_match(fragment),
        SectionType::RunningElements => {
            let words = word_count(fragment);
            fragment.chars().count() <= 150 && words <= 15 && !(fragment.ends_with('.') && words > 6)
        }
        SectionType::FrontMatter
        | SectionType::TableOfContents
        | SectionType::AuxiliaryLists
        | SectionType::Index
        | SectionType::BackMatter => false,
    }
}

/// Phase C for pattern sets: conservative built-in patterns.
///
/// Citations and footnotes use the built-in regexes; running elements use line
/// frequency analysis. The set is returned only if it passes Phase A at
/// [`HEURISTIC_CONFIDENCE`]; otherwise nothing is detected.
pub fn heuristic_patterns(text: &str, section: SectionType, config: &PipelineConfig) -> Vec<Regex> {
    let sources: Vec<String> = match section {
        SectionType::Citations => builtin_citation_patterns()
            .iter()
            .map(|re| re.as_str().to_string())
            .collect(),
        SectionType::Footnotes => builtin_footnote_patterns()
            .iter()
            .map(|re| re.as_str().to_string())
            .collect(),
        SectionType::RunningElements => repeated_line_patterns(
            text,
            config.header_footer_threshold,
            config.max_header_footer_length,
        ),
        SectionType::FrontMatter
        | SectionType::TableOfContents
        | SectionType::AuxiliaryLists
        | SectionType::Index
        | SectionType::BackMatter => Vec::new(),
    };
    // A single greedy pattern must not sink the rest of the set
    let profile = section.profile();
    let sources: Vec<String> = sources
        .into_iter()
        .filter(|source| match compile_patterns(std::slice::from_ref(source)) {
            Ok(compiled) => measure(text, &compiled, section).1 <= profile.max_removal_fraction,
            Err(_) => false,
        })
        .collect();
    if sources.is_empty() {
        return Vec::new();
    }

    let evaluation = validate_patterns(text, &sources, section, HEURISTIC_CONFIDENCE);
    if evaluation.verdict.is_accepted() {
        tracing::debug!(section = %section, matches = evaluation.matches, "heuristic patterns");
        evaluation.patterns
    } else {
        Vec::new()
    }
}
