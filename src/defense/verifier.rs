//! Phase B: the spanned text must look like the section it is claimed to be.

use crate::boundary::{BoundaryCandidate, RejectionReason, ValidationVerdict};
use crate::section::SectionType;
use crate::transform::lines::lines_in_range;
use regex::Regex;
use std::sync::LazyLock;

/// Markers needed for full verification confidence.
const SATURATION: usize = 3;

static RE_INDEX_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*[\p{L}][^\n]{0,80}?,\s*\d{1,4}(?:\s*[-–]\s*\d{1,4})?(?:\s*,\s*\d{1,4}(?:\s*[-–]\s*\d{1,4})?)*\s*$")
        .unwrap()
});

static RE_TOC_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[^\n]{1,120}?(?:\.{2,}|…+|\s)\s*(?:\d{1,4}|[ivxlc]{1,6})\s*$").unwrap()
});

static RE_CAPTION_ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*(?:figure|fig\.|table|map|plate)\s*\d").unwrap());

/// Longest line still treated as a heading.
const MAX_HEADING_CHARS: usize = 60;

/// Strips heading decoration (`#`, numbering, trailing colon or period).
static RE_HEADING_CORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*#{0,6}\s*(?:(?:\d{1,3}|[ivxlcIVXLC]{1,6})[.):]\s+)?(.+?)\s*[:.]?\s*$").unwrap()
});

enum Marker {
    /// A short line consisting of the phrase, optionally numbered or labelled
    /// ("3. References", "APPENDIX B", "Appendix A: Tables").
    Heading(&'static str),
    /// Case-insensitive whole-word occurrence anywhere in the span.
    Term(&'static str),
    /// Line regex that must match at least `min` lines.
    Entries {
        name: &'static str,
        regex: &'static Regex,
        min: usize,
    },
}

impl Marker {
    fn name(&self) -> &'static str {
        match self {
            Marker::Heading(phrase) | Marker::Term(phrase) => phrase,
            Marker::Entries { name, .. } => name,
        }
    }

    fn is_present(&self, span: &str, lowered: &str) -> bool {
        match self {
            Marker::Heading(phrase) => span.lines().any(|line| is_heading(line, phrase)),
            Marker::Term(term) => contains_word(lowered, term),
            Marker::Entries { regex, min, .. } => regex.find_iter(span).count() >= *min,
        }
    }
}

fn is_heading(line: &str, phrase: &str) -> bool {
    if line.trim().chars().count() > MAX_HEADING_CHARS {
        return false;
    }
    let Some(core) = RE_HEADING_CORE.captures(line).and_then(|caps| caps.get(1)) else {
        return false;
    };
    let core = core.as_str().to_lowercase();
    let Some(rest) = core.strip_prefix(phrase) else {
        return false;
    };
    if rest.is_empty() {
        return true;
    }
    if !rest.starts_with(|c: char| c.is_whitespace() || is_title_separator(c)) {
        return false;
    }
    // "Appendix B", "Appendix A: Tables", "Notes – Chapter 3"
    let label = rest.split(is_title_separator).next().unwrap_or("").trim();
    label.chars().count() <= 4 && label.chars().all(char::is_alphanumeric)
}

fn is_title_separator(c: char) -> bool {
    matches!(c, ':' | '-' | '–' | '—')
}

fn contains_word(haystack: &str, word: &str) -> bool {
    let is_word_char = |c: char| c.is_alphanumeric();
    haystack.match_indices(word).any(|(at, _)| {
        let before = haystack[..at].chars().next_back();
        let after = haystack[at + word.len()..].chars().next();
        let starts_clean = !word.starts_with(is_word_char) || !before.is_some_and(is_word_char);
        let ends_clean = !word.ends_with(is_word_char) || !after.is_some_and(is_word_char);
        starts_clean && ends_clean
    })
}

fn expected_markers(section: SectionType) -> Vec<Marker> {
    use Marker::{Heading, Term};
    match section {
        SectionType::BackMatter => vec![
            Heading("bibliography"),
            Heading("select bibliography"),
            Heading("references"),
            Heading("works cited"),
            Heading("appendix"),
            Heading("appendices"),
            Heading("glossary"),
            Heading("notes"),
            Heading("endnotes"),
            Heading("acknowledgments"),
            Heading("acknowledgements"),
            Heading("about the author"),
            Heading("afterword"),
        ],
        SectionType::Index => vec![
            Heading("index"),
            Marker::Entries {
                name: "page-number entries",
                regex: &RE_INDEX_ENTRY,
                min: 3,
            },
        ],
        SectionType::FrontMatter => vec![
            Term("copyright"),
            Term("©"),
            Term("isbn"),
            Term("all rights reserved"),
            Term("published by"),
            Term("printed in"),
            Term("library of congress"),
            Term("first published"),
        ],
        SectionType::TableOfContents => vec![
            Heading("contents"),
            Heading("table of contents"),
            Marker::Entries {
                name: "page listings",
                regex: &RE_TOC_ENTRY,
                min: 3,
            },
        ],
        SectionType::AuxiliaryLists => vec![
            Heading("list of figures"),
            Heading("list of tables"),
            Heading("list of illustrations"),
            Heading("list of abbreviations"),
            Heading("abbreviations"),
            Marker::Entries {
                name: "caption entries",
                regex: &RE_CAPTION_ENTRY,
                min: 2,
            },
        ],
        SectionType::Footnotes => vec![Term("ibid"), Term("op. cit"), Term("cf.")],
        SectionType::Citations => vec![Term("et al"), Term("ibid")],
        // Verified per match by the pattern guard
        SectionType::RunningElements => Vec::new(),
    }
}

/// Detailed result of Phase B.
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub verdict: ValidationVerdict,
    /// Distinct markers found in the spanned text.
    pub markers_found: Vec<&'static str>,
    /// Grows with the number of distinct markers, saturating at 1.0.
    pub confidence: f64,
}

/// Runs Phase B and reports which markers were found.
pub fn inspect(text: &str, candidate: &BoundaryCandidate, section: SectionType) -> Verification {
    let span = lines_in_range(text, candidate.start_line..candidate.end_line);
    let lowered = span.to_lowercase();

    let markers_found: Vec<&'static str> = expected_markers(section)
        .iter()
        .filter(|marker| marker.is_present(&span, &lowered))
        .map(Marker::name)
        .collect();

    let confidence = (markers_found.len() as f64 / SATURATION as f64).min(1.0);
    let verdict = if markers_found.is_empty() {
        ValidationVerdict::Rejected(RejectionReason::MissingExpectedPattern)
    } else {
        ValidationVerdict::Accepted
    };

    Verification {
        verdict,
        markers_found,
        confidence,
    }
}

/// Phase B verdict: accepted if the spanned text holds at least one expected marker.
pub fn verify(text: &str, candidate: &BoundaryCandidate, section: SectionType) -> ValidationVerdict {
    inspect(text, candidate, section).verdict
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(total: usize, inserts: &[(usize, &str)]) -> String {
        (0..total)
            .map(|i| {
                inserts
                    .iter()
                    .find(|(line, _)| *line == i)
                    .map(|(_, text)| text.to_string())
                    .unwrap_or_else(|| format!("Body sentence number {}.", i))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_back_matter_with_bibliography_accepted() {
        let text = document(500, &[(300, "BIBLIOGRAPHY")]);
        let candidate = BoundaryCandidate::new(300, 400, 0.8);
        let result = inspect(&text, &candidate, SectionType::BackMatter);
        assert_eq!(result.verdict, ValidationVerdict::Accepted);
        assert_eq!(result.markers_found, vec!["bibliography"]);
        assert!((result.confidence - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_markerless_span_rejected_at_full_confidence() {
        let text = document(500, &[]);
        let candidate = BoundaryCandidate::new(300, 400, 1.0);
        assert_eq!(
            verify(&text, &candidate, SectionType::BackMatter),
            ValidationVerdict::Rejected(RejectionReason::MissingExpectedPattern)
        );
    }

    #[test]
    fn test_marker_outside_span_does_not_count() {
        let text = document(500, &[(250, "Appendix A")]);
        let candidate = BoundaryCandidate::new(300, 400, 0.9);
        assert!(!verify(&text, &candidate, SectionType::BackMatter).is_accepted());
    }

    #[test]
    fn test_prose_mentioning_marker_words_rejected() {
        let text = document(
            500,
            &[
                (320, "In Rome the word consul denotes the senate's elected magistrate."),
                (350, "Cicero ignored the references he made to Cato in the letters."),
                (360, "Index fingers were raised as the tribune spoke."),
            ],
        );
        let candidate = BoundaryCandidate::new(300, 400, 0.9);
        let result = inspect(&text, &candidate, SectionType::BackMatter);
        assert!(result.markers_found.is_empty());
        assert_eq!(
            result.verdict,
            ValidationVerdict::Rejected(RejectionReason::MissingExpectedPattern)
        );
    }

    #[test]
    fn test_decorated_headings_accepted() {
        for heading in ["## Notes", "3. References", "APPENDIX B", "Appendix A: Tables", "Glossary:"] {
            let text = document(500, &[(310, heading)]);
            let candidate = BoundaryCandidate::new(300, 400, 0.9);
            assert!(
                verify(&text, &candidate, SectionType::BackMatter).is_accepted(),
                "{heading}"
            );
        }
    }

    #[test]
    fn test_terms_need_word_boundaries() {
        assert!(contains_word("copyright © 2001", "copyright"));
        assert!(contains_word("see ibid., 12", "ibid"));
        assert!(!contains_word("the misbn field", "isbn"));
        assert!(!contains_word("copyrighted works", "copyright"));
    }

    #[test]
    fn test_index_entries() {
        let text = "Alexander, 12, 45\nBrutus, 7-9\nCaesar, 101\nCarthage, 88, 90-92";
        let candidate = BoundaryCandidate::new(0, 4, 0.9);
        let result = inspect(text, &candidate, SectionType::Index);
        assert_eq!(result.markers_found, vec!["page-number entries"]);
    }

    #[test]
    fn test_confidence_grows_with_markers() {
        let text = "Copyright © 2001\nISBN 978-0-00-000000-0\nAll rights reserved.";
        let candidate = BoundaryCandidate::new(0, 3, 0.9);
        let result = inspect(text, &candidate, SectionType::FrontMatter);
        assert!(result.markers_found.len() >= 3);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_table_of_contents_listing() {
        let text = "Contents\nIntroduction ........ 1\nThe Early Republic .... 17\nThe Punic Wars 45";
        let candidate = BoundaryCandidate::new(0, 4, 0.9);
        let result = inspect(text, &candidate, SectionType::TableOfContents);
        assert!(result.markers_found.contains(&"contents"));
        assert!(result.markers_found.contains(&"page listings"));
    }

    #[test]
    fn test_running_elements_never_verified_by_span() {
        let text = "HEADER\nbody\nHEADER";
        let candidate = BoundaryCandidate::new(0, 3, 1.0);
        assert!(!verify(text, &candidate, SectionType::RunningElements).is_accepted());
    }
}
