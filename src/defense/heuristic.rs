//! Phase C: AI-independent boundary detection.
//!
//! Searches only a position-constrained window for strong heading signals. Finding
//! nothing is the expected result for most documents.

use super::validator::validate;
use crate::boundary::BoundaryCandidate;
use crate::section::SectionType;
use crate::transform::lines::split_lines;
use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

/// Confidence assigned to every heuristic detection. It is at least every section's
/// minimum, so heuristic candidates pass Phase A.
pub const HEURISTIC_CONFIDENCE: f64 = 0.75;

static RE_BACK_MATTER_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*#{0,6}\s*(?:bibliography|references|works cited|select bibliography|appendix(?:\s+[a-z0-9]{1,4})?|appendices|glossary|endnotes|notes|acknowledge?ments|about the authors?)\s*:?\s*$",
    )
    .unwrap()
});

static RE_INDEX_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*#{0,6}\s*(?:general\s+|subject\s+|name\s+)?index\s*$").unwrap()
});

static RE_TOC_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*#{0,6}\s*(?:table\s+of\s+)?contents\s*$").unwrap()
});

static RE_TOC_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:[^\n]{1,120}?(?:\.{2,}|…+|\s)\s*(?:\d{1,4}|[ivxlc]{1,6})|(?:chapter|part|book)\s+\S+[^\n]{0,100})\s*$",
    )
    .unwrap()
});

static RE_AUX_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*#{0,6}\s*(?:list\s+of\s+(?:figures|tables|illustrations|abbreviations|maps|plates)|abbreviations)\s*$",
    )
    .unwrap()
});

static RE_AUX_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:(?:[Ff]igure|[Ff]ig\.|[Tt]able|[Mm]ap|[Pp]late)\s*\d[^\n]*|[A-Z][A-Z0-9&.]{1,9}\s+(?:[-–—:=]\s*)?\S[^\n]*|[^\n]{1,120}?(?:\.{2,}|…+|\s)\s*\d{1,4})\s*$",
    )
    .unwrap()
});

static RE_FRONT_MATTER_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)copyright|©|\bisbn\b|all rights reserved|published by|printed in|library of congress|first published",
    )
    .unwrap()
});

/// Fractions of the document each heuristic may look at: `window ∩ max-removal`.
fn window_fraction(section: SectionType) -> f64 {
    match section {
        SectionType::FrontMatter => 0.40,
        SectionType::TableOfContents => 0.35,
        SectionType::AuxiliaryLists => 0.50,
        SectionType::Index => 0.30,
        SectionType::BackMatter => 0.40,
        SectionType::Citations | SectionType::Footnotes | SectionType::RunningElements => 1.0,
    }
}

/// Line range the heuristic searches for `section`.
pub fn search_window(section: SectionType, total_lines: usize) -> Range<usize> {
    let fraction = window_fraction(section);
    match section {
        SectionType::FrontMatter | SectionType::TableOfContents | SectionType::AuxiliaryLists => {
            0..(total_lines as f64 * fraction).floor() as usize
        }
        SectionType::Index | SectionType::BackMatter => {
            let start = (total_lines as f64 * (1.0 - fraction)).ceil() as usize;
            start.min(total_lines)..total_lines
        }
        SectionType::Citations | SectionType::Footnotes | SectionType::RunningElements => {
            0..total_lines
        }
    }
}

/// Looks for `section` inside its search window.
///
/// Returns `None` for pattern-detected sections and whenever nothing conclusive is
/// found. A returned candidate always lies inside [`search_window`] and passes Phase A.
pub fn detect(text: &str, section: SectionType) -> Option<BoundaryCandidate> {
    let lines = split_lines(text);
    let total = lines.len();
    let window = search_window(section, total);
    if window.is_empty() {
        return None;
    }

    let (start, end, rationale) = match section {
        SectionType::BackMatter => {
            let start = find_heading(&lines, window.clone(), &RE_BACK_MATTER_HEADING)?;
            (start, window.end, "back-matter heading in final part of document")
        }
        SectionType::Index => {
            let start = find_heading(&lines, window.clone(), &RE_INDEX_HEADING)?;
            (start, window.end, "index heading in final part of document")
        }
        SectionType::TableOfContents => {
            let start = find_heading(&lines, window.clone(), &RE_TOC_HEADING)?;
            let end = extend_listing(&lines, start, window.end, &[&*RE_TOC_ENTRY], 3)?;
            (start, end, "contents heading followed by page listings")
        }
        SectionType::AuxiliaryLists => {
            let start = find_heading(&lines, window.clone(), &RE_AUX_HEADING)?;
            let end = extend_listing(
                &lines,
                start,
                window.end,
                &[&*RE_AUX_ENTRY, &*RE_AUX_HEADING],
                2,
            )?;
            (start, end, "list heading followed by entries")
        }
        SectionType::FrontMatter => {
            let end = front_matter_end(&lines, window.clone())?;
            (0, end, "publication details near start of document")
        }
        SectionType::Citations | SectionType::Footnotes | SectionType::RunningElements => {
            return None;
        }
    };

    let candidate =
        BoundaryCandidate::new(start, end, HEURISTIC_CONFIDENCE).with_rationale(rationale);
    let in_window = window.contains(&start) && end <= window.end;
    if !in_window || !validate(&candidate, section, total).is_accepted() {
        return None;
    }

    tracing::debug!(section = %section, start, end, "heuristic detection");
    Some(candidate)
}

fn find_heading(lines: &[&str], window: Range<usize>, heading: &Regex) -> Option<usize> {
    window.into_iter().find(|&i| heading.is_match(lines[i]))
}

/// Extends a listing that starts at a heading over entry lines and blank lines.
/// Returns the exclusive end, or `None` if fewer than `min_entries` entries follow.
fn extend_listing(
    lines: &[&str],
    heading: usize,
    limit: usize,
    entries: &[&Regex],
    min_entries: usize,
) -> Option<usize> {
    let mut end = heading + 1;
    let mut count = 0;

    for (i, line) in lines.iter().enumerate().take(limit).skip(heading + 1) {
        if line.trim().is_empty() {
            continue;
        }
        if entries.iter().any(|re| re.is_match(line.trim())) {
            count += 1;
            end = i + 1;
        } else {
            break;
        }
    }

    (count >= min_entries).then_some(end)
}

/// Front matter ends after the last publication-detail line in the window, provided at
/// least two distinct markers were seen.
fn front_matter_end(lines: &[&str], window: Range<usize>) -> Option<usize> {
    let mut distinct: Vec<String> = Vec::new();
    let mut last = None;

    for i in window {
        let line = lines[i];
        if line.len() > 160 {
            continue;
        }
        for m in RE_FRONT_MATTER_MARKER.find_iter(line) {
            let marker = m.as_str().to_lowercase();
            if !distinct.contains(&marker) {
                distinct.push(marker);
            }
            last = Some(i);
        }
    }

    if distinct.len() < 2 {
        return None;
    }
    last.map(|i| i + 1)
}
