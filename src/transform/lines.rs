//! Line-level operations: range deletion, pattern-driven line and inline removal,
//! page-number stripping and repeated-line (header/footer) analysis.
//!
//! Lines are the `\n`-separated pieces of the text, numbered from 0, so joining the
//! result of [`split_lines`] with `\n` reproduces the input exactly. Lines inside fenced
//! code blocks are never removed by pattern-driven operations.

use regex::Regex;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::LazyLock;

/// Splits text into lines without dropping a trailing empty line.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n').collect()
}

/// Number of lines as seen by boundary candidates.
pub fn line_count(text: &str) -> usize {
    text.split('\n').count()
}

/// Whitespace-separated word count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Number of lines that differ between two versions of a text, counted as a multiset
/// (moved lines are not changes).
pub fn changed_lines(before: &str, after: &str) -> usize {
    if before == after {
        return 0;
    }
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for line in split_lines(before) {
        *counts.entry(line).or_default() += 1;
    }
    for line in split_lines(after) {
        *counts.entry(line).or_default() -= 1;
    }
    let removed: i64 = counts.values().filter(|c| **c > 0).sum();
    let added: i64 = counts.values().filter(|c| **c < 0).map(|c| -c).sum();
    removed.max(added) as usize
}

/// Text of the lines in `range`, clamped to the document.
pub fn lines_in_range(text: &str, range: Range<usize>) -> String {
    let lines = split_lines(text);
    let end = range.end.min(lines.len());
    let start = range.start.min(end);
    lines[start..end].join("\n")
}

/// Result of a removal pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub text: String,
    /// Lines (or inline matches) removed.
    pub removed: usize,
    /// Characters removed.
    pub chars_removed: usize,
}

impl Removal {
    fn unchanged(text: &str) -> Self {
        Self {
            text: text.to_string(),
            removed: 0,
            chars_removed: 0,
        }
    }
}

/// Deletes lines `[range.start, range.end)`. Out-of-range bounds are clamped.
pub fn remove_line_range(text: &str, range: Range<usize>) -> Removal {
    let lines = split_lines(text);
    let end = range.end.min(lines.len());
    let start = range.start.min(end);
    if start == end {
        return Removal::unchanged(text);
    }

    let chars_removed = lines[start..end].iter().map(|l| l.len() + 1).sum::<usize>();
    let kept: Vec<&str> = lines[..start]
        .iter()
        .chain(lines[end..].iter())
        .copied()
        .collect();

    tracing::debug!(start, end, "removed line range");
    Removal {
        text: kept.join("\n"),
        removed: end - start,
        chars_removed,
    }
}

static RE_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(```|~~~)").unwrap());

/// Marks the lines that sit inside (or delimit) fenced code blocks.
pub fn fenced_line_mask(lines: &[&str]) -> Vec<bool> {
    let mut mask = Vec::with_capacity(lines.len());
    let mut open: Option<&str> = None;

    for line in lines {
        match (open, RE_FENCE.captures(line)) {
            (None, Some(caps)) => {
                open = caps.get(1).map(|m| m.as_str());
                mask.push(true);
            }
            (Some(fence), Some(caps)) if caps.get(1).map(|m| m.as_str()) == Some(fence) => {
                open = None;
                mask.push(true);
            }
            (Some(_), _) => mask.push(true),
            (None, None) => mask.push(false),
        }
    }

    mask
}

/// Removes every line whose trimmed content is fully matched by one of `patterns`.
pub fn remove_matching_lines(text: &str, patterns: &[Regex]) -> Removal {
    if patterns.is_empty() {
        return Removal::unchanged(text);
    }
    remove_lines_where(text, |trimmed| {
        patterns.iter().any(|re| full_match(re, trimmed))
    })
}

/// Counts lines that [`remove_matching_lines`] would remove.
pub fn count_matching_lines(text: &str, patterns: &[Regex]) -> usize {
    let lines = split_lines(text);
    let mask = fenced_line_mask(&lines);
    lines
        .iter()
        .zip(mask)
        .filter(|(line, fenced)| {
            let trimmed = line.trim();
            !fenced && !trimmed.is_empty() && patterns.iter().any(|re| full_match(re, trimmed))
        })
        .count()
}

/// Returns true if `re` matches the whole of `line`.
pub fn full_match(re: &Regex, line: &str) -> bool {
    re.find_iter(line)
        .any(|m| m.start() == 0 && m.end() == line.len())
}

fn remove_lines_where(text: &str, predicate: impl Fn(&str) -> bool) -> Removal {
    let lines = split_lines(text);
    let mask = fenced_line_mask(&lines);
    let mut kept = Vec::with_capacity(lines.len());
    let mut removed = 0;
    let mut chars_removed = 0;

    for (line, fenced) in lines.iter().zip(mask) {
        let trimmed = line.trim();
        if !fenced && !trimmed.is_empty() && predicate(trimmed) {
            removed += 1;
            chars_removed += line.len() + 1;
            continue;
        }
        kept.push(*line);
    }

    Removal {
        text: kept.join("\n"),
        removed,
        chars_removed,
    }
}

static RE_SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+([,.;:!?)\]])").unwrap());

static RE_DOUBLE_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\S)[ \t]{2,}(\S)").unwrap());

/// Removes inline matches of `patterns` outside fenced code, tidying the spacing left
/// behind on the lines that changed.
pub fn remove_inline_matches(text: &str, patterns: &[Regex]) -> Removal {
    if patterns.is_empty() {
        return Removal::unchanged(text);
    }

    let lines = split_lines(text);
    let mask = fenced_line_mask(&lines);
    let mut out = Vec::with_capacity(lines.len());
    let mut removed = 0;
    let mut chars_removed = 0;

    for (line, fenced) in lines.iter().zip(mask) {
        if fenced {
            out.push(line.to_string());
            continue;
        }

        let mut current = line.to_string();
        let mut changed = false;
        for re in patterns {
            let hits = re.find_iter(&current).filter(|m| !m.as_str().is_empty()).count();
            if hits > 0 {
                let before = current.len();
                current = re.replace_all(&current, "").into_owned();
                removed += hits;
                chars_removed += before - current.len();
                changed = true;
            }
        }

        if changed {
            current = RE_SPACE_BEFORE_PUNCT.replace_all(&current, "$1").into_owned();
            current = RE_DOUBLE_SPACE.replace_all(&current, "$1 $2").into_owned();
        }
        out.push(current);
    }

    Removal {
        text: out.join("\n"),
        removed,
        chars_removed,
    }
}

/// Counts non-empty inline matches outside fenced code and the characters they cover.
pub fn count_inline_matches(text: &str, patterns: &[Regex]) -> (usize, usize) {
    let lines = split_lines(text);
    let mask = fenced_line_mask(&lines);
    let mut hits = 0;
    let mut chars = 0;
    for (line, fenced) in lines.iter().zip(mask) {
        if fenced {
            continue;
        }
        for re in patterns {
            for m in re.find_iter(line).filter(|m| !m.as_str().is_empty()) {
                hits += 1;
                chars += m.as_str().len();
            }
        }
    }
    (hits, chars)
}

// ============================================================================
// Page numbers
// ============================================================================

static RE_PAGE_HYPHEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-\[\(]\s*\d+\s*[-\]\)]\s*$").unwrap());

static RE_PAGE_RATIO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:Page\s*)?\d+\s*(?:/|of)\s*\d+\s*$").unwrap());

static RE_PAGE_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:page|pg\.?|p\.)\s*\d{1,4}\s*$").unwrap());

static RE_PAGE_BARE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\d{1,4}\s*$").unwrap());

/// Well-formed lowercase numerals up to cccxcix; also matches the empty string.
static RE_PAGE_ROMAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*c{0,3}(?:xc|xl|l?x{0,3})(?:ix|iv|v?i{0,3})\s*$").unwrap()
});

/// Check if line matches page number patterns
pub fn is_page_number(line: &str) -> bool {
    RE_PAGE_HYPHEN.is_match(line)
        || RE_PAGE_RATIO.is_match(line)
        || RE_PAGE_LABEL.is_match(line)
        || RE_PAGE_BARE.is_match(line)
        || (!line.trim().is_empty() && RE_PAGE_ROMAN.is_match(line))
}

/// Removes standalone page-number lines.
pub fn remove_page_numbers(text: &str) -> Removal {
    remove_lines_where(text, is_page_number)
}

// ============================================================================
// Repeated lines (running headers/footers)
// ============================================================================

static RE_DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

static RE_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[-=*_\s]{3,}$").unwrap());

/// Finds lines that repeat across the document often enough to be page furniture.
///
/// Digit runs are folded before counting so that "THE ROMAN REPUBLIC 23" and
/// "THE ROMAN REPUBLIC 24" count as the same running header. Returns anchored regex
/// sources suitable for [`remove_matching_lines`].
pub fn repeated_line_patterns(text: &str, threshold: f64, max_length: usize) -> Vec<String> {
    let lines = split_lines(text);
    let mask = fenced_line_mask(&lines);
    let mut freq: HashMap<String, usize> = HashMap::new();

    for (line, fenced) in lines.iter().zip(&mask) {
        let trimmed = line.trim();
        if *fenced || !is_furniture_candidate(trimmed, max_length) {
            continue;
        }
        *freq.entry(fold_digits(trimmed)).or_insert(0) += 1;
    }

    // Estimate page count (rough: ~40 lines per page)
    let estimated_pages = (lines.len() as f64 / 40.0).ceil() as usize;
    let min_count = ((estimated_pages as f64 * threshold) as usize).max(3);

    let mut patterns: Vec<(usize, String)> = freq
        .into_iter()
        .filter(|(_, count)| *count >= min_count)
        .map(|(folded, count)| (count, folded_to_pattern(&folded)))
        .collect();
    patterns.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    patterns.into_iter().map(|(_, pattern)| pattern).collect()
}

fn is_furniture_candidate(trimmed: &str, max_length: usize) -> bool {
    if trimmed.is_empty() || trimmed.len() > max_length {
        return false;
    }
    if trimmed.starts_with('#')
        || trimmed.starts_with('|')
        || trimmed.starts_with('>')
        || RE_SEPARATOR.is_match(trimmed)
    {
        return false;
    }
    // At least a few letters, so bare page numbers are left to the page-number step
    trimmed.chars().filter(|c| c.is_alphabetic()).count() >= 3
}

const DIGIT_SLOT: &str = "\u{0}";

fn fold_digits(line: &str) -> String {
    RE_DIGIT_RUN.replace_all(line, DIGIT_SLOT).into_owned()
}

fn folded_to_pattern(folded: &str) -> String {
    let escaped: Vec<String> = folded.split(DIGIT_SLOT).map(regex::escape).collect();
    format!("^{}$", escaped.join(r"\d+"))
}
