//! Prompt construction for [`PromptedOracle`](super::PromptedOracle).

use crate::section::{PositionBound, SectionType};
use crate::transform::lines::split_lines;
use std::fmt::Write;
use std::ops::Range;

/// Longest line excerpt sent for boundary detection.
const MAX_LINE_CHARS: usize = 160;

/// Most numbered lines sent in one boundary request.
pub const MAX_PROMPT_LINES: usize = 1_200;

pub const SYSTEM_PROMPT: &str = "You analyze the structure of documents extracted by OCR. \
Answer with a single JSON object and nothing else.";

/// Lines the oracle is shown for `section`: the part of the document where the section
/// may legally sit.
pub fn boundary_window(section: SectionType, total_lines: usize) -> Range<usize> {
    let profile = section.profile();
    match profile.position {
        PositionBound::StartWithinLast(_) => profile.earliest_start(total_lines)..total_lines,
        PositionBound::EndWithinFirst(_) => 0..profile.latest_end(total_lines),
        PositionBound::Anywhere => 0..total_lines,
    }
}

/// Numbered excerpt of `text` restricted to `window`. Line numbers are absolute and
/// 0-based. Windows over [`MAX_PROMPT_LINES`] keep their head and tail.
pub fn numbered_lines(text: &str, window: Range<usize>) -> String {
    let lines = split_lines(text);
    let end = window.end.min(lines.len());
    let start = window.start.min(end);

    let indices: Vec<usize> = if end - start <= MAX_PROMPT_LINES {
        (start..end).collect()
    } else {
        let half = MAX_PROMPT_LINES / 2;
        (start..start + half).chain(end - half..end).collect()
    };

    let mut out = String::new();
    let mut previous: Option<usize> = None;
    for i in indices {
        if previous.is_some_and(|p| p + 1 != i) {
            out.push_str("[...]\n");
        }
        let line = lines[i];
        let excerpt: String = line.chars().take(MAX_LINE_CHARS).collect();
        let _ = writeln!(out, "{:>6}| {}", i, excerpt);
        previous = Some(i);
    }
    out
}

fn section_hint(section: SectionType) -> &'static str {
    match section {
        SectionType::FrontMatter => {
            "title pages, copyright and publication details, dedications, epigraphs"
        }
        SectionType::TableOfContents => "a list of chapter or section titles with page numbers",
        SectionType::AuxiliaryLists => "lists of figures, tables, illustrations or abbreviations",
        SectionType::Index => "an alphabetical index of terms with page numbers",
        SectionType::BackMatter => {
            "bibliography, references, appendices, glossary, endnotes, acknowledgments"
        }
        SectionType::Citations => "inline citation markers",
        SectionType::Footnotes => "footnote lines",
        SectionType::RunningElements => "running headers and footers",
    }
}

/// Request to locate one section.
pub fn boundary_prompt(text: &str, section: SectionType) -> String {
    let total = split_lines(text).len();
    let window = boundary_window(section, total);
    format!(
        "The document has {total} lines, numbered from 0. Below are lines {start} to {end} \
(exclusive).\n\n\
Find the {label} ({hint}). If it is present, reply with \
{{\"found\": true, \"start_line\": N, \"end_line\": M, \"confidence\": 0.0-1.0, \"rationale\": \"...\"}} \
where end_line is exclusive. If it is not present, reply with {{\"found\": false}}.\n\n\
Do not guess. A wrong boundary deletes real content.\n\n{lines}",
        total = total,
        start = window.start,
        end = window.end,
        label = section.label(),
        hint = section_hint(section),
        lines = numbered_lines(text, window.clone()),
    )
}

/// Request for document-wide pattern analysis of a sample.
pub fn patterns_prompt(sample: &str) -> String {
    format!(
        "Below is a sample (beginning, middle and end, separated by [...]) of an OCR-extracted \
document. Describe its structure as JSON with these fields:\n\
- content_type: book, academic-paper, report, technical or unknown\n\
- has_front_matter, has_table_of_contents, has_index, has_back_matter: booleans\n\
- header_patterns, footer_patterns, page_number_patterns: regexes that match a whole \
running header, footer or page-number line\n\
- citation_patterns: regexes matching inline citation markers\n\
- footnote_patterns: regexes matching a whole footnote line\n\
- chapter_patterns: regexes matching a whole chapter heading line\n\
- confidence: 0.0-1.0\n\
Use empty lists for patterns that do not occur. Use Rust regex syntax.\n\n{}",
        sample
    )
}

/// Request to reflow one chunk.
pub fn reflow_prompt(chunk: &str) -> String {
    format!(
        "Reflow the following OCR text. Join lines that were broken mid-sentence, keep \
paragraph breaks, headings and list items, and fix words split across lines. Do not \
summarize, translate, add or drop any content. Copy every token of the form ⟦KEEP·…⟧ \
exactly as it appears. Reply with the reflowed text only.\n\n{}",
        chunk
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(total: usize) -> String {
        (0..total)
            .map(|i| format!("line {}", i))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_boundary_window_follows_profile() {
        assert_eq!(boundary_window(SectionType::BackMatter, 500), 250..500);
        assert_eq!(boundary_window(SectionType::FrontMatter, 500), 0..200);
        assert_eq!(boundary_window(SectionType::Citations, 500), 0..500);
    }

    #[test]
    fn test_numbered_lines_are_absolute() {
        let text = document(20);
        let excerpt = numbered_lines(&text, 15..20);
        assert!(excerpt.starts_with("    15| line 15\n"));
        assert!(excerpt.ends_with("    19| line 19\n"));
        assert!(!excerpt.contains("line 14"));
    }

    #[test]
    fn test_large_windows_are_elided() {
        let text = document(3_000);
        let excerpt = numbered_lines(&text, 0..3_000);
        assert_eq!(excerpt.lines().count(), MAX_PROMPT_LINES + 1);
        assert!(excerpt.contains("[...]"));
        assert!(excerpt.contains("  2999| line 2999"));
    }

    #[test]
    fn test_boundary_prompt_mentions_window() {
        let prompt = boundary_prompt(&document(100), SectionType::Index);
        assert!(prompt.contains("Below are lines 60 to 100"));
        assert!(prompt.contains("\"found\": false"));
    }
}
