//! Paragraph-level operations: splitting, chunking for the oracle, dehyphenation,
//! length optimization and chapter markers.

use super::lines::{fenced_line_mask, split_lines, word_count};
use crate::config::{MarkerStyle, ParagraphLength};
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Splits text into paragraphs separated by one or more blank lines.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }

    paragraphs
}

/// Groups paragraphs into chunks of at most `max_chars` bytes, in document order.
///
/// Joining the chunks with a blank line gives back the paragraphs. A paragraph longer
/// than `max_chars` is cut at line boundaries, and a single over-long line at word
/// boundaries.
pub fn chunk_paragraphs(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in split_paragraphs(text) {
        for piece in split_oversized(&paragraph, max_chars) {
            if !current.is_empty() && current.len() + 2 + piece.len() > max_chars {
                chunks.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(&piece);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

fn split_oversized(paragraph: &str, max_chars: usize) -> Vec<String> {
    if paragraph.len() <= max_chars {
        return vec![paragraph.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    for line in paragraph.lines() {
        for part in split_long_line(line, max_chars) {
            if !current.is_empty() && current.len() + 1 + part.len() > max_chars {
                pieces.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(&part);
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

fn split_long_line(line: &str, max_chars: usize) -> Vec<String> {
    if line.len() <= max_chars {
        return vec![line.to_string()];
    }
    let mut parts = Vec::new();
    let mut current = String::new();
    for word in line.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > max_chars {
            parts.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

static RE_HYPHEN_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\p{L})-\n[ \t]*(\p{Ll}+)([ \t]+)?").unwrap());

/// Joins words hyphenated across a line break (`exam-\nple` becomes `example`).
pub fn join_hyphenated(text: &str) -> String {
    RE_HYPHEN_BREAK
        .replace_all(text, |caps: &Captures| {
            let joined = format!("{}{}", &caps[1], &caps[2]);
            if caps.get(3).is_some() {
                joined + "\n"
            } else {
                joined
            }
        })
        .into_owned()
}

// ============================================================================
// Paragraph length optimization
// ============================================================================

/// Result of [`optimize_paragraphs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParagraphEdit {
    pub text: String,
    pub merged: usize,
    pub split: usize,
}

impl ParagraphEdit {
    pub fn changes(&self) -> usize {
        self.merged + self.split
    }
}

const CONTINUATION_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "of", "to", "in", "on", "for", "with", "by", "from",
    "that", "which", "as", "at", "is", "was",
];

const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "st", "vs", "etc", "e.g", "i.e", "fig", "no", "vol", "pp",
    "ch", "sec", "jr", "sr", "al", "cf", "approx",
];

/// Brings paragraphs into `bounds`.
///
/// A prose paragraph that stops mid-sentence is merged with the next one when the
/// result stays within `max_words`; a paragraph over `max_words` is split at sentence
/// boundaries into roughly even pieces. Headings, lists, tables, quotes and
/// placeholders are left alone. When nothing changes the input is returned verbatim.
pub fn optimize_paragraphs(text: &str, bounds: ParagraphLength) -> ParagraphEdit {
    let mut merged = 0;
    let mut joined: Vec<String> = Vec::new();

    for paragraph in split_paragraphs(text) {
        if let Some(prev) = joined.last_mut() {
            if should_merge(prev, &paragraph, bounds) {
                *prev = format!("{} {}", flatten(prev), flatten(&paragraph));
                merged += 1;
                continue;
            }
        }
        joined.push(paragraph);
    }

    let mut split = 0;
    let mut result = Vec::with_capacity(joined.len());
    for paragraph in joined {
        if is_prose(&paragraph) && word_count(&paragraph) > bounds.max_words {
            let pieces = split_long_paragraph(&paragraph, bounds);
            if pieces.len() > 1 {
                split += 1;
                result.extend(pieces);
                continue;
            }
        }
        result.push(paragraph);
    }

    if merged + split == 0 {
        return ParagraphEdit {
            text: text.to_string(),
            merged,
            split,
        };
    }

    tracing::debug!(merged, split, "optimized paragraphs");
    ParagraphEdit {
        text: result.join("\n\n"),
        merged,
        split,
    }
}

fn should_merge(prev: &str, next: &str, bounds: ParagraphLength) -> bool {
    if !is_prose(prev) || !is_prose(next) || ends_terminal(prev) {
        return false;
    }
    if word_count(prev) + word_count(next) > bounds.max_words {
        return false;
    }
    starts_lowercase(next) || ends_with_continuation(prev)
}

fn is_prose(paragraph: &str) -> bool {
    let first = paragraph.trim_start();
    let structural = ["#", "|", ">", "```", "~~~", "- ", "* ", "+ ", "⟦", "[", "---", "***"];
    if structural.iter().any(|prefix| first.starts_with(prefix)) {
        return false;
    }
    // Ordered list item
    let digits = first.chars().take_while(|c| c.is_ascii_digit()).count();
    !(digits > 0 && first[digits..].starts_with(". "))
}

fn ends_terminal(paragraph: &str) -> bool {
    paragraph
        .trim_end()
        .trim_end_matches(['"', '\'', ')', ']', '”', '’'])
        .ends_with(['.', '!', '?', ':', '…'])
}

fn starts_lowercase(paragraph: &str) -> bool {
    paragraph
        .trim_start()
        .chars()
        .next()
        .is_some_and(|c| c.is_lowercase())
}

fn ends_with_continuation(paragraph: &str) -> bool {
    let trimmed = paragraph.trim_end();
    if trimmed.ends_with([',', ';', '-', '–', '—']) {
        return true;
    }
    trimmed
        .split_whitespace()
        .last()
        .map(|word| word.to_lowercase())
        .is_some_and(|word| CONTINUATION_WORDS.contains(&word.as_str()))
}

fn flatten(paragraph: &str) -> String {
    paragraph
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn split_long_paragraph(paragraph: &str, bounds: ParagraphLength) -> Vec<String> {
    let flat = flatten(paragraph);
    let sentences = split_sentences(&flat);
    if sentences.len() < 2 {
        return vec![paragraph.to_string()];
    }

    let total = word_count(&flat);
    let pieces_needed = total.div_ceil(bounds.max_words);
    let target = total.div_ceil(pieces_needed.max(1));

    let mut pieces: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_words = 0;
    for sentence in sentences {
        let words = word_count(sentence);
        if !current.is_empty() && current_words + words > bounds.max_words {
            pieces.push(std::mem::take(&mut current));
            current_words = 0;
        }
        current.push(sentence);
        current_words += words;
        if current_words >= target {
            pieces.push(std::mem::take(&mut current));
            current_words = 0;
        }
    }
    if !current.is_empty() {
        // Fold a short tail into the previous piece when it fits
        let fits = pieces.last().is_some_and(|prev| {
            let prev_words: usize = prev.iter().map(|s| word_count(s)).sum();
            current_words < bounds.min_words && prev_words + current_words <= bounds.max_words
        });
        match pieces.last_mut() {
            Some(prev) if fits => prev.extend(current),
            _ => pieces.push(current),
        }
    }

    pieces.into_iter().map(|p| p.join(" ")).collect()
}

/// Splits flattened prose into sentences.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        if matches!(c, '.' | '!' | '?') {
            let mut j = i + 1;
            while j < chars.len() && matches!(chars[j].1, '"' | '\'' | ')' | ']' | '”' | '’') {
                j += 1;
            }
            if j < chars.len() && chars[j].1.is_whitespace() {
                let mut k = j;
                while k < chars.len() && chars[k].1.is_whitespace() {
                    k += 1;
                }
                let abbreviated = c == '.' && is_abbreviation(&text[start..pos]);
                if k < chars.len() && starts_sentence(chars[k].1) && !abbreviated {
                    sentences.push(text[start..chars[j].0].trim());
                    start = chars[k].0;
                    i = k;
                    continue;
                }
            }
        }
        i += 1;
    }
    if start < text.len() {
        sentences.push(text[start..].trim());
    }

    sentences.retain(|s| !s.is_empty());
    sentences
}

fn starts_sentence(c: char) -> bool {
    c.is_uppercase() || c.is_ascii_digit() || matches!(c, '"' | '“' | '(' | '\'')
}

fn is_abbreviation(before_period: &str) -> bool {
    let word = before_period
        .split_whitespace()
        .last()
        .unwrap_or("")
        .trim_start_matches(['(', '"', '\''])
        .to_lowercase();
    let single_letter = word.chars().count() == 1 && word.chars().all(char::is_alphabetic);
    single_letter || ABBREVIATIONS.contains(&word.as_str())
}

// ============================================================================
// Chapter markers
// ============================================================================

static RE_CHAPTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:chapter|part|book)\s+(?:\d+|[ivxlcdm]+|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|thirteen|fourteen|fifteen|sixteen|seventeen|eighteen|nineteen|twenty)\b",
    )
    .unwrap()
});

const SCENE_BREAK: &str = "* * *";

/// Result of [`add_chapter_markers`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerEdit {
    pub text: String,
    pub marked: usize,
}

/// Returns true if `line` looks like a chapter heading.
pub fn is_chapter_heading(line: &str, extra: &[Regex]) -> bool {
    let trimmed = line.trim();
    let words = word_count(trimmed);
    if trimmed.is_empty() || trimmed.len() > 100 || words > 12 {
        return false;
    }
    if trimmed.ends_with([',', ';']) || (trimmed.ends_with('.') && words > 4) {
        return false;
    }
    RE_CHAPTER.is_match(trimmed) || extra.iter().any(|re| super::lines::full_match(re, trimmed))
}

/// Marks standalone chapter headings in `style`. Already-marked headings are skipped,
/// so the step is idempotent.
pub fn add_chapter_markers(text: &str, extra: &[Regex], style: MarkerStyle) -> MarkerEdit {
    let lines = split_lines(text);
    let mask = fenced_line_mask(&lines);
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut marked = 0;

    for (i, (line, fenced)) in lines.iter().zip(mask).enumerate() {
        let standalone = i == 0 || lines[i - 1].trim().is_empty();
        if fenced || !standalone || !is_chapter_heading(line, extra) {
            out.push(line.to_string());
            continue;
        }

        let trimmed = line.trim();
        match style {
            MarkerStyle::Heading => out.push(format!("## {}", trimmed)),
            MarkerStyle::Bracketed => out.push(format!("[{}]", trimmed.to_uppercase())),
            MarkerStyle::Separator => {
                let already = out
                    .iter()
                    .rev()
                    .find(|l| !l.trim().is_empty())
                    .is_some_and(|l| l.trim() == SCENE_BREAK);
                if already {
                    out.push(line.to_string());
                    continue;
                }
                out.push(SCENE_BREAK.to_string());
                out.push(String::new());
                out.push(line.to_string());
            }
        }
        marked += 1;
    }

    if marked == 0 {
        return MarkerEdit {
            text: text.to_string(),
            marked,
        };
    }
    MarkerEdit {
        text: out.join("\n"),
        marked,
    }
}
