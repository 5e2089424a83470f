//! Character normalization and final whitespace cleanup.
//!
//! Both functions are idempotent: applying them twice gives the same text as applying
//! them once.

use super::protect::{protect, ProtectKind};
use regex::Regex;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// Character normalization
// ============================================================================

/// Bullet glyphs replaced when they open a line.
const BULLET_MAPPINGS: &[(char, &str)] = &[
    // Filled bullets -> standard list marker
    ('●', "- "),
    ('■', "- "),
    ('◆', "- "),
    ('▶', "- "),
    ('►', "- "),
    ('➢', "- "),
    ('➤', "- "),
    ('•', "- "),
    ('▪', "- "),
    ('·', "- "),
    // Hollow bullets
    ('○', "- "),
    ('◦', "- "),
    ('□', "- "),
    ('◇', "- "),
    ('▷', "- "),
    ('★', "- "),
    ('☆', "- "),
    // Checkmarks -> task list
    ('✓', "- [x] "),
    ('✔', "- [x] "),
    ('✗', "- [ ] "),
    ('✘', "- [ ] "),
];

const LIGATURES: &[(char, &str)] = &[
    ('\u{FB00}', "ff"),
    ('\u{FB01}', "fi"),
    ('\u{FB02}', "fl"),
    ('\u{FB03}', "ffi"),
    ('\u{FB04}', "ffl"),
    ('\u{FB05}', "st"),
    ('\u{FB06}', "st"),
];

/// Normalizes OCR character noise.
///
/// - CRLF and lone CR to LF
/// - control, BOM, soft-hyphen and zero-width character removal
/// - Private Use Area removal (when `remove_private_use` is set)
/// - ligature expansion, fullwidth ASCII and exotic spaces to ASCII
/// - curly quotes to straight quotes
/// - bullet glyphs at line start to `- `
/// - Unicode NFC
pub fn normalize_characters(input: &str, remove_private_use: bool) -> String {
    let unified = input.replace("\r\n", "\n").replace('\r', "\n");
    let mut mapped = String::with_capacity(unified.len());

    for (i, line) in unified.split('\n').enumerate() {
        if i > 0 {
            mapped.push('\n');
        }
        let line = map_line_chars(line, remove_private_use);
        mapped.push_str(&map_leading_bullet(&line));
    }

    // NFC last: none of the mappings above can be produced by composition
    mapped.nfc().collect()
}

fn map_line_chars(line: &str, remove_private_use: bool) -> String {
    let mut out = String::with_capacity(line.len());
    for c in line.chars() {
        if is_removable_char(c) || (remove_private_use && is_pua_char(c)) {
            continue;
        }
        if let Some(expansion) = ligature_expansion(c) {
            out.push_str(expansion);
            continue;
        }
        if let Some(normalized) = normalize_fullwidth(c) {
            out.push(normalized);
            continue;
        }
        out.push(normalize_quote(c));
    }
    out
}

fn map_leading_bullet(line: &str) -> String {
    let body = line.trim_start();
    let indent = &line[..line.len() - body.len()];
    let mut chars = body.chars();

    match chars.next().and_then(bullet_replacement) {
        Some(replacement) => format!("{}{}{}", indent, replacement, chars.as_str().trim_start()),
        None => line.to_string(),
    }
}

/// Check if character is a control or invisible character that should be removed
fn is_removable_char(c: char) -> bool {
    match c {
        '\n' | '\t' => false,
        '\u{FEFF}' // BOM
        | '\u{FFFD}' // Replacement character
        | '\u{00AD}' // Soft hyphen
        | '\u{200B}' // Zero-width space
        | '\u{200C}'
        | '\u{200D}'
        | '\u{2060}' => true,
        c => c.is_control(),
    }
}

/// Check if character is in Private Use Area
fn is_pua_char(c: char) -> bool {
    let code = c as u32;
    (0xE000..=0xF8FF).contains(&code)
        || (0xF0000..=0xFFFFD).contains(&code)
        || (0x100000..=0x10FFFD).contains(&code)
}

fn bullet_replacement(c: char) -> Option<&'static str> {
    BULLET_MAPPINGS
        .iter()
        .find(|(bullet, _)| *bullet == c)
        .map(|(_, replacement)| *replacement)
}

fn ligature_expansion(c: char) -> Option<&'static str> {
    LIGATURES
        .iter()
        .find(|(ligature, _)| *ligature == c)
        .map(|(_, expansion)| *expansion)
}

/// Normalize fullwidth characters and exotic spaces to ASCII equivalents
fn normalize_fullwidth(c: char) -> Option<char> {
    match c {
        '\u{3000}' | '\u{00A0}' | '\u{2002}'..='\u{200A}' | '\u{202F}' | '\u{205F}' => Some(' '),
        '\u{FF01}'..='\u{FF5E}' => {
            // Fullwidth ASCII variants (！to ～)
            let offset = c as u32 - 0xFF01;
            char::from_u32(0x21 + offset)
        }
        _ => None,
    }
}

fn normalize_quote(c: char) -> char {
    match c {
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' => '\'',
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' => '"',
        c => c,
    }
}

// ============================================================================
// Final cleanup
// ============================================================================

static RE_MULTIPLE_NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

static RE_MULTIPLE_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());

/// Final normalization.
///
/// - Reduce consecutive blank lines to one
/// - Squeeze runs of spaces, strip trailing whitespace
/// - Remove orphan punctuation-only lines
///
/// Tables and fenced code blocks are shielded for the duration of the call.
pub fn final_cleanup(input: &str) -> String {
    let protected = protect(input, &[ProtectKind::Table, ProtectKind::CodeBlock]);

    let mut cleaned_lines: Vec<String> = Vec::new();
    for line in protected.text().lines() {
        let trimmed = line.trim();
        if is_orphan_line(trimmed) {
            continue;
        }

        // Keep list/quote nesting, squeeze everything after it
        let leading = &line[..line.len() - line.trim_start().len()];
        let cleaned = RE_MULTIPLE_SPACES.replace_all(trimmed, " ");
        if cleaned.is_empty() {
            cleaned_lines.push(String::new());
        } else {
            cleaned_lines.push(format!("{}{}", leading.replace('\t', "    "), cleaned));
        }
    }

    let joined = cleaned_lines.join("\n");
    let collapsed = RE_MULTIPLE_NEWLINES.replace_all(&joined, "\n\n");
    let trimmed = collapsed.trim_matches('\n');

    let mut result = protected.restore(trimmed).into_text();
    if !result.is_empty() {
        result.push('\n');
    }
    result
}

/// Check if line is an orphan (meaningless fragment)
fn is_orphan_line(line: &str) -> bool {
    if line.is_empty() {
        return false;
    }

    // Preserve horizontal rules and scene breaks
    if matches!(line, "---" | "***" | "___" | "* * *" | "...") {
        return false;
    }

    // Not a list marker or header
    if line.starts_with("- ") || line.starts_with("* ") || line.starts_with("+ ") || line.starts_with('#')
    {
        return false;
    }

    // Short fragments that only contain punctuation are OCR noise
    line.chars().count() <= 8
        && line
            .chars()
            .all(|c| c.is_ascii_punctuation() || c.is_whitespace() || matches!(c, '。' | '、' | '…'))
}
