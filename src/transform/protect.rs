//! Protect/restore pairs for content that must survive an oracle rewrite.
//!
//! Protected blocks are swapped for placeholders of the form `⟦KEEP·TABLE·1f3a9c0e·0⟧`.
//! The bracket glyphs and middle dots keep a text generator from reading the token as
//! prose, and the nonce (taken from the SHA-256 of the input) keeps it from colliding
//! with anything already in the text.

use crate::cache::content_hash;
use crate::patterns::builtin_citation_patterns;
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag};
use regex::Regex;
use std::fmt;
use std::ops::Range;
use std::sync::LazyLock;

/// Kind of protected content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtectKind {
    /// Markdown pipe table.
    Table,
    /// Fenced code block.
    CodeBlock,
    /// Display math (`$$…$$`, `\[…\]`).
    Math,
    /// Inline citation such as `[12]` or `(Smith, 2019)`.
    Citation,
}

impl ProtectKind {
    fn tag(self) -> &'static str {
        match self {
            ProtectKind::Table => "TABLE",
            ProtectKind::CodeBlock => "CODE",
            ProtectKind::Math => "MATH",
            ProtectKind::Citation => "CITE",
        }
    }
}

impl fmt::Display for ProtectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtectKind::Table => f.write_str("table"),
            ProtectKind::CodeBlock => f.write_str("code block"),
            ProtectKind::Math => f.write_str("math block"),
            ProtectKind::Citation => f.write_str("citation"),
        }
    }
}

/// One extracted block and the placeholder standing in for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedSpan {
    pub kind: ProtectKind,
    pub token: String,
    pub content: String,
    index: usize,
}

/// Text with protected blocks replaced by placeholders.
#[derive(Debug, Clone)]
pub struct ProtectedText {
    text: String,
    spans: Vec<ProtectedSpan>,
    nonce: String,
}

/// A placeholder that could not be found in rewritten text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestorationWarning {
    pub kind: ProtectKind,
    pub token: String,
}

impl fmt::Display for RestorationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} placeholder {} missing from rewritten text; block appended after it",
            self.kind, self.token
        )
    }
}

/// Rewritten text with protected blocks put back.
#[derive(Debug, Clone)]
pub struct Restoration {
    text: String,
    warnings: Vec<RestorationWarning>,
}

impl Restoration {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    pub fn warnings(&self) -> &[RestorationWarning] {
        &self.warnings
    }

    /// Returns true if every placeholder was found.
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }
}

static RE_DISPLAY_MATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\$\$.+?\$\$|\\\[.+?\\\]").unwrap());

/// Replaces every block of the requested kinds with a placeholder.
///
/// Overlapping matches keep the one that starts first (the longer one on a tie).
pub fn protect(text: &str, kinds: &[ProtectKind]) -> ProtectedText {
    let nonce = pick_nonce(text);
    let ranges = collect_ranges(text, kinds);
    if ranges.is_empty() {
        return ProtectedText {
            text: text.to_string(),
            spans: Vec::new(),
            nonce,
        };
    }

    let mut out = String::with_capacity(text.len());
    let mut spans = Vec::with_capacity(ranges.len());
    let mut cursor = 0;

    for (index, (range, kind)) in ranges.into_iter().enumerate() {
        let token = format!("⟦KEEP·{}·{}·{}⟧", kind.tag(), nonce, index);
        out.push_str(&text[cursor..range.start]);
        out.push_str(&token);
        spans.push(ProtectedSpan {
            kind,
            token,
            content: text[range.clone()].to_string(),
            index,
        });
        cursor = range.end;
    }
    out.push_str(&text[cursor..]);

    tracing::debug!(blocks = spans.len(), "protected blocks");
    ProtectedText {
        text: out,
        spans,
        nonce,
    }
}

fn pick_nonce(text: &str) -> String {
    let mut salt = 0u32;
    loop {
        let seed = if salt == 0 {
            content_hash(text)
        } else {
            content_hash(&format!("{}{}", salt, text))
        };
        let nonce = seed[..8].to_string();
        if !text.contains(&nonce) {
            return nonce;
        }
        salt += 1;
    }
}

fn collect_ranges(text: &str, kinds: &[ProtectKind]) -> Vec<(Range<usize>, ProtectKind)> {
    let mut ranges = Vec::new();

    let want_tables = kinds.contains(&ProtectKind::Table);
    let want_code = kinds.contains(&ProtectKind::CodeBlock);
    if want_tables || want_code {
        let parser = Parser::new_ext(text, Options::ENABLE_TABLES);
        for (event, range) in parser.into_offset_iter() {
            match event {
                Event::Start(Tag::Table(_)) if want_tables => {
                    ranges.push((trim_newlines(text, range), ProtectKind::Table));
                }
                Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(_))) if want_code => {
                    ranges.push((trim_newlines(text, range), ProtectKind::CodeBlock));
                }
                _ => {}
            }
        }
    }

    if kinds.contains(&ProtectKind::Math) {
        for m in RE_DISPLAY_MATH.find_iter(text) {
            ranges.push((m.range(), ProtectKind::Math));
        }
    }

    if kinds.contains(&ProtectKind::Citation) {
        for re in builtin_citation_patterns() {
            for m in re.find_iter(text) {
                ranges.push((m.range(), ProtectKind::Citation));
            }
        }
    }

    ranges.retain(|(range, _)| !range.is_empty());
    ranges.sort_by(|a, b| a.0.start.cmp(&b.0.start).then(b.0.end.cmp(&a.0.end)));

    let mut kept: Vec<(Range<usize>, ProtectKind)> = Vec::with_capacity(ranges.len());
    for (range, kind) in ranges {
        if kept.last().is_some_and(|(prev, _)| range.start < prev.end) {
            continue;
        }
        kept.push((range, kind));
    }
    kept
}

fn trim_newlines(text: &str, range: Range<usize>) -> Range<usize> {
    let mut end = range.end.min(text.len());
    let bytes = text.as_bytes();
    while end > range.start && matches!(bytes[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    range.start..end
}

impl ProtectedText {
    /// Text with placeholders, ready to hand to the oracle.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn spans(&self) -> &[ProtectedSpan] {
        &self.spans
    }

    /// Returns true if nothing was protected.
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Puts the protected blocks back into `output`.
    ///
    /// Placeholders are looked up exactly first, then leniently (the oracle may have
    /// changed the brackets, separators or case). A placeholder that cannot be found
    /// produces a warning and its block is appended after the text so nothing is lost.
    pub fn restore(&self, output: &str) -> Restoration {
        self.restore_spans(output, self.spans.iter())
    }

    /// Restores only the placeholders that occur in `input`, one chunk of
    /// [`text`](Self::text) that was rewritten on its own into `output`.
    pub fn restore_chunk(&self, input: &str, output: &str) -> Restoration {
        self.restore_spans(
            output,
            self.spans.iter().filter(|span| input.contains(&span.token)),
        )
    }

    fn restore_spans<'a>(
        &'a self,
        output: &str,
        spans: impl Iterator<Item = &'a ProtectedSpan>,
    ) -> Restoration {
        let mut text = output.to_string();
        let mut warnings = Vec::new();
        let mut missing = Vec::new();

        for span in spans {
            if text.contains(&span.token) {
                text = text.replacen(&span.token, &span.content, 1);
                // Drop duplicates the rewrite may have introduced
                text = text.replace(&span.token, "");
                continue;
            }

            match self.lenient_pattern(span) {
                Some(re) if re.is_match(&text) => {
                    text = re.replacen(&text, 1, regex::NoExpand(span.content.as_str())).into_owned();
                }
                _ => {
                    tracing::warn!(token = %span.token, kind = %span.kind, "placeholder lost in rewrite");
                    warnings.push(RestorationWarning {
                        kind: span.kind,
                        token: span.token.clone(),
                    });
                    missing.push(span);
                }
            }
        }

        for span in missing {
            let trimmed_len = text.trim_end_matches('\n').len();
            text.truncate(trimmed_len);
            if !text.is_empty() {
                text.push_str(if span.kind == ProtectKind::Citation { " " } else { "\n\n" });
            }
            text.push_str(&span.content);
        }

        Restoration { text, warnings }
    }

    fn lenient_pattern(&self, span: &ProtectedSpan) -> Option<Regex> {
        let sep = r"\s*[·.:\-_|/ ]?\s*";
        let source = format!(
            r"(?i)[⟦\[\{{(]?\s*KEEP{sep}{kind}{sep}{nonce}{sep}{index}\b\s*[⟧\]\}})]?",
            sep = sep,
            kind = span.kind.tag(),
            nonce = regex::escape(&self.nonce),
            index = span.index,
        );
        Regex::new(&source).ok()
    }
}
