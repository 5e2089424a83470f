//! Document-wide pattern analysis.
//!
//! [`DetectedPatterns`] is what the structure-analysis step stores in the pattern cache:
//! the oracle's view of the document when it answers, or [`analyze_locally`] when it
//! does not.

use crate::config::PipelineConfig;
use crate::defense::heuristic;
use crate::section::SectionType;
use crate::transform::lines::{count_matching_lines, repeated_line_patterns, split_lines};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Where a detection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionSource {
    /// The external oracle, after passing validation.
    Oracle,
    /// Built-in AI-independent heuristics (Phase C).
    Heuristic,
    /// Local analysis without any oracle involvement.
    #[default]
    Local,
}

impl fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionSource::Oracle => f.write_str("oracle"),
            DetectionSource::Heuristic => f.write_str("heuristic"),
            DetectionSource::Local => f.write_str("local"),
        }
    }
}

/// Broad document category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    Book,
    AcademicPaper,
    Report,
    Technical,
    #[default]
    Unknown,
}

impl ContentType {
    /// Lenient parse used for oracle replies; anything unrecognised is `Unknown`.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        match label.as_str() {
            "book" | "novel" | "monograph" => ContentType::Book,
            "academic-paper" | "academic" | "paper" | "article" | "thesis" => {
                ContentType::AcademicPaper
            }
            "report" | "whitepaper" => ContentType::Report,
            "technical" | "manual" | "documentation" => ContentType::Technical,
            _ => ContentType::Unknown,
        }
    }
}

/// Document-wide structure and recurring patterns.
///
/// Pattern lists hold regex sources. Line patterns (headers, footers, page numbers,
/// footnotes) must match a whole trimmed line; citation patterns match inline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectedPatterns {
    pub content_type: ContentType,
    pub has_front_matter: bool,
    pub front_matter_end: Option<usize>,
    pub has_table_of_contents: bool,
    pub toc_start: Option<usize>,
    pub toc_end: Option<usize>,
    pub has_index: bool,
    pub index_start: Option<usize>,
    pub has_back_matter: bool,
    pub back_matter_start: Option<usize>,
    pub header_patterns: Vec<String>,
    pub footer_patterns: Vec<String>,
    pub page_number_patterns: Vec<String>,
    pub citation_patterns: Vec<String>,
    pub footnote_patterns: Vec<String>,
    pub chapter_patterns: Vec<String>,
    pub confidence: f64,
    pub source: DetectionSource,
}

impl DetectedPatterns {
    /// Pattern sources for a pattern-detected section (empty for boundary sections).
    pub fn patterns_for(&self, section: SectionType) -> Vec<String> {
        match section {
            SectionType::RunningElements => self
                .header_patterns
                .iter()
                .chain(&self.footer_patterns)
                .chain(&self.page_number_patterns)
                .cloned()
                .collect(),
            SectionType::Citations => self.citation_patterns.clone(),
            SectionType::Footnotes => self.footnote_patterns.clone(),
            SectionType::FrontMatter
            | SectionType::TableOfContents
            | SectionType::AuxiliaryLists
            | SectionType::Index
            | SectionType::BackMatter => Vec::new(),
        }
    }

    /// Returns true if an oracle analysis explicitly found no such section.
    ///
    /// Local analyses never rule a section out.
    pub fn reports_absent(&self, section: SectionType) -> bool {
        if self.source != DetectionSource::Oracle {
            return false;
        }
        match section {
            SectionType::FrontMatter => !self.has_front_matter,
            SectionType::TableOfContents => !self.has_table_of_contents,
            SectionType::Index => !self.has_index,
            SectionType::BackMatter => !self.has_back_matter,
            SectionType::AuxiliaryLists
            | SectionType::Citations
            | SectionType::Footnotes
            | SectionType::RunningElements => false,
        }
    }

    /// Compiled chapter patterns; invalid sources are dropped.
    pub fn compiled_chapter_patterns(&self) -> Vec<Regex> {
        self.chapter_patterns
            .iter()
            .filter_map(|source| match Regex::new(source) {
                Ok(re) => Some(re),
                Err(err) => {
                    tracing::warn!(pattern = %source, error = %err, "ignoring invalid chapter pattern");
                    None
                }
            })
            .collect()
    }
}

// ============================================================================
// Built-in patterns
// ============================================================================

/// Numeric bracket citations: `[12]`, `[3, 7]`, `[4-9]`.
pub const NUMERIC_CITATION: &str = r"\[\d{1,3}(?:\s*[-–,]\s*\d{1,3})*\]";

/// Parenthetical author-year citations: `(Smith, 2019)`, `(Lee et al. 2003; Kim 2004)`.
pub const AUTHOR_YEAR_CITATION: &str = r"\((?:see\s+)?[A-Z][\p{L}'\-]+(?:\s+et\s+al\.|\s+(?:and|&)\s+[A-Z][\p{L}'\-]+)?,?\s+(?:1[5-9]|20)\d{2}[a-z]?(?:[,;][^()\n]{0,60})?\)";

/// Footnote lines opening with a marker followed by a reference abbreviation.
pub const FOOTNOTE_REFERENCE_LINE: &str =
    r"(?i)^(?:\[\d{1,3}\]|[¹²³⁴⁵⁶⁷⁸⁹⁰]+|\d{1,3}\.?)\s+(?:ibid|id\.|op\.?\s*cit|loc\.?\s*cit|see|cf\.).*$";

/// Footnote lines opening with a marker followed by an author and a year.
pub const FOOTNOTE_SOURCE_LINE: &str =
    r"^(?:\[\d{1,3}\]|[¹²³⁴⁵⁶⁷⁸⁹⁰]+|\d{1,3})\s+[A-Z][\p{L}'\-]+,\s.*\b(?:1[5-9]|20)\d{2}\b.*$";

static CITATION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(NUMERIC_CITATION).unwrap(),
        Regex::new(AUTHOR_YEAR_CITATION).unwrap(),
    ]
});

static FOOTNOTE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(FOOTNOTE_REFERENCE_LINE).unwrap(),
        Regex::new(FOOTNOTE_SOURCE_LINE).unwrap(),
    ]
});

/// Compiled built-in inline citation patterns.
pub fn builtin_citation_patterns() -> &'static [Regex] {
    &CITATION_PATTERNS
}

/// Compiled built-in footnote line patterns.
pub fn builtin_footnote_patterns() -> &'static [Regex] {
    &FOOTNOTE_PATTERNS
}

// ============================================================================
// Local analysis
// ============================================================================

static RE_ABSTRACT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*#*\s*abstract\b").unwrap());

static RE_REFERENCES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*#*\s*(?:references|bibliography|works cited)\s*$").unwrap());

static RE_CHAPTER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*#*\s*chapter\s+(?:\d+|[ivxlc]+|[a-z]+)\b").unwrap());

static RE_EXEC_SUMMARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*#*\s*executive summary\s*$").unwrap());

static RE_FENCE_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*```").unwrap());

/// Analyzes the document without the oracle.
///
/// Boundaries come from the same heuristics as Phase C; running headers and footers
/// from line-frequency analysis; citation and footnote patterns are the built-ins that
/// actually occur in the text.
pub fn analyze_locally(text: &str, config: &PipelineConfig) -> DetectedPatterns {
    let mut patterns = DetectedPatterns {
        content_type: classify(text),
        confidence: 0.5,
        source: DetectionSource::Local,
        ..DetectedPatterns::default()
    };

    if let Some(candidate) = heuristic::detect(text, SectionType::FrontMatter) {
        patterns.has_front_matter = true;
        patterns.front_matter_end = Some(candidate.end_line);
    }
    if let Some(candidate) = heuristic::detect(text, SectionType::TableOfContents) {
        patterns.has_table_of_contents = true;
        patterns.toc_start = Some(candidate.start_line);
        patterns.toc_end = Some(candidate.end_line);
    }
    if let Some(candidate) = heuristic::detect(text, SectionType::Index) {
        patterns.has_index = true;
        patterns.index_start = Some(candidate.start_line);
    }
    if let Some(candidate) = heuristic::detect(text, SectionType::BackMatter) {
        patterns.has_back_matter = true;
        patterns.back_matter_start = Some(candidate.start_line);
    }

    patterns.header_patterns = repeated_line_patterns(
        text,
        config.header_footer_threshold,
        config.max_header_footer_length,
    );

    patterns.citation_patterns = builtin_citation_patterns()
        .iter()
        .filter(|re| re.is_match(text))
        .map(|re| re.as_str().to_string())
        .collect();

    patterns.footnote_patterns = builtin_footnote_patterns()
        .iter()
        .filter(|re| count_matching_lines(text, std::slice::from_ref(*re)) > 0)
        .map(|re| re.as_str().to_string())
        .collect();

    tracing::debug!(
        content_type = ?patterns.content_type,
        headers = patterns.header_patterns.len(),
        citations = patterns.citation_patterns.len(),
        "local pattern analysis"
    );
    patterns
}

fn classify(text: &str) -> ContentType {
    if RE_ABSTRACT.is_match(text) && RE_REFERENCES.is_match(text) {
        return ContentType::AcademicPaper;
    }
    if RE_CHAPTER_LINE.find_iter(text).count() >= 2 {
        return ContentType::Book;
    }
    if RE_FENCE_LINE.find_iter(text).count() >= 4 {
        return ContentType::Technical;
    }
    if RE_EXEC_SUMMARY.is_match(text) {
        return ContentType::Report;
    }
    ContentType::Unknown
}

/// Takes up to `max_lines` lines from the head, middle and tail of the document, with
/// a marker line between the excerpts. Short documents are returned whole.
pub fn sample_for_patterns(text: &str, max_lines: usize) -> String {
    let lines = split_lines(text);
    if lines.len() <= max_lines {
        return text.to_string();
    }

    let part = (max_lines / 3).max(1);
    let middle_start = lines.len() / 2 - part / 2;
    let tail_start = lines.len() - part;

    [
        lines[..part].join("\n"),
        lines[middle_start..middle_start + part].join("\n"),
        lines[tail_start..].join("\n"),
    ]
    .join("\n[...]\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_citations() {
        let re = &builtin_citation_patterns()[0];
        assert!(re.is_match("as shown [12]"));
        assert!(re.is_match("see [3, 7]"));
        let author = &builtin_citation_patterns()[1];
        assert!(author.is_match("(Smith, 2019)"));
        assert!(author.is_match("(Smith et al., 2019)"));
        assert!(author.is_match("(Jones and Lee 2003; Kim 2004)"));
        assert!(!author.is_match("(see below)"));
    }

    #[test]
    fn test_builtin_footnotes() {
        let lines = [
            "12 Ibid., p. 45.",
            "¹ See Gibbon, vol. 2.",
            "3 Mommsen, History of Rome (London, 1894), p. 12.",
        ];
        for line in lines {
            assert!(
                builtin_footnote_patterns()
                    .iter()
                    .any(|re| crate::transform::lines::full_match(re, line)),
                "{line}"
            );
        }
        assert!(!builtin_footnote_patterns()
            .iter()
            .any(|re| re.is_match("1. Introduction to the topic")));
    }

    #[test]
    fn test_patterns_for_sections() {
        let patterns = DetectedPatterns {
            header_patterns: vec!["^A$".into()],
            footer_patterns: vec!["^B$".into()],
            citation_patterns: vec![NUMERIC_CITATION.into()],
            ..DetectedPatterns::default()
        };
        assert_eq!(patterns.patterns_for(SectionType::RunningElements).len(), 2);
        assert_eq!(patterns.patterns_for(SectionType::Citations).len(), 1);
        assert!(patterns.patterns_for(SectionType::BackMatter).is_empty());
    }

    #[test]
    fn test_only_oracle_rules_sections_out() {
        let mut patterns = DetectedPatterns::default();
        assert!(!patterns.reports_absent(SectionType::Index));
        patterns.source = DetectionSource::Oracle;
        assert!(patterns.reports_absent(SectionType::Index));
        patterns.has_index = true;
        assert!(!patterns.reports_absent(SectionType::Index));
        assert!(!patterns.reports_absent(SectionType::AuxiliaryLists));
    }

    #[test]
    fn test_content_type_labels() {
        assert_eq!(ContentType::from_label("Academic Paper"), ContentType::AcademicPaper);
        assert_eq!(ContentType::from_label("novel"), ContentType::Book);
        assert_eq!(ContentType::from_label("recipe"), ContentType::Unknown);
    }

    #[test]
    fn test_classify_academic() {
        let text = "Title\n\nAbstract\nWe study things.\n\nReferences\n[1] A. Author.";
        assert_eq!(classify(text), ContentType::AcademicPaper);
    }

    #[test]
    fn test_analyze_locally_finds_citations_and_headers() {
        let mut text = String::new();
        for page in 1..=6 {
            text.push_str(&format!("A HISTORY OF ROME {}\n", page));
            for i in 0..38 {
                // Body lines are longer than any running header
                text.push_str(&format!(
                    "Roman line {} on page {} gives a long account of the senate, the consuls, the tribunes and the assemblies [{}].\n",
                    i,
                    page,
                    i % 9 + 1
                ));
            }
        }
        let patterns = analyze_locally(&text, &PipelineConfig::default());
        assert_eq!(patterns.source, DetectionSource::Local);
        assert_eq!(patterns.header_patterns, vec![r"^A HISTORY OF ROME \d+$".to_string()]);
        assert_eq!(patterns.citation_patterns, vec![NUMERIC_CITATION.to_string()]);
        assert!(patterns.footnote_patterns.is_empty());
        assert!(!patterns.has_back_matter);
    }

    #[test]
    fn test_sample_for_patterns() {
        let text: String = (0..1000)
            .map(|i| format!("line {}", i))
            .collect::<Vec<_>>()
            .join("\n");
        let sample = sample_for_patterns(&text, 90);
        assert!(sample.starts_with("line 0\n"));
        assert!(sample.contains("line 500"));
        assert!(sample.ends_with("line 999"));
        assert_eq!(sample.matches("[...]").count(), 2);
        assert_eq!(sample_for_patterns("short", 90), "short");
    }
}
