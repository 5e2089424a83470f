//! Pipeline configuration and presets.

use crate::error::{Error, Result};
use crate::step::Step;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Named bundles of configuration values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    /// Every removal step, reflow and paragraph optimization.
    #[default]
    Standard,
    /// Local-only cleanup; never calls the oracle.
    Minimal,
    /// Everything, with lower thresholds and chapter markers.
    Aggressive,
    /// Standard, but citations and footnotes are kept and protected during reflow.
    PreserveCitations,
}

impl Preset {
    pub const ALL: [Preset; 4] = [
        Preset::Standard,
        Preset::Minimal,
        Preset::Aggressive,
        Preset::PreserveCitations,
    ];

    /// Stable kebab-case identifier.
    pub fn id(self) -> &'static str {
        match self {
            Preset::Standard => "standard",
            Preset::Minimal => "minimal",
            Preset::Aggressive => "aggressive",
            Preset::PreserveCitations => "preserve-citations",
        }
    }

    /// Builds the configuration this preset stands for.
    pub fn config(self) -> PipelineConfig {
        match self {
            Preset::Standard => PipelineConfig::standard(),
            Preset::Minimal => PipelineConfig::minimal(),
            Preset::Aggressive => PipelineConfig::aggressive(),
            Preset::PreserveCitations => PipelineConfig::preserve_citations(),
        }
    }
}

impl std::str::FromStr for Preset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Preset::ALL
            .iter()
            .copied()
            .find(|p| p.id() == wanted)
            .ok_or_else(|| Error::Config(format!("unknown preset '{}'", s)))
    }
}

/// Target paragraph length, in words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParagraphLength {
    pub min_words: usize,
    pub max_words: usize,
}

impl Default for ParagraphLength {
    fn default() -> Self {
        Self {
            min_words: 40,
            max_words: 300,
        }
    }
}

/// How chapter headings are marked by the chapter-marker step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkerStyle {
    /// `## Chapter 3`
    #[default]
    Heading,
    /// `[CHAPTER 3]`
    Bracketed,
    /// A `* * *` break line before the untouched heading.
    Separator,
}

impl std::str::FromStr for MarkerStyle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heading" => Ok(MarkerStyle::Heading),
            "bracketed" => Ok(MarkerStyle::Bracketed),
            "separator" => Ok(MarkerStyle::Separator),
            other => Err(Error::Config(format!("unknown marker style '{}'", other))),
        }
    }
}

/// Bounded exponential backoff for transient oracle failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl RetrySettings {
    /// No waiting between attempts (tests, offline runs).
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }
}

/// Pipeline configuration.
///
/// Mandatory steps ([`Step::is_mandatory`]) have no toggle and are always enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Preset this configuration was derived from.
    pub preset: Preset,

    pub analyze_structure: bool,
    pub remove_page_numbers: bool,
    pub remove_headers_footers: bool,
    pub remove_front_matter: bool,
    pub remove_table_of_contents: bool,
    pub remove_auxiliary_lists: bool,
    pub remove_footnotes: bool,
    pub remove_citations: bool,
    pub remove_index: bool,
    pub remove_back_matter: bool,
    pub reflow_paragraphs: bool,
    pub optimize_paragraphs: bool,
    pub add_chapter_markers: bool,

    /// Target paragraph length for the optimization step.
    pub paragraph_length: ParagraphLength,
    /// Marker style for the chapter-marker step.
    pub chapter_marker: MarkerStyle,
    /// Shield inline citations from the oracle during reflow.
    pub protect_citations: bool,
    /// Remove Private Use Area characters during normalization.
    pub remove_private_use: bool,
    /// Upper bound on the size of one reflow chunk, in characters.
    pub max_chunk_chars: usize,
    /// Lines sent to the oracle for document-wide pattern analysis.
    pub pattern_sample_lines: usize,
    /// Share of estimated pages a line must repeat on to count as a header/footer (0.0-1.0).
    pub header_footer_threshold: f64,
    /// Maximum line length considered for header/footer detection.
    pub max_header_footer_length: usize,
    pub retry: RetrySettings,
    /// Lifetime of cached pattern analyses, in seconds.
    pub cache_ttl_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            preset: Preset::Standard,
            analyze_structure: true,
            remove_page_numbers: true,
            remove_headers_footers: true,
            remove_front_matter: true,
            remove_table_of_contents: true,
            remove_auxiliary_lists: true,
            remove_footnotes: true,
            remove_citations: true,
            remove_index: true,
            remove_back_matter: true,
            reflow_paragraphs: true,
            optimize_paragraphs: true,
            add_chapter_markers: false,
            paragraph_length: ParagraphLength::default(),
            chapter_marker: MarkerStyle::Heading,
            protect_citations: false,
            remove_private_use: true,
            max_chunk_chars: 6_000,
            pattern_sample_lines: 400,
            header_footer_threshold: 0.8,
            max_header_footer_length: 100,
            retry: RetrySettings::default(),
            cache_ttl_secs: 3_600,
        }
    }
}

impl PipelineConfig {
    /// Creates the standard configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every removal step plus reflow and paragraph optimization.
    pub fn standard() -> Self {
        Self::default()
    }

    /// Local-only cleanup: normalization, page numbers and final cleanup.
    pub fn minimal() -> Self {
        Self {
            preset: Preset::Minimal,
            analyze_structure: false,
            remove_page_numbers: true,
            remove_headers_footers: false,
            remove_front_matter: false,
            remove_table_of_contents: false,
            remove_auxiliary_lists: false,
            remove_footnotes: false,
            remove_citations: false,
            remove_index: false,
            remove_back_matter: false,
            reflow_paragraphs: false,
            optimize_paragraphs: false,
            add_chapter_markers: false,
            ..Self::default()
        }
    }

    /// Maximum purification.
    pub fn aggressive() -> Self {
        Self {
            preset: Preset::Aggressive,
            add_chapter_markers: true,
            header_footer_threshold: 0.6, // Lower threshold = more aggressive
            max_header_footer_length: 150,
            paragraph_length: ParagraphLength {
                min_words: 30,
                max_words: 220,
            },
            ..Self::default()
        }
    }

    /// Keeps citations and footnotes and shields citations from reflow.
    pub fn preserve_citations() -> Self {
        Self {
            preset: Preset::PreserveCitations,
            remove_citations: false,
            remove_footnotes: false,
            protect_citations: true,
            ..Self::default()
        }
    }

    /// Parses a configuration from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// Returns true if `step` will run.
    pub fn is_enabled(&self, step: Step) -> bool {
        match step {
            Step::NormalizeCharacters | Step::FinalCleanup => true,
            Step::AnalyzeStructure => self.analyze_structure,
            Step::RemovePageNumbers => self.remove_page_numbers,
            Step::RemoveHeadersFooters => self.remove_headers_footers,
            Step::RemoveFrontMatter => self.remove_front_matter,
            Step::RemoveTableOfContents => self.remove_table_of_contents,
            Step::RemoveAuxiliaryLists => self.remove_auxiliary_lists,
            Step::RemoveFootnotes => self.remove_footnotes,
            Step::RemoveCitations => self.remove_citations,
            Step::RemoveIndex => self.remove_index,
            Step::RemoveBackMatter => self.remove_back_matter,
            Step::ReflowParagraphs => self.reflow_paragraphs,
            Step::OptimizeParagraphs => self.optimize_paragraphs,
            Step::AddChapterMarkers => self.add_chapter_markers,
        }
    }

    /// Enables or disables a step. Disabling a mandatory step is an error.
    pub fn set_step(&mut self, step: Step, enabled: bool) -> Result<()> {
        let flag = match step {
            Step::NormalizeCharacters | Step::FinalCleanup => {
                if enabled {
                    return Ok(());
                }
                return Err(Error::Config(format!(
                    "step '{}' is mandatory and cannot be disabled",
                    step.id()
                )));
            }
            Step::AnalyzeStructure => &mut self.analyze_structure,
            Step::RemovePageNumbers => &mut self.remove_page_numbers,
            Step::RemoveHeadersFooters => &mut self.remove_headers_footers,
            Step::RemoveFrontMatter => &mut self.remove_front_matter,
            Step::RemoveTableOfContents => &mut self.remove_table_of_contents,
            Step::RemoveAuxiliaryLists => &mut self.remove_auxiliary_lists,
            Step::RemoveFootnotes => &mut self.remove_footnotes,
            Step::RemoveCitations => &mut self.remove_citations,
            Step::RemoveIndex => &mut self.remove_index,
            Step::RemoveBackMatter => &mut self.remove_back_matter,
            Step::ReflowParagraphs => &mut self.reflow_paragraphs,
            Step::OptimizeParagraphs => &mut self.optimize_paragraphs,
            Step::AddChapterMarkers => &mut self.add_chapter_markers,
        };
        *flag = enabled;
        Ok(())
    }

    /// Builder form of [`set_step`](Self::set_step).
    pub fn with_step(mut self, step: Step, enabled: bool) -> Result<Self> {
        self.set_step(step, enabled)?;
        Ok(self)
    }

    /// Disables every step that talks to the oracle.
    pub fn local_only(mut self) -> Self {
        for step in Step::ALL {
            if step.method().uses_oracle() && !step.is_mandatory() {
                // Only non-mandatory steps use the oracle, so this cannot fail.
                let _ = self.set_step(step, false);
            }
        }
        self
    }

    /// Sets the target paragraph length.
    pub fn with_paragraph_length(mut self, min_words: usize, max_words: usize) -> Self {
        self.paragraph_length = ParagraphLength {
            min_words,
            max_words,
        };
        self
    }

    /// Sets the chapter marker style and enables the chapter-marker step.
    pub fn with_chapter_markers(mut self, style: MarkerStyle) -> Self {
        self.chapter_marker = style;
        self.add_chapter_markers = true;
        self
    }

    /// Sets the retry behaviour for transient oracle failures.
    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the maximum reflow chunk size.
    pub fn with_max_chunk_chars(mut self, chars: usize) -> Self {
        self.max_chunk_chars = chars;
        self
    }

    /// Enabled steps, always a subsequence of [`Step::ALL`].
    pub fn enabled_steps(&self) -> Vec<Step> {
        Step::ALL
            .into_iter()
            .filter(|step| self.is_enabled(*step))
            .collect()
    }

    /// Pattern-cache lifetime.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Rejects invalid parameter combinations.
    pub fn validate(&self) -> Result<()> {
        let bounds = self.paragraph_length;
        if bounds.min_words == 0 {
            return Err(Error::Config(
                "paragraph_length.min_words must be at least 1".into(),
            ));
        }
        if bounds.min_words >= bounds.max_words {
            return Err(Error::Config(format!(
                "paragraph_length.min_words ({}) must be below max_words ({})",
                bounds.min_words, bounds.max_words
            )));
        }
        if self.max_chunk_chars < 500 {
            return Err(Error::Config(format!(
                "max_chunk_chars must be at least 500 (got {})",
                self.max_chunk_chars
            )));
        }
        if !(self.header_footer_threshold > 0.0 && self.header_footer_threshold <= 1.0) {
            return Err(Error::Config(format!(
                "header_footer_threshold must be in (0, 1] (got {})",
                self.header_footer_threshold
            )));
        }
        if self.max_header_footer_length == 0 {
            return Err(Error::Config(
                "max_header_footer_length must be positive".into(),
            ));
        }
        if self.pattern_sample_lines < 20 {
            return Err(Error::Config(format!(
                "pattern_sample_lines must be at least 20 (got {})",
                self.pattern_sample_lines
            )));
        }
        if self.retry.max_attempts == 0 || self.retry.max_attempts > 10 {
            return Err(Error::Config(format!(
                "retry.max_attempts must be between 1 and 10 (got {})",
                self.retry.max_attempts
            )));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(Error::Config(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".into(),
            ));
        }
        if self.protect_citations && self.remove_citations {
            return Err(Error::Config(
                "protect_citations conflicts with remove_citations".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_enables_fourteen_steps() {
        let config = PipelineConfig::default();
        let steps = config.enabled_steps();
        assert_eq!(steps.len(), 14);
        assert!(!steps.contains(&Step::AddChapterMarkers));
    }

    #[test]
    fn test_enabled_steps_are_subsequence() {
        let config = PipelineConfig::default()
            .with_step(Step::RemoveIndex, false)
            .unwrap()
            .with_step(Step::ReflowParagraphs, false)
            .unwrap();
        let steps = config.enabled_steps();
        let mut cursor = Step::ALL.iter();
        for step in &steps {
            assert!(cursor.any(|s| s == step), "{step:?} out of order");
        }
        assert!(!steps.contains(&Step::RemoveIndex));
    }

    #[test]
    fn test_mandatory_steps_cannot_be_disabled() {
        let mut config = PipelineConfig::default();
        assert!(config.set_step(Step::FinalCleanup, false).is_err());
        assert!(config.set_step(Step::NormalizeCharacters, true).is_ok());
        assert!(config.is_enabled(Step::NormalizeCharacters));
    }

    #[test]
    fn test_minimal_never_uses_oracle() {
        let config = PipelineConfig::minimal();
        assert!(config
            .enabled_steps()
            .iter()
            .all(|s| !s.method().uses_oracle()));
        assert!(config.is_enabled(Step::RemovePageNumbers));
    }

    #[test]
    fn test_local_only_keeps_local_steps() {
        let config = PipelineConfig::aggressive().local_only();
        assert!(config.is_enabled(Step::AddChapterMarkers));
        assert!(config.is_enabled(Step::OptimizeParagraphs));
        assert!(!config.is_enabled(Step::RemoveBackMatter));
        assert!(!config.is_enabled(Step::ReflowParagraphs));
    }

    #[test]
    fn test_presets() {
        let standard = PipelineConfig::standard();
        let aggressive = PipelineConfig::aggressive();
        assert!(aggressive.header_footer_threshold < standard.header_footer_threshold);
        assert!(aggressive.add_chapter_markers);

        let preserve = PipelineConfig::preserve_citations();
        assert!(!preserve.remove_citations);
        assert!(!preserve.remove_footnotes);
        assert!(preserve.protect_citations);

        for preset in Preset::ALL {
            let config = preset.config();
            assert_eq!(config.preset, preset);
            assert!(config.validate().is_ok(), "{preset:?}");
        }
    }

    #[test]
    fn test_validate_rejects_inverted_paragraph_bounds() {
        let config = PipelineConfig::default().with_paragraph_length(200, 100);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        let config = PipelineConfig::default().with_paragraph_length(0, 100);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_conflicting_citation_flags() {
        let mut config = PipelineConfig::default();
        config.protect_citations = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_retry_bounds() {
        let config = PipelineConfig::default().with_retry(RetrySettings {
            max_attempts: 0,
            ..RetrySettings::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_overrides_subset() {
        let config = PipelineConfig::from_json_str(
            r#"{"remove_index": false, "paragraph_length": {"min_words": 10, "max_words": 90}}"#,
        )
        .unwrap();
        assert!(!config.remove_index);
        assert!(config.remove_back_matter);
        assert_eq!(config.paragraph_length.max_words, 90);
    }

    #[test]
    fn test_json_invalid_values_rejected() {
        let result = PipelineConfig::from_json_str(r#"{"max_chunk_chars": 10}"#);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"preset": "aggressive", "add_chapter_markers": true}}"#).unwrap();
        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.preset, Preset::Aggressive);
        assert!(config.add_chapter_markers);
    }

    #[test]
    fn test_parse_preset_and_marker() {
        assert_eq!(
            "preserve_citations".parse::<Preset>().unwrap(),
            Preset::PreserveCitations
        );
        assert_eq!(
            "bracketed".parse::<MarkerStyle>().unwrap(),
            MarkerStyle::Bracketed
        );
        assert!("loud".parse::<MarkerStyle>().is_err());
    }
}
