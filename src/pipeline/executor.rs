//! Per-step dispatch.
//!
//! Each step is a function from the current text to a new text plus what it learned on
//! the way. Every removal an oracle proposes goes through [`crate::defense`] first.

use super::run::StepOutcome;
use crate::boundary::{clamp_confidence, RejectionReason};
use crate::cache::{CacheKey, PatternCache};
use crate::config::PipelineConfig;
use crate::defense::pattern_guard::{scope, PatternScope};
use crate::defense::{resolve_boundary, resolve_patterns, OracleAnswer, PatternProposal};
use crate::error::{Error, Result};
use crate::oracle::BoundaryOracle;
use crate::patterns::{analyze_locally, sample_for_patterns, DetectedPatterns, DetectionSource};
use crate::section::SectionType;
use crate::step::Step;
use crate::transform::lines::{
    changed_lines, remove_inline_matches, remove_line_range, remove_matching_lines,
    remove_page_numbers, word_count,
};
use crate::transform::normalize::{final_cleanup, normalize_characters};
use crate::transform::paragraphs::{
    add_chapter_markers, chunk_paragraphs, join_hyphenated, optimize_paragraphs,
};
use crate::transform::protect::{protect, ProtectKind};
use regex::Regex;
use std::sync::LazyLock;

/// Largest word-count drift accepted from a reflowed chunk.
pub const MAX_REFLOW_DRIFT: f64 = 0.35;

static RE_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"⟦[^⟧]*⟧").unwrap());

/// What a step produced, before timing and cost are attached.
#[derive(Debug, Clone)]
pub(crate) struct Execution {
    pub text: String,
    pub outcome: StepOutcome,
    pub change_count: usize,
    pub confidence: f64,
    pub source: Option<DetectionSource>,
    pub rejection: Option<RejectionReason>,
    pub warnings: Vec<String>,
}

impl Execution {
    fn changed(before: &str, text: String, change_count: usize) -> Self {
        let outcome = if text == before {
            StepOutcome::Unchanged
        } else {
            StepOutcome::Applied
        };
        Self {
            text,
            outcome,
            change_count,
            confidence: 1.0,
            source: None,
            rejection: None,
            warnings: Vec::new(),
        }
    }

    fn skipped(text: &str, reason: String) -> Self {
        Self {
            text: text.to_string(),
            outcome: StepOutcome::Skipped { reason },
            change_count: 0,
            confidence: 0.0,
            source: None,
            rejection: None,
            warnings: Vec::new(),
        }
    }

    fn with_source(mut self, source: DetectionSource) -> Self {
        self.source = Some(source);
        self
    }

    fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_confidence(confidence);
        self
    }

    fn with_rejection(mut self, rejection: Option<RejectionReason>) -> Self {
        self.rejection = rejection;
        self
    }

    fn with_warnings(mut self, mut warnings: Vec<String>) -> Self {
        warnings.append(&mut self.warnings);
        self.warnings = warnings;
        self
    }
}

/// Everything a step may consult besides the text.
pub(crate) struct StepContext<'a> {
    pub oracle: &'a dyn BoundaryOracle,
    pub config: &'a PipelineConfig,
    pub cache: &'a mut PatternCache,
    pub cache_key: &'a CacheKey,
}

/// Runs one step over `text`.
pub(crate) fn execute(step: Step, text: &str, ctx: &mut StepContext<'_>) -> Result<Execution> {
    match step {
        Step::AnalyzeStructure => Ok(analyze_structure(text, ctx)),
        Step::NormalizeCharacters => {
            let normalized = normalize_characters(text, ctx.config.remove_private_use);
            let changes = changed_lines(text, &normalized);
            Ok(Execution::changed(text, normalized, changes))
        }
        Step::RemovePageNumbers => {
            let removal = remove_page_numbers(text);
            Ok(Execution::changed(text, removal.text, removal.removed))
        }
        Step::RemoveHeadersFooters => Ok(remove_patterns(text, SectionType::RunningElements, ctx)),
        Step::RemoveFrontMatter => Ok(remove_boundary(text, SectionType::FrontMatter, ctx)),
        Step::RemoveTableOfContents => {
            Ok(remove_boundary(text, SectionType::TableOfContents, ctx))
        }
        Step::RemoveAuxiliaryLists => Ok(remove_boundary(text, SectionType::AuxiliaryLists, ctx)),
        Step::RemoveFootnotes => Ok(remove_patterns(text, SectionType::Footnotes, ctx)),
        Step::RemoveCitations => Ok(remove_patterns(text, SectionType::Citations, ctx)),
        Step::RemoveIndex => Ok(remove_boundary(text, SectionType::Index, ctx)),
        Step::RemoveBackMatter => Ok(remove_boundary(text, SectionType::BackMatter, ctx)),
        Step::ReflowParagraphs => reflow(text, ctx),
        Step::OptimizeParagraphs => Ok(optimize(text, ctx)),
        Step::AddChapterMarkers => {
            let extra = ctx
                .cache
                .get(ctx.cache_key)
                .map(DetectedPatterns::compiled_chapter_patterns)
                .unwrap_or_default();
            let edit = add_chapter_markers(text, &extra, ctx.config.chapter_marker);
            Ok(Execution::changed(text, edit.text, edit.marked))
        }
        Step::FinalCleanup => {
            let cleaned = final_cleanup(text);
            let changes = changed_lines(text, &cleaned);
            Ok(Execution::changed(text, cleaned, changes))
        }
    }
}

/// Asks the oracle for document-wide patterns, falling back to local analysis.
fn analyze(text: &str, ctx: &StepContext<'_>) -> (DetectedPatterns, Vec<String>) {
    let sample = sample_for_patterns(text, ctx.config.pattern_sample_lines);
    match ctx.oracle.detect_patterns(&sample) {
        Ok(mut patterns) => {
            patterns.source = DetectionSource::Oracle;
            patterns.confidence = clamp_confidence(patterns.confidence);
            (patterns, Vec::new())
        }
        Err(err) => {
            tracing::warn!(error = %err, "pattern analysis failed, using local analysis");
            (
                analyze_locally(text, ctx.config),
                vec![format!("structure analysis fell back to local heuristics: {}", err)],
            )
        }
    }
}

/// Cached patterns for this document, analyzing and caching them on a miss.
fn cached_patterns(text: &str, ctx: &mut StepContext<'_>) -> (DetectedPatterns, Vec<String>) {
    if let Some(patterns) = ctx.cache.get(ctx.cache_key) {
        return (patterns.clone(), Vec::new());
    }
    let (patterns, warnings) = analyze(text, ctx);
    ctx.cache.insert(ctx.cache_key.clone(), patterns.clone());
    (patterns, warnings)
}

fn analyze_structure(text: &str, ctx: &mut StepContext<'_>) -> Execution {
    let cached = ctx.cache.get(ctx.cache_key).is_some();
    let (patterns, warnings) = cached_patterns(text, ctx);
    if cached {
        tracing::debug!(source = %patterns.source, "using cached pattern analysis");
    }

    Execution::changed(text, text.to_string(), 0)
        .with_source(patterns.source)
        .with_confidence(patterns.confidence)
        .with_warnings(warnings)
}

fn remove_boundary(text: &str, section: SectionType, ctx: &mut StepContext<'_>) -> Execution {
    let (patterns, mut warnings) = cached_patterns(text, ctx);
    if patterns.reports_absent(section) {
        return Execution::skipped(text, format!("structure analysis found no {}", section))
            .with_source(DetectionSource::Oracle)
            .with_warnings(warnings);
    }

    let answer = match ctx.oracle.detect_boundary(text, section) {
        Ok(Some(candidate)) => OracleAnswer::Found(candidate),
        Ok(None) => OracleAnswer::Absent,
        Err(err) => {
            warnings.push(format!("{} detection failed: {}", section, err));
            OracleAnswer::Unavailable(Some(err))
        }
    };

    let decision = resolve_boundary(text, section, answer);
    let Some(candidate) = decision.candidate else {
        return Execution::skipped(text, decision.note)
            .with_source(decision.source)
            .with_rejection(decision.rejection)
            .with_warnings(warnings);
    };

    let removal = remove_line_range(text, candidate.start_line..candidate.end_line);
    tracing::info!(
        section = %section,
        start = candidate.start_line,
        end = candidate.end_line,
        source = %decision.source,
        "removed section"
    );
    Execution::changed(text, removal.text, removal.removed)
        .with_source(decision.source)
        .with_confidence(decision.confidence)
        .with_rejection(decision.rejection)
        .with_warnings(warnings)
}

fn remove_patterns(text: &str, section: SectionType, ctx: &mut StepContext<'_>) -> Execution {
    let (patterns, warnings) = cached_patterns(text, ctx);

    let answer = match patterns.source {
        DetectionSource::Oracle => {
            let sources = patterns.patterns_for(section);
            if sources.is_empty() {
                OracleAnswer::Absent
            } else {
                OracleAnswer::Found(PatternProposal {
                    sources,
                    confidence: patterns.confidence,
                })
            }
        }
        DetectionSource::Heuristic | DetectionSource::Local => OracleAnswer::Unavailable(None),
    };

    let decision = resolve_patterns(text, section, answer, ctx.config);
    if decision.patterns.is_empty() {
        return Execution::skipped(text, decision.note)
            .with_source(decision.source)
            .with_rejection(decision.rejection)
            .with_warnings(warnings);
    }

    let removal = match scope(section) {
        PatternScope::Lines => remove_matching_lines(text, &decision.patterns),
        PatternScope::Inline => remove_inline_matches(text, &decision.patterns),
    };
    tracing::info!(
        section = %section,
        removed = removal.removed,
        source = %decision.source,
        "removed recurring elements"
    );
    Execution::changed(text, removal.text, removal.removed)
        .with_source(decision.source)
        .with_confidence(decision.confidence)
        .with_rejection(decision.rejection)
        .with_warnings(warnings)
}

/// Word count of prose, ignoring placeholders.
fn prose_words(text: &str) -> usize {
    word_count(&RE_PLACEHOLDER.replace_all(text, " "))
}

fn reflow(text: &str, ctx: &mut StepContext<'_>) -> Result<Execution> {
    let joined = join_hyphenated(text);
    let mut kinds = vec![ProtectKind::Table, ProtectKind::CodeBlock, ProtectKind::Math];
    if ctx.config.protect_citations {
        kinds.push(ProtectKind::Citation);
    }
    let protected = protect(&joined, &kinds);
    let chunks = chunk_paragraphs(protected.text(), ctx.config.max_chunk_chars);

    let mut out = Vec::with_capacity(chunks.len());
    let mut warnings = Vec::new();
    let mut sent = 0;
    let mut rejected = 0;
    let mut rewritten = 0;

    for (index, chunk) in chunks.iter().enumerate() {
        let before = prose_words(chunk);
        if before == 0 {
            out.push(protected.restore_chunk(chunk, chunk).into_text());
            continue;
        }

        sent += 1;
        let reply = ctx.oracle.reflow_chunk(chunk).map_err(Error::Oracle)?;
        let after = prose_words(&reply);
        let drift = (after as f64 - before as f64).abs() / before as f64;

        let accepted = if drift > MAX_REFLOW_DRIFT {
            tracing::warn!(chunk = index, before, after, "reflowed chunk rejected");
            warnings.push(format!(
                "chunk {} kept as is: reflow changed its word count from {} to {}",
                index + 1,
                before,
                after
            ));
            rejected += 1;
            chunk.as_str()
        } else {
            reply.as_str()
        };
        if accepted != chunk.as_str() {
            rewritten += 1;
        }

        let restoration = protected.restore_chunk(chunk, accepted);
        warnings.extend(restoration.warnings().iter().map(ToString::to_string));
        out.push(restoration.into_text());
    }

    let reflowed = out.join("\n\n");
    let confidence = if sent == 0 {
        1.0
    } else {
        (sent - rejected) as f64 / sent as f64
    };
    tracing::debug!(chunks = chunks.len(), sent, rejected, "reflowed paragraphs");

    // Rewriting nothing must leave the document byte-identical
    let reflowed = if rewritten == 0 && joined == text {
        text.to_string()
    } else {
        reflowed
    };

    Ok(Execution::changed(text, reflowed, rewritten)
        .with_source(DetectionSource::Oracle)
        .with_confidence(confidence)
        .with_warnings(warnings))
}

fn optimize(text: &str, ctx: &StepContext<'_>) -> Execution {
    let protected = protect(
        text,
        &[ProtectKind::Table, ProtectKind::CodeBlock, ProtectKind::Math],
    );
    let edit = optimize_paragraphs(protected.text(), ctx.config.paragraph_length);
    if edit.changes() == 0 {
        return Execution::changed(text, text.to_string(), 0);
    }

    let restoration = protected.restore(&edit.text);
    let warnings = restoration
        .warnings()
        .iter()
        .map(ToString::to_string)
        .collect();
    Execution::changed(text, restoration.into_text(), edit.changes()).with_warnings(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::BoundaryCandidate;
    use crate::error::OracleError;
    use std::time::Duration;

    struct Echo;

    impl BoundaryOracle for Echo {
        fn detect_boundary(
            &self,
            _text: &str,
            _section: SectionType,
        ) -> std::result::Result<Option<BoundaryCandidate>, OracleError> {
            Ok(None)
        }

        fn detect_patterns(&self, _text: &str) -> std::result::Result<DetectedPatterns, OracleError> {
            Err(OracleError::Timeout)
        }

        fn reflow_chunk(&self, text: &str) -> std::result::Result<String, OracleError> {
            Ok(text.replace("\nwas", " was"))
        }
    }

    struct Shrinking;

    impl BoundaryOracle for Shrinking {
        fn detect_boundary(
            &self,
            _text: &str,
            _section: SectionType,
        ) -> std::result::Result<Option<BoundaryCandidate>, OracleError> {
            Ok(None)
        }

        fn detect_patterns(&self, _text: &str) -> std::result::Result<DetectedPatterns, OracleError> {
            Err(OracleError::Timeout)
        }

        fn reflow_chunk(&self, _text: &str) -> std::result::Result<String, OracleError> {
            Ok("Summary.".to_string())
        }
    }

    fn run_step(step: Step, text: &str, oracle: &dyn BoundaryOracle) -> Result<Execution> {
        let config = PipelineConfig::default();
        let mut cache = PatternCache::new(Duration::from_secs(60));
        let key = CacheKey::new("test", text);
        let mut ctx = StepContext {
            oracle,
            config: &config,
            cache: &mut cache,
            cache_key: &key,
        };
        execute(step, text, &mut ctx)
    }

    #[test]
    fn test_reflow_keeps_tables() {
        let text = "The senate\nwas divided.\n\n| a | b |\n|---|---|\n| 1 | 2 |\n\nThe end.";
        let result = run_step(Step::ReflowParagraphs, text, &Echo).unwrap();
        assert_eq!(result.outcome, StepOutcome::Applied);
        assert!(result.text.starts_with("The senate was divided."));
        assert!(result.text.contains("| 1 | 2 |"));
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_reflow_guard_keeps_original_chunk() {
        let text = "One two three four five six seven eight nine ten eleven twelve.";
        let result = run_step(Step::ReflowParagraphs, text, &Shrinking).unwrap();
        assert_eq!(result.text, text);
        assert_eq!(result.outcome, StepOutcome::Unchanged);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_reflow_failure_is_an_error() {
        let result = run_step(
            Step::ReflowParagraphs,
            "Some prose.",
            &crate::oracle::OfflineOracle,
        );
        assert!(matches!(result, Err(Error::Oracle(OracleError::Unavailable(_)))));
    }

    #[test]
    fn test_analysis_falls_back_to_local() {
        let result = run_step(Step::AnalyzeStructure, "Some prose.", &Echo).unwrap();
        assert_eq!(result.source, Some(DetectionSource::Local));
        assert_eq!(result.outcome, StepOutcome::Unchanged);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_absent_boundary_is_skipped() {
        let text = (0..100)
            .map(|i| format!("Line {} of the story.", i))
            .collect::<Vec<_>>()
            .join("\n");
        let result = run_step(Step::RemoveBackMatter, &text, &Echo).unwrap();
        assert!(matches!(result.outcome, StepOutcome::Skipped { .. }));
        assert_eq!(result.text, text);
    }

    #[test]
    fn test_prose_words_ignore_placeholders() {
        assert_eq!(prose_words("⟦KEEP·TABLE·abcd1234·0⟧"), 0);
        assert_eq!(prose_words("two words ⟦KEEP·CODE·abcd1234·1⟧"), 2);
    }
}
