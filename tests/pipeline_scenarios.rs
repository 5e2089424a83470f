//! End-to-end pipeline scenarios driven by a scripted oracle.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use unscaffold::transform::protect::{protect, ProtectKind};
use unscaffold::{
    BoundaryCandidate, BoundaryOracle, CancellationToken, DetectedPatterns, DetectionSource,
    OracleError, Pipeline, PipelineConfig, ProgressObserver, RejectionReason, SectionType, Step,
    StepOutcome, StepResult,
};

/// Answers from a fixed script and counts calls.
#[derive(Default)]
struct ScriptedOracle {
    boundaries: HashMap<SectionType, Result<Option<BoundaryCandidate>, OracleError>>,
    patterns: Option<DetectedPatterns>,
    calls: AtomicUsize,
    cost_per_call: f64,
}

impl ScriptedOracle {
    fn with_boundary(mut self, section: SectionType, start: usize, end: usize, confidence: f64) -> Self {
        self.boundaries.insert(
            section,
            Ok(Some(BoundaryCandidate::new(start, end, confidence))),
        );
        self
    }

    fn failing(mut self, section: SectionType, error: OracleError) -> Self {
        self.boundaries.insert(section, Err(error));
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BoundaryOracle for ScriptedOracle {
    fn detect_boundary(
        &self,
        _text: &str,
        section: SectionType,
    ) -> Result<Option<BoundaryCandidate>, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.boundaries.get(&section).cloned().unwrap_or(Ok(None))
    }

    fn detect_patterns(&self, _text: &str) -> Result<DetectedPatterns, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.patterns
            .clone()
            .ok_or_else(|| OracleError::MalformedReply("no analysis scripted".into()))
    }

    fn reflow_chunk(&self, text: &str) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(text.replace("-\n", "").replace('\n', " "))
    }

    fn cost_so_far(&self) -> f64 {
        self.calls() as f64 * self.cost_per_call
    }
}

fn narrative(total: usize, inserts: &[(usize, &str)]) -> String {
    (0..total)
        .map(|i| {
            inserts
                .iter()
                .find(|(line, _)| *line == i)
                .map(|(_, text)| text.to_string())
                .unwrap_or_else(|| format!("Narrative line {} moves the story forward.", i))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Only the mandatory steps plus `step`.
fn only(step: Step) -> PipelineConfig {
    let mut config = PipelineConfig::minimal()
        .with_step(Step::RemovePageNumbers, false)
        .unwrap();
    config.set_step(step, true).unwrap();
    config
}

fn no_wait(_: std::time::Duration) {}

#[test]
fn early_back_matter_is_rejected_and_nothing_is_removed() {
    let text = narrative(500, &[]);
    let oracle = ScriptedOracle::default().with_boundary(SectionType::BackMatter, 4, 414, 0.95);
    let mut pipeline = Pipeline::new(oracle);

    let cleaned = pipeline.run(&text, &only(Step::RemoveBackMatter)).unwrap();
    let step = cleaned.step(Step::RemoveBackMatter).unwrap();

    assert!(step.is_skipped());
    assert_eq!(step.rejection, Some(RejectionReason::PositionTooEarly));
    assert_eq!(step.text, text);
    assert_eq!(cleaned.text(), text);
}

#[test]
fn verified_bibliography_is_removed() {
    let text = narrative(500, &[(300, "BIBLIOGRAPHY")]);
    let oracle = ScriptedOracle::default().with_boundary(SectionType::BackMatter, 300, 400, 0.8);
    let mut pipeline = Pipeline::new(oracle);

    let cleaned = pipeline.run(&text, &only(Step::RemoveBackMatter)).unwrap();
    let step = cleaned.step(Step::RemoveBackMatter).unwrap();

    assert_eq!(step.outcome, StepOutcome::Applied);
    assert_eq!(step.change_count, 100);
    assert_eq!(step.source, Some(DetectionSource::Oracle));
    assert!(step.rejection.is_none());
    assert!(!cleaned.text().contains("BIBLIOGRAPHY"));
    assert!(cleaned.text().contains("Narrative line 299 "));
    assert!(cleaned.text().contains("Narrative line 400 "));
    assert_eq!(cleaned.text().lines().count(), 400);
}

#[test]
fn oracle_outage_falls_back_to_the_index_heuristic() {
    let mut inserts: Vec<(usize, String)> = vec![(470, "INDEX".to_string())];
    for i in 471..500 {
        inserts.push((i, format!("Entry {}, {}, {}", i, i - 300, i - 200)));
    }
    let inserts: Vec<(usize, &str)> = inserts.iter().map(|(i, s)| (*i, s.as_str())).collect();
    let text = narrative(500, &inserts);

    let oracle = ScriptedOracle::default().failing(SectionType::Index, OracleError::Timeout);
    let config = only(Step::RemoveIndex).with_retry(unscaffold::RetrySettings::immediate(3));
    let mut pipeline = Pipeline::new(oracle).with_sleeper(no_wait);

    let cleaned = pipeline.run(&text, &config).unwrap();
    let step = cleaned.step(Step::RemoveIndex).unwrap();

    assert_eq!(step.outcome, StepOutcome::Applied);
    assert_eq!(step.source, Some(DetectionSource::Heuristic));
    assert!(!cleaned.text().contains("INDEX"));
    assert!(cleaned.text().contains("Narrative line 469 "));
    // One pattern analysis plus three boundary attempts
    assert_eq!(pipeline.oracle().calls(), 4);
}

#[test]
fn misplaced_contents_span_falls_back_to_the_real_listing() {
    let text = narrative(
        500,
        &[
            (10, "CONTENTS"),
            (11, "Introduction ........ 1"),
            (12, "Chapter 1 The Early Republic .... 9"),
            (13, "Chapter 2 The Punic Wars .... 45"),
            (14, "Chapter 3 The Gracchi .... 88"),
        ],
    );
    let oracle =
        ScriptedOracle::default().with_boundary(SectionType::TableOfContents, 300, 400, 0.9);
    let mut pipeline = Pipeline::new(oracle);

    let cleaned = pipeline
        .run_document(
            "book",
            &text,
            &only(Step::RemoveTableOfContents),
            &mut unscaffold::NoopObserver,
            &CancellationToken::new(),
        )
        .unwrap();
    let step = cleaned.step(Step::RemoveTableOfContents).unwrap();

    assert_eq!(step.outcome, StepOutcome::Applied);
    assert_eq!(step.source, Some(DetectionSource::Heuristic));
    assert_eq!(step.rejection, Some(RejectionReason::PositionTooLate));
    assert_eq!(step.change_count, 5);
    assert!(!cleaned.text().contains("CONTENTS"));
    assert!(!cleaned.text().contains("The Punic Wars"));
    assert!(cleaned.text().contains("Narrative line 9 "));
    assert!(cleaned.text().contains("Narrative line 350 "));
}

#[test]
fn oracle_reporting_no_section_is_trusted() {
    let text = narrative(200, &[(150, "BIBLIOGRAPHY")]);
    let oracle = ScriptedOracle {
        patterns: Some(DetectedPatterns {
            has_back_matter: false,
            confidence: 0.9,
            source: DetectionSource::Oracle,
            ..DetectedPatterns::default()
        }),
        ..ScriptedOracle::default()
    };
    let mut pipeline = Pipeline::new(oracle);

    let cleaned = pipeline.run(&text, &only(Step::RemoveBackMatter)).unwrap();
    let step = cleaned.step(Step::RemoveBackMatter).unwrap();

    assert!(step.is_skipped());
    assert_eq!(step.source, Some(DetectionSource::Oracle));
    assert!(cleaned.text().contains("BIBLIOGRAPHY"));
}

struct CancelAfter {
    limit: usize,
    seen: usize,
    token: CancellationToken,
}

impl ProgressObserver for CancelAfter {
    fn on_step_complete(&mut self, _step: Step, _result: &StepResult) {
        self.seen += 1;
        if self.seen == self.limit {
            self.token.cancel();
        }
    }
}

#[test]
fn cancellation_after_five_steps() {
    let text = narrative(50, &[]);
    let token = CancellationToken::new();
    let mut observer = CancelAfter {
        limit: 5,
        seen: 0,
        token: token.clone(),
    };
    let mut pipeline = Pipeline::new(ScriptedOracle::default());

    let cleaned = pipeline
        .run_document("doc", &text, &PipelineConfig::default(), &mut observer, &token)
        .unwrap();

    assert!(cleaned.is_cancelled());
    assert_eq!(cleaned.steps.len(), 5);
    assert_eq!(cleaned.text(), cleaned.steps[4].text);
}

#[test]
fn steps_chain_and_costs_add_up() {
    let text = narrative(120, &[(40, "- 41 -"), (80, "81")]);
    let oracle = ScriptedOracle {
        cost_per_call: 0.01,
        ..ScriptedOracle::default()
    };
    let mut pipeline = Pipeline::new(oracle);

    let cleaned = pipeline.run(&text, &PipelineConfig::default()).unwrap();

    let ordinals: Vec<usize> = cleaned.steps.iter().map(|r| r.step.ordinal()).collect();
    assert!(ordinals.windows(2).all(|pair| pair[0] < pair[1]));
    for pair in cleaned.steps.windows(2) {
        assert_eq!(pair[0].words_after, pair[1].words_before);
    }

    let summed: f64 = cleaned.steps.iter().map(|r| r.cost).sum();
    assert!((cleaned.total_cost - summed).abs() < 1e-9);
    assert!(cleaned.total_cost > 0.0);
    assert!((0.0..=1.0).contains(&cleaned.confidence));
    assert!(!cleaned.text().contains("- 41 -"));
}

#[test]
fn report_round_trips_through_json() {
    let text = narrative(500, &[(300, "BIBLIOGRAPHY")]);
    let oracle = ScriptedOracle::default().with_boundary(SectionType::BackMatter, 300, 400, 0.9);
    let mut pipeline = Pipeline::new(oracle);
    let cleaned = pipeline.run(&text, &only(Step::RemoveBackMatter)).unwrap();

    let report = cleaned.report();
    let json = report.to_json().unwrap();
    let parsed = unscaffold::ProcessingReport::from_json(&json).unwrap();
    assert_eq!(parsed, report);
    assert!(parsed.reduction_percent > 15.0);
}

#[test]
fn protected_blocks_survive_randomized_round_trips() {
    let mut rng = StdRng::seed_from_u64(7);
    let blocks = [
        "| a | b |\n|---|---|\n| 1 | 2 |",
        "```rust\nfn main() {}\n```",
        "$$\nE = mc^2\n$$",
        "Plain prose with a citation [12] inside.",
    ];

    for _ in 0..50 {
        let count = rng.gen_range(1..8);
        let text = (0..count)
            .map(|_| blocks[rng.gen_range(0..blocks.len())])
            .collect::<Vec<_>>()
            .join("\n\n");

        let protected = protect(
            &text,
            &[
                ProtectKind::Table,
                ProtectKind::CodeBlock,
                ProtectKind::Math,
                ProtectKind::Citation,
            ],
        );
        let restored = protected.restore(protected.text());
        assert!(restored.is_complete());
        assert_eq!(restored.text(), text);
    }
}

#[test]
fn config_file_overrides_a_subset() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{ "remove_citations": false, "paragraph_length": {{ "min_words": 40, "max_words": 200 }} }}"#
    )
    .unwrap();

    let config = PipelineConfig::from_file(file.path()).unwrap();
    assert!(!config.is_enabled(Step::RemoveCitations));
    assert!(config.is_enabled(Step::RemoveBackMatter));
    assert_eq!(config.paragraph_length.min_words, 40);
    assert_eq!(config.max_chunk_chars, PipelineConfig::default().max_chunk_chars);
    assert!(config.validate().is_ok());
}
