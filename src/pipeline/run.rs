//! Step results and the run that aggregates them.

use crate::boundary::RejectionReason;
use crate::error::{Error, PipelineError};
use crate::patterns::DetectionSource;
use crate::report::ProcessingReport;
use crate::step::Step;
use crate::transform::lines::word_count;
use std::fmt;
use std::time::Duration;

/// What a step did to the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The text changed.
    Applied,
    /// The step ran and found nothing to change.
    Unchanged,
    /// Nothing trustworthy was detected, so the step left the text alone.
    Skipped { reason: String },
}

impl StepOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepOutcome::Applied => "applied",
            StepOutcome::Unchanged => "unchanged",
            StepOutcome::Skipped { .. } => "skipped",
        }
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Skipped { reason } => write!(f, "skipped ({})", reason),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Record of one completed step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub step: Step,
    pub outcome: StepOutcome,
    /// Document text after the step.
    pub text: String,
    pub words_before: usize,
    pub words_after: usize,
    /// Lines, matches or chunks the step changed.
    pub change_count: usize,
    pub confidence: f64,
    /// Oracle cost incurred by this step.
    pub cost: f64,
    /// Where the applied detection came from, for steps that detect anything.
    pub source: Option<DetectionSource>,
    /// Why the oracle's answer was refused, if it was.
    pub rejection: Option<RejectionReason>,
    pub warnings: Vec<String>,
    pub duration: Duration,
}

impl StepResult {
    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, StepOutcome::Skipped { .. })
    }

    pub fn is_applied(&self) -> bool {
        self.outcome == StepOutcome::Applied
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    /// Stopped between steps by a cancellation request.
    Cancelled,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

/// Weighted mean of step confidences; skipped steps do not count.
pub fn overall_confidence(steps: &[StepResult]) -> f64 {
    let (weighted, weights) = steps
        .iter()
        .filter(|result| !result.is_skipped())
        .fold((0.0, 0.0), |(sum, total), result| {
            let weight = result.step.method().confidence_weight();
            (sum + result.confidence * weight, total + weight)
        });

    if weights == 0.0 {
        1.0
    } else {
        weighted / weights
    }
}

/// The state of one document's run while it is in progress.
///
/// Only the orchestrator appends to it; it is consumed into [`CleanedContent`] or a
/// [`PipelineError`].
#[derive(Debug)]
pub struct PipelineRun {
    document_id: String,
    original_words: usize,
    original_chars: usize,
    text: String,
    steps: Vec<StepResult>,
}

impl PipelineRun {
    pub fn new(document_id: impl Into<String>, text: &str) -> Self {
        Self {
            document_id: document_id.into(),
            original_words: word_count(text),
            original_chars: text.chars().count(),
            text: text.to_string(),
            steps: Vec::new(),
        }
    }

    /// Current document text.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn steps(&self) -> &[StepResult] {
        &self.steps
    }

    /// Appends a completed step and adopts its text.
    pub fn record(&mut self, result: StepResult) {
        self.text.clone_from(&result.text);
        self.steps.push(result);
    }

    /// Finalizes the run.
    pub fn finish(self, status: RunStatus) -> CleanedContent {
        let confidence = overall_confidence(&self.steps);
        let total_cost = self.steps.iter().map(|s| s.cost).sum();
        CleanedContent {
            document_id: self.document_id,
            text: self.text,
            status,
            steps: self.steps,
            confidence,
            total_cost,
            original_words: self.original_words,
            original_chars: self.original_chars,
        }
    }

    /// Turns a step failure into a pipeline error that keeps the completed steps.
    pub fn fail(self, step: Step, source: Error) -> PipelineError {
        PipelineError::StepFailed {
            step,
            source,
            completed: self.steps,
            text: self.text,
        }
    }
}

/// The final product of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedContent {
    pub document_id: String,
    pub text: String,
    pub status: RunStatus,
    pub steps: Vec<StepResult>,
    pub confidence: f64,
    pub total_cost: f64,
    pub original_words: usize,
    pub original_chars: usize,
}

impl CleanedContent {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == RunStatus::Cancelled
    }

    /// Result of `step`, if it ran.
    pub fn step(&self, step: Step) -> Option<&StepResult> {
        self.steps.iter().find(|result| result.step == step)
    }

    /// Share of words removed, in percent.
    pub fn reduction_percent(&self) -> f64 {
        if self.original_words == 0 {
            return 0.0;
        }
        let remaining = word_count(&self.text);
        (1.0 - remaining as f64 / self.original_words as f64) * 100.0
    }

    /// Builds the processing report.
    pub fn report(&self) -> ProcessingReport {
        ProcessingReport::from_content(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(step: Step, outcome: StepOutcome, confidence: f64) -> StepResult {
        StepResult {
            step,
            outcome,
            text: String::new(),
            words_before: 0,
            words_after: 0,
            change_count: 0,
            confidence,
            cost: 0.0,
            source: None,
            rejection: None,
            warnings: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn test_overall_confidence_is_weighted() {
        let steps = vec![
            result(Step::NormalizeCharacters, StepOutcome::Applied, 1.0),
            result(Step::RemoveBackMatter, StepOutcome::Applied, 0.5),
        ];
        // (1.0 * 0.5 + 0.5 * 1.5) / 2.0
        assert!((overall_confidence(&steps) - 0.625).abs() < 1e-12);
    }

    #[test]
    fn test_skipped_steps_do_not_count() {
        let steps = vec![result(
            Step::RemoveIndex,
            StepOutcome::Skipped {
                reason: "no index".into(),
            },
            0.0,
        )];
        assert_eq!(overall_confidence(&steps), 1.0);
        assert_eq!(overall_confidence(&[]), 1.0);
    }

    #[test]
    fn test_failed_run_keeps_completed_steps() {
        let mut run = PipelineRun::new("doc", "some text");
        let mut first = result(Step::NormalizeCharacters, StepOutcome::Unchanged, 1.0);
        first.text = "some text".into();
        run.record(first);

        let err = run.fail(
            Step::ReflowParagraphs,
            Error::Oracle(crate::error::OracleError::Timeout),
        );
        assert_eq!(err.completed().len(), 1);
        assert_eq!(err.failed_step(), Some(Step::ReflowParagraphs));
    }

    #[test]
    fn test_reduction() {
        let mut run = PipelineRun::new("doc", "one two three four");
        let mut step = result(Step::RemovePageNumbers, StepOutcome::Applied, 1.0);
        step.text = "one two".into();
        run.record(step);
        let content = run.finish(RunStatus::Completed);
        assert_eq!(content.reduction_percent(), 50.0);
        assert_eq!(content.text(), "one two");
    }
}
