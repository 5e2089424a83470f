//! Serializable processing report for a cleaned document.

use crate::boundary::RejectionReason;
use crate::error::Result;
use crate::patterns::DetectionSource;
use crate::pipeline::{CleanedContent, StepResult};
use crate::step::Step;
use crate::transform::lines::word_count;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// One step as it appears in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: Step,
    pub label: String,
    /// `applied`, `unchanged` or `skipped`.
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub change_count: usize,
    pub words_before: usize,
    pub words_after: usize,
    pub confidence: f64,
    pub cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<DetectionSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<RejectionReason>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub duration_ms: u64,
}

impl From<&StepResult> for StepReport {
    fn from(result: &StepResult) -> Self {
        let reason = match &result.outcome {
            crate::pipeline::StepOutcome::Skipped { reason } => Some(reason.clone()),
            _ => None,
        };
        Self {
            step: result.step,
            label: result.step.label().to_string(),
            outcome: result.outcome.as_str().to_string(),
            reason,
            change_count: result.change_count,
            words_before: result.words_before,
            words_after: result.words_after,
            confidence: result.confidence,
            cost: result.cost,
            source: result.source,
            rejection: result.rejection,
            warnings: result.warnings.clone(),
            duration_ms: u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Summary of one run, handed to whatever stores or exports the cleaned text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingReport {
    pub document_id: String,
    /// `completed` or `cancelled`.
    pub status: String,
    pub steps: Vec<StepReport>,
    pub words_before: usize,
    pub words_after: usize,
    pub reduction_percent: f64,
    pub confidence: f64,
    pub total_cost: f64,
}

impl ProcessingReport {
    pub fn from_content(content: &CleanedContent) -> Self {
        Self {
            document_id: content.document_id.clone(),
            status: content.status.as_str().to_string(),
            steps: content.steps.iter().map(StepReport::from).collect(),
            words_before: content.original_words,
            words_after: word_count(&content.text),
            reduction_percent: content.reduction_percent(),
            confidence: content.confidence,
            total_cost: content.total_cost,
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Steps whose oracle answer was refused by the defense chain.
    pub fn rejections(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|step| step.rejection.is_some())
    }

    /// Plain-text table for terminals.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for step in &self.steps {
            let _ = write!(
                out,
                "{:<48} {:<9} {:>6} changes  conf {:.2}",
                step.label, step.outcome, step.change_count, step.confidence
            );
            if let Some(source) = step.source {
                let _ = write!(out, "  [{}]", source);
            }
            if let Some(rejection) = step.rejection {
                let _ = write!(out, "  rejected: {}", rejection);
            }
            out.push('\n');
        }
        let _ = writeln!(
            out,
            "{}: {} -> {} words ({:.1}% removed), confidence {:.2}, cost {:.4}",
            self.status,
            self.words_before,
            self.words_after,
            self.reduction_percent,
            self.confidence,
            self.total_cost
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineRun, RunStatus, StepOutcome};
    use std::time::Duration;

    fn content() -> CleanedContent {
        let mut run = PipelineRun::new("book-1", "alpha beta gamma delta");
        run.record(StepResult {
            step: Step::RemoveBackMatter,
            outcome: StepOutcome::Applied,
            text: "alpha beta gamma".into(),
            words_before: 4,
            words_after: 3,
            change_count: 1,
            confidence: 0.75,
            cost: 0.002,
            source: Some(DetectionSource::Heuristic),
            rejection: Some(RejectionReason::MissingExpectedPattern),
            warnings: Vec::new(),
            duration: Duration::from_millis(12),
        });
        run.record(StepResult {
            step: Step::RemoveIndex,
            outcome: StepOutcome::Skipped {
                reason: "no index found".into(),
            },
            text: "alpha beta gamma".into(),
            words_before: 3,
            words_after: 3,
            change_count: 0,
            confidence: 0.0,
            cost: 0.0,
            source: Some(DetectionSource::Oracle),
            rejection: None,
            warnings: Vec::new(),
            duration: Duration::from_millis(3),
        });
        run.finish(RunStatus::Completed)
    }

    #[test]
    fn test_report_fields() {
        let report = content().report();
        assert_eq!(report.status, "completed");
        assert_eq!(report.words_before, 4);
        assert_eq!(report.words_after, 3);
        assert!((report.reduction_percent - 25.0).abs() < 1e-9);
        assert_eq!(report.steps[1].reason.as_deref(), Some("no index found"));
        assert_eq!(report.rejections().count(), 1);
    }

    #[test]
    fn test_json_uses_kebab_case() {
        let json = content().report().to_json().unwrap();
        assert!(json.contains("\"remove-back-matter\""));
        assert!(json.contains("\"missing-expected-pattern\""));
        assert!(json.contains("\"heuristic\""));

        let parsed = ProcessingReport::from_json(&json).unwrap();
        assert_eq!(parsed.steps.len(), 2);
    }

    #[test]
    fn test_summary_mentions_rejections() {
        let summary = content().report().summary();
        assert!(summary.contains("rejected: missing-expected-pattern"));
        assert!(summary.contains("25.0% removed"));
    }
}
