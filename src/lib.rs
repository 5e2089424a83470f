//! # unscaffold
//!
//! Strips OCR scaffolding (front matter, tables of contents, page furniture, footnotes,
//! citations, indexes, back matter) from document text and reflows what remains into
//! clean prose.
//!
//! Detection is delegated to an external oracle, usually a language model, which is
//! treated as untrusted: every boundary or pattern it reports passes a positional and
//! size validator and a content verifier before anything is removed, and a
//! conservative local heuristic takes over when the oracle is wrong or unreachable.
//!
//! ## Quick Start
//!
//! ```no_run
//! use unscaffold::{OfflineOracle, Pipeline, PipelineConfig};
//!
//! fn main() -> Result<(), unscaffold::PipelineError> {
//!     let text = std::fs::read_to_string("book.md").unwrap_or_default();
//!
//!     // Without an oracle, boundary steps fall back to the local heuristics
//!     let config = PipelineConfig::standard()
//!         .with_step(unscaffold::Step::ReflowParagraphs, false)
//!         .map_err(|e| unscaffold::PipelineError::InvalidConfig(e.to_string()))?;
//!     let mut pipeline = Pipeline::new(OfflineOracle);
//!     let cleaned = pipeline.run(&text, &config)?;
//!
//!     println!("{}", cleaned.text());
//!     println!("{}", cleaned.report().summary());
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `async`: non-blocking wrapper with Tokio

pub mod boundary;
pub mod cache;
pub mod config;
pub mod defense;
pub mod error;
pub mod oracle;
pub mod patterns;
pub mod pipeline;
pub mod report;
pub mod section;
pub mod step;
pub mod transform;

#[cfg(feature = "async")]
pub mod async_api;

// Re-exports
pub use boundary::{BoundaryCandidate, RejectionReason, ValidationVerdict};
pub use cache::{CacheKey, PatternCache};
pub use config::{MarkerStyle, ParagraphLength, PipelineConfig, Preset, RetrySettings};
pub use error::{Error, OracleError, PipelineError, Result};
pub use oracle::{BoundaryOracle, OfflineOracle, PromptedOracle};
pub use patterns::{ContentType, DetectedPatterns, DetectionSource};
pub use pipeline::{
    CancellationToken, CleanedContent, NoopObserver, Pipeline, ProgressObserver, RunStatus,
    StepOutcome, StepResult,
};
pub use report::ProcessingReport;
pub use section::SectionType;
pub use step::{MethodKind, Step};

/// Cleans `text` with the local steps only (no oracle).
///
/// Boundary and pattern removal are disabled; see [`PipelineConfig::local_only`].
///
/// # Example
///
/// ```
/// let cleaned = unscaffold::clean_locally("Chapter text.\n\n- 12 -\n\nMore text.").unwrap();
/// assert!(!cleaned.contains("- 12 -"));
/// ```
pub fn clean_locally(text: &str) -> std::result::Result<String, PipelineError> {
    let config = PipelineConfig::default().local_only();
    let mut pipeline = Pipeline::new(OfflineOracle);
    Ok(pipeline.run(text, &config)?.into_text())
}
