//! The external boundary oracle.
//!
//! The oracle is untrusted: every boundary or pattern it reports goes through the
//! defense chain in [`crate::defense`] before it can remove anything, and every failure
//! is a typed [`OracleError`].

pub mod prompt;
pub mod prompted;
pub mod reply;
pub mod retry;

pub use prompted::{
    Completion, CompletionBackend, CompletionRequest, Pricing, PromptedOracle, Usage,
};
pub use retry::{RetryPolicy, Retrying, Sleeper};

use crate::boundary::BoundaryCandidate;
use crate::error::OracleError;
use crate::patterns::DetectedPatterns;
use crate::section::SectionType;
use std::sync::Arc;

/// Detects structural sections and rewrites prose on request.
pub trait BoundaryOracle: Send + Sync {
    /// Locates `section` in `text`. `Ok(None)` means the oracle found no such section.
    fn detect_boundary(
        &self,
        text: &str,
        section: SectionType,
    ) -> Result<Option<BoundaryCandidate>, OracleError>;

    /// Analyzes a sample of the document for recurring patterns.
    fn detect_patterns(&self, text: &str) -> Result<DetectedPatterns, OracleError>;

    /// Reflows one chunk of prose. Placeholders must be passed through untouched.
    fn reflow_chunk(&self, text: &str) -> Result<String, OracleError>;

    /// Total cost of every call made so far.
    fn cost_so_far(&self) -> f64 {
        0.0
    }
}

impl<T: BoundaryOracle + ?Sized> BoundaryOracle for &T {
    fn detect_boundary(
        &self,
        text: &str,
        section: SectionType,
    ) -> Result<Option<BoundaryCandidate>, OracleError> {
        (**self).detect_boundary(text, section)
    }

    fn detect_patterns(&self, text: &str) -> Result<DetectedPatterns, OracleError> {
        (**self).detect_patterns(text)
    }

    fn reflow_chunk(&self, text: &str) -> Result<String, OracleError> {
        (**self).reflow_chunk(text)
    }

    fn cost_so_far(&self) -> f64 {
        (**self).cost_so_far()
    }
}

impl<T: BoundaryOracle + ?Sized> BoundaryOracle for Box<T> {
    fn detect_boundary(
        &self,
        text: &str,
        section: SectionType,
    ) -> Result<Option<BoundaryCandidate>, OracleError> {
        (**self).detect_boundary(text, section)
    }

    fn detect_patterns(&self, text: &str) -> Result<DetectedPatterns, OracleError> {
        (**self).detect_patterns(text)
    }

    fn reflow_chunk(&self, text: &str) -> Result<String, OracleError> {
        (**self).reflow_chunk(text)
    }

    fn cost_so_far(&self) -> f64 {
        (**self).cost_so_far()
    }
}

impl<T: BoundaryOracle + ?Sized> BoundaryOracle for Arc<T> {
    fn detect_boundary(
        &self,
        text: &str,
        section: SectionType,
    ) -> Result<Option<BoundaryCandidate>, OracleError> {
        (**self).detect_boundary(text, section)
    }

    fn detect_patterns(&self, text: &str) -> Result<DetectedPatterns, OracleError> {
        (**self).detect_patterns(text)
    }

    fn reflow_chunk(&self, text: &str) -> Result<String, OracleError> {
        (**self).reflow_chunk(text)
    }

    fn cost_so_far(&self) -> f64 {
        (**self).cost_so_far()
    }
}

/// An oracle that is never available.
///
/// Boundary and pattern steps fall back to the heuristics; oracle-chunked steps fail,
/// so offline runs should disable reflow.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineOracle;

impl OfflineOracle {
    fn unavailable() -> OracleError {
        OracleError::Unavailable("running offline".into())
    }
}

impl BoundaryOracle for OfflineOracle {
    fn detect_boundary(
        &self,
        _text: &str,
        _section: SectionType,
    ) -> Result<Option<BoundaryCandidate>, OracleError> {
        Err(Self::unavailable())
    }

    fn detect_patterns(&self, _text: &str) -> Result<DetectedPatterns, OracleError> {
        Err(Self::unavailable())
    }

    fn reflow_chunk(&self, _text: &str) -> Result<String, OracleError> {
        Err(Self::unavailable())
    }
}
