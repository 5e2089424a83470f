//! Pipeline steps and their method kinds.
//!
//! The step list is closed and totally ordered: [`Step::ALL`] is the canonical order and
//! every dispatch site matches exhaustively, so adding a step forces each site to be
//! revisited.

use crate::section::SectionType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a step gets its work done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MethodKind {
    /// The oracle answers; nothing is removed locally.
    OracleOnly,
    /// The oracle detects a boundary or pattern set, local code removes it.
    Hybrid,
    /// The oracle rewrites the text chunk by chunk.
    OracleChunked,
    /// Pure local transform.
    LocalOnly,
}

impl MethodKind {
    /// Weight of a step of this kind in the run's overall confidence.
    pub fn confidence_weight(self) -> f64 {
        match self {
            MethodKind::LocalOnly => 0.5,
            MethodKind::OracleOnly => 1.0,
            MethodKind::OracleChunked => 1.0,
            MethodKind::Hybrid => 1.5,
        }
    }

    /// Returns true if the step talks to the oracle.
    pub fn uses_oracle(self) -> bool {
        !matches!(self, MethodKind::LocalOnly)
    }
}

/// One pipeline operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    AnalyzeStructure,
    NormalizeCharacters,
    RemovePageNumbers,
    RemoveHeadersFooters,
    RemoveFrontMatter,
    RemoveTableOfContents,
    RemoveAuxiliaryLists,
    RemoveFootnotes,
    RemoveCitations,
    RemoveIndex,
    RemoveBackMatter,
    ReflowParagraphs,
    OptimizeParagraphs,
    AddChapterMarkers,
    FinalCleanup,
}

impl Step {
    /// All steps in canonical order.
    pub const ALL: [Step; 15] = [
        Step::AnalyzeStructure,
        Step::NormalizeCharacters,
        Step::RemovePageNumbers,
        Step::RemoveHeadersFooters,
        Step::RemoveFrontMatter,
        Step::RemoveTableOfContents,
        Step::RemoveAuxiliaryLists,
        Step::RemoveFootnotes,
        Step::RemoveCitations,
        Step::RemoveIndex,
        Step::RemoveBackMatter,
        Step::ReflowParagraphs,
        Step::OptimizeParagraphs,
        Step::AddChapterMarkers,
        Step::FinalCleanup,
    ];

    /// 1-based position in the canonical order.
    pub fn ordinal(self) -> usize {
        Step::ALL
            .iter()
            .position(|s| *s == self)
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Step::AnalyzeStructure => "Analyze document structure",
            Step::NormalizeCharacters => "Normalize characters",
            Step::RemovePageNumbers => "Remove page numbers",
            Step::RemoveHeadersFooters => "Remove headers and footers",
            Step::RemoveFrontMatter => "Remove front matter",
            Step::RemoveTableOfContents => "Remove table of contents",
            Step::RemoveAuxiliaryLists => "Remove lists of figures/tables/abbreviations",
            Step::RemoveFootnotes => "Remove footnotes",
            Step::RemoveCitations => "Remove citations",
            Step::RemoveIndex => "Remove index",
            Step::RemoveBackMatter => "Remove back matter",
            Step::ReflowParagraphs => "Reflow paragraphs",
            Step::OptimizeParagraphs => "Optimize paragraph length",
            Step::AddChapterMarkers => "Add chapter markers",
            Step::FinalCleanup => "Final cleanup",
        }
    }

    /// Stable kebab-case identifier (as used in config files and on the command line).
    pub fn id(self) -> &'static str {
        match self {
            Step::AnalyzeStructure => "analyze-structure",
            Step::NormalizeCharacters => "normalize-characters",
            Step::RemovePageNumbers => "remove-page-numbers",
            Step::RemoveHeadersFooters => "remove-headers-footers",
            Step::RemoveFrontMatter => "remove-front-matter",
            Step::RemoveTableOfContents => "remove-table-of-contents",
            Step::RemoveAuxiliaryLists => "remove-auxiliary-lists",
            Step::RemoveFootnotes => "remove-footnotes",
            Step::RemoveCitations => "remove-citations",
            Step::RemoveIndex => "remove-index",
            Step::RemoveBackMatter => "remove-back-matter",
            Step::ReflowParagraphs => "reflow-paragraphs",
            Step::OptimizeParagraphs => "optimize-paragraphs",
            Step::AddChapterMarkers => "add-chapter-markers",
            Step::FinalCleanup => "final-cleanup",
        }
    }

    /// Declared method kind.
    pub fn method(self) -> MethodKind {
        match self {
            Step::AnalyzeStructure => MethodKind::OracleOnly,
            Step::NormalizeCharacters
            | Step::RemovePageNumbers
            | Step::OptimizeParagraphs
            | Step::AddChapterMarkers
            | Step::FinalCleanup => MethodKind::LocalOnly,
            Step::RemoveHeadersFooters
            | Step::RemoveFrontMatter
            | Step::RemoveTableOfContents
            | Step::RemoveAuxiliaryLists
            | Step::RemoveFootnotes
            | Step::RemoveCitations
            | Step::RemoveIndex
            | Step::RemoveBackMatter => MethodKind::Hybrid,
            Step::ReflowParagraphs => MethodKind::OracleChunked,
        }
    }

    /// Section a hybrid step removes.
    pub fn section(self) -> Option<SectionType> {
        match self {
            Step::RemoveHeadersFooters => Some(SectionType::RunningElements),
            Step::RemoveFrontMatter => Some(SectionType::FrontMatter),
            Step::RemoveTableOfContents => Some(SectionType::TableOfContents),
            Step::RemoveAuxiliaryLists => Some(SectionType::AuxiliaryLists),
            Step::RemoveFootnotes => Some(SectionType::Footnotes),
            Step::RemoveCitations => Some(SectionType::Citations),
            Step::RemoveIndex => Some(SectionType::Index),
            Step::RemoveBackMatter => Some(SectionType::BackMatter),
            Step::AnalyzeStructure
            | Step::NormalizeCharacters
            | Step::RemovePageNumbers
            | Step::ReflowParagraphs
            | Step::OptimizeParagraphs
            | Step::AddChapterMarkers
            | Step::FinalCleanup => None,
        }
    }

    /// Mandatory steps cannot be disabled.
    pub fn is_mandatory(self) -> bool {
        matches!(self, Step::NormalizeCharacters | Step::FinalCleanup)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Step {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Step::ALL
            .iter()
            .copied()
            .find(|step| step.id() == wanted)
            .ok_or_else(|| crate::Error::Config(format!("unknown step '{}'", s)))
    }
}
