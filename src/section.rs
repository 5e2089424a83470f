//! Structural section types and their safety-constraint profiles.
//!
//! Each section carries four numbers: where in the document it may sit, how much of the
//! document it may remove, how small it may be, and how confident a detection must be.
//! The bounds are deliberately asymmetric: leaving scaffolding in is recoverable,
//! removing content is not.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which structural section a detection targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SectionType {
    FrontMatter,
    TableOfContents,
    AuxiliaryLists,
    Index,
    BackMatter,
    Citations,
    Footnotes,
    /// Running headers, footers and other repeated page furniture.
    RunningElements,
}

/// Whether a section is located as a line range or as a set of recurring patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionKind {
    Boundary,
    Pattern,
}

/// Where a section may legally sit, as fractions of the document's line count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionBound {
    /// The section must end at or before this fraction of the document.
    EndWithinFirst(f64),
    /// The section must start at or after `1 - fraction` of the document.
    StartWithinLast(f64),
    /// No positional constraint.
    Anywhere,
}

/// Static safety constraints for one section type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstraintProfile {
    pub position: PositionBound,
    /// Largest share of the document one detection may remove (lines for boundaries and
    /// line patterns, characters for inline patterns).
    pub max_removal_fraction: f64,
    /// Smallest plausible section, in lines (boundaries) or matches (patterns).
    pub min_size: usize,
    /// Minimum confidence a detection must report.
    pub min_confidence: f64,
}

impl ConstraintProfile {
    /// First line index the section may start at, for `StartWithinLast` bounds.
    pub fn earliest_start(&self, total_lines: usize) -> usize {
        match self.position {
            PositionBound::StartWithinLast(fraction) => {
                (total_lines as f64 * (1.0 - fraction)).ceil() as usize
            }
            PositionBound::EndWithinFirst(_) | PositionBound::Anywhere => 0,
        }
    }

    /// Last line index (exclusive) the section may end at, for `EndWithinFirst` bounds.
    pub fn latest_end(&self, total_lines: usize) -> usize {
        match self.position {
            PositionBound::EndWithinFirst(fraction) => {
                (total_lines as f64 * fraction).floor() as usize
            }
            PositionBound::StartWithinLast(_) | PositionBound::Anywhere => total_lines,
        }
    }

    /// Largest number of lines one detection may remove.
    pub fn max_lines(&self, total_lines: usize) -> usize {
        (total_lines as f64 * self.max_removal_fraction).floor() as usize
    }
}

impl SectionType {
    /// All section types.
    pub const ALL: [SectionType; 8] = [
        SectionType::FrontMatter,
        SectionType::TableOfContents,
        SectionType::AuxiliaryLists,
        SectionType::Index,
        SectionType::BackMatter,
        SectionType::Citations,
        SectionType::Footnotes,
        SectionType::RunningElements,
    ];

    /// The constraint profile for this section.
    pub fn profile(self) -> ConstraintProfile {
        match self {
            SectionType::FrontMatter => ConstraintProfile {
                position: PositionBound::EndWithinFirst(0.40),
                max_removal_fraction: 0.40,
                min_size: 2,
                min_confidence: 0.60,
            },
            SectionType::TableOfContents => ConstraintProfile {
                position: PositionBound::EndWithinFirst(0.35),
                max_removal_fraction: 0.20,
                min_size: 3,
                min_confidence: 0.65,
            },
            SectionType::AuxiliaryLists => ConstraintProfile {
                position: PositionBound::EndWithinFirst(0.50),
                max_removal_fraction: 0.15,
                min_size: 3,
                min_confidence: 0.70,
            },
            SectionType::Index => ConstraintProfile {
                position: PositionBound::StartWithinLast(0.40),
                max_removal_fraction: 0.30,
                min_size: 5,
                min_confidence: 0.70,
            },
            SectionType::BackMatter => ConstraintProfile {
                position: PositionBound::StartWithinLast(0.50),
                max_removal_fraction: 0.45,
                min_size: 3,
                min_confidence: 0.70,
            },
            SectionType::Citations => ConstraintProfile {
                position: PositionBound::Anywhere,
                max_removal_fraction: 0.10,
                min_size: 1,
                min_confidence: 0.70,
            },
            SectionType::Footnotes => ConstraintProfile {
                position: PositionBound::Anywhere,
                max_removal_fraction: 0.20,
                min_size: 1,
                min_confidence: 0.70,
            },
            SectionType::RunningElements => ConstraintProfile {
                position: PositionBound::Anywhere,
                max_removal_fraction: 0.15,
                min_size: 1,
                min_confidence: 0.60,
            },
        }
    }

    /// How this section is detected.
    pub fn detection(self) -> DetectionKind {
        match self {
            SectionType::FrontMatter
            | SectionType::TableOfContents
            | SectionType::AuxiliaryLists
            | SectionType::Index
            | SectionType::BackMatter => DetectionKind::Boundary,
            SectionType::Citations | SectionType::Footnotes | SectionType::RunningElements => {
                DetectionKind::Pattern
            }
        }
    }

    /// Human-readable name, also used in oracle requests.
    pub fn label(self) -> &'static str {
        match self {
            SectionType::FrontMatter => "front matter",
            SectionType::TableOfContents => "table of contents",
            SectionType::AuxiliaryLists => "list of figures/tables/abbreviations",
            SectionType::Index => "index",
            SectionType::BackMatter => "back matter",
            SectionType::Citations => "citations",
            SectionType::Footnotes => "footnotes",
            SectionType::RunningElements => "running headers and footers",
        }
    }

    /// Stable kebab-case identifier.
    pub fn id(self) -> &'static str {
        match self {
            SectionType::FrontMatter => "front-matter",
            SectionType::TableOfContents => "table-of-contents",
            SectionType::AuxiliaryLists => "auxiliary-lists",
            SectionType::Index => "index",
            SectionType::BackMatter => "back-matter",
            SectionType::Citations => "citations",
            SectionType::Footnotes => "footnotes",
            SectionType::RunningElements => "running-elements",
        }
    }
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SectionType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        let wanted = match wanted.as_str() {
            "toc" => "table-of-contents",
            "headers-footers" => "running-elements",
            other => other,
        };
        SectionType::ALL
            .iter()
            .copied()
            .find(|section| section.id() == wanted)
            .ok_or_else(|| crate::Error::Config(format!("unknown section '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_back_matter_bounds() {
        let profile = SectionType::BackMatter.profile();
        assert_eq!(profile.earliest_start(500), 250);
        assert_eq!(profile.max_lines(500), 225);
        assert!(profile.min_confidence >= SectionType::FrontMatter.profile().min_confidence);
    }

    #[test]
    fn test_front_matter_bounds() {
        let profile = SectionType::FrontMatter.profile();
        assert_eq!(profile.latest_end(500), 200);
        assert_eq!(profile.earliest_start(500), 0);
    }

    #[test]
    fn test_index_window_inside_back_half() {
        let profile = SectionType::Index.profile();
        assert_eq!(profile.earliest_start(1000), 600);
    }

    #[test]
    fn test_detection_kinds() {
        assert_eq!(SectionType::BackMatter.detection(), DetectionKind::Boundary);
        assert_eq!(SectionType::Citations.detection(), DetectionKind::Pattern);
        assert_eq!(
            SectionType::RunningElements.detection(),
            DetectionKind::Pattern
        );
    }

    #[test]
    fn test_pattern_sections_are_unpositioned() {
        for section in SectionType::ALL {
            let anywhere = matches!(section.profile().position, PositionBound::Anywhere);
            assert_eq!(anywhere, section.detection() == DetectionKind::Pattern);
        }
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!(
            "toc".parse::<SectionType>().unwrap(),
            SectionType::TableOfContents
        );
        assert_eq!(
            "back_matter".parse::<SectionType>().unwrap(),
            SectionType::BackMatter
        );
        assert!("appendix".parse::<SectionType>().is_err());
    }
}
