//! Stateless text transforms.
//!
//! Every function here takes text by reference and returns new text; none of them talk
//! to the oracle or look at the configuration beyond the arguments they are given.

pub mod lines;
pub mod normalize;
pub mod paragraphs;
pub mod protect;

pub use lines::{
    line_count, remove_inline_matches, remove_line_range, remove_matching_lines,
    remove_page_numbers, repeated_line_patterns, word_count, Removal,
};
pub use normalize::{final_cleanup, normalize_characters};
pub use paragraphs::{
    add_chapter_markers, chunk_paragraphs, join_hyphenated, optimize_paragraphs,
    split_paragraphs, MarkerEdit, ParagraphEdit,
};
pub use protect::{protect, ProtectKind, ProtectedText, Restoration, RestorationWarning};
