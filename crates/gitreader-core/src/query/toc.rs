//! Table-of-contents query.

use crate::models::{RepoIndex, TocEntry, TocMode};

/// Entries for `mode`. Story mode falls back to the directory tree when no
/// story categories were derived.
pub fn query_toc(index: &RepoIndex, mode: TocMode) -> Vec<TocEntry> {
    match mode {
        TocMode::Story if !index.toc.story.is_empty() => index.toc.story.clone(),
        _ => index.toc.tree.clone(),
    }
}
