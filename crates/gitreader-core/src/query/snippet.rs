//! Bounded source-snippet extraction for a symbol.

use std::str::FromStr;

use serde::Serialize;
use tracing::debug;

use crate::config::IndexConfig;
use crate::errors::{GitReaderError, GitReaderResult};
use crate::models::{Location, RepoIndex, SymbolKind, SymbolNode};
use crate::query::guards::clamp_snippet_lines;

/// Which extent of the symbol's file to return.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnippetSection {
    #[default]
    Symbol,
    /// The whole containing file, from line 1.
    File,
}

impl FromStr for SnippetSection {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "" | "symbol" => Ok(SnippetSection::Symbol),
            "file" => Ok(SnippetSection::File),
            other => Err(format!("unknown snippet section: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SymbolSnippet {
    pub id: String,
    pub name: String,
    pub kind: SymbolKind,
    pub summary: String,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub location: Option<Location>,
    pub start_line: usize,
    pub end_line: usize,
    pub total_lines: usize,
    /// The returned range stops short of the symbol's known extent.
    pub truncated: bool,
    pub snippet: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct LineRange {
    start: usize,
    end: usize,
    truncated: bool,
}

/// Read the source behind `symbol_id` and cut the requested line range.
pub fn query_snippet(
    index: &RepoIndex,
    symbol_id: &str,
    section: SnippetSection,
    config: &IndexConfig,
) -> GitReaderResult<SymbolSnippet> {
    let node = index
        .node(symbol_id)
        .ok_or_else(|| GitReaderError::NotFound(symbol_id.to_string()))?;
    let location = node
        .location
        .as_ref()
        .ok_or_else(|| GitReaderError::NoLocation(symbol_id.to_string()))?;

    let file_path = index.root_path.join(&location.path);
    let bytes = std::fs::read(&file_path).map_err(|e| {
        GitReaderError::UnreadableSource(format!("{}: {e}", location.path))
    })?;
    let source = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = source.split_inclusive('\n').collect();

    let whole_file = section == SnippetSection::File || node.kind == SymbolKind::File;
    let range = resolve_line_range(
        location,
        whole_file,
        lines.len(),
        clamp_snippet_lines(config.snippet_lines),
        config.fallback_context.max(1),
    );
    debug!(
        symbol = symbol_id,
        start = range.start,
        end = range.end,
        truncated = range.truncated,
        "snippet resolved"
    );

    let snippet = if range.start <= range.end {
        lines[range.start - 1..range.end].concat()
    } else {
        String::new()
    };

    Ok(make_snippet(node, range, lines.len(), snippet))
}

fn resolve_line_range(
    location: &Location,
    whole_file: bool,
    total: usize,
    max_lines: usize,
    fallback: usize,
) -> LineRange {
    if whole_file {
        let end = total.min(max_lines);
        return LineRange {
            start: 1,
            end,
            truncated: end < total,
        };
    }

    let start = location.start_line.max(1);
    let known_extent = location.end_line >= start;
    let mut end = if known_extent {
        location.end_line
    } else {
        start.saturating_add(fallback - 1)
    };
    if end - start + 1 > max_lines {
        end = start + max_lines - 1;
    }
    let end = end.min(total);

    let truncated = if known_extent {
        end < location.end_line.min(total)
    } else {
        end >= start && end - start + 1 >= max_lines && end < total
    };
    LineRange {
        start,
        end,
        truncated,
    }
}

fn make_snippet(
    node: &SymbolNode,
    range: LineRange,
    total_lines: usize,
    snippet: String,
) -> SymbolSnippet {
    SymbolSnippet {
        id: node.id.clone(),
        name: node.name.clone(),
        kind: node.kind,
        summary: node.summary.clone(),
        signature: node.signature.clone(),
        docstring: node.docstring.clone(),
        location: node.location.clone(),
        start_line: range.start,
        end_line: range.end,
        total_lines,
        truncated: range.truncated,
        snippet,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{external_id, file_id, symbol_id, IndexStats, TableOfContents};
    use std::collections::BTreeMap;
    use std::path::Path;

    fn numbered(n: usize) -> String {
        (1..=n).map(|i| format!("line {i}\n")).collect()
    }

    fn make_node(id: &str, kind: SymbolKind, location: Option<(usize, usize)>) -> SymbolNode {
        SymbolNode {
            id: id.to_string(),
            name: id.to_string(),
            kind,
            summary: String::new(),
            signature: None,
            docstring: None,
            location: location.map(|(start_line, end_line)| Location {
                path: "mod.py".to_string(),
                start_line,
                end_line,
            }),
        }
    }

    fn make_index(root: &Path, nodes: Vec<SymbolNode>) -> RepoIndex {
        RepoIndex {
            repo_id: "r".into(),
            root_path: root.to_path_buf(),
            commit_sha: None,
            nodes: nodes.into_iter().map(|n| (n.id.clone(), n)).collect::<BTreeMap<_, _>>(),
            edges: vec![],
            toc: TableOfContents::default(),
            warnings: vec![],
            stats: IndexStats::default(),
            content_signature: String::new(),
            generated_at: 0,
        }
    }

    fn setup(lines: usize, nodes: Vec<SymbolNode>) -> (tempfile::TempDir, RepoIndex) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mod.py"), numbered(lines)).unwrap();
        let index = make_index(dir.path(), nodes);
        (dir, index)
    }

    #[test]
    fn test_section_parse() {
        assert_eq!("".parse::<SnippetSection>().unwrap(), SnippetSection::Symbol);
        assert_eq!("FILE".parse::<SnippetSection>().unwrap(), SnippetSection::File);
        assert!("chapter".parse::<SnippetSection>().is_err());
    }

    #[test]
    fn test_symbol_range() {
        let id = symbol_id("mod.f");
        let (_dir, index) = setup(20, vec![make_node(&id, SymbolKind::Function, Some((3, 5)))]);
        let snip =
            query_snippet(&index, &id, SnippetSection::Symbol, &IndexConfig::default()).unwrap();
        assert_eq!((snip.start_line, snip.end_line), (3, 5));
        assert_eq!(snip.snippet, "line 3\nline 4\nline 5\n");
        assert_eq!(snip.total_lines, 20);
        assert!(!snip.truncated);
    }

    #[test]
    fn test_fallback_span_when_end_precedes_start() {
        let id = symbol_id("mod.f");
        let config = IndexConfig::default();

        let (_dir, index) = setup(500, vec![make_node(&id, SymbolKind::Function, Some((10, 5)))]);
        let snip = query_snippet(&index, &id, SnippetSection::Symbol, &config).unwrap();
        assert_eq!(snip.start_line, 10);
        assert_eq!(snip.end_line, 10 + config.fallback_context - 1);

        let (_dir, short) = setup(12, vec![make_node(&id, SymbolKind::Function, Some((10, 5)))]);
        let snip = query_snippet(&short, &id, SnippetSection::Symbol, &config).unwrap();
        assert_eq!((snip.start_line, snip.end_line), (10, 12));
        assert!(!snip.truncated);
    }

    #[test]
    fn test_long_symbol_truncated() {
        let id = symbol_id("mod.big");
        let config = IndexConfig {
            snippet_lines: 10,
            ..IndexConfig::default()
        };
        let (_dir, index) = setup(100, vec![make_node(&id, SymbolKind::Class, Some((5, 60)))]);
        let snip = query_snippet(&index, &id, SnippetSection::Symbol, &config).unwrap();
        assert_eq!((snip.start_line, snip.end_line), (5, 14));
        assert!(snip.truncated);
        assert_eq!(snip.snippet.lines().count(), 10);
    }

    #[test]
    fn test_file_node_and_file_section() {
        let file = file_id("mod.py");
        let func = symbol_id("mod.f");
        let config = IndexConfig {
            snippet_lines: 50,
            ..IndexConfig::default()
        };
        let (_dir, index) = setup(
            80,
            vec![
                make_node(&file, SymbolKind::File, Some((1, 80))),
                make_node(&func, SymbolKind::Function, Some((30, 32))),
            ],
        );
        let snip = query_snippet(&index, &file, SnippetSection::Symbol, &config).unwrap();
        assert_eq!((snip.start_line, snip.end_line), (1, 50));
        assert!(snip.truncated);

        let snip = query_snippet(&index, &func, SnippetSection::File, &config).unwrap();
        assert_eq!((snip.start_line, snip.end_line), (1, 50));
    }

    #[test]
    fn test_errors() {
        let ext = external_id("print");
        let gone = symbol_id("gone.f");
        let dir = tempfile::tempdir().unwrap();
        let mut missing = make_node(&gone, SymbolKind::Function, Some((1, 2)));
        if let Some(loc) = missing.location.as_mut() {
            loc.path = "gone.py".to_string();
        }
        let index = make_index(
            dir.path(),
            vec![make_node(&ext, SymbolKind::External, None), missing],
        );
        let config = IndexConfig::default();

        let err =
            query_snippet(&index, "symbol:nope", SnippetSection::Symbol, &config).unwrap_err();
        assert_eq!(err.code(), "not_found");
        let err = query_snippet(&index, &ext, SnippetSection::Symbol, &config).unwrap_err();
        assert_eq!(err.code(), "no_location");
        let err = query_snippet(&index, &gone, SnippetSection::Symbol, &config).unwrap_err();
        assert_eq!(err.code(), "unreadable_source");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let id = file_id("mod.py");
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mod.py"), b"x = '\xff'\n").unwrap();
        let index = make_index(dir.path(), vec![make_node(&id, SymbolKind::File, Some((1, 1)))]);
        let snip =
            query_snippet(&index, &id, SnippetSection::Symbol, &IndexConfig::default()).unwrap();
        assert!(snip.snippet.contains('\u{FFFD}'));
    }

    #[test]
    fn test_empty_file_yields_empty_snippet() {
        let id = file_id("mod.py");
        let (_dir, index) = setup(0, vec![make_node(&id, SymbolKind::File, Some((1, 1)))]);
        let snip =
            query_snippet(&index, &id, SnippetSection::Symbol, &IndexConfig::default()).unwrap();
        assert_eq!(snip.total_lines, 0);
        assert_eq!(snip.end_line, 0);
        assert!(snip.snippet.is_empty());
    }
}
