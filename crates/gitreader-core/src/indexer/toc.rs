//! Table-of-contents grouping: by top-level directory and by heuristic role.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::config::IndexConfig;
use crate::indexer::parser::ParsedFile;
use crate::models::{EdgeKind, GraphEdge, SymbolKind, SymbolNode, TableOfContents, TocEntry};

pub const ROOT_GROUP: &str = "root";
pub const GROUP_SCOPE_PREFIX: &str = "group:";
pub const STORY_SCOPE_PREFIX: &str = "story:";

const ENTRY_STEMS: &[&str] = &[
    "flasky",
    "manage",
    "wsgi",
    "asgi",
    "run",
    "main",
    "app",
    "server",
    "__main__",
    "application",
];
const CONFIG_STEMS: &[&str] = &["config", "settings", "configuration", "conf", "constants"];
const ROUTE_STEMS: &[&str] = &[
    "views",
    "routes",
    "controllers",
    "handlers",
    "endpoints",
    "api",
    "urls",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum StoryCategory {
    Entry,
    Config,
    Routes,
    Templates,
    Other,
}

impl StoryCategory {
    const ALL: [StoryCategory; 5] = [
        StoryCategory::Entry,
        StoryCategory::Config,
        StoryCategory::Routes,
        StoryCategory::Templates,
        StoryCategory::Other,
    ];

    fn key(&self) -> &'static str {
        match self {
            StoryCategory::Entry => "entry",
            StoryCategory::Config => "config",
            StoryCategory::Routes => "routes",
            StoryCategory::Templates => "templates",
            StoryCategory::Other => "other",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            StoryCategory::Entry => "Entry points",
            StoryCategory::Config => "Configuration",
            StoryCategory::Routes => "Routes and handlers",
            StoryCategory::Templates => "Templates and rendering",
            StoryCategory::Other => "Everything else",
        }
    }
}

/// Build both groupings for the parsed files.
pub fn build_toc(
    files: &[ParsedFile],
    nodes: &BTreeMap<String, SymbolNode>,
    edges: &[GraphEdge],
    config: &IndexConfig,
) -> TableOfContents {
    let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
    TableOfContents {
        tree: tree_entries(&paths),
        story: story_entries(&paths, nodes, edges, config),
    }
}

/// Top-level directory of a path, or `root` for files at the top.
pub fn tree_group(path: &str) -> &str {
    match path.split_once('/') {
        Some((dir, _)) if !dir.is_empty() => dir,
        _ => ROOT_GROUP,
    }
}

fn tree_entries(paths: &[&str]) -> Vec<TocEntry> {
    let mut groups: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for path in paths {
        groups
            .entry(tree_group(path))
            .or_default()
            .push(path.to_string());
    }
    let root = groups.remove(ROOT_GROUP);
    root.map(|files| (ROOT_GROUP, files))
        .into_iter()
        .chain(groups)
        .map(|(name, files)| make_entry(GROUP_SCOPE_PREFIX, name, name, files))
        .collect()
}

fn story_entries(
    paths: &[&str],
    nodes: &BTreeMap<String, SymbolNode>,
    edges: &[GraphEdge],
    config: &IndexConfig,
) -> Vec<TocEntry> {
    let blueprint_files: HashSet<&str> = nodes
        .values()
        .filter(|n| n.kind == SymbolKind::Blueprint)
        .filter_map(|n| n.path())
        .collect();

    let template_files: HashSet<&str> = edges
        .iter()
        .filter(|e| e.kind == EdgeKind::Calls)
        .filter(|e| {
            nodes.get(&e.target_id).is_some_and(|t| {
                t.kind == SymbolKind::External && config.is_template_render_name(&t.name)
            })
        })
        .filter_map(|e| nodes.get(&e.source_id).and_then(|s| s.path()))
        .collect();

    let mut buckets: BTreeMap<StoryCategory, Vec<String>> = BTreeMap::new();
    for path in paths {
        let stem = file_stem(path);
        let category = if ENTRY_STEMS.contains(&stem.as_str()) {
            StoryCategory::Entry
        } else if is_config_stem(&stem) {
            StoryCategory::Config
        } else if ROUTE_STEMS.contains(&stem.as_str()) || blueprint_files.contains(path) {
            StoryCategory::Routes
        } else if template_files.contains(path) {
            StoryCategory::Templates
        } else {
            StoryCategory::Other
        };
        buckets.entry(category).or_default().push(path.to_string());
    }

    StoryCategory::ALL
        .iter()
        .filter_map(|category| {
            let files = buckets.remove(category)?;
            Some(make_entry(
                STORY_SCOPE_PREFIX,
                category.key(),
                category.title(),
                files,
            ))
        })
        .collect()
}

fn is_config_stem(stem: &str) -> bool {
    CONFIG_STEMS.contains(&stem) || stem.starts_with("config") || stem.starts_with("settings")
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn make_entry(prefix: &str, key: &str, title: &str, mut files: Vec<String>) -> TocEntry {
    files.sort();
    let count = files.len();
    let scope = format!("{prefix}{key}");
    TocEntry {
        id: scope.clone(),
        title: title.to_string(),
        summary: if count == 1 {
            "1 file".to_string()
        } else {
            format!("{count} files")
        },
        scope,
        files,
    }
}
