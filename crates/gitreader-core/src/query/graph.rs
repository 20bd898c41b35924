//! Scoped subgraph extraction with optional external-node collapsing.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;
use tracing::debug;

use crate::indexer::toc::{GROUP_SCOPE_PREFIX, STORY_SCOPE_PREFIX};
use crate::models::{
    external_group_id, Confidence, EdgeKind, GraphEdge, RepoIndex, SymbolKind, SymbolNode, TocEntry,
};
use crate::query::guards::truncate_scope;

pub const FULL_SCOPE: &str = "full";

/// A parsed scope token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    Full,
    Group(String),
    Story(String),
}

impl Scope {
    /// Unrecognized tokens mean the full graph.
    pub fn parse(token: &str) -> Scope {
        let token = token.trim();
        if let Some(name) = token.strip_prefix(GROUP_SCOPE_PREFIX) {
            if !name.is_empty() {
                return Scope::Group(name.to_string());
            }
        }
        if let Some(name) = token.strip_prefix(STORY_SCOPE_PREFIX) {
            if !name.is_empty() {
                return Scope::Story(name.to_string());
            }
        }
        Scope::Full
    }

    pub fn token(&self) -> String {
        match self {
            Scope::Full => FULL_SCOPE.to_string(),
            Scope::Group(name) => format!("{GROUP_SCOPE_PREFIX}{name}"),
            Scope::Story(name) => format!("{STORY_SCOPE_PREFIX}{name}"),
        }
    }

    fn files<'i>(&self, index: &'i RepoIndex) -> Option<HashSet<&'i str>> {
        let entries: &[TocEntry] = match self {
            Scope::Full => return None,
            Scope::Group(_) => &index.toc.tree,
            Scope::Story(_) => &index.toc.story,
        };
        let token = self.token();
        entries
            .iter()
            .find(|e| e.scope == token)
            .map(|e| e.files.iter().map(String::as_str).collect())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GraphOptions {
    pub collapse_externals: bool,
}

/// The induced subgraph for a scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GraphView {
    /// Scope actually served; `full` when the request degraded.
    pub scope: String,
    pub nodes: Vec<SymbolNode>,
    pub edges: Vec<GraphEdge>,
}

type EdgeKey = (String, String, EdgeKind, Confidence);

fn dedupe_edges(edges: impl IntoIterator<Item = GraphEdge>) -> Vec<GraphEdge> {
    let mut seen: HashSet<EdgeKey> = HashSet::new();
    edges
        .into_iter()
        .filter(|e| {
            seen.insert((
                e.source_id.clone(),
                e.target_id.clone(),
                e.kind,
                e.confidence,
            ))
        })
        .collect()
}

/// Nodes and edges for `scope`; an unknown or empty scope yields the full graph.
pub fn query_graph(index: &RepoIndex, scope: &str, options: GraphOptions) -> GraphView {
    let requested = Scope::parse(&truncate_scope(scope));

    let mut served = requested.clone();
    let mut selected: HashSet<&str> = match requested.files(index) {
        Some(files) => index
            .nodes
            .values()
            .filter(|n| n.path().is_some_and(|p| files.contains(p)))
            .map(|n| n.id.as_str())
            .collect(),
        None => HashSet::new(),
    };
    if selected.is_empty() {
        if requested != Scope::Full {
            debug!(scope = %requested.token(), "scope matched nothing, serving full graph");
        }
        served = Scope::Full;
        selected = index.nodes.keys().map(String::as_str).collect();
    }

    // Keep boundary edges into external nodes visible.
    let is_external = |id: &str| {
        index
            .nodes
            .get(id)
            .is_some_and(|n| n.kind == SymbolKind::External)
    };
    let mut adjacent: Vec<&str> = Vec::new();
    for edge in &index.edges {
        let (s, t) = (edge.source_id.as_str(), edge.target_id.as_str());
        if selected.contains(s) && !selected.contains(t) && is_external(t) {
            adjacent.push(t);
        } else if selected.contains(t) && !selected.contains(s) && is_external(s) {
            adjacent.push(s);
        }
    }
    selected.extend(adjacent);

    let nodes: BTreeMap<String, SymbolNode> = index
        .nodes
        .iter()
        .filter(|(id, _)| selected.contains(id.as_str()))
        .map(|(id, n)| (id.clone(), n.clone()))
        .collect();
    let edges = dedupe_edges(
        index
            .edges
            .iter()
            .filter(|e| {
                selected.contains(e.source_id.as_str()) && selected.contains(e.target_id.as_str())
            })
            .cloned(),
    );

    let (nodes, edges) = if options.collapse_externals {
        collapse_externals(nodes, edges)
    } else {
        (nodes, edges)
    };

    GraphView {
        scope: served.token(),
        nodes: nodes.into_values().collect(),
        edges,
    }
}

/// Merge external nodes into one synthetic node per adjacent file.
fn collapse_externals(
    mut nodes: BTreeMap<String, SymbolNode>,
    edges: Vec<GraphEdge>,
) -> (BTreeMap<String, SymbolNode>, Vec<GraphEdge>) {
    let external_ids: HashSet<String> = nodes
        .values()
        .filter(|n| n.kind == SymbolKind::External)
        .map(|n| n.id.clone())
        .collect();
    if external_ids.is_empty() {
        return (nodes, edges);
    }

    let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut merged: HashSet<String> = HashSet::new();
    let mut redirected = Vec::with_capacity(edges.len());

    for mut edge in edges {
        if external_ids.contains(&edge.target_id) {
            if let Some(path) = nodes.get(&edge.source_id).and_then(|n| n.path()) {
                let group = external_group_id(path);
                groups
                    .entry(path.to_string())
                    .or_default()
                    .insert(edge.target_id.clone());
                merged.insert(std::mem::replace(&mut edge.target_id, group));
            }
        } else if external_ids.contains(&edge.source_id) {
            if let Some(path) = nodes.get(&edge.target_id).and_then(|n| n.path()) {
                let group = external_group_id(path);
                groups
                    .entry(path.to_string())
                    .or_default()
                    .insert(edge.source_id.clone());
                merged.insert(std::mem::replace(&mut edge.source_id, group));
            }
        }
        redirected.push(edge);
    }

    for id in &merged {
        nodes.remove(id);
    }
    for (path, members) in groups {
        let count = members.len();
        let noun = if count == 1 { "symbol" } else { "symbols" };
        let id = external_group_id(&path);
        nodes.insert(
            id.clone(),
            SymbolNode {
                id,
                name: format!("External dependencies of {path}"),
                kind: SymbolKind::External,
                summary: format!("{count} external {noun}"),
                signature: None,
                docstring: None,
                location: None,
            },
        );
    }

    (nodes, dedupe_edges(redirected))
}
