//! Symbol graph construction from parsed per-file symbol tables.
//!
//! Creates one node per file and definition, `contains` edges for the
//! definition hierarchy, `imports` edges between files, and `calls` edges
//! resolved in cascading order:
//!
//! 1. Local definitions in the same file (lexical scope, then `self`/`cls`).
//! 2. Import aliases expanded to module-qualified names.
//! 3. Everything else becomes a lazily-created external node.
//!
//! A local definition always shadows an import of the same name.

use std::collections::{BTreeMap, HashMap, HashSet};

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::config::IndexConfig;
use crate::indexer::imports::{import_edges, ModuleTable};
use crate::indexer::parser::{CallSite, DefinitionKind, ParsedFile, SymbolDefinition};
use crate::indexer::toc::build_toc;
use crate::models::{
    file_id, qualify, symbol_id, Confidence, EdgeKind, GraphEdge, Location, SymbolKind,
    SymbolNode, TableOfContents,
};

/// Resolver output: everything a `RepoIndex` needs besides scan metadata.
#[derive(Clone, Debug, Default)]
pub struct SymbolGraph {
    pub nodes: BTreeMap<String, SymbolNode>,
    pub edges: Vec<GraphEdge>,
    pub toc: TableOfContents,
}

impl SymbolGraph {
    fn add_edge(&mut self, edge: GraphEdge) {
        self.edges.push(edge);
    }

    fn ensure_external(&mut self, name: &str) -> String {
        let node = SymbolNode::external(name);
        let id = node.id.clone();
        self.nodes.entry(id.clone()).or_insert(node);
        id
    }
}

/// A resolved call target before external nodes are materialized.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Target {
    Node(String, Confidence),
    External(String),
}

// ---------------------------------------------------------------------------
// Per-file context
// ---------------------------------------------------------------------------

struct FileContext<'f> {
    file: &'f ParsedFile,
    /// Qualified name → kind, for definitions in this file.
    local: HashMap<&'f str, DefinitionKind>,
    /// Alias → import target; later bindings replace earlier ones.
    aliases: IndexMap<&'f str, &'f str>,
}

impl<'f> FileContext<'f> {
    fn new(file: &'f ParsedFile) -> Self {
        let mut local = HashMap::new();
        for symbol in &file.symbols {
            local
                .entry(symbol.qualified_name.as_str())
                .or_insert(symbol.kind);
        }
        let mut aliases = IndexMap::new();
        for binding in &file.imports {
            if binding.alias != "*" {
                aliases.insert(binding.alias.as_str(), binding.target.as_str());
            }
        }
        Self {
            file,
            local,
            aliases,
        }
    }

    /// Bare-name lookup through the enclosing lexical scopes, innermost first.
    ///
    /// Methods are not visible as bare names.
    fn lookup_bare(&self, caller: Option<&SymbolDefinition>, name: &str) -> Option<String> {
        let module = self.file.module.as_str();
        let mut scopes: Vec<&str> = Vec::new();
        if let Some(caller) = caller {
            let mut scope = caller.qualified_name.as_str();
            while scope.len() > module.len() {
                scopes.push(scope);
                match scope.rfind('.') {
                    Some(pos) => scope = &scope[..pos],
                    None => break,
                }
            }
        }
        scopes.push(module);

        scopes.into_iter().find_map(|scope| {
            let candidate = qualify(scope, name);
            match self.local.get(candidate.as_str()) {
                Some(DefinitionKind::Method) | None => None,
                Some(_) => Some(candidate),
            }
        })
    }

    fn is_local(&self, qualified: &str) -> bool {
        self.local.contains_key(qualified)
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

struct Resolver<'f> {
    table: ModuleTable,
    /// Every qualified name that owns a node.
    known: HashSet<&'f str>,
}

impl<'f> Resolver<'f> {
    fn resolve(
        &self,
        ctx: &FileContext<'_>,
        caller: Option<&SymbolDefinition>,
        call: &CallSite,
    ) -> Target {
        let name = call.name.as_str();
        let (head, rest) = match name.split_once('.') {
            Some((h, r)) => (h, Some(r)),
            None => (name, None),
        };

        // 1. Local scope.
        if matches!(head, "self" | "cls") {
            if let (Some(class), Some(rest)) = (caller.and_then(|c| c.owner_class.as_deref()), rest)
            {
                let candidate = qualify(class, rest);
                if ctx.is_local(&candidate) {
                    return Target::Node(symbol_id(&candidate), Confidence::High);
                }
                let member = rest.split('.').next().unwrap_or(rest);
                let candidate = qualify(class, member);
                if ctx.is_local(&candidate) {
                    return Target::Node(symbol_id(&candidate), Confidence::Medium);
                }
            }
        } else if let Some(local) = ctx.lookup_bare(caller, head) {
            return match rest {
                None => Target::Node(symbol_id(&local), Confidence::High),
                Some(rest) => {
                    let full = qualify(&local, rest);
                    if ctx.is_local(&full) {
                        Target::Node(symbol_id(&full), Confidence::High)
                    } else {
                        Target::Node(symbol_id(&local), Confidence::Medium)
                    }
                }
            };
        }

        // 2. Import aliases.
        if let Some(target) = ctx.aliases.get(head) {
            let expanded = match rest {
                Some(rest) => qualify(target, rest),
                None => target.to_string(),
            };
            return self.resolve_qualified(&expanded);
        }

        // 3. Unresolved.
        Target::External(name.to_string())
    }

    fn resolve_qualified(&self, expanded: &str) -> Target {
        if self.known.contains(expanded) {
            return Target::Node(symbol_id(expanded), Confidence::High);
        }
        match self.table.longest_module_prefix(expanded) {
            Some((_, path, "")) => Target::Node(file_id(path), Confidence::Medium),
            Some((module, path, _)) => {
                let symbol = self.longest_known_prefix(expanded, module.len());
                match symbol {
                    Some(q) => Target::Node(symbol_id(q), Confidence::Medium),
                    None => Target::Node(file_id(path), Confidence::Medium),
                }
            }
            None => Target::External(expanded.to_string()),
        }
    }

    /// Longest known symbol that is a dotted prefix of `dotted`, longer than
    /// `min_len` bytes.
    fn longest_known_prefix<'d>(&self, dotted: &'d str, min_len: usize) -> Option<&'d str> {
        let mut end = dotted.len();
        while let Some(pos) = dotted[..end].rfind('.') {
            end = pos;
            if end <= min_len {
                return None;
            }
            let candidate = &dotted[..end];
            if self.known.contains(candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Graph construction
// ---------------------------------------------------------------------------

fn node_kind(kind: DefinitionKind) -> SymbolKind {
    match kind {
        DefinitionKind::Function => SymbolKind::Function,
        DefinitionKind::Class => SymbolKind::Class,
        DefinitionKind::Method => SymbolKind::Method,
        DefinitionKind::Blueprint => SymbolKind::Blueprint,
    }
}

fn first_line(text: Option<&str>) -> Option<String> {
    text?
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

fn display_module(file: &ParsedFile) -> &str {
    if file.module.is_empty() {
        &file.path
    } else {
        &file.module
    }
}

fn file_node(file: &ParsedFile) -> SymbolNode {
    let summary = first_line(file.docstring.as_deref()).unwrap_or_else(|| {
        let n = file.symbols.len();
        let noun = if n == 1 { "symbol" } else { "symbols" };
        format!("Module {} ({n} {noun})", display_module(file))
    });
    SymbolNode {
        id: file_id(&file.path),
        name: file.path.clone(),
        kind: SymbolKind::File,
        summary,
        signature: None,
        docstring: file.docstring.clone(),
        location: Some(Location {
            path: file.path.clone(),
            start_line: 1,
            end_line: file.line_count.max(1),
        }),
    }
}

fn definition_node(file: &ParsedFile, symbol: &SymbolDefinition) -> SymbolNode {
    let kind = node_kind(symbol.kind);
    let summary = first_line(symbol.docstring.as_deref()).unwrap_or_else(|| {
        format!("{} {} in {}", kind.label(), symbol.name, display_module(file))
    });
    SymbolNode {
        id: symbol_id(&symbol.qualified_name),
        name: symbol.name.clone(),
        kind,
        summary,
        signature: symbol.signature.clone(),
        docstring: symbol.docstring.clone(),
        location: Some(Location {
            path: file.path.clone(),
            start_line: symbol.start_line,
            end_line: symbol.end_line,
        }),
    }
}

/// Merge per-file symbol tables into a global graph and its table of contents.
pub fn build_graph(files: &[ParsedFile], config: &IndexConfig) -> SymbolGraph {
    let mut graph = SymbolGraph::default();
    let mut known: HashSet<&str> = HashSet::new();

    // Nodes and containment.
    for file in files {
        let fid = file_id(&file.path);
        graph.nodes.insert(fid.clone(), file_node(file));
        for symbol in &file.symbols {
            if !known.insert(symbol.qualified_name.as_str()) {
                debug!(
                    symbol = %symbol.qualified_name,
                    path = %file.path,
                    "duplicate definition ignored"
                );
                continue;
            }
            let node = definition_node(file, symbol);
            let sid = node.id.clone();
            graph.nodes.insert(sid.clone(), node);
            match symbol.parent.as_deref() {
                None => graph.add_edge(GraphEdge::new(
                    fid.clone(),
                    sid,
                    EdgeKind::Contains,
                    Confidence::High,
                )),
                Some(parent) => graph.add_edge(GraphEdge::new(
                    symbol_id(parent),
                    sid,
                    EdgeKind::Contains,
                    Confidence::Medium,
                )),
            }
        }
    }

    let resolver = Resolver {
        table: ModuleTable::from_files(files),
        known,
    };

    // Imports and calls.
    for file in files {
        for edge in import_edges(file, &resolver.table) {
            graph.add_edge(edge);
        }

        let ctx = FileContext::new(file);
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut emit = |graph: &mut SymbolGraph, source: String, target: Target| {
            let (target_id, confidence) = match target {
                Target::Node(id, confidence) => (id, confidence),
                Target::External(name) => (graph.ensure_external(&name), Confidence::Low),
            };
            if seen.insert((source.clone(), target_id.clone())) {
                graph.add_edge(GraphEdge::new(source, target_id, EdgeKind::Calls, confidence));
            }
        };

        let fid = file_id(&file.path);
        for call in &file.module_calls {
            let target = resolver.resolve(&ctx, None, call);
            emit(&mut graph, fid.clone(), target);
        }
        for symbol in &file.symbols {
            let sid = symbol_id(&symbol.qualified_name);
            for call in &symbol.local_calls {
                let target = resolver.resolve(&ctx, Some(symbol), call);
                if let Target::Node(id, _) = &target {
                    // Recursion is not an interesting edge.
                    if *id == sid {
                        continue;
                    }
                }
                emit(&mut graph, sid.clone(), target);
            }
        }
    }

    graph.toc = build_toc(files, &graph.nodes, &graph.edges, config);
    info!(
        files = files.len(),
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        "graph built"
    );
    graph
}
