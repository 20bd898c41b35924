//! Import resolution from parsed import bindings to repository files.

use std::collections::{HashMap, HashSet};

use crate::indexer::parser::ParsedFile;
use crate::models::{file_id, Confidence, EdgeKind, GraphEdge};

/// Dotted module path → repository-relative file path, for parsed files.
#[derive(Debug, Default)]
pub struct ModuleTable {
    modules: HashMap<String, String>,
}

impl ModuleTable {
    pub fn from_files(files: &[ParsedFile]) -> Self {
        let mut modules = HashMap::new();
        for file in files {
            // `pkg.py` and `pkg/__init__.py` can collide; first wins.
            modules
                .entry(file.module.clone())
                .or_insert_with(|| file.path.clone());
        }
        Self { modules }
    }

    pub fn file_for(&self, module: &str) -> Option<&str> {
        self.modules.get(module).map(String::as_str)
    }

    /// Longest known module that is `dotted` or a dotted prefix of it.
    ///
    /// Returns `(module, file_path, rest)` where `rest` is the remainder
    /// after the module, without the leading dot.
    pub fn longest_module_prefix<'d>(&self, dotted: &'d str) -> Option<(&'d str, &str, &'d str)> {
        let mut end = dotted.len();
        loop {
            let candidate = &dotted[..end];
            if let Some(path) = self.modules.get(candidate) {
                let rest = dotted[end..].trim_start_matches('.');
                return Some((candidate, path.as_str(), rest));
            }
            match candidate.rfind('.') {
                Some(pos) => end = pos,
                None => return None,
            }
        }
    }
}

/// File-to-file `imports` edges for one parsed file.
///
/// Exact module hits are `high`; hits that only reach a parent package are
/// `medium`. Unresolvable and self imports produce nothing.
pub fn import_edges(file: &ParsedFile, table: &ModuleTable) -> Vec<GraphEdge> {
    let source = file_id(&file.path);
    let mut seen: HashSet<String> = HashSet::new();
    let mut edges = Vec::new();

    for binding in &file.imports {
        let resolved = resolve_import_target(&binding.target, &binding.module, table);
        let Some((path, confidence)) = resolved else {
            continue;
        };
        if path == file.path || !seen.insert(path.to_string()) {
            continue;
        }
        edges.push(GraphEdge::new(
            source.clone(),
            file_id(path),
            EdgeKind::Imports,
            confidence,
        ));
    }
    edges
}

/// `from pkg import mod` names a module when `pkg.mod` is a file; otherwise
/// the imported module itself is the target.
fn resolve_import_target<'t>(
    target: &str,
    module: &str,
    table: &'t ModuleTable,
) -> Option<(&'t str, Confidence)> {
    if let Some(path) = table.file_for(target) {
        return Some((path, Confidence::High));
    }
    if !module.is_empty() {
        if let Some(path) = table.file_for(module) {
            return Some((path, Confidence::High));
        }
    }
    let lookup = if module.is_empty() { target } else { module };
    let (_, path, _) = table.longest_module_prefix(lookup)?;
    Some((path, Confidence::Medium))
}
