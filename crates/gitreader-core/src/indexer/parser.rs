//! Python source parsing into per-file symbol tables.
//!
//! Uses the native tree-sitter Python grammar. A file whose tree contains
//! any error or missing node is rejected as a whole with a [`SyntaxIssue`];
//! the caller turns that into a `syntax_error` warning and moves on.

use std::collections::HashSet;
use std::path::Path;

use rayon::prelude::*;
use regex::Regex;
use tracing::{debug, info, warn};
use tree_sitter::{Node, Parser};

use crate::config::IndexConfig;
use crate::errors::GitReaderResult;
use crate::models::{qualify, Warning, WarningCode};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Compiled decorator and constructor patterns used to detect route groups.
#[derive(Clone, Debug)]
pub struct ParsePatterns {
    pub route_decorator: Regex,
    pub blueprint_constructor: Regex,
}

impl ParsePatterns {
    pub fn new(route_decorator: &str, blueprint_constructor: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            route_decorator: Regex::new(route_decorator)?,
            blueprint_constructor: Regex::new(blueprint_constructor)?,
        })
    }

    /// True when a decorator expression registers a route or handler.
    pub fn is_route_decorator(&self, decorator: &str) -> bool {
        let callee = decorator.split('(').next().unwrap_or(decorator).trim();
        self.route_decorator.is_match(callee)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DefinitionKind {
    Function,
    Class,
    Method,
    Blueprint,
}

/// A call expression whose callee is a plain or dotted name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallSite {
    pub name: String,
    pub line: usize,
}

/// A definition before cross-file resolution.
#[derive(Clone, Debug)]
pub struct SymbolDefinition {
    pub name: String,
    pub qualified_name: String,
    pub kind: DefinitionKind,
    /// Qualified name of the enclosing function or class, if nested.
    pub parent: Option<String>,
    /// Qualified name of the class `self`/`cls` refer to inside this body.
    pub owner_class: Option<String>,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub decorators: Vec<String>,
    pub start_line: usize,
    pub end_line: usize,
    /// Distinct callees in first-seen order.
    pub local_calls: Vec<CallSite>,
}

/// One name bound by an import statement.
///
/// `import a.b.c` binds `a` to `a` and imports module `a.b.c`;
/// `from pkg import helper as h` binds `h` to `pkg.helper` from module `pkg`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportBinding {
    pub alias: String,
    pub target: String,
    pub module: String,
    pub line: usize,
}

#[derive(Clone, Debug)]
pub struct ParsedFile {
    pub path: String,
    pub module: String,
    pub is_package: bool,
    pub line_count: usize,
    pub docstring: Option<String>,
    pub symbols: Vec<SymbolDefinition>,
    pub imports: Vec<ImportBinding>,
    /// Calls made outside any def or class body.
    pub module_calls: Vec<CallSite>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntaxIssue {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ParseOutcome {
    /// Successfully parsed files in input order.
    pub files: Vec<ParsedFile>,
    pub warnings: Vec<Warning>,
}

// ---------------------------------------------------------------------------
// Module paths
// ---------------------------------------------------------------------------

/// Dotted module path for a repository-relative file.
///
/// `app/main/views.py` → `app.main.views`, `app/__init__.py` → `app`.
pub fn module_path_from_file(rel_path: &str) -> String {
    let normalized = rel_path.replace('\\', "/");
    let stem = match normalized.rsplit_once('/') {
        Some((dir, file)) => match file.rsplit_once('.') {
            Some((name, _)) if !name.is_empty() => format!("{dir}/{name}"),
            _ => normalized.clone(),
        },
        None => match normalized.rsplit_once('.') {
            Some((name, _)) if !name.is_empty() => name.to_string(),
            _ => normalized.clone(),
        },
    };
    let mut parts: Vec<&str> = stem.split('/').filter(|p| !p.is_empty() && *p != ".").collect();
    if parts.last() == Some(&"__init__") {
        parts.pop();
    }
    parts.join(".")
}

fn is_package_file(rel_path: &str) -> bool {
    Path::new(rel_path)
        .file_stem()
        .map(|s| s == "__init__")
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Parsing entry points
// ---------------------------------------------------------------------------

/// Parse a single file's source text.
pub fn parse_source(
    rel_path: &str,
    source: &str,
    patterns: &ParsePatterns,
) -> Result<ParsedFile, SyntaxIssue> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| SyntaxIssue {
            line: 0,
            message: format!("grammar unavailable: {e}"),
        })?;
    let tree = parser.parse(source, None).ok_or_else(|| SyntaxIssue {
        line: 0,
        message: "parser produced no tree".to_string(),
    })?;
    let root = tree.root_node();
    if root.has_error() {
        return Err(first_syntax_issue(root, source.as_bytes()));
    }

    let module = module_path_from_file(rel_path);
    let is_package = is_package_file(rel_path);
    let package = if is_package {
        module.clone()
    } else {
        module
            .rsplit_once('.')
            .map(|(pkg, _)| pkg.to_string())
            .unwrap_or_default()
    };

    let mut extractor = Extractor {
        source: source.as_bytes(),
        package,
        patterns,
        symbols: Vec::new(),
        seen_calls: Vec::new(),
        imports: Vec::new(),
        module_calls: Vec::new(),
        seen_module_calls: HashSet::new(),
    };
    let scope = Scope {
        prefix: module.clone(),
        owner: Owner::Module,
        class_body: None,
        self_class: None,
    };
    extractor.walk_children(root, &scope);

    Ok(ParsedFile {
        path: rel_path.to_string(),
        docstring: block_docstring(root, source.as_bytes()),
        module,
        is_package,
        line_count: source.lines().count(),
        symbols: extractor.symbols,
        imports: extractor.imports,
        module_calls: extractor.module_calls,
    })
}

enum FileParse {
    Parsed(ParsedFile),
    Skipped(Warning),
}

fn parse_file_worker(root: &Path, rel_path: &str, patterns: &ParsePatterns) -> FileParse {
    let bytes = match std::fs::read(root.join(rel_path)) {
        Ok(b) => b,
        Err(e) => {
            warn!(path = rel_path, error = %e, "unreadable source file");
            return FileParse::Skipped(
                Warning::new(
                    WarningCode::UnreadableFile,
                    format!("Could not read {rel_path}: {e}"),
                )
                .at(rel_path, 1),
            );
        }
    };
    let source = String::from_utf8_lossy(&bytes);
    match parse_source(rel_path, &source, patterns) {
        Ok(parsed) => {
            debug!(
                path = rel_path,
                symbols = parsed.symbols.len(),
                imports = parsed.imports.len(),
                "parsed"
            );
            FileParse::Parsed(parsed)
        }
        Err(issue) => {
            warn!(path = rel_path, line = issue.line, "syntax error, file skipped");
            FileParse::Skipped(
                Warning::new(
                    WarningCode::SyntaxError,
                    format!(
                        "Syntax error in {rel_path} at line {}: {}",
                        issue.line, issue.message
                    ),
                )
                .at(rel_path, issue.line.max(1)),
            )
        }
    }
}

/// Parse candidate files on a worker pool; results keep input order.
pub fn parse_files(
    root: &Path,
    paths: &[String],
    config: &IndexConfig,
) -> GitReaderResult<ParseOutcome> {
    let patterns = config.parse_patterns()?;
    if paths.is_empty() {
        return Ok(ParseOutcome::default());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers.max(1))
        .build();

    let results: Vec<FileParse> = match pool {
        Ok(pool) => pool.install(|| {
            paths
                .par_iter()
                .map(|path| parse_file_worker(root, path, &patterns))
                .collect()
        }),
        Err(e) => {
            warn!(error = %e, "worker pool unavailable, parsing sequentially");
            paths
                .iter()
                .map(|path| parse_file_worker(root, path, &patterns))
                .collect()
        }
    };

    let mut outcome = ParseOutcome::default();
    for result in results {
        match result {
            FileParse::Parsed(file) => outcome.files.push(file),
            FileParse::Skipped(warning) => outcome.warnings.push(warning),
        }
    }
    info!(
        parsed = outcome.files.len(),
        skipped = outcome.warnings.len(),
        "parse complete"
    );
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Syntax errors
// ---------------------------------------------------------------------------

fn first_syntax_issue(root: Node<'_>, source: &[u8]) -> SyntaxIssue {
    match find_error_node(root) {
        Some(node) if node.is_missing() => SyntaxIssue {
            line: node.start_position().row + 1,
            message: format!("missing `{}`", node.kind()),
        },
        Some(node) => {
            let text = node_text(node, source);
            let first = text.lines().next().unwrap_or("").trim();
            let message = if first.is_empty() {
                "invalid syntax".to_string()
            } else {
                format!("invalid syntax near `{}`", truncate(first, 40))
            };
            SyntaxIssue {
                line: node.start_position().row + 1,
                message,
            }
        }
        None => SyntaxIssue {
            line: 1,
            message: "invalid syntax".to_string(),
        },
    }
}

fn find_error_node(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|c| c.has_error() || c.is_missing())
        .find_map(find_error_node)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Owner {
    Module,
    Symbol(usize),
}

#[derive(Clone, Debug)]
struct Scope {
    /// Qualified prefix for names defined in this scope.
    prefix: String,
    /// Who call sites in this scope are attributed to.
    owner: Owner,
    /// Set when directly inside a class body.
    class_body: Option<String>,
    self_class: Option<String>,
}

struct Extractor<'a> {
    source: &'a [u8],
    package: String,
    patterns: &'a ParsePatterns,
    symbols: Vec<SymbolDefinition>,
    seen_calls: Vec<HashSet<String>>,
    imports: Vec<ImportBinding>,
    module_calls: Vec<CallSite>,
    seen_module_calls: HashSet<String>,
}

impl<'a> Extractor<'a> {
    fn text(&self, node: Node<'_>) -> String {
        node_text(node, self.source)
    }

    fn walk_children(&mut self, node: Node<'_>, scope: &Scope) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            self.walk(child, scope);
        }
    }

    fn walk(&mut self, node: Node<'_>, scope: &Scope) {
        match node.kind() {
            "function_definition" => self.define_function(node, node, Vec::new(), scope),
            "class_definition" => self.define_class(node, node, Vec::new(), scope),
            "decorated_definition" => self.define_decorated(node, scope),
            "import_statement" => self.record_import(node),
            "import_from_statement" => self.record_from_import(node),
            "call" => {
                self.record_call(node, scope);
                self.walk_children(node, scope);
            }
            "assignment" => {
                if scope.owner == Owner::Module {
                    self.record_blueprint_assignment(node, scope);
                }
                self.walk_children(node, scope);
            }
            "comment" => {}
            _ => self.walk_children(node, scope),
        }
    }

    fn define_decorated(&mut self, node: Node<'_>, scope: &Scope) {
        let mut decorators = Vec::new();
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children.iter().filter(|c| c.kind() == "decorator") {
            if let Some(expr) = child.named_child(0) {
                decorators.push(collapse_whitespace(&self.text(expr)));
                // Decorator expressions run in the enclosing scope.
                self.walk(expr, scope);
            }
        }
        match node.child_by_field_name("definition") {
            Some(def) if def.kind() == "function_definition" => {
                self.define_function(def, node, decorators, scope)
            }
            Some(def) if def.kind() == "class_definition" => {
                self.define_class(def, node, decorators, scope)
            }
            Some(other) => self.walk(other, scope),
            None => {}
        }
    }

    fn define_function(
        &mut self,
        node: Node<'_>,
        span: Node<'_>,
        decorators: Vec<String>,
        scope: &Scope,
    ) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node);
        let kind = if decorators.iter().any(|d| self.patterns.is_route_decorator(d)) {
            DefinitionKind::Blueprint
        } else if scope.class_body.is_some() {
            DefinitionKind::Method
        } else {
            DefinitionKind::Function
        };
        let owner_class = scope
            .class_body
            .clone()
            .or_else(|| scope.self_class.clone());

        // Defaults and annotations are evaluated where the def statement runs.
        if let Some(params) = node.child_by_field_name("parameters") {
            self.walk_children(params, scope);
        }

        let idx = self.push_symbol(SymbolDefinition {
            qualified_name: qualify(&scope.prefix, &name),
            signature: Some(self.function_signature(node, &name)),
            docstring: node
                .child_by_field_name("body")
                .and_then(|body| block_docstring(body, self.source)),
            parent: self.owner_name(scope),
            owner_class: owner_class.clone(),
            decorators,
            kind,
            start_line: span.start_position().row + 1,
            end_line: node.end_position().row + 1,
            local_calls: Vec::new(),
            name,
        });

        if let Some(body) = node.child_by_field_name("body") {
            let inner = Scope {
                prefix: self.symbols[idx].qualified_name.clone(),
                owner: Owner::Symbol(idx),
                class_body: None,
                self_class: owner_class,
            };
            self.walk_children(body, &inner);
        }
    }

    fn define_class(
        &mut self,
        node: Node<'_>,
        span: Node<'_>,
        decorators: Vec<String>,
        scope: &Scope,
    ) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.text(name_node);
        let qualified_name = qualify(&scope.prefix, &name);
        let kind = if decorators.iter().any(|d| self.patterns.is_route_decorator(d)) {
            DefinitionKind::Blueprint
        } else {
            DefinitionKind::Class
        };

        let bases = node.child_by_field_name("superclasses");
        if let Some(bases) = bases {
            self.walk_children(bases, scope);
        }
        let signature = match bases {
            Some(b) => format!("class {name}{}", tighten_parens(&self.text(b))),
            None => format!("class {name}"),
        };

        let idx = self.push_symbol(SymbolDefinition {
            qualified_name: qualified_name.clone(),
            signature: Some(signature),
            docstring: node
                .child_by_field_name("body")
                .and_then(|body| block_docstring(body, self.source)),
            parent: self.owner_name(scope),
            owner_class: scope.self_class.clone(),
            decorators,
            kind,
            start_line: span.start_position().row + 1,
            end_line: node.end_position().row + 1,
            local_calls: Vec::new(),
            name,
        });

        if let Some(body) = node.child_by_field_name("body") {
            let inner = Scope {
                prefix: qualified_name.clone(),
                owner: Owner::Symbol(idx),
                class_body: Some(qualified_name.clone()),
                self_class: Some(qualified_name),
            };
            self.walk_children(body, &inner);
        }
    }

    /// `bp = Blueprint('bp', __name__)` at module scope.
    fn record_blueprint_assignment(&mut self, node: Node<'_>, scope: &Scope) {
        let (Some(left), Some(right)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("right"),
        ) else {
            return;
        };
        if left.kind() != "identifier" || right.kind() != "call" {
            return;
        }
        let Some(callee) = right
            .child_by_field_name("function")
            .and_then(|f| dotted_name(f, self.source))
        else {
            return;
        };
        if !self.patterns.blueprint_constructor.is_match(&callee) {
            return;
        }
        let name = self.text(left);
        self.push_symbol(SymbolDefinition {
            qualified_name: qualify(&scope.prefix, &name),
            signature: Some(collapse_whitespace(&self.text(node))),
            docstring: None,
            parent: None,
            owner_class: None,
            decorators: Vec::new(),
            kind: DefinitionKind::Blueprint,
            start_line: node.start_position().row + 1,
            end_line: node.end_position().row + 1,
            local_calls: Vec::new(),
            name,
        });
    }

    fn push_symbol(&mut self, symbol: SymbolDefinition) -> usize {
        self.symbols.push(symbol);
        self.seen_calls.push(HashSet::new());
        self.symbols.len() - 1
    }

    fn owner_name(&self, scope: &Scope) -> Option<String> {
        match scope.owner {
            Owner::Module => None,
            Owner::Symbol(idx) => Some(self.symbols[idx].qualified_name.clone()),
        }
    }

    fn record_call(&mut self, node: Node<'_>, scope: &Scope) {
        let Some(name) = node
            .child_by_field_name("function")
            .and_then(|f| dotted_name(f, self.source))
        else {
            return;
        };
        let site = CallSite {
            line: node.start_position().row + 1,
            name,
        };
        match scope.owner {
            Owner::Module => {
                if self.seen_module_calls.insert(site.name.clone()) {
                    self.module_calls.push(site);
                }
            }
            Owner::Symbol(idx) => {
                if self.seen_calls[idx].insert(site.name.clone()) {
                    self.symbols[idx].local_calls.push(site);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Imports
    // -----------------------------------------------------------------------

    fn record_import(&mut self, node: Node<'_>) {
        let line = node.start_position().row + 1;
        let mut cursor = node.walk();
        let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
        for name in names {
            match name.kind() {
                "dotted_name" => {
                    let module = self.text(name);
                    let head = module.split('.').next().unwrap_or(&module).to_string();
                    self.imports.push(ImportBinding {
                        alias: head.clone(),
                        target: head,
                        module,
                        line,
                    });
                }
                "aliased_import" => {
                    let (Some(target), Some(alias)) = (
                        name.child_by_field_name("name"),
                        name.child_by_field_name("alias"),
                    ) else {
                        continue;
                    };
                    let module = self.text(target);
                    self.imports.push(ImportBinding {
                        alias: self.text(alias),
                        target: module.clone(),
                        module,
                        line,
                    });
                }
                _ => {}
            }
        }
    }

    fn record_from_import(&mut self, node: Node<'_>) {
        let line = node.start_position().row + 1;
        let Some(module_node) = node.child_by_field_name("module_name") else {
            return;
        };
        let module = match module_node.kind() {
            "relative_import" => self.resolve_relative(module_node),
            _ => self.text(module_node),
        };

        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        if children.iter().any(|c| c.kind() == "wildcard_import") {
            self.imports.push(ImportBinding {
                alias: "*".to_string(),
                target: module.clone(),
                module,
                line,
            });
            return;
        }

        let mut cursor = node.walk();
        let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
        for name in names {
            let (imported, alias) = match name.kind() {
                "aliased_import" => {
                    let (Some(target), Some(alias)) = (
                        name.child_by_field_name("name"),
                        name.child_by_field_name("alias"),
                    ) else {
                        continue;
                    };
                    (self.text(target), self.text(alias))
                }
                _ => {
                    let imported = self.text(name);
                    let alias = imported.rsplit('.').next().unwrap_or(&imported).to_string();
                    (imported, alias)
                }
            };
            self.imports.push(ImportBinding {
                alias,
                target: qualify(&module, &imported),
                module: module.clone(),
                line,
            });
        }
    }

    /// `from ..pkg import x` inside `a.b.c` resolves to `a.pkg`.
    fn resolve_relative(&self, node: Node<'_>) -> String {
        let mut dots = 0usize;
        let mut suffix = String::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "import_prefix" => dots = self.text(child).chars().filter(|c| *c == '.').count(),
                "dotted_name" => suffix = self.text(child),
                _ => {}
            }
        }
        let mut parts: Vec<&str> = if self.package.is_empty() {
            Vec::new()
        } else {
            self.package.split('.').collect()
        };
        for _ in 1..dots {
            parts.pop();
        }
        let base = parts.join(".");
        qualify(&base, &suffix).trim_end_matches('.').to_string()
    }

    fn function_signature(&self, node: Node<'_>, name: &str) -> String {
        let is_async = node
            .child(0)
            .map(|c| c.kind() == "async")
            .unwrap_or(false);
        let keyword = if is_async { "async def" } else { "def" };
        let params = node
            .child_by_field_name("parameters")
            .map(|p| tighten_parens(&self.text(p)))
            .unwrap_or_else(|| "()".to_string());
        match node.child_by_field_name("return_type") {
            Some(ret) => format!(
                "{keyword} {name}{params} -> {}",
                collapse_whitespace(&self.text(ret))
            ),
            None => format!("{keyword} {name}{params}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

fn node_text(node: Node<'_>, source: &[u8]) -> String {
    node.utf8_text(source).unwrap_or_default().to_string()
}

/// Dotted callee name for identifiers and attribute chains; `None` otherwise.
fn dotted_name(node: Node<'_>, source: &[u8]) -> Option<String> {
    match node.kind() {
        "identifier" => Some(node_text(node, source)),
        "attribute" => {
            let object = dotted_name(node.child_by_field_name("object")?, source)?;
            let attr = node_text(node.child_by_field_name("attribute")?, source);
            Some(format!("{object}.{attr}"))
        }
        _ => None,
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn tighten_parens(text: &str) -> String {
    collapse_whitespace(text)
        .replace("( ", "(")
        .replace(" )", ")")
        .replace(",)", ")")
}

/// Docstring of a module or block: its first non-comment statement, when that
/// statement is a bare string literal.
fn block_docstring(block: Node<'_>, source: &[u8]) -> Option<String> {
    let mut cursor = block.walk();
    let first = block
        .named_children(&mut cursor)
        .find(|c| c.kind() != "comment")?;
    if first.kind() != "expression_statement" || first.named_child_count() != 1 {
        return None;
    }
    let expr = first.named_child(0)?;
    if expr.kind() != "string" {
        return None;
    }
    clean_docstring(&node_text(expr, source))
}

/// Strip prefix and quotes from a string literal and dedent its body.
pub fn clean_docstring(literal: &str) -> Option<String> {
    let body = literal.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    let body = ["\"\"\"", "'''", "\"", "'"]
        .iter()
        .find_map(|q| {
            body.strip_prefix(q)
                .map(|rest| rest.strip_suffix(q).unwrap_or(rest))
        })
        .unwrap_or(body);

    let lines: Vec<&str> = body.lines().collect();
    let first = lines.first().map(|l| l.trim()).unwrap_or("");
    let indent = lines
        .iter()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.chars().take_while(|c| c.is_whitespace()).count())
        .min()
        .unwrap_or(0);

    let mut out: Vec<String> = vec![first.to_string()];
    for line in lines.iter().skip(1) {
        let dedented: String = line.chars().skip(indent).collect();
        out.push(dedented.trim_end().to_string());
    }
    while out.last().map(|l| l.is_empty()).unwrap_or(false) {
        out.pop();
    }
    while out.first().map(|l| l.is_empty()).unwrap_or(false) {
        out.remove(0);
    }
    let cleaned = out.join("\n");
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> ParsePatterns {
        IndexConfig::default().parse_patterns().unwrap()
    }

    fn parse(path: &str, source: &str) -> ParsedFile {
        parse_source(path, source, &patterns()).unwrap()
    }

    fn symbol<'p>(file: &'p ParsedFile, qualified: &str) -> &'p SymbolDefinition {
        file.symbols
            .iter()
            .find(|s| s.qualified_name == qualified)
            .unwrap_or_else(|| panic!("missing symbol {qualified}"))
    }

    fn call_names(symbol: &SymbolDefinition) -> Vec<&str> {
        symbol.local_calls.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_module_path_from_file() {
        assert_eq!(module_path_from_file("app/main/views.py"), "app.main.views");
        assert_eq!(module_path_from_file("app/__init__.py"), "app");
        assert_eq!(module_path_from_file("app/main/__init__.py"), "app.main");
        assert_eq!(module_path_from_file("flasky.py"), "flasky");
        assert_eq!(module_path_from_file("__init__.py"), "");
    }

    #[test]
    fn test_functions_classes_methods() {
        let file = parse(
            "pkg/shapes.py",
            concat!(
                "class Greeter(Base):\n",
                "    def greet(self):\n        self.say()\n\n",
                "    def say(self):\n        return 'hi'\n\n",
                "def top(a, b=1) -> int:\n    return a\n",
            ),
        );
        assert_eq!(file.module, "pkg.shapes");
        let class = symbol(&file, "pkg.shapes.Greeter");
        assert_eq!(class.kind, DefinitionKind::Class);
        assert_eq!(class.signature.as_deref(), Some("class Greeter(Base)"));
        assert_eq!((class.start_line, class.end_line), (1, 6));

        let greet = symbol(&file, "pkg.shapes.Greeter.greet");
        assert_eq!(greet.kind, DefinitionKind::Method);
        assert_eq!(greet.owner_class.as_deref(), Some("pkg.shapes.Greeter"));
        assert_eq!(greet.parent.as_deref(), Some("pkg.shapes.Greeter"));
        assert_eq!(call_names(greet), vec!["self.say"]);

        let top = symbol(&file, "pkg.shapes.top");
        assert_eq!(top.kind, DefinitionKind::Function);
        assert_eq!(top.signature.as_deref(), Some("def top(a, b=1) -> int"));
        assert_eq!(top.parent, None);
    }

    #[test]
    fn test_async_signature() {
        let file = parse("svc.py", "async def fetch(\n    url,\n    timeout=3,\n):\n    pass\n");
        let fetch = symbol(&file, "svc.fetch");
        assert_eq!(fetch.signature.as_deref(), Some("async def fetch(url, timeout=3)"));
    }

    #[test]
    fn test_docstrings() {
        let file = parse(
            "doc.py",
            concat!(
                "\"\"\"Module doc.\"\"\"\n\n",
                "def f():\n    \"\"\"Summary line.\n\n    More detail.\n    \"\"\"\n",
                "    return 1\n",
            ),
        );
        assert_eq!(file.docstring.as_deref(), Some("Module doc."));
        let f = symbol(&file, "doc.f");
        assert_eq!(f.docstring.as_deref(), Some("Summary line.\n\nMore detail."));
    }

    #[test]
    fn test_imports_and_aliases() {
        let file = parse(
            "main.py",
            concat!(
                "import os\nimport pkg.foo as foo\nimport a.b.c\n",
                "from pkg import helper as helper_alias\n",
                "from pkg.util import tool\nfrom x import *\n",
            ),
        );
        let by_alias = |alias: &str| {
            file.imports
                .iter()
                .find(|i| i.alias == alias)
                .unwrap_or_else(|| panic!("missing alias {alias}"))
        };
        assert_eq!(by_alias("os").target, "os");
        assert_eq!(by_alias("foo").target, "pkg.foo");
        assert_eq!(by_alias("a").target, "a");
        assert_eq!(by_alias("a").module, "a.b.c");
        assert_eq!(by_alias("helper_alias").target, "pkg.helper");
        assert_eq!(by_alias("helper_alias").module, "pkg");
        assert_eq!(by_alias("tool").target, "pkg.util.tool");
        assert_eq!(by_alias("*").module, "x");
    }

    #[test]
    fn test_relative_imports() {
        let file = parse(
            "app/main/views.py",
            "from . import forms\nfrom ..models import User\nfrom .errors import handler as h\n",
        );
        let targets: Vec<(&str, &str)> = file
            .imports
            .iter()
            .map(|i| (i.alias.as_str(), i.target.as_str()))
            .collect();
        assert_eq!(
            targets,
            vec![
                ("forms", "app.main.forms"),
                ("User", "app.models.User"),
                ("h", "app.main.errors.handler"),
            ]
        );

        let init = parse("app/__init__.py", "from .main import main as main_blueprint\n");
        assert_eq!(init.imports[0].target, "app.main.main");
        assert_eq!(init.imports[0].module, "app.main");
    }

    #[test]
    fn test_calls_are_deduped_and_scoped() {
        let file = parse(
            "calls.py",
            concat!(
                "setup()\n\n",
                "def outer():\n    helper()\n    helper()\n    obj.method().chain()\n",
                "    def inner():\n        deep()\n    return inner()\n",
            ),
        );
        assert_eq!(
            file.module_calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["setup"]
        );
        let outer = symbol(&file, "calls.outer");
        assert_eq!(call_names(outer), vec!["helper", "obj.method", "inner"]);
        let inner = symbol(&file, "calls.outer.inner");
        assert_eq!(inner.parent.as_deref(), Some("calls.outer"));
        assert_eq!(inner.kind, DefinitionKind::Function);
        assert_eq!(call_names(inner), vec!["deep"]);
    }

    #[test]
    fn test_route_decorator_marks_blueprint() {
        let file = parse(
            "app/main/views.py",
            concat!(
                "from . import main\n\n",
                "@main.route('/')\ndef index():\n    return render_template('index.html')\n\n",
                "@login_required\ndef other():\n    pass\n",
            ),
        );
        let index = symbol(&file, "app.main.views.index");
        assert_eq!(index.kind, DefinitionKind::Blueprint);
        assert_eq!(index.decorators, vec!["main.route('/')"]);
        assert_eq!(index.start_line, 3);
        assert_eq!(call_names(index), vec!["render_template"]);
        assert_eq!(symbol(&file, "app.main.views.other").kind, DefinitionKind::Function);
        assert!(file.module_calls.iter().any(|c| c.name == "main.route"));
    }

    #[test]
    fn test_blueprint_assignment() {
        let file = parse(
            "app/main/__init__.py",
            "from flask import Blueprint\n\nmain = Blueprint('main', __name__)\n",
        );
        let main = symbol(&file, "app.main.main");
        assert_eq!(main.kind, DefinitionKind::Blueprint);
        assert_eq!(main.name, "main");
        assert_eq!(main.start_line, 3);
        assert!(file.is_package);
    }

    #[test]
    fn test_syntax_error_reports_line() {
        let issue = parse_source("bad.py", "def broken(\n    return 2\n", &patterns()).unwrap_err();
        assert!(issue.line >= 1);
        assert!(!issue.message.is_empty());
    }

    #[test]
    fn test_python2_print_statement_is_accepted() {
        let file = parse("legacy.py", "print 'hi'\n\ndef f():\n    return 1\n");
        assert_eq!(symbol(&file, "legacy.f").kind, DefinitionKind::Function);
    }

    #[test]
    fn test_parse_files_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.py"), "def ok():\n    return 1\n").unwrap();
        std::fs::write(dir.path().join("bad.py"), "def broken(\n    return 2\n").unwrap();
        let paths = vec![
            "bad.py".to_string(),
            "good.py".to_string(),
            "gone.py".to_string(),
        ];
        let outcome = parse_files(dir.path(), &paths, &IndexConfig::default()).unwrap();
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.files[0].path, "good.py");
        let codes: Vec<WarningCode> = outcome.warnings.iter().map(|w| w.code).collect();
        assert_eq!(codes, vec![WarningCode::SyntaxError, WarningCode::UnreadableFile]);
    }

    #[test]
    fn test_non_utf8_source_is_decoded_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = b"def ok():\n    return '".to_vec();
        bytes.push(0xff);
        bytes.extend_from_slice(b"'\n");
        std::fs::write(dir.path().join("latin.py"), bytes).unwrap();
        let outcome =
            parse_files(dir.path(), &["latin.py".to_string()], &IndexConfig::default()).unwrap();
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.files[0].symbols[0].qualified_name, "latin.ok");
    }

    #[test]
    fn test_clean_docstring_variants() {
        assert_eq!(clean_docstring("'single'").as_deref(), Some("single"));
        assert_eq!(clean_docstring("r\"\"\"raw\"\"\"").as_deref(), Some("raw"));
        assert_eq!(clean_docstring("\"\"\"   \"\"\""), None);
    }
}
