//! Shared typed models used across acquisition, indexing, storage, and query layers.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Node identity
// ---------------------------------------------------------------------------

pub const FILE_ID_PREFIX: &str = "file:";
pub const SYMBOL_ID_PREFIX: &str = "symbol:";
pub const EXTERNAL_ID_PREFIX: &str = "external:";
pub const EXTERNAL_GROUP_ID_PREFIX: &str = "external-group:";

/// Node id for a file, derived from its repository-relative path.
pub fn file_id(rel_path: &str) -> String {
    format!("{FILE_ID_PREFIX}{rel_path}")
}

/// Node id for a definition, derived from its fully-qualified dotted name.
pub fn symbol_id(qualified_name: &str) -> String {
    format!("{SYMBOL_ID_PREFIX}{qualified_name}")
}

/// Node id for an unresolved call target.
pub fn external_id(name: &str) -> String {
    format!("{EXTERNAL_ID_PREFIX}{name}")
}

/// Node id for the synthetic node that stands for all externals of one file.
pub fn external_group_id(rel_path: &str) -> String {
    format!("{EXTERNAL_GROUP_ID_PREFIX}{rel_path}")
}

/// First 16 hex characters of the SHA-256 of `input`.
pub fn short_digest(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

/// Join a module path and a dotted name, tolerating the empty root module.
pub fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

// ---------------------------------------------------------------------------
// Repository identity
// ---------------------------------------------------------------------------

/// What to index. Supplied by the caller, never mutated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySpec {
    pub remote_url: Option<String>,
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    pub subdir: Option<String>,
    pub local_path: Option<PathBuf>,
}

impl RepositorySpec {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            local_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn remote(url: impl Into<String>, git_ref: Option<&str>) -> Self {
        Self {
            remote_url: Some(url.into()),
            git_ref: git_ref.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn with_subdir(mut self, subdir: impl Into<String>) -> Self {
        self.subdir = Some(subdir.into());
        self
    }

    /// Canonical textual form used for hashing.
    ///
    /// Local paths are canonicalized when they exist; remote URLs lose a
    /// trailing `/` or `.git`. The subdir participates because the index root
    /// differs per subdir.
    pub fn normalized(&self) -> String {
        let subdir = self
            .subdir
            .as_deref()
            .map(|s| s.trim().trim_matches('/'))
            .unwrap_or("");
        match (&self.local_path, &self.remote_url) {
            (Some(path), _) => {
                let resolved = canonical_or_absolute(path);
                let posix = resolved.to_string_lossy().replace('\\', "/");
                format!("local:{posix}|subdir:{subdir}")
            }
            (None, Some(url)) => {
                let url = url.trim().trim_end_matches('/');
                let url = url.strip_suffix(".git").unwrap_or(url);
                let git_ref = self.git_ref.as_deref().unwrap_or("HEAD").trim();
                format!("remote:{url}@{git_ref}|subdir:{subdir}")
            }
            (None, None) => format!("empty|subdir:{subdir}"),
        }
    }

    pub fn repo_id(&self) -> String {
        short_digest(&self.normalized())
    }
}

fn canonical_or_absolute(path: &Path) -> PathBuf {
    match std::fs::canonicalize(path) {
        Ok(p) => p,
        Err(_) if path.is_absolute() => path.to_path_buf(),
        Err(_) => std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf()),
    }
}

/// A resolved on-disk snapshot, produced by the acquirer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepositoryHandle {
    pub repo_id: String,
    pub root_path: PathBuf,
    pub commit_sha: Option<String>,
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCode {
    SyntaxError,
    OversizeSkipped,
    UnreadableFile,
    TruncatedScan,
}

impl WarningCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningCode::SyntaxError => "syntax_error",
            WarningCode::OversizeSkipped => "oversize_skipped",
            WarningCode::UnreadableFile => "unreadable_file",
            WarningCode::TruncatedScan => "truncated_scan",
        }
    }
}

impl fmt::Display for WarningCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-fatal problem recorded while scanning or parsing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub code: WarningCode,
    pub message: String,
    pub location: Option<Location>,
}

impl Warning {
    pub fn new(code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            location: None,
        }
    }

    pub fn at(mut self, path: &str, line: usize) -> Self {
        self.location = Some(Location {
            path: path.to_string(),
            start_line: line,
            end_line: line,
        });
        self
    }
}

// ---------------------------------------------------------------------------
// Scan result
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// Repository-relative POSIX paths, ascending.
    pub candidate_files: Vec<String>,
    pub total_files: usize,
    pub total_bytes: u64,
    /// Lower-cased extension without the dot; `""` for extensionless files.
    pub extension_counts: BTreeMap<String, usize>,
    pub warnings: Vec<Warning>,
}

// ---------------------------------------------------------------------------
// Graph model
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    File,
    Function,
    Class,
    Method,
    Blueprint,
    External,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::File => "file",
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Method => "method",
            SymbolKind::Blueprint => "blueprint",
            SymbolKind::External => "external",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SymbolKind::File => "Module",
            SymbolKind::Function => "Function",
            SymbolKind::Class => "Class",
            SymbolKind::Method => "Method",
            SymbolKind::Blueprint => "Blueprint",
            SymbolKind::External => "External reference",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Calls,
    Contains,
    Imports,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Calls => "calls",
            EdgeKind::Contains => "contains",
            EdgeKind::Imports => "imports",
        }
    }
}

/// How certain the resolver is of an edge's target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

/// A 1-based inclusive line span inside a repository-relative file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolNode {
    pub id: String,
    pub name: String,
    pub kind: SymbolKind,
    pub summary: String,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub location: Option<Location>,
}

impl SymbolNode {
    /// Placeholder node for a call target that resolved to nothing local.
    pub fn external(name: &str) -> Self {
        Self {
            id: external_id(name),
            name: name.to_string(),
            kind: SymbolKind::External,
            summary: format!("External reference {name}"),
            signature: None,
            docstring: None,
            location: None,
        }
    }

    pub fn path(&self) -> Option<&str> {
        self.location.as_ref().map(|loc| loc.path.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source_id: String,
    pub target_id: String,
    pub kind: EdgeKind,
    pub confidence: Confidence,
}

impl GraphEdge {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        kind: EdgeKind,
        confidence: Confidence,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            kind,
            confidence,
        }
    }
}

// ---------------------------------------------------------------------------
// Table of contents
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TocMode {
    #[default]
    Tree,
    Story,
}

impl FromStr for TocMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "tree" => Ok(TocMode::Tree),
            "story" => Ok(TocMode::Story),
            other => Err(format!("unknown toc mode: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub id: String,
    pub title: String,
    pub summary: String,
    /// Scope token accepted by the graph query.
    pub scope: String,
    pub files: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableOfContents {
    pub tree: Vec<TocEntry>,
    pub story: Vec<TocEntry>,
}

// ---------------------------------------------------------------------------
// Repo index
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_files: usize,
    pub total_bytes: u64,
    pub source_files: usize,
    pub parsed_files: usize,
    pub nodes: usize,
    pub edges: usize,
    pub warnings: usize,
    pub extension_counts: BTreeMap<String, usize>,
}

/// The unit of caching. Immutable once built; replaced wholesale on rebuild.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoIndex {
    pub repo_id: String,
    pub root_path: PathBuf,
    pub commit_sha: Option<String>,
    pub nodes: BTreeMap<String, SymbolNode>,
    pub edges: Vec<GraphEdge>,
    pub toc: TableOfContents,
    pub warnings: Vec<Warning>,
    pub stats: IndexStats,
    pub content_signature: String,
    /// Seconds since the Unix epoch.
    pub generated_at: u64,
}

impl RepoIndex {
    pub fn node(&self, id: &str) -> Option<&SymbolNode> {
        self.nodes.get(id)
    }
}
