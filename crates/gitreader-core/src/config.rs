//! Indexer configuration: scan limits, parse patterns, snippet bounds.
//!
//! Defaults are tuned for small-to-medium web application repositories.
//! `IndexConfig::from_env` overlays `GITREADER_*` environment variables.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{GitReaderError, GitReaderResult};
use crate::indexer::parser::ParsePatterns;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 512 * 1024;
pub const DEFAULT_MAX_FILES: usize = 5000;
pub const DEFAULT_SNIPPET_LINES: usize = 200;
pub const DEFAULT_FALLBACK_CONTEXT: usize = 40;
pub const DEFAULT_WORKERS: usize = 4;

pub const DEFAULT_ROUTE_DECORATOR_PATTERN: &str = concat!(
    r"^[A-Za-z_][A-Za-z0-9_.]*\.",
    r"(route|get|post|put|patch|delete|errorhandler|app_errorhandler",
    r"|before_request|before_app_request|after_request|teardown_request)$",
);
pub const DEFAULT_BLUEPRINT_CONSTRUCTOR_PATTERN: &str =
    r"^([A-Za-z_][A-Za-z0-9_]*\.)?(Blueprint|APIRouter)$";

const DEFAULT_IGNORED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "__pycache__",
    "node_modules",
    ".venv",
    "venv",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    "build",
    "dist",
    ".eggs",
];

const DEFAULT_TEMPLATE_RENDER_NAMES: &[&str] =
    &["render_template", "render_template_string", "render", "TemplateResponse"];

/// How the content signature is computed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureMode {
    /// Commit id plus aggregate scan statistics.
    #[default]
    Aggregate,
    /// Aggregate signature plus a digest of every candidate file's bytes.
    Content,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub max_file_size: u64,
    /// `None` disables the cap.
    pub max_files: Option<usize>,
    pub snippet_lines: usize,
    pub fallback_context: usize,
    pub source_extensions: Vec<String>,
    pub ignored_dirs: Vec<String>,
    pub respect_gitignore: bool,
    pub workers: usize,
    pub route_decorator_pattern: String,
    pub blueprint_constructor_pattern: String,
    pub template_render_names: Vec<String>,
    pub signature_mode: SignatureMode,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_files: Some(DEFAULT_MAX_FILES),
            snippet_lines: DEFAULT_SNIPPET_LINES,
            fallback_context: DEFAULT_FALLBACK_CONTEXT,
            source_extensions: vec!["py".to_string()],
            ignored_dirs: DEFAULT_IGNORED_DIRS.iter().map(|s| s.to_string()).collect(),
            respect_gitignore: true,
            workers: DEFAULT_WORKERS,
            route_decorator_pattern: DEFAULT_ROUTE_DECORATOR_PATTERN.to_string(),
            blueprint_constructor_pattern: DEFAULT_BLUEPRINT_CONSTRUCTOR_PATTERN.to_string(),
            template_render_names: DEFAULT_TEMPLATE_RENDER_NAMES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            signature_mode: SignatureMode::default(),
        }
    }
}

impl IndexConfig {
    /// Defaults overlaid with `GITREADER_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Apply overrides from an arbitrary key lookup. Unparseable values are
    /// logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("GITREADER_MAX_FILE_SIZE") {
            match raw.trim().parse::<u64>() {
                Ok(value) => self.max_file_size = value,
                Err(_) => warn!("ignoring GITREADER_MAX_FILE_SIZE={raw:?}"),
            }
        }
        if let Some(raw) = lookup("GITREADER_MAX_FILES") {
            let value = raw.trim().to_lowercase();
            if matches!(value.as_str(), "" | "none" | "unlimited") {
                self.max_files = None;
            } else {
                match value.parse::<usize>() {
                    Ok(n) => self.max_files = Some(n),
                    Err(_) => warn!("ignoring GITREADER_MAX_FILES={raw:?}"),
                }
            }
        }
        if let Some(raw) = lookup("GITREADER_WORKERS") {
            match raw.trim().parse::<usize>() {
                Ok(value) => self.workers = value,
                Err(_) => warn!("ignoring GITREADER_WORKERS={raw:?}"),
            }
        }
        if let Some(raw) = lookup("GITREADER_SIGNATURE_MODE") {
            match raw.trim().to_lowercase().as_str() {
                "aggregate" => self.signature_mode = SignatureMode::Aggregate,
                "content" => self.signature_mode = SignatureMode::Content,
                _ => warn!("ignoring GITREADER_SIGNATURE_MODE={raw:?}"),
            }
        }
        if let Some(raw) = lookup("GITREADER_RESPECT_GITIGNORE") {
            self.respect_gitignore = is_truthy(&raw);
        }
    }

    pub fn validate(&self) -> GitReaderResult<()> {
        if self.max_file_size == 0 {
            return Err(GitReaderError::Config("max_file_size must be positive".into()));
        }
        if self.max_files == Some(0) {
            return Err(GitReaderError::Config("max_files must be positive".into()));
        }
        if self.snippet_lines == 0 || self.fallback_context == 0 {
            return Err(GitReaderError::Config(
                "snippet_lines and fallback_context must be positive".into(),
            ));
        }
        if self.source_extensions.is_empty() {
            return Err(GitReaderError::Config("source_extensions is empty".into()));
        }
        self.parse_patterns().map(|_| ())
    }

    pub fn parse_patterns(&self) -> GitReaderResult<ParsePatterns> {
        ParsePatterns::new(
            &self.route_decorator_pattern,
            &self.blueprint_constructor_pattern,
        )
        .map_err(|e| GitReaderError::Config(format!("invalid pattern: {e}")))
    }

    pub fn is_source_extension(&self, extension: &str) -> bool {
        self.source_extensions
            .iter()
            .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(extension))
    }

    pub fn is_ignored_dir(&self, name: &str) -> bool {
        self.ignored_dirs.iter().any(|d| d == name)
    }

    pub fn is_template_render_name(&self, name: &str) -> bool {
        let last = name.rsplit('.').next().unwrap_or(name);
        self.template_render_names.iter().any(|n| n == last)
    }
}

fn is_truthy(raw: &str) -> bool {
    let v = raw.trim().to_lowercase();
    !matches!(v.as_str(), "0" | "false" | "no" | "off")
}
