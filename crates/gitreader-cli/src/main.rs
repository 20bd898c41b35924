//! gitreader CLI - index a Python source tree and query its symbol graph.
//!
//! Every subcommand builds (or reuses) the cached index for the selected
//! repository and prints JSON on stdout. Logs go to stderr and are filtered
//! by `GITREADER_LOG`, then `RUST_LOG`, defaulting to `info`.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use gitreader_core::models::TocMode;
use gitreader_core::query::graph::{query_graph, GraphOptions};
use gitreader_core::query::snippet::{query_snippet, SnippetSection};
use gitreader_core::query::toc::query_toc;
use gitreader_core::{build_or_load_index, IndexConfig, RepoIndex, RepositorySpec, Workspace};

/// Static symbol-graph indexer for Python source trees
///
/// Examples:
///   gitreader --path . index
///   gitreader --url https://github.com/miguelgrinberg/flasky toc --mode story
///   gitreader --path . graph --scope group:app --collapse-externals
///   gitreader --path . snippet --symbol symbol:app.create_app
#[derive(Parser, Debug)]
#[command(name = "gitreader")]
#[command(version)]
#[command(about, long_about = None)]
struct Cli {
    /// Cache directory holding cloned repositories and serialized indexes
    #[arg(long, global = true, env = "GITREADER_CACHE_DIR", default_value = ".gitreader-cache")]
    cache_dir: PathBuf,

    #[command(flatten)]
    repo: RepoArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct RepoArgs {
    /// Local directory to index
    #[arg(long, global = true, conflicts_with = "url")]
    path: Option<PathBuf>,

    /// Remote git URL to clone and index
    #[arg(long, global = true)]
    url: Option<String>,

    /// Branch, tag or commit to check out (remote only)
    #[arg(long = "ref", global = true, requires = "url")]
    git_ref: Option<String>,

    /// Index only this subdirectory of the repository
    #[arg(long, global = true)]
    subdir: Option<String>,
}

impl RepoArgs {
    fn to_spec(&self) -> Result<RepositorySpec> {
        let spec = match (&self.path, &self.url) {
            (Some(path), None) => RepositorySpec::local(path),
            (None, Some(url)) => RepositorySpec::remote(url, self.git_ref.as_deref()),
            _ => bail!("exactly one of --path or --url is required"),
        };
        Ok(match &self.subdir {
            Some(subdir) => spec.with_subdir(subdir),
            None => spec,
        })
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build or reuse the index and print its stats and warnings
    Index,

    /// Print the table of contents
    Toc {
        /// `tree` groups by top-level directory, `story` by role
        #[arg(long, default_value = "tree")]
        mode: TocMode,
    },

    /// Print the subgraph for a scope
    Graph {
        /// `full`, `group:<dir>` or `story:<category>`
        #[arg(long, default_value = "full")]
        scope: String,

        /// Merge external nodes into one node per file
        #[arg(long)]
        collapse_externals: bool,
    },

    /// Print the source lines behind a symbol
    Snippet {
        /// Node id, e.g. `symbol:app.create_app` or `file:app/__init__.py`
        #[arg(long)]
        symbol: String,

        /// `symbol` for the symbol's own lines, `file` for the whole file
        #[arg(long, default_value = "symbol")]
        section: SnippetSection,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("GITREADER_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_index(cli: &Cli, config: &IndexConfig) -> Result<RepoIndex> {
    let spec = cli.repo.to_spec()?;
    let workspace = Workspace::open(&cli.cache_dir)
        .with_context(|| format!("failed to open cache at {}", cli.cache_dir.display()))?;
    let index = build_or_load_index(&spec, &workspace, config)
        .with_context(|| format!("failed to index {}", spec.normalized()))?;
    Ok(index)
}

fn run(cli: &Cli) -> Result<serde_json::Value> {
    let config = IndexConfig::from_env();
    debug!(command = ?cli.command, cache_dir = %cli.cache_dir.display(), "running");
    let index = load_index(cli, &config)?;

    let value = match &cli.command {
        Command::Index => json!({
            "repo_id": index.repo_id,
            "root_path": index.root_path,
            "commit_sha": index.commit_sha,
            "content_signature": index.content_signature,
            "generated_at": index.generated_at,
            "stats": index.stats,
            "warnings": index.warnings,
        }),
        Command::Toc { mode } => serde_json::to_value(query_toc(&index, *mode))?,
        Command::Graph {
            scope,
            collapse_externals,
        } => {
            let options = GraphOptions {
                collapse_externals: *collapse_externals,
            };
            serde_json::to_value(query_graph(&index, scope, options))?
        }
        Command::Snippet { symbol, section } => {
            let snippet = query_snippet(&index, symbol, *section, &config)
                .with_context(|| format!("no snippet for {symbol}"))?;
            serde_json::to_value(snippet)?
        }
    };
    Ok(value)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let output = run(&cli)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
