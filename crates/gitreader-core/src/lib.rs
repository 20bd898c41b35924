//! gitreader core library: static symbol-graph indexing for Python source
//! trees.
//!
//! A build runs acquire → scan → parse → resolve and caches the resulting
//! [`models::RepoIndex`] under a content signature, so repeated queries over
//! an unchanged tree reuse the cached graph. The query layer serves a table
//! of contents, scoped subgraphs and source snippets from a built index.

pub mod config;
pub mod errors;
pub mod indexer;
pub mod models;
pub mod query;
pub mod store;

pub use config::IndexConfig;
pub use errors::{GitReaderError, GitReaderResult};
pub use indexer::pipeline::build_or_load_index;
pub use models::{RepoIndex, RepositorySpec};
pub use store::Workspace;
