//! Indexing pipeline orchestration: acquire → scan → signature check →
//! parse → resolve → save.

use std::path::Path;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::config::{IndexConfig, SignatureMode};
use crate::errors::GitReaderResult;
use crate::indexer::acquire::{acquire, build_lock_key, resolve_scan_root};
use crate::indexer::callgraph::build_graph;
use crate::indexer::filesystem::scan_repo;
use crate::indexer::parser::parse_files;
use crate::models::{IndexStats, RepoIndex, RepositoryHandle, RepositorySpec, ScanResult};
use crate::store::Workspace;

/// Deterministic digest over commit identity and scan statistics.
///
/// In [`SignatureMode::Content`] every candidate file's path and bytes are
/// folded in as well.
pub fn compute_signature(
    commit_sha: Option<&str>,
    scan: &ScanResult,
    root: &Path,
    mode: SignatureMode,
) -> String {
    let extensions = scan
        .extension_counts
        .iter()
        .map(|(ext, count)| format!("{ext}={count}"))
        .collect::<Vec<_>>()
        .join(",");
    let payload = format!(
        "{}|{}|{}|{}|{}",
        commit_sha.unwrap_or(""),
        scan.total_files,
        scan.total_bytes,
        scan.candidate_files.len(),
        extensions
    );

    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    if mode == SignatureMode::Content {
        for rel_path in &scan.candidate_files {
            hasher.update(rel_path.as_bytes());
            hasher.update([0u8]);
            match std::fs::read(root.join(rel_path)) {
                Ok(bytes) => hasher.update(&bytes),
                Err(_) => hasher.update(b"<unreadable>"),
            }
            hasher.update([0u8]);
        }
    }
    format!("{:x}", hasher.finalize())
}

/// Return the cached index for `spec` when its signature still matches a
/// fresh scan; otherwise rebuild, cache and return it.
///
/// Holds the per-checkout build lock from acquisition to save.
pub fn build_or_load_index(
    spec: &RepositorySpec,
    workspace: &Workspace,
    config: &IndexConfig,
) -> GitReaderResult<RepoIndex> {
    config.validate()?;
    let started = Instant::now();

    // Held from acquisition through save; remote checkouts are rewritten in place.
    let lock = workspace.locks().lock_for(&build_lock_key(spec));
    let _guard = lock.lock();

    let handle = acquire(spec, &workspace.repos_dir())?;
    let scan_root = resolve_scan_root(&handle, spec)?;

    let scan = scan_repo(&scan_root, config)?;
    let signature = compute_signature(
        handle.commit_sha.as_deref(),
        &scan,
        &scan_root,
        config.signature_mode,
    );

    if let Some(cached) = workspace.store().load(&handle.repo_id) {
        if cached.content_signature == signature {
            info!(
                repo_id = %handle.repo_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "index cache hit"
            );
            return Ok(cached);
        }
        info!(repo_id = %handle.repo_id, "cached index is stale, rebuilding");
    }

    let index = build_index(&handle, &scan_root, scan, signature, config)?;
    match workspace.store().save(&index) {
        Ok(path) => info!(path = %path.display(), "index cached"),
        Err(e) => warn!(repo_id = %index.repo_id, error = %e, "failed to cache index"),
    }
    info!(
        repo_id = %index.repo_id,
        nodes = index.stats.nodes,
        edges = index.stats.edges,
        warnings = index.stats.warnings,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "index built"
    );
    Ok(index)
}

/// Parse and resolve a scanned tree into a fresh [`RepoIndex`].
pub fn build_index(
    handle: &RepositoryHandle,
    scan_root: &Path,
    scan: ScanResult,
    content_signature: String,
    config: &IndexConfig,
) -> GitReaderResult<RepoIndex> {
    let parsed = parse_files(scan_root, &scan.candidate_files, config)?;
    let graph = build_graph(&parsed.files, config);

    let mut warnings = scan.warnings;
    warnings.extend(parsed.warnings);

    let stats = IndexStats {
        total_files: scan.total_files,
        total_bytes: scan.total_bytes,
        source_files: scan.candidate_files.len(),
        parsed_files: parsed.files.len(),
        nodes: graph.nodes.len(),
        edges: graph.edges.len(),
        warnings: warnings.len(),
        extension_counts: scan.extension_counts,
    };

    let generated_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    Ok(RepoIndex {
        repo_id: handle.repo_id.clone(),
        root_path: scan_root.to_path_buf(),
        commit_sha: handle.commit_sha.clone(),
        nodes: graph.nodes,
        edges: graph.edges,
        toc: graph.toc,
        warnings,
        stats,
        content_signature,
        generated_at,
    })
}
