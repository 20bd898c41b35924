//! Repository acquisition: local working trees and cached remote checkouts.
//!
//! Remote repositories are cloned once into `repos_dir/<digest>` and fetched
//! on later requests; the requested ref is checked out detached.

use std::path::{Component, Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{Commit, Repository};
use tracing::{debug, info};

use crate::errors::{GitReaderError, GitReaderResult};
use crate::models::{short_digest, RepositoryHandle, RepositorySpec};

const FETCH_REFSPECS: &[&str] = &[
    "+refs/heads/*:refs/remotes/origin/*",
    "+refs/tags/*:refs/tags/*",
];

/// Resolve `spec` to an on-disk snapshot.
///
/// git failures surface as [`GitReaderError::Acquisition`].
pub fn acquire(spec: &RepositorySpec, repos_dir: &Path) -> GitReaderResult<RepositoryHandle> {
    validate_spec(spec)?;
    let repo_id = spec.repo_id();
    let handle = match (&spec.local_path, &spec.remote_url) {
        (Some(path), None) => acquire_local(repo_id, path),
        (None, Some(url)) => acquire_remote(repo_id, url, spec.git_ref.as_deref(), repos_dir),
        _ => Err(GitReaderError::Validation(
            "exactly one of local_path or remote_url is required".into(),
        )),
    };
    handle.map_err(|err| match err {
        GitReaderError::Git(e) => GitReaderError::Acquisition(e.message().to_string()),
        other => other,
    })
}

/// Key for the build lock guarding `spec`.
///
/// Remote specs that differ only by subdir share one checkout and so share
/// one key; local specs key on their `repo_id`.
pub fn build_lock_key(spec: &RepositorySpec) -> String {
    match (&spec.local_path, &spec.remote_url) {
        (None, Some(url)) => format!(
            "checkout:{}",
            checkout_name(url, spec.git_ref.as_deref())
        ),
        _ => spec.repo_id(),
    }
}

/// Directory the scanner should walk: the snapshot root or its subdir.
pub fn resolve_scan_root(
    handle: &RepositoryHandle,
    spec: &RepositorySpec,
) -> GitReaderResult<PathBuf> {
    let Some(subdir) = normalized_subdir(spec)? else {
        return Ok(handle.root_path.clone());
    };
    let root = handle.root_path.join(&subdir);
    if !root.is_dir() {
        return Err(GitReaderError::Validation(format!(
            "Subdir not found: {subdir}"
        )));
    }
    Ok(root)
}

fn validate_spec(spec: &RepositorySpec) -> GitReaderResult<()> {
    match (&spec.local_path, &spec.remote_url) {
        (Some(_), Some(_)) => {
            return Err(GitReaderError::Validation(
                "local_path and remote_url are mutually exclusive".into(),
            ))
        }
        (None, None) => {
            return Err(GitReaderError::Validation(
                "one of local_path or remote_url is required".into(),
            ))
        }
        (None, Some(url)) if url.trim().is_empty() => {
            return Err(GitReaderError::Validation("remote_url is empty".into()))
        }
        _ => {}
    }
    normalized_subdir(spec).map(|_| ())
}

fn normalized_subdir(spec: &RepositorySpec) -> GitReaderResult<Option<String>> {
    let Some(raw) = spec.subdir.as_deref() else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.starts_with('/') || Path::new(trimmed).is_absolute() {
        return Err(GitReaderError::Validation(format!(
            "subdir must be relative: {raw}"
        )));
    }
    let trimmed = trimmed.trim_end_matches('/');
    if Path::new(trimmed)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(GitReaderError::Validation(format!(
            "subdir may not contain '..': {raw}"
        )));
    }
    if trimmed.is_empty() || trimmed == "." {
        return Ok(None);
    }
    Ok(Some(trimmed.to_string()))
}

// ---------------------------------------------------------------------------
// Local
// ---------------------------------------------------------------------------

fn acquire_local(repo_id: String, path: &Path) -> GitReaderResult<RepositoryHandle> {
    if !path.is_dir() {
        return Err(GitReaderError::Acquisition(format!(
            "local path is not a directory: {}",
            path.display()
        )));
    }
    let root_path = path.to_path_buf();
    let commit_sha = local_head_commit(&root_path);
    debug!(path = %root_path.display(), commit = ?commit_sha, "acquired local repository");
    Ok(RepositoryHandle {
        repo_id,
        root_path,
        commit_sha,
    })
}

/// HEAD commit of the enclosing git repository, if any.
fn local_head_commit(path: &Path) -> Option<String> {
    let repo = Repository::discover(path).ok()?;
    let head = repo.head().ok()?;
    let commit = head.peel_to_commit().ok()?;
    Some(commit.id().to_string())
}

// ---------------------------------------------------------------------------
// Remote
// ---------------------------------------------------------------------------

fn normalized_ref(git_ref: Option<&str>) -> Option<&str> {
    git_ref.map(str::trim).filter(|r| !r.is_empty())
}

/// Directory name of the cached checkout for `url` at `git_ref`.
fn checkout_name(url: &str, git_ref: Option<&str>) -> String {
    short_digest(&format!(
        "{}@{}",
        url.trim(),
        normalized_ref(git_ref).unwrap_or("HEAD")
    ))
}

fn acquire_remote(
    repo_id: String,
    url: &str,
    git_ref: Option<&str>,
    repos_dir: &Path,
) -> GitReaderResult<RepositoryHandle> {
    let url = url.trim();
    let git_ref = normalized_ref(git_ref);
    std::fs::create_dir_all(repos_dir)?;
    let checkout_dir = repos_dir.join(checkout_name(url, git_ref));

    // Clones are renamed into place whole, so `.git` means a finished clone.
    let repo = if checkout_dir.join(".git").exists() {
        let repo = Repository::open(&checkout_dir)?;
        fetch_origin(&repo)?;
        repo
    } else {
        clone_into(url, repos_dir, &checkout_dir)?
    };

    let commit = resolve_ref(&repo, git_ref)?;
    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.checkout_tree(commit.as_object(), Some(&mut checkout))?;
    repo.set_head_detached(commit.id())?;

    let commit_sha = commit.id().to_string();
    info!(
        url,
        git_ref = git_ref.unwrap_or("HEAD"),
        commit = %commit_sha,
        "checked out remote repository"
    );
    Ok(RepositoryHandle {
        repo_id,
        root_path: checkout_dir,
        commit_sha: Some(commit_sha),
    })
}

/// Clone into a staging directory under `repos_dir`, then rename it to
/// `checkout_dir`. A failed clone only removes its own staging directory.
fn clone_into(url: &str, repos_dir: &Path, checkout_dir: &Path) -> GitReaderResult<Repository> {
    let staging = tempfile::Builder::new()
        .prefix(".clone-")
        .tempdir_in(repos_dir)?;
    info!(url, dest = %checkout_dir.display(), "cloning repository");
    if let Err(e) = Repository::clone(url, staging.path()) {
        return Err(GitReaderError::Acquisition(format!(
            "clone of {url} failed: {e}"
        )));
    }

    match std::fs::rename(staging.path(), checkout_dir) {
        Ok(()) => {}
        // Another process finished the same clone first; keep theirs.
        Err(_) if checkout_dir.join(".git").exists() => {
            debug!(dest = %checkout_dir.display(), "checkout already in place");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(Repository::open(checkout_dir)?)
}

fn fetch_origin(repo: &Repository) -> GitReaderResult<()> {
    let mut remote = repo.find_remote("origin")?;
    debug!(url = remote.url().unwrap_or(""), "fetching origin");
    remote.fetch(FETCH_REFSPECS, None, None)?;
    Ok(())
}

fn resolve_ref<'r>(repo: &'r Repository, git_ref: Option<&str>) -> GitReaderResult<Commit<'r>> {
    let candidates: Vec<String> = match git_ref {
        Some(r) => vec![
            format!("refs/remotes/origin/{r}"),
            format!("refs/tags/{r}"),
            r.to_string(),
        ],
        None => vec!["refs/remotes/origin/HEAD".to_string(), "HEAD".to_string()],
    };
    for spec in &candidates {
        if let Ok(object) = repo.revparse_single(spec) {
            if let Ok(commit) = object.peel_to_commit() {
                return Ok(commit);
            }
        }
    }
    Err(GitReaderError::Acquisition(format!(
        "ref not found: {}",
        git_ref.unwrap_or("HEAD")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Signature;

    fn commit_file(repo: &Repository, name: &str, content: &str) -> git2::Oid {
        let workdir = repo.workdir().unwrap().to_path_buf();
        std::fs::write(workdir.join(name), content).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = Signature::now("Test", "test@example.com").unwrap();
        let parents: Vec<Commit> = match repo.head() {
            Ok(head) => vec![head.peel_to_commit().unwrap()],
            Err(_) => vec![],
        };
        let parent_refs: Vec<&Commit> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, "commit", &tree, &parent_refs)
            .unwrap()
    }

    #[test]
    fn test_rejects_both_sources() {
        let mut spec = RepositorySpec::local("/tmp");
        spec.remote_url = Some("https://example.com/repo".into());
        let err = acquire(&spec, Path::new("/tmp")).unwrap_err();
        assert!(matches!(err, GitReaderError::Validation(_)));
    }

    #[test]
    fn test_rejects_no_source() {
        let err = acquire(&RepositorySpec::default(), Path::new("/tmp")).unwrap_err();
        assert!(matches!(err, GitReaderError::Validation(_)));
    }

    #[test]
    fn test_missing_local_path_is_acquisition_error() {
        let dir = tempfile::tempdir().unwrap();
        let spec = RepositorySpec::local(dir.path().join("nope"));
        let err = acquire(&spec, dir.path()).unwrap_err();
        assert_eq!(err.code(), "acquisition_error");
    }

    #[test]
    fn test_subdir_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        for bad in ["../etc", "/abs", "a/../../b"] {
            let spec = RepositorySpec::local(dir.path()).with_subdir(bad);
            let err = acquire(&spec, dir.path()).unwrap_err();
            assert!(matches!(err, GitReaderError::Validation(_)), "{bad}");
        }
    }

    #[test]
    fn test_local_without_git_has_no_commit() {
        let dir = tempfile::tempdir().unwrap();
        let spec = RepositorySpec::local(dir.path());
        let handle = acquire(&spec, dir.path()).unwrap();
        assert_eq!(handle.commit_sha, None);
        assert_eq!(handle.repo_id, spec.repo_id());
    }

    #[test]
    fn test_local_git_repo_reports_head() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let oid = commit_file(&repo, "main.py", "x = 1\n");
        let handle = acquire(&RepositorySpec::local(dir.path()), dir.path()).unwrap();
        assert_eq!(handle.commit_sha, Some(oid.to_string()));
    }

    #[test]
    fn test_resolve_scan_root_subdir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("app")).unwrap();
        let spec = RepositorySpec::local(dir.path()).with_subdir("app/");
        let handle = acquire(&spec, dir.path()).unwrap();
        let root = resolve_scan_root(&handle, &spec).unwrap();
        assert!(root.ends_with("app"));

        let missing = RepositorySpec::local(dir.path()).with_subdir("docs");
        let err = resolve_scan_root(&handle, &missing).unwrap_err();
        assert_eq!(err.to_string(), "Validation error: Subdir not found: docs");
    }

    #[test]
    fn test_remote_clone_and_refetch() {
        let upstream_dir = tempfile::tempdir().unwrap();
        let upstream = Repository::init(upstream_dir.path()).unwrap();
        let first = commit_file(&upstream, "app.py", "def a():\n    pass\n");
        let branch = upstream.head().unwrap().shorthand().unwrap().to_string();

        let cache = tempfile::tempdir().unwrap();
        let url = upstream_dir.path().to_string_lossy().to_string();
        let spec = RepositorySpec::remote(url.clone(), Some(&branch));
        let handle = acquire(&spec, cache.path()).unwrap();
        assert_eq!(handle.commit_sha, Some(first.to_string()));
        assert!(handle.root_path.join("app.py").is_file());

        let second = commit_file(&upstream, "app.py", "def b():\n    pass\n");
        let again = acquire(&spec, cache.path()).unwrap();
        assert_eq!(again.root_path, handle.root_path);
        assert_eq!(again.commit_sha, Some(second.to_string()));
    }

    #[test]
    fn test_broken_checkout_is_acquisition_error() {
        let cache = tempfile::tempdir().unwrap();
        let url = "https://example.com/org/repo";
        let checkout = cache.path().join(checkout_name(url, None));
        std::fs::create_dir_all(checkout.join(".git")).unwrap();

        let err = acquire(&RepositorySpec::remote(url, None), cache.path()).unwrap_err();
        assert!(matches!(err, GitReaderError::Acquisition(_)), "{err:?}");
    }

    #[test]
    fn test_build_lock_key_shares_checkout_across_subdirs() {
        let spec = RepositorySpec::remote("https://example.com/org/repo", Some("main"));
        let sub = spec.clone().with_subdir("app");
        assert_ne!(spec.repo_id(), sub.repo_id());
        assert_eq!(build_lock_key(&spec), build_lock_key(&sub));
        assert_ne!(
            build_lock_key(&spec),
            build_lock_key(&RepositorySpec::remote("https://example.com/org/repo", None))
        );

        let local = RepositorySpec::local("/srv/app");
        assert_eq!(build_lock_key(&local), local.repo_id());
    }

    #[test]
    fn test_failed_clone_leaves_no_staging_dir() {
        let cache = tempfile::tempdir().unwrap();
        let url = cache.path().join("no-such-upstream").to_string_lossy().to_string();
        let err = acquire(&RepositorySpec::remote(url, None), cache.path()).unwrap_err();
        assert!(matches!(err, GitReaderError::Acquisition(_)));
        let remaining: Vec<_> = std::fs::read_dir(cache.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert!(remaining.is_empty(), "{remaining:?}");
    }

    #[test]
    fn test_remote_unknown_ref() {
        let upstream_dir = tempfile::tempdir().unwrap();
        let upstream = Repository::init(upstream_dir.path()).unwrap();
        commit_file(&upstream, "app.py", "x = 1\n");
        let cache = tempfile::tempdir().unwrap();
        let url = upstream_dir.path().to_string_lossy().to_string();
        let spec = RepositorySpec::remote(url, Some("no-such-branch"));
        let err = acquire(&spec, cache.path()).unwrap_err();
        assert!(matches!(err, GitReaderError::Acquisition(_)));
    }
}
