//! Filesystem scanning for indexing passes.
//!
//! Walks the scan root in a stable order, honours the root `.gitignore` and
//! the configured ignored directories, and applies the size and count caps.

use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::IndexConfig;
use crate::errors::GitReaderResult;
use crate::models::{ScanResult, Warning, WarningCode};

struct FileEntry {
    rel_path: String,
    size: u64,
}

/// Scan `root` for candidate source files.
///
/// Fails only when the root itself cannot be listed; everything below the
/// root degrades to warnings.
pub fn scan_repo(root: &Path, config: &IndexConfig) -> GitReaderResult<ScanResult> {
    std::fs::read_dir(root)?;

    let gitignore = if config.respect_gitignore {
        load_gitignore(root)
    } else {
        None
    };

    let mut result = ScanResult::default();
    let mut entries = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| keep_entry(entry, root, config, gitignore.as_ref()));

    for item in walker {
        let entry = match item {
            Ok(entry) => entry,
            Err(err) => {
                let rel = err
                    .path()
                    .map(|p| relative_posix(root, p))
                    .unwrap_or_default();
                warn!(path = %rel, error = %err, "unreadable entry skipped");
                result.warnings.push(unreadable(&rel, &err.to_string()));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let rel_path = relative_posix(root, entry.path());
        if let Some(gi) = gitignore.as_ref() {
            if gi.matched_path_or_any_parents(&rel_path, false).is_ignore() {
                continue;
            }
        }
        match entry.metadata() {
            Ok(meta) => entries.push(FileEntry {
                rel_path,
                size: meta.len(),
            }),
            Err(err) => {
                warn!(path = %rel_path, error = %err, "unreadable entry skipped");
                result.warnings.push(unreadable(&rel_path, &err.to_string()));
            }
        }
    }

    // Full-path order, independent of directory traversal order.
    entries.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));

    for entry in entries {
        let extension = extension_of(&entry.rel_path);
        let is_source = config.is_source_extension(&extension);

        if is_source {
            if let Some(max) = config.max_files {
                if result.candidate_files.len() >= max {
                    warn!(max, "scan truncated at file cap");
                    result.warnings.push(Warning::new(
                        WarningCode::TruncatedScan,
                        format!("Scan stopped after {max} source files"),
                    ));
                    break;
                }
            }
        }

        result.total_files += 1;
        result.total_bytes += entry.size;
        *result.extension_counts.entry(extension).or_insert(0) += 1;

        if !is_source {
            continue;
        }
        if entry.size > config.max_file_size {
            debug!(path = %entry.rel_path, size = entry.size, "oversize file skipped");
            result.warnings.push(
                Warning::new(
                    WarningCode::OversizeSkipped,
                    format!(
                        "Skipped {} ({} bytes > {} byte limit)",
                        entry.rel_path, entry.size, config.max_file_size
                    ),
                )
                .at(&entry.rel_path, 1),
            );
            continue;
        }
        result.candidate_files.push(entry.rel_path);
    }

    info!(
        root = %root.display(),
        total_files = result.total_files,
        candidates = result.candidate_files.len(),
        warnings = result.warnings.len(),
        "scan complete"
    );
    Ok(result)
}

fn keep_entry(
    entry: &DirEntry,
    root: &Path,
    config: &IndexConfig,
    gitignore: Option<&Gitignore>,
) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    if config.is_ignored_dir(&name) {
        return false;
    }
    match gitignore {
        Some(gi) => !gi
            .matched(relative_posix(root, entry.path()), true)
            .is_ignore(),
        None => true,
    }
}

fn load_gitignore(root: &Path) -> Option<Gitignore> {
    let path = root.join(".gitignore");
    if !path.is_file() {
        return None;
    }
    let mut builder = GitignoreBuilder::new(root);
    if let Some(err) = builder.add(&path) {
        warn!(error = %err, "partially invalid .gitignore");
    }
    match builder.build() {
        Ok(gi) => Some(gi),
        Err(err) => {
            warn!(error = %err, "ignoring unusable .gitignore");
            None
        }
    }
}

/// Lower-cased extension without the dot; `""` when there is none.
pub fn extension_of(rel_path: &str) -> String {
    Path::new(rel_path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn relative_posix(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn unreadable(rel_path: &str, detail: &str) -> Warning {
    Warning::new(
        WarningCode::UnreadableFile,
        format!("Could not read {rel_path}: {detail}"),
    )
    .at(rel_path, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_scan_collects_sorted_candidates() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.py", "x = 1\n");
        write(dir.path(), "a/z.py", "y = 2\n");
        write(dir.path(), "a.py", "z = 3\n");
        write(dir.path(), "README", "hi\n");
        write(dir.path(), "notes.md", "# notes\n");

        let scan = scan_repo(dir.path(), &IndexConfig::default()).unwrap();
        assert_eq!(scan.candidate_files, vec!["a.py", "a/z.py", "b.py"]);
        assert_eq!(scan.total_files, 5);
        assert_eq!(scan.extension_counts.get("py"), Some(&3));
        assert_eq!(scan.extension_counts.get(""), Some(&1));
        assert_eq!(scan.extension_counts.get("md"), Some(&1));
        assert!(scan.warnings.is_empty());
    }

    #[test]
    fn test_ignored_dirs_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "app.py", "");
        write(dir.path(), "__pycache__/app.py", "");
        write(dir.path(), "venv/lib/site.py", "");
        let scan = scan_repo(dir.path(), &IndexConfig::default()).unwrap();
        assert_eq!(scan.candidate_files, vec!["app.py"]);
        assert_eq!(scan.total_files, 1);
    }

    #[test]
    fn test_gitignore_respected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".gitignore", "generated/\nsecret.py\n");
        write(dir.path(), "app.py", "");
        write(dir.path(), "secret.py", "");
        write(dir.path(), "generated/out.py", "");
        let scan = scan_repo(dir.path(), &IndexConfig::default()).unwrap();
        assert_eq!(scan.candidate_files, vec!["app.py"]);

        let config = IndexConfig {
            respect_gitignore: false,
            ..IndexConfig::default()
        };
        let scan = scan_repo(dir.path(), &config).unwrap();
        assert_eq!(scan.candidate_files.len(), 3);
    }

    #[test]
    fn test_oversize_files_warn() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "big.py", &"x = 1\n".repeat(100));
        write(dir.path(), "small.py", "x = 1\n");
        let config = IndexConfig {
            max_file_size: 64,
            ..IndexConfig::default()
        };
        let scan = scan_repo(dir.path(), &config).unwrap();
        assert_eq!(scan.candidate_files, vec!["small.py"]);
        assert_eq!(scan.warnings.len(), 1);
        assert_eq!(scan.warnings[0].code, WarningCode::OversizeSkipped);
        assert_eq!(scan.total_files, 2);
    }

    #[test]
    fn test_max_files_truncates_deterministically() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["d.py", "a.py", "c.py", "b.py"] {
            write(dir.path(), name, "");
        }
        let config = IndexConfig {
            max_files: Some(2),
            ..IndexConfig::default()
        };
        let scan = scan_repo(dir.path(), &config).unwrap();
        assert_eq!(scan.candidate_files, vec!["a.py", "b.py"]);
        let truncated: Vec<_> = scan
            .warnings
            .iter()
            .filter(|w| w.code == WarningCode::TruncatedScan)
            .collect();
        assert_eq!(truncated.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subdir_warns_and_continues() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "");
        write(dir.path(), "locked/hidden.py", "");
        write(dir.path(), "z/ok.py", "");
        let locked = dir.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&locked).is_ok() {
            // Permission bits do not bind root.
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let scan = scan_repo(dir.path(), &IndexConfig::default());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        let scan = scan.unwrap();

        assert_eq!(scan.candidate_files, vec!["a.py", "z/ok.py"]);
        let unreadable: Vec<_> = scan
            .warnings
            .iter()
            .filter(|w| w.code == WarningCode::UnreadableFile)
            .collect();
        assert_eq!(unreadable.len(), 1);
        assert_eq!(unreadable[0].location.as_ref().unwrap().path, "locked");
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan_repo(&dir.path().join("missing"), &IndexConfig::default()).unwrap_err();
        assert_eq!(err.code(), "io_error");
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("pkg/Mod.PY"), "py");
        assert_eq!(extension_of("Makefile"), "");
        assert_eq!(extension_of(".gitignore"), "");
    }
}
