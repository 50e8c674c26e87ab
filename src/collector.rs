//! File collection — the ordered, escape-protected walk of a skill root.
//!
//! Symlinks are never followed, and every candidate is re-verified to resolve
//! inside the canonical root. Either check alone can be bypassed on some
//! filesystems; both together close the escape.

use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};

// ── File-access capability ───────────────────────────────────────────────────

/// Minimal file-access surface the engine consumes. None of the operations
/// interpret shell syntax; all take plain paths.
pub trait FileAccess: Send + Sync {
    fn stat(&self, path: &Path) -> io::Result<Metadata>;
    /// Must NOT follow symlinks.
    fn lstat(&self, path: &Path) -> io::Result<Metadata>;
    fn realpath(&self, path: &Path) -> io::Result<PathBuf>;
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// The real filesystem.
pub struct OsFs;

impl FileAccess for OsFs {
    fn stat(&self, path: &Path) -> io::Result<Metadata> {
        std::fs::metadata(path)
    }

    fn lstat(&self, path: &Path) -> io::Result<Metadata> {
        std::fs::symlink_metadata(path)
    }

    fn realpath(&self, path: &Path) -> io::Result<PathBuf> {
        std::fs::canonicalize(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        entries.sort();
        Ok(entries)
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

// ── Collection ───────────────────────────────────────────────────────────────

/// One regular file reachable from the root.
#[derive(Debug, Clone)]
pub struct CollectedFile {
    /// Path as walked (root-joined, not canonicalized).
    pub path: PathBuf,
    /// Path relative to the root; the only form that may enter the checksum.
    pub relative: PathBuf,
}

/// Package-manager cache directory excluded from every walk.
const DEPENDENCY_CACHE_DIR: &str = "node_modules";

/// Walk `root` and return its regular files in lexicographic relative-path
/// order. Dot-prefixed entries, the dependency cache, symlinks, and anything
/// resolving outside the canonical root are skipped silently (logged at
/// debug).
pub fn collect_files(fs: &dyn FileAccess, root: &Path) -> Vec<CollectedFile> {
    let Ok(canonical_root) = fs.realpath(root) else {
        tracing::debug!("cannot canonicalize root {}", root.display());
        return Vec::new();
    };

    let mut files = Vec::new();
    walk(fs, root, root, &canonical_root, &mut files);
    files
}

fn walk(
    fs: &dyn FileAccess,
    dir: &Path,
    root: &Path,
    canonical_root: &Path,
    out: &mut Vec<CollectedFile>,
) {
    let entries = match fs.read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("skipping unreadable directory {}: {e}", dir.display());
            return;
        }
    };

    for entry in entries {
        let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
            tracing::debug!("skipping non-UTF-8 entry under {}", dir.display());
            continue;
        };
        if name.starts_with('.') || name == DEPENDENCY_CACHE_DIR {
            continue;
        }

        let meta = match fs.lstat(&entry) {
            Ok(meta) => meta,
            Err(e) => {
                tracing::debug!("skipping {}: {e}", entry.display());
                continue;
            }
        };

        if meta.file_type().is_symlink() {
            tracing::debug!("skipping symlink {}", entry.display());
            continue;
        }

        if meta.is_dir() {
            walk(fs, &entry, root, canonical_root, out);
            continue;
        }

        if !meta.is_file() {
            continue;
        }

        // Second line of defense: the resolved path must still sit inside
        // the canonical root.
        match fs.realpath(&entry) {
            Ok(resolved) if resolved.starts_with(canonical_root) => {}
            Ok(resolved) => {
                tracing::debug!(
                    "skipping {}: resolves outside root ({})",
                    entry.display(),
                    resolved.display()
                );
                continue;
            }
            Err(e) => {
                tracing::debug!("skipping {}: {e}", entry.display());
                continue;
            }
        }

        let Ok(relative) = entry.strip_prefix(root) else {
            continue;
        };
        out.push(CollectedFile {
            relative: relative.to_path_buf(),
            path: entry,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, content).expect("write file");
    }

    #[test]
    fn collects_files_in_relative_path_order() {
        let dir = TempDir::new().expect("tempdir");
        touch(&dir.path().join("zeta.js"), "z");
        touch(&dir.path().join("alpha.js"), "a");
        touch(&dir.path().join("lib/util.js"), "u");

        let files = collect_files(&OsFs, dir.path());
        let rels: Vec<_> = files
            .iter()
            .map(|f| f.relative.to_string_lossy().into_owned())
            .collect();
        assert_eq!(rels, vec!["alpha.js", "lib/util.js", "zeta.js"]);
    }

    #[test]
    fn skips_dotfiles_and_dependency_cache() {
        let dir = TempDir::new().expect("tempdir");
        touch(&dir.path().join(".env"), "SECRET=1");
        touch(&dir.path().join(".git/config"), "[core]");
        touch(&dir.path().join("node_modules/pkg/index.js"), "x");
        touch(&dir.path().join("index.js"), "ok");

        let files = collect_files(&OsFs, dir.path());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative, Path::new("index.js"));
    }

    #[cfg(unix)]
    #[test]
    fn skips_symlinks_even_when_target_is_inside() {
        let dir = TempDir::new().expect("tempdir");
        touch(&dir.path().join("real.js"), "x");
        std::os::unix::fs::symlink(dir.path().join("real.js"), dir.path().join("alias.js"))
            .expect("symlink");

        let files = collect_files(&OsFs, dir.path());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative, Path::new("real.js"));
    }

    #[cfg(unix)]
    #[test]
    fn skips_symlink_escaping_the_root() {
        let outside = TempDir::new().expect("tempdir");
        touch(&outside.path().join("secret.txt"), "top secret");

        let dir = TempDir::new().expect("tempdir");
        touch(&dir.path().join("index.js"), "ok");
        std::os::unix::fs::symlink(
            outside.path().join("secret.txt"),
            dir.path().join("stolen.txt"),
        )
        .expect("symlink");

        let files = collect_files(&OsFs, dir.path());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative, Path::new("index.js"));
    }

    #[test]
    fn unreadable_root_yields_empty() {
        let files = collect_files(&OsFs, Path::new("/nonexistent/skillvet-test"));
        assert!(files.is_empty());
    }
}
