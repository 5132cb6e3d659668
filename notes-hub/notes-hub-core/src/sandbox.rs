//! Containment of untrusted note paths inside the sandbox root.
//!
//! Callers hand in whatever path arrived on the wire. A leading separator is
//! read as "relative to the root", backslashes are treated as separators, and
//! the joined path is canonicalized so `..` segments and symlinks are resolved
//! before the containment check. Containment is decided per path segment, so a
//! sibling such as `notes-archive` never passes for a root named `notes`.

use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::error::StorageError;

/// A path that has been resolved and proven to live inside the sandbox root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPath {
    absolute: PathBuf,
    relative: String,
}

impl ValidatedPath {
    /// Canonical absolute location on disk.
    pub fn as_path(&self) -> &Path {
        &self.absolute
    }

    /// POSIX-style path below the root, without a leading slash. Empty for the
    /// root itself.
    pub fn relative(&self) -> &str {
        &self.relative
    }

    pub fn is_root(&self) -> bool {
        self.relative.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PathSandbox {
    root: PathBuf,
}

impl PathSandbox {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical form of the root, or `None` when the root does not exist.
    pub fn canonical_root(&self) -> Option<PathBuf> {
        std::fs::canonicalize(&self.root).ok()
    }

    /// Resolve `raw` against the root.
    ///
    /// The final component may be missing (a target that does not exist yet),
    /// but every component before it must exist. Never touches the filesystem
    /// beyond metadata lookups.
    pub fn resolve(&self, raw: &str) -> Result<ValidatedPath, StorageError> {
        let canonical_root = self.canonical_root().ok_or_else(|| {
            debug!(root = %self.root.display(), "sandbox root is not accessible");
            StorageError::PathRejected
        })?;

        let normalized = raw.replace('\\', "/");
        let normalized = normalized.trim_start_matches('/');
        let requested = Path::new(normalized);
        if requested
            .components()
            .any(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
        {
            debug!(path = raw, "absolute path rejected");
            return Err(StorageError::PathRejected);
        }

        let joined = canonical_root.join(requested);
        let resolved = canonicalize_allow_missing(&joined).map_err(|e| {
            debug!(path = raw, error = %e, "path could not be canonicalized");
            StorageError::PathRejected
        })?;

        let relative = match resolved.strip_prefix(&canonical_root) {
            Ok(rel) => to_posix(rel),
            Err(_) => {
                debug!(path = raw, resolved = %resolved.display(), "path escapes sandbox");
                return Err(StorageError::PathRejected);
            }
        };

        Ok(ValidatedPath {
            absolute: resolved,
            relative,
        })
    }
}

/// Canonicalize `path`, tolerating a missing final component whose parent
/// exists. A dangling symlink in the final position is not tolerated.
fn canonicalize_allow_missing(path: &Path) -> io::Result<PathBuf> {
    match std::fs::canonicalize(path) {
        Ok(p) => Ok(p),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if std::fs::symlink_metadata(path).is_ok() {
                return Err(io::Error::new(io::ErrorKind::NotFound, "dangling symlink"));
            }
            let name = path.file_name().ok_or(e)?;
            let parent = path
                .parent()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no parent"))?;
            Ok(std::fs::canonicalize(parent)?.join(name))
        }
        Err(e) => Err(e),
    }
}

pub(crate) fn to_posix(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
