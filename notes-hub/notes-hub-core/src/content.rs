use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::config::NotesConfig;
use crate::error::StorageError;
use crate::sandbox::PathSandbox;

/// Loads the full text of a single note.
pub struct ContentReader {
    config: Arc<NotesConfig>,
    sandbox: PathSandbox,
}

impl ContentReader {
    pub fn new(config: Arc<NotesConfig>) -> Self {
        let sandbox = PathSandbox::new(&config.notes_dir);
        Self { config, sandbox }
    }

    /// Read `relative_path` as UTF-8.
    ///
    /// Rejected paths come back as `PathRejected`; missing files, directories,
    /// disallowed extensions and undecodable bytes all come back as `NotFound`.
    pub fn read(&self, relative_path: &str) -> Result<String, StorageError> {
        let validated = self.sandbox.resolve(relative_path)?;
        read_note(&self.config, validated.as_path())
    }
}

/// Read an already validated note path.
pub(crate) fn read_note(config: &NotesConfig, path: &Path) -> Result<String, StorageError> {
    // the extension is checked on the resolved target, so a `.md` symlink to a
    // non-note file is refused as well
    if !config.is_allowed(path) || !path.is_file() {
        return Err(StorageError::NotFound);
    }
    let bytes = std::fs::read(path).map_err(|e| {
        debug!(path = %path.display(), error = %e, "note could not be read");
        StorageError::NotFound
    })?;
    String::from_utf8(bytes).map_err(|e| {
        debug!(path = %path.display(), error = %e, "note is not valid UTF-8");
        StorageError::NotFound
    })
}
