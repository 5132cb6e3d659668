//! Immutable configuration values handed to each component at construction.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Configuration for the document side: where notes live and which files count.
#[derive(Debug, Clone, Deserialize)]
pub struct NotesConfig {
    /// Sandbox root holding the note tree
    pub notes_dir: PathBuf,

    /// File extensions (without the leading dot) that are visible, compared
    /// case-insensitively
    #[serde(default = "default_extensions")]
    pub allowed_extensions: Vec<String>,

    /// Characters of body text returned around a search match
    #[serde(default = "default_context_length")]
    pub context_length: usize,
}

fn default_extensions() -> Vec<String> {
    vec!["md".to_string(), "markdown".to_string()]
}
fn default_context_length() -> usize { 100 }

impl NotesConfig {
    pub fn new(notes_dir: impl AsRef<Path>) -> Self {
        Self {
            notes_dir: notes_dir.as_ref().to_path_buf(),
            allowed_extensions: default_extensions(),
            context_length: default_context_length(),
        }
    }

    /// Whether `path` carries one of the allowed extensions.
    pub fn is_allowed(&self, path: &Path) -> bool {
        self.matching_extension(path).is_some()
    }

    /// The extension of `path` if it is on the allow-list, as written on disk.
    pub fn matching_extension<'a>(&self, path: &'a Path) -> Option<&'a str> {
        let ext = path.extension()?.to_str()?;
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
            .then_some(ext)
    }
}

/// Configuration for the access-log database and its queries.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Page size used when the caller gives none
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,

    /// Upper bound for caller-supplied page sizes
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,

    /// Length of the overview window when no start date is given
    #[serde(default = "default_window_days")]
    pub overview_window_days: i64,

    /// Entries kept in the ranked overview lists
    #[serde(default = "default_top_n")]
    pub top_n: u32,

    /// How long a connection waits on a locked database, in milliseconds
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_page_size() -> u32 { 50 }
fn default_max_page_size() -> u32 { 100 }
fn default_window_days() -> i64 { 30 }
fn default_top_n() -> u32 { 10 }
fn default_busy_timeout() -> u64 { 5000 }

impl AnalyticsConfig {
    pub fn new(database_path: impl AsRef<Path>) -> Self {
        Self {
            database_path: database_path.as_ref().to_path_buf(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            overview_window_days: default_window_days(),
            top_n: default_top_n(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}
