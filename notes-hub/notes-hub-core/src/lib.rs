pub mod analytics;
pub mod config;
pub mod content;
pub mod error;
pub mod library;
pub mod sandbox;
pub mod search;
pub mod tree;

pub use config::{AnalyticsConfig, NotesConfig};
pub use error::{AnalyticsError, AnalyticsResult, StorageError};
pub use library::NoteLibrary;
