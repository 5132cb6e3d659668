use std::sync::Arc;
use std::time::Instant;

use crate::config::NotesConfig;
use crate::content::ContentReader;
use crate::error::StorageError;
use crate::search::{SearchEngine, SearchHit, SearchResults};
use crate::tree::{Document, TreeBuilder};

/// Read-only view of the note tree: listing, content and search.
///
/// Holds no mutable state, so one instance can be shared across requests.
pub struct NoteLibrary {
    config: Arc<NotesConfig>,
    tree: TreeBuilder,
    reader: ContentReader,
    search: SearchEngine,
}

impl NoteLibrary {
    pub fn new(config: NotesConfig) -> Self {
        let config = Arc::new(config);
        Self {
            tree: TreeBuilder::new(config.clone()),
            reader: ContentReader::new(config.clone()),
            search: SearchEngine::new(config.clone()),
            config,
        }
    }

    pub fn config(&self) -> &NotesConfig {
        &self.config
    }

    pub fn list_tree(&self) -> Vec<Document> {
        self.tree.build()
    }

    pub fn get_content(&self, path: &str) -> Result<String, StorageError> {
        self.reader.read(path)
    }

    pub fn search(&self, keyword: &str) -> Vec<SearchHit> {
        self.search.search(keyword)
    }

    pub fn search_until(&self, keyword: &str, deadline: Instant) -> SearchResults {
        self.search.search_until(keyword, deadline)
    }
}
