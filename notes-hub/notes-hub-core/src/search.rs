//! Linear keyword search over every eligible note.
//!
//! There is no index: each call walks the tree in listing order and reads each
//! note, so the cost grows with the total size of the note set. Callers that
//! serve requests should use [`SearchEngine::search_until`] with a deadline.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::NotesConfig;
use crate::content::read_note;
use crate::sandbox::PathSandbox;
use crate::tree::{flatten_files, TreeBuilder};

pub const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub name: String,
    #[serde(rename = "path")]
    pub relative_path: String,
    pub context: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    /// False when the deadline cut the scan short
    pub complete: bool,
}

pub struct SearchEngine {
    config: Arc<NotesConfig>,
    sandbox: PathSandbox,
    tree: TreeBuilder,
}

impl SearchEngine {
    pub fn new(config: Arc<NotesConfig>) -> Self {
        let sandbox = PathSandbox::new(&config.notes_dir);
        let tree = TreeBuilder::new(config.clone());
        Self {
            config,
            sandbox,
            tree,
        }
    }

    /// Every note whose display name or body contains `keyword`, ignoring case.
    pub fn search(&self, keyword: &str) -> Vec<SearchHit> {
        self.scan(keyword, None).hits
    }

    /// Like [`search`](Self::search), but stops once `deadline` has passed and
    /// returns the hits found so far.
    pub fn search_until(&self, keyword: &str, deadline: Instant) -> SearchResults {
        self.scan(keyword, Some(deadline))
    }

    fn scan(&self, keyword: &str, deadline: Option<Instant>) -> SearchResults {
        let mut hits = Vec::new();
        if keyword.is_empty() {
            return SearchResults {
                hits,
                complete: true,
            };
        }
        let needle: Vec<char> = keyword.chars().map(fold).collect();
        let tree = self.tree.build();

        for doc in flatten_files(&tree) {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                info!(keyword, hits = hits.len(), "search deadline reached");
                return SearchResults {
                    hits,
                    complete: false,
                };
            }
            let body = match self
                .sandbox
                .resolve(&doc.relative_path)
                .and_then(|p| read_note(&self.config, p.as_path()))
            {
                Ok(body) => body,
                Err(e) => {
                    debug!(path = %doc.relative_path, error = %e, "skipping unreadable note");
                    continue;
                }
            };

            let body: Vec<char> = body.chars().collect();
            let name: Vec<char> = doc.name.chars().collect();
            let position = find_folded(&body, &needle);
            if position.is_none() && find_folded(&name, &needle).is_none() {
                continue;
            }
            hits.push(SearchHit {
                name: doc.name.clone(),
                relative_path: doc.relative_path.clone(),
                context: excerpt(&body, position, needle.len(), self.config.context_length),
            });
        }

        SearchResults {
            hits,
            complete: true,
        }
    }
}

/// Excerpt of `body` around the first case-insensitive occurrence of
/// `keyword`, `context_length` characters wide. Falls back to the start of the
/// body when the keyword does not occur in it.
pub fn extract_context(body: &str, keyword: &str, context_length: usize) -> String {
    let body: Vec<char> = body.chars().collect();
    let needle: Vec<char> = keyword.chars().map(fold).collect();
    let position = find_folded(&body, &needle);
    excerpt(&body, position, needle.len(), context_length)
}

fn excerpt(body: &[char], position: Option<usize>, match_len: usize, width: usize) -> String {
    let len = body.len();
    let mut out = String::new();
    match position {
        Some(pos) => {
            // near either end the window slides to stay inside the body
            let span = width.max(match_len).min(len);
            let before = width.saturating_sub(match_len) / 2;
            let start = pos.saturating_sub(before).min(len - span);
            let end = start + span;
            if start > 0 {
                out.push_str(ELLIPSIS);
            }
            out.extend(&body[start..end]);
            if end < len {
                out.push_str(ELLIPSIS);
            }
        }
        None => {
            out.extend(&body[..width.min(len)]);
            if len > width {
                out.push_str(ELLIPSIS);
            }
        }
    }
    out
}

/// Single-character lowercase so positions line up between folded and
/// original text.
fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

fn find_folded(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window.iter().zip(needle).all(|(h, n)| fold(*h) == *n))
}
