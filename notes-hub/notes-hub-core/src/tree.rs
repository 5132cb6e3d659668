//! Hierarchical listing of the note tree.

use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::NotesConfig;
use crate::sandbox::PathSandbox;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    File,
    Directory,
}

/// One node of the listing. Directories always carry `children`, files never do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DocumentKind,
    #[serde(rename = "path")]
    pub relative_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Document>>,
}

impl Document {
    fn file(name: String, relative_path: String) -> Self {
        Self {
            name,
            kind: DocumentKind::File,
            relative_path,
            children: None,
        }
    }

    fn directory(name: String, relative_path: String, children: Vec<Document>) -> Self {
        Self {
            name,
            kind: DocumentKind::Directory,
            relative_path,
            children: Some(children),
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == DocumentKind::File
    }
}

/// Files of `tree` in listing order (pre-order, directories expanded in place).
pub fn flatten_files(tree: &[Document]) -> Vec<&Document> {
    let mut files = Vec::new();
    let mut pending: Vec<&Document> = tree.iter().rev().collect();
    while let Some(doc) = pending.pop() {
        match &doc.children {
            Some(children) => pending.extend(children.iter().rev()),
            None => files.push(doc),
        }
    }
    files
}

struct Entry {
    name: String,
    relative: String,
    canonical: PathBuf,
    is_dir: bool,
}

struct Frame {
    name: String,
    relative: String,
    entries: std::vec::IntoIter<Entry>,
    children: Vec<Document>,
}

pub struct TreeBuilder {
    config: Arc<NotesConfig>,
    sandbox: PathSandbox,
}

impl TreeBuilder {
    pub fn new(config: Arc<NotesConfig>) -> Self {
        let sandbox = PathSandbox::new(&config.notes_dir);
        Self { config, sandbox }
    }

    /// Build the listing. An absent root yields an empty listing.
    pub fn build(&self) -> Vec<Document> {
        let Some(root) = self.sandbox.canonical_root() else {
            debug!(root = %self.config.notes_dir.display(), "notes root missing");
            return Vec::new();
        };
        if !root.is_dir() {
            return Vec::new();
        }

        let mut visited = HashSet::new();
        visited.insert(root.clone());
        let mut stack = vec![Frame {
            name: String::new(),
            relative: String::new(),
            entries: self.list_level(&root, "").into_iter(),
            children: Vec::new(),
        }];

        loop {
            let Some(top) = stack.last_mut() else {
                return Vec::new();
            };
            match top.entries.next() {
                Some(entry) if entry.is_dir => {
                    if !visited.insert(entry.canonical.clone()) {
                        debug!(path = %entry.relative, "directory already visited, skipping");
                        continue;
                    }
                    let entries = self.list_level(&entry.canonical, &entry.relative);
                    stack.push(Frame {
                        name: entry.name,
                        relative: entry.relative,
                        entries: entries.into_iter(),
                        children: Vec::new(),
                    });
                }
                Some(entry) => {
                    let name = display_name(&entry.name);
                    top.children.push(Document::file(name, entry.relative));
                }
                None => {
                    let Some(done) = stack.pop() else {
                        return Vec::new();
                    };
                    match stack.last_mut() {
                        None => return done.children,
                        Some(parent) if !done.children.is_empty() => parent
                            .children
                            .push(Document::directory(done.name, done.relative, done.children)),
                        Some(_) => {}
                    }
                }
            }
        }
    }

    /// Visible entries of one directory, directories first, then by name
    /// ignoring case.
    fn list_level(&self, dir: &Path, relative: &str) -> Vec<Entry> {
        let mut entries: Vec<Entry> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| match e {
                Ok(e) => Some(e),
                Err(err) => {
                    debug!(dir = %dir.display(), error = %err, "skipping unreadable entry");
                    None
                }
            })
            .filter_map(|e| self.classify(&e, relative))
            .collect();
        entries.sort_by(|a, b| {
            b.is_dir
                .cmp(&a.is_dir)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
                .then_with(|| a.name.cmp(&b.name))
        });
        entries
    }

    fn classify(&self, entry: &walkdir::DirEntry, parent: &str) -> Option<Entry> {
        let name = entry.file_name().to_str()?.to_string();
        if name.starts_with('.') {
            return None;
        }
        let file_type = entry.file_type();
        let is_dir = file_type.is_dir();
        if !is_dir && !(file_type.is_file() && self.config.is_allowed(Path::new(&name))) {
            return None;
        }

        let relative = if parent.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", parent, name)
        };
        let validated = match self.sandbox.resolve(&relative) {
            Ok(v) => v,
            Err(_) => {
                debug!(path = %relative, "entry resolves outside the sandbox, skipping");
                return None;
            }
        };
        // a linked directory whose target is listed on its own would show
        // the same notes twice, or take the real directory's place
        if is_dir
            && entry.path_is_symlink()
            && !validated.relative().split('/').any(|s| s.starts_with('.'))
        {
            debug!(path = %relative, target = validated.relative(), "directory link into the tree, skipping");
            return None;
        }
        // a note symlinked to a non-note target would list but never read
        if !is_dir && !self.config.is_allowed(validated.as_path()) {
            return None;
        }
        Some(Entry {
            name,
            relative,
            canonical: validated.as_path().to_path_buf(),
            is_dir,
        })
    }
}

/// Filename with its extension removed, e.g. `Intro.md` -> `Intro`.
pub(crate) fn display_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string())
}
