use notes_hub_core::tree::flatten_files;
use notes_hub_core::{NoteLibrary, NotesConfig, StorageError};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn library(root: &Path) -> NoteLibrary {
    NoteLibrary::new(NotesConfig::new(root))
}

#[test]
fn everything_listed_is_readable() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "guide/intro.md", "# Intro\nwelcome");
    write(root, "guide/deep/part.markdown", "part two");
    write(root, "Top.MD", "top level");
    write(root, "skip.txt", "not a note");
    write(root, ".drafts/wip.md", "hidden dir");

    let lib = library(root);
    let tree = lib.list_tree();
    let files = flatten_files(&tree);
    assert_eq!(files.len(), 3);
    for doc in files {
        let body = lib.get_content(&doc.relative_path).unwrap();
        assert_eq!(body, fs::read_to_string(root.join(&doc.relative_path)).unwrap());
    }
}

#[test]
fn escaping_paths_are_never_read() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("notes");
    write(&root, "a.md", "inside");
    write(tmp.path(), "secret.md", "outside");
    write(tmp.path(), "notes-evil/x.md", "sibling");

    let lib = library(&root);
    for attempt in [
        "../secret.md",
        "a/../../secret.md",
        "../notes-evil/x.md",
        "..\\secret.md",
    ] {
        let err = lib.get_content(attempt).unwrap_err();
        assert!(matches!(err, StorageError::PathRejected | StorageError::NotFound));
    }
    assert_eq!(lib.get_content("/a.md").unwrap(), "inside");
}

#[test]
fn ineligible_files_are_not_found() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "d.txt", "text");
    write(tmp.path(), "dir/n.md", "x");
    let lib = library(tmp.path());
    assert_eq!(lib.get_content("d.txt"), Err(StorageError::NotFound));
    assert_eq!(lib.get_content("dir"), Err(StorageError::NotFound));
    assert_eq!(lib.get_content("missing.md"), Err(StorageError::NotFound));
}

#[test]
fn search_hits_are_listed_documents() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write(root, "a.md", "hello world");
    write(root, "b/c.md", "nothing here");
    write(root, "b/.hidden.md", "world");
    write(root, "b/d.txt", "world");
    write(root, "b/World Tour.md", "no match in body");

    let lib = library(root);
    let listed: Vec<String> = flatten_files(&lib.list_tree())
        .iter()
        .map(|d| d.relative_path.clone())
        .collect();
    let hits = lib.search("world");
    let paths: Vec<_> = hits.iter().map(|h| h.relative_path.as_str()).collect();
    assert_eq!(paths, vec!["b/World Tour.md", "a.md"]);
    for hit in &hits {
        assert!(listed.contains(&hit.relative_path));
    }
}

#[test]
fn listing_and_search_tolerate_a_missing_root() {
    let tmp = TempDir::new().unwrap();
    let lib = library(&tmp.path().join("nope"));
    assert!(lib.list_tree().is_empty());
    assert!(lib.search("anything").is_empty());
}
