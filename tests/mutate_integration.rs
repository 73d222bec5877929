use std::fs;
use std::path::Path;

use mdhop::{
    IndexStore, NodeKind, Vault, build, delete, incoming_edges, live_stats, nodes_of_kind,
    note_by_path, update,
};

fn write(root: &Path, rel: &str, content: &str) {
    let abs = root.join(rel);
    if let Some(parent) = abs.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(abs, content).unwrap();
}

fn rels(paths: &[&str]) -> Vec<String> {
    paths.iter().map(|p| p.to_string()).collect()
}

#[test]
fn update_reindexes_changed_content() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "A.md", "[[B]] #old\n");
    write(temp.path(), "B.md", "target\n");
    let vault = Vault::open(temp.path())?;
    build(&vault)?;

    write(temp.path(), "A.md", "#fresh only a tag now\n");
    let report = update(&vault, &rels(&["A.md"]))?;
    assert_eq!(report.updated, vec!["A.md".to_string()]);

    let store = IndexStore::open_live(&vault)?;
    let b = note_by_path(store.conn(), "B.md")?.unwrap();
    assert!(incoming_edges(store.conn(), b.id)?.is_empty());
    let tags = nodes_of_kind(store.conn(), NodeKind::Tag)?;
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].name, "#fresh");
    Ok(())
}

#[test]
fn update_phantomizes_a_vanished_referenced_note() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "A.md", "[[B]]\n");
    write(temp.path(), "B.md", "going away\n");
    let vault = Vault::open(temp.path())?;
    build(&vault)?;

    fs::remove_file(temp.path().join("B.md"))?;
    let report = update(&vault, &rels(&["B.md"]))?;
    assert_eq!(report.phantomized, vec!["B.md".to_string()]);

    let store = IndexStore::open_live(&vault)?;
    assert!(note_by_path(store.conn(), "B.md")?.is_none());
    let phantoms = nodes_of_kind(store.conn(), NodeKind::Phantom)?;
    assert_eq!(phantoms.len(), 1);
    assert_eq!(phantoms[0].name, "B");
    assert_eq!(incoming_edges(store.conn(), phantoms[0].id)?.len(), 1);
    Ok(())
}

#[test]
fn update_drops_an_unreferenced_vanished_note() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "A.md", "alone\n");
    let vault = Vault::open(temp.path())?;
    build(&vault)?;

    fs::remove_file(temp.path().join("A.md"))?;
    let report = update(&vault, &rels(&["A.md"]))?;
    assert_eq!(report.removed, vec!["A.md".to_string()]);
    assert_eq!(live_stats(&vault)?.notes, 0);
    Ok(())
}

#[test]
fn update_deduplicates_input_and_requires_registration() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "A.md", "hello\n");
    let vault = Vault::open(temp.path())?;
    build(&vault)?;

    let report = update(&vault, &rels(&["A.md", "./A.md", "A.md"]))?;
    assert_eq!(report.updated, vec!["A.md".to_string()]);

    let err = update(&vault, &rels(&["Nope.md"])).unwrap_err();
    assert!(err.to_string().contains("file not registered"));
    Ok(())
}

#[test]
fn update_aborts_the_whole_batch_on_a_validation_error() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "A.md", "fine\n");
    write(temp.path(), "B.md", "fine too\n");
    let vault = Vault::open(temp.path())?;
    build(&vault)?;

    write(temp.path(), "A.md", "now #changed\n");
    write(temp.path(), "B.md", "[[../escape]]\n");
    let err = update(&vault, &rels(&["A.md", "B.md"])).unwrap_err();
    assert!(err.to_string().contains("link escapes vault"));

    // A.md's change must not have been committed.
    let store = IndexStore::open_live(&vault)?;
    assert!(nodes_of_kind(store.conn(), NodeKind::Tag)?.is_empty());
    Ok(())
}

#[test]
fn delete_of_referenced_note_becomes_phantom() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "A.md", "[[B]]\n");
    write(temp.path(), "B.md", "bye\n");
    let vault = Vault::open(temp.path())?;
    build(&vault)?;

    fs::remove_file(temp.path().join("B.md"))?;
    let report = delete(&vault, &rels(&["B.md"]), false)?;
    assert_eq!(report.phantomized, vec!["B.md".to_string()]);

    let store = IndexStore::open_live(&vault)?;
    assert!(note_by_path(store.conn(), "B.md")?.is_none());
    let phantoms = nodes_of_kind(store.conn(), NodeKind::Phantom)?;
    assert_eq!(phantoms.len(), 1);
    assert_eq!(phantoms[0].name, "B");
    assert!(!phantoms[0].exists);
    let a = note_by_path(store.conn(), "A.md")?.unwrap();
    let edges = incoming_edges(store.conn(), phantoms[0].id)?;
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].source_id, a.id);
    Ok(())
}

#[test]
fn delete_requires_the_file_to_be_gone_without_remove_files() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "A.md", "still here\n");
    let vault = Vault::open(temp.path())?;
    build(&vault)?;

    let err = delete(&vault, &rels(&["A.md"]), false).unwrap_err();
    assert!(err.to_string().contains("file still exists on disk"));
    Ok(())
}

#[test]
fn delete_with_remove_files_unlinks_from_disk() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "A.md", "delete me\n");
    let vault = Vault::open(temp.path())?;
    build(&vault)?;

    let report = delete(&vault, &rels(&["A.md"]), true)?;
    assert_eq!(report.removed, vec!["A.md".to_string()]);
    assert!(!temp.path().join("A.md").exists());
    assert_eq!(live_stats(&vault)?.notes, 0);
    Ok(())
}

#[test]
fn delete_cleans_up_orphaned_tags_and_phantoms() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "A.md", "#only-here [[NoSuchNote]]\n");
    write(temp.path(), "B.md", "plain\n");
    let vault = Vault::open(temp.path())?;
    build(&vault)?;
    assert_eq!(live_stats(&vault)?.tags, 1);
    assert_eq!(live_stats(&vault)?.phantoms, 1);

    let report = delete(&vault, &rels(&["A.md"]), true)?;
    assert_eq!(report.removed, vec!["A.md".to_string()]);
    let stats = live_stats(&vault)?;
    assert_eq!(stats.tags, 0);
    assert_eq!(stats.phantoms, 0);
    Ok(())
}

#[test]
fn delete_refuses_tampered_paths_that_escape_the_vault() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "A.md", "victim\n");
    let vault = Vault::open(temp.path())?;
    build(&vault)?;

    // Simulate a tampered row pointing outside the vault.
    {
        let store = IndexStore::open_live(&vault)?;
        store.conn().execute(
            "UPDATE nodes SET path='../outside.md' WHERE path='A.md'",
            [],
        )?;
    }
    let err = delete(&vault, &rels(&["A.md"]), true).unwrap_err();
    assert!(err.to_string().contains("path escapes vault"));
    Ok(())
}
