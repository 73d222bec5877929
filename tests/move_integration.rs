use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use filetime::FileTime;
use mdhop::{
    IndexStore, NodeKind, Vault, build, incoming_edges, live_stats, move_note, nodes_of_kind,
    note_by_path,
};

fn write(root: &Path, rel: &str, content: &str) {
    let abs = root.join(rel);
    if let Some(parent) = abs.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(abs, content).unwrap();
}

fn bump_mtime(root: &Path, rel: &str, secs_forward: u64) {
    let abs = root.join(rel);
    let new = SystemTime::now() + Duration::from_secs(secs_forward);
    filetime::set_file_mtime(&abs, FileTime::from_system_time(new)).unwrap();
}

fn disk_mtime(root: &Path, rel: &str) -> i64 {
    fs::metadata(root.join(rel))
        .unwrap()
        .modified()
        .unwrap()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

#[test]
fn basename_change_rewrites_incoming_links() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "A.md", "content\n");
    write(temp.path(), "B.md", "[[A]]\n");
    let vault = Vault::open(temp.path())?;
    build(&vault)?;

    let report = move_note(&vault, "A.md", "X.md")?;
    assert!(report.disk_renamed);

    assert!(!temp.path().join("A.md").exists());
    assert!(temp.path().join("X.md").exists());
    assert_eq!(fs::read_to_string(temp.path().join("B.md"))?, "[[./X]]\n");

    let store = IndexStore::open_live(&vault)?;
    let moved = note_by_path(store.conn(), "X.md")?.unwrap();
    let edges = incoming_edges(store.conn(), moved.id)?;
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].raw_link, "[[./X]]");
    let b = note_by_path(store.conn(), "B.md")?.unwrap();
    assert_eq!(b.mtime, Some(disk_mtime(temp.path(), "B.md")));
    Ok(())
}

#[test]
fn stale_link_source_aborts_the_move() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "A.md", "content\n");
    write(temp.path(), "C.md", "[note](./A.md)\n");
    let vault = Vault::open(temp.path())?;
    build(&vault)?;

    // C.md has a path link to A.md, so it is scheduled for rewrite; make
    // its disk mtime disagree with the store.
    bump_mtime(temp.path(), "C.md", 30);
    let err = move_note(&vault, "A.md", "X.md").unwrap_err();
    assert!(err.to_string().contains("stale"));

    // Nothing moved, nothing rewritten, store unchanged.
    assert!(temp.path().join("A.md").exists());
    assert!(!temp.path().join("X.md").exists());
    assert_eq!(
        fs::read_to_string(temp.path().join("C.md"))?,
        "[note](./A.md)\n"
    );
    let store = IndexStore::open_live(&vault)?;
    assert!(note_by_path(store.conn(), "A.md")?.is_some());
    Ok(())
}

#[test]
fn stale_moved_file_aborts_the_move() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "A.md", "content\n");
    let vault = Vault::open(temp.path())?;
    build(&vault)?;

    bump_mtime(temp.path(), "A.md", 30);
    let err = move_note(&vault, "A.md", "X.md").unwrap_err();
    assert!(err.to_string().contains("source file is stale"));
    Ok(())
}

#[test]
fn relative_links_rewrite_while_stable_basenames_keep() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "A.md", "content\n");
    write(temp.path(), "C.md", "[note](A.md) [[./A]]\n");
    let vault = Vault::open(temp.path())?;
    build(&vault)?;

    move_note(&vault, "A.md", "sub/A.md")?;
    // The basename form still resolves (basename unchanged and unique),
    // so only the relative link is rewritten.
    assert_eq!(
        fs::read_to_string(temp.path().join("C.md"))?,
        "[note](A.md) [[./sub/A]]\n"
    );
    Ok(())
}

#[test]
fn outgoing_relative_links_follow_the_move() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "sub/A.md", "[[./B]]\n");
    write(temp.path(), "sub/B.md", "content\n");
    let vault = Vault::open(temp.path())?;
    build(&vault)?;

    move_note(&vault, "sub/A.md", "A.md")?;
    assert_eq!(
        fs::read_to_string(temp.path().join("A.md"))?,
        "[[./sub/B]]\n"
    );

    let store = IndexStore::open_live(&vault)?;
    let b = note_by_path(store.conn(), "sub/B.md")?.unwrap();
    assert_eq!(incoming_edges(store.conn(), b.id)?.len(), 1);
    Ok(())
}

#[test]
fn move_respects_a_user_performed_rename() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "A.md", "content\n");
    let vault = Vault::open(temp.path())?;
    build(&vault)?;

    // The user already did the rename; keep the recorded mtime honest.
    let a_mtime = fs::metadata(temp.path().join("A.md"))?.modified()?;
    fs::rename(temp.path().join("A.md"), temp.path().join("X.md"))?;
    filetime::set_file_mtime(temp.path().join("X.md"), FileTime::from_system_time(a_mtime))?;

    let report = move_note(&vault, "A.md", "X.md")?;
    assert!(!report.disk_renamed);

    let store = IndexStore::open_live(&vault)?;
    assert!(note_by_path(store.conn(), "A.md")?.is_none());
    assert!(note_by_path(store.conn(), "X.md")?.is_some());
    Ok(())
}

#[test]
fn move_precondition_errors() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "A.md", "content\n");
    write(temp.path(), "B.md", "content\n");
    let vault = Vault::open(temp.path())?;
    build(&vault)?;

    let err = move_note(&vault, "A.md", "A.md").unwrap_err();
    assert!(err.to_string().contains("source and destination are the same"));

    let err = move_note(&vault, "Nope.md", "X.md").unwrap_err();
    assert!(err.to_string().contains("file not registered"));

    let err = move_note(&vault, "A.md", "B.md").unwrap_err();
    assert!(err.to_string().contains("destination already registered"));

    write(temp.path(), "Y.md", "already there\n");
    let err = move_note(&vault, "A.md", "Y.md").unwrap_err();
    assert!(err.to_string().contains("destination already registered") || err.to_string().contains("destination already exists on disk"));

    fs::remove_file(temp.path().join("A.md"))?;
    let err = move_note(&vault, "A.md", "Z.md").unwrap_err();
    assert!(err.to_string().contains("source file not found on disk"));
    Ok(())
}

#[test]
fn move_aborts_when_third_party_links_would_go_ambiguous() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "A.md", "content\n");
    write(temp.path(), "sub/X.md", "existing\n");
    write(temp.path(), "C.md", "[[X]]\n");
    let vault = Vault::open(temp.path())?;
    build(&vault)?;

    // Moving A into d/X.md makes basename X two-way with no root rescue.
    let err = move_note(&vault, "A.md", "d/X.md").unwrap_err();
    assert!(
        err.to_string()
            .contains("move would make existing links ambiguous")
    );
    assert_eq!(fs::read_to_string(temp.path().join("C.md"))?, "[[X]]\n");
    Ok(())
}

#[test]
fn move_promotes_a_phantom_at_the_destination_basename() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "A.md", "content\n");
    write(temp.path(), "C.md", "[[X]]\n");
    let vault = Vault::open(temp.path())?;
    build(&vault)?;
    assert_eq!(live_stats(&vault)?.phantoms, 1);

    move_note(&vault, "A.md", "X.md")?;

    let store = IndexStore::open_live(&vault)?;
    assert!(nodes_of_kind(store.conn(), NodeKind::Phantom)?.is_empty());
    let moved = note_by_path(store.conn(), "X.md")?.unwrap();
    assert_eq!(incoming_edges(store.conn(), moved.id)?.len(), 1);
    Ok(())
}

#[test]
fn move_round_trip_restores_the_graph() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    write(temp.path(), "A.md", "content #tagged\n");
    write(temp.path(), "B.md", "[[A]]\n");
    let vault = Vault::open(temp.path())?;
    build(&vault)?;
    let before = live_stats(&vault)?;

    move_note(&vault, "A.md", "sub/X.md")?;
    move_note(&vault, "sub/X.md", "A.md")?;

    let after = live_stats(&vault)?;
    assert_eq!(before.notes, after.notes);
    assert_eq!(before.edges, after.edges);
    assert_eq!(before.tags, after.tags);
    assert_eq!(before.phantoms, after.phantoms);

    let store = IndexStore::open_live(&vault)?;
    let a = note_by_path(store.conn(), "A.md")?.unwrap();
    let b = note_by_path(store.conn(), "B.md")?.unwrap();
    let edges = incoming_edges(store.conn(), a.id)?;
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].source_id, b.id);
    Ok(())
}
