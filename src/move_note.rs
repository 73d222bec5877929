use std::collections::HashSet;
use std::fs;

use serde::Serialize;
use tracing::info;

use crate::graph::NodeKind;
use crate::parse::{parse_links, parse_raw_link};
use crate::paths::{basename_key, join_relative, note_basename, parent_dir, relative_to};
use crate::resolve::{Resolution, basename_ambiguous, resolve, resolve_path_target};
use crate::rewrite::{RewriteEntry, apply_rewrites, restore_backups, rewrite_raw_link};
use crate::sqlite::{self, IndexStore};
use crate::vault::Vault;
use crate::{Error, Result};

#[derive(Debug, Clone, Default, Serialize)]
pub struct MoveReport {
    pub from: String,
    pub to: String,
    pub disk_renamed: bool,
    pub rewritten: Vec<RewriteEntry>,
}

/// Rename a registered note, rewriting incoming links in other files and
/// relative links inside the moved file, with full rollback on failure.
pub fn move_note(vault: &Vault, from: &str, to: &str) -> Result<MoveReport> {
    let mut store = IndexStore::open_live(vault)?;
    let from = vault.relativize(from)?;
    let to = vault.relativize(to)?;
    if from == to {
        return Err(Error::SameSourceAndDestination(from));
    }

    let node = sqlite::note_by_path(store.conn(), &from)?
        .ok_or_else(|| Error::FileNotRegistered(from.clone()))?;
    if sqlite::note_by_path(store.conn(), &to)?.is_some() {
        return Err(Error::DestinationRegistered(to));
    }

    let need_disk_move = match (vault.file_exists(&from), vault.file_exists(&to)) {
        (true, false) => true,
        // The user already moved the file; only the index and links need work.
        (false, true) => false,
        (true, true) => return Err(Error::DestinationExistsOnDisk(to)),
        (false, false) => return Err(Error::SourceNotOnDisk(from)),
    };

    let current_rel: &str = if need_disk_move { &from } else { &to };
    let disk_mtime = vault.mtime(current_rel)?;
    if Some(disk_mtime) != node.mtime {
        return Err(if need_disk_move {
            Error::SourceStale(from)
        } else {
            Error::MovedStale(to)
        });
    }

    let pre_maps = sqlite::resolve_map_from_store(store.conn())?;
    let mut post_maps = pre_maps.clone();
    post_maps.remove_note(&from);
    post_maps.add_note(&to);

    let old_key = basename_key(&from);
    let new_key = basename_key(&to);
    let base_changed = old_key != new_key;
    let post_count = post_maps.notes.count(&new_key);
    let root_rescued =
        pre_maps.notes.root(&new_key).is_some() && post_maps.notes.root(&new_key).is_some();
    let same_base_rewrite = post_count > 1 && !root_rescued;

    // Phase 1: incoming rewrites from other notes.
    let all_edges = sqlite::link_edges(store.conn())?;
    let mut incoming_entries: Vec<RewriteEntry> = Vec::new();
    let mut edge_updates: Vec<(i64, String)> = Vec::new();
    let mut scheduled: HashSet<i64> = HashSet::new();
    for le in &all_edges {
        if le.edge.target_id != node.id || le.edge.source_id == node.id {
            continue;
        }
        let Some(occ) = parse_raw_link(&le.edge.raw_link, le.edge.link_type) else {
            continue;
        };
        let rewrite = if occ.is_basename {
            base_changed || same_base_rewrite
        } else {
            // Path links always track the new location.
            true
        };
        if !rewrite {
            continue;
        }
        let new_target = if occ.is_basename || occ.is_relative {
            relative_to(parent_dir(&le.source_path), &to)
        } else if occ.target.starts_with('/') {
            format!("/{to}")
        } else {
            to.clone()
        };
        let new_raw = rewrite_raw_link(&le.edge.raw_link, le.edge.link_type, &new_target);
        scheduled.insert(le.edge.id);
        edge_updates.push((le.edge.id, new_raw.clone()));
        incoming_entries.push(RewriteEntry {
            path: le.source_path.clone(),
            line: le.edge.line_start,
            old: le.edge.raw_link.clone(),
            new: new_raw,
        });
    }

    // Phase 2.5: basename links from third parties that would go
    // ambiguous because the destination basename gains a collision.
    if post_count > 1 && !root_rescued {
        for le in &all_edges {
            if le.edge.source_id == node.id || scheduled.contains(&le.edge.id) {
                continue;
            }
            let target_key = match le.target_kind {
                NodeKind::Note => le.target_path.as_deref().map(basename_key),
                NodeKind::Phantom => Some(le.target_name.to_lowercase()),
                _ => None,
            };
            if target_key.as_deref() != Some(new_key.as_str()) {
                continue;
            }
            let is_basename = parse_raw_link(&le.edge.raw_link, le.edge.link_type)
                .is_some_and(|occ| occ.is_basename);
            if is_basename {
                return Err(Error::MoveWouldAmbiguate {
                    source_file: le.source_path.clone(),
                    raw: le.edge.raw_link.clone(),
                });
            }
        }
    }

    // Phase 3: every file about to be rewritten must match its stored mtime.
    let mut checked: HashSet<&str> = HashSet::new();
    for le in &all_edges {
        if !scheduled.contains(&le.edge.id) || !checked.insert(&le.source_path) {
            continue;
        }
        if vault.mtime(&le.source_path)? != le.source_mtime {
            return Err(Error::SourceStale(le.source_path.clone()));
        }
    }

    // Phase 4: outgoing links of the moved file. Relative targets get
    // recomputed from the new directory; basename targets must stay
    // unambiguous after the move.
    let content = vault.read_note(current_rel)?;
    let mut outgoing_entries: Vec<RewriteEntry> = Vec::new();
    for occ in parse_links(&content) {
        if occ.is_tag() || occ.is_self_link() {
            continue;
        }
        if occ.is_relative {
            let joined = join_relative(parent_dir(&from), &occ.target);
            if joined == ".." || joined.starts_with("../") {
                return Err(Error::LinkEscapesVault {
                    source_file: from.clone(),
                    raw: occ.raw_link.clone(),
                });
            }
            let target_path = match resolve_path_target(&joined, &post_maps) {
                Resolution::Note(p) | Resolution::Asset(p) => p,
                _ => joined,
            };
            let new_target = relative_to(parent_dir(&to), &target_path);
            let new_raw = rewrite_raw_link(&occ.raw_link, occ.link_type, &new_target);
            if new_raw != occ.raw_link {
                outgoing_entries.push(RewriteEntry {
                    path: current_rel.to_string(),
                    line: occ.line_start,
                    old: occ.raw_link.clone(),
                    new: new_raw,
                });
            }
        } else if occ.is_basename && basename_ambiguous(&post_maps, &occ.target) {
            return Err(Error::AmbiguousAfterMove(format!(
                "{} in {}",
                occ.raw_link, from
            )));
        }
    }

    // Commit: other files first, then the moved file, then the disk
    // rename, then one store transaction.
    let (mut backups, mut new_mtimes) = apply_rewrites(vault, &incoming_entries)?;
    match apply_rewrites(vault, &outgoing_entries) {
        Ok((more_backups, more_mtimes)) => {
            backups.extend(more_backups);
            new_mtimes.extend(more_mtimes);
        }
        Err(err) => {
            restore_backups(&backups);
            return Err(err);
        }
    }

    if need_disk_move {
        let to_abs = vault.abs(&to);
        let rename_result = (|| -> std::io::Result<()> {
            if let Some(parent) = to_abs.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::rename(vault.abs(&from), &to_abs)
        })();
        if let Err(err) = rename_result {
            restore_backups(&backups);
            return Err(Error::io(to_abs, err));
        }
    }

    let commit = (|| -> Result<()> {
        let tx = store.transaction()?;
        let moved_mtime = vault.mtime(&to)?;
        sqlite::update_note_identity(&tx, node.id, &to, moved_mtime)?;

        sqlite::delete_outgoing_edges(&tx, node.id)?;
        let content = vault.read_note(&to)?;
        for occ in parse_links(&content) {
            let resolution = resolve(&occ, &to, &post_maps)?;
            let target_id = sqlite::target_id_for(&tx, node.id, &resolution)?;
            sqlite::insert_edge(&tx, node.id, target_id, &occ)?;
        }

        for (edge_id, new_raw) in &edge_updates {
            sqlite::update_edge_raw(&tx, *edge_id, new_raw)?;
        }
        for (path, mtime) in &new_mtimes {
            if path.as_str() == current_rel {
                continue;
            }
            if let Some(source) = sqlite::note_by_path(&tx, path)? {
                sqlite::update_note_mtime(&tx, source.id, *mtime)?;
            }
        }

        sqlite::promote_phantom_onto(&tx, note_basename(&to), node.id)?;
        sqlite::orphan_cleanup(&tx)?;
        tx.commit()?;
        Ok(())
    })();

    if let Err(err) = commit {
        // Undo the rename first so file backups land at their old paths.
        if need_disk_move {
            let _ = fs::rename(vault.abs(&to), vault.abs(&from));
        }
        restore_backups(&backups);
        return Err(err);
    }

    let mut rewritten = incoming_entries;
    rewritten.extend(outgoing_entries);
    info!(from = %from, to = %to, rewrites = rewritten.len(), "note moved");
    Ok(MoveReport {
        from,
        to,
        disk_renamed: need_disk_move,
        rewritten,
    })
}
