use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::info;

use crate::graph::NodeRecord;
use crate::parse::{LinkOccurrence, parse_links, parse_raw_link};
use crate::paths::{basename_key, is_root_file, note_basename, path_escapes_vault};
use crate::resolve::{resolve, validate_occurrence};
use crate::rewrite::{RewriteEntry, apply_rewrites, restore_backups, rewrite_raw_link};
use crate::sqlite::{self, IndexStore};
use crate::vault::Vault;
use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    pub files: Vec<String>,
    pub auto_disambiguate: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AddReport {
    pub added: Vec<String>,
    pub promoted: Vec<String>,
    pub rewritten: Vec<RewriteEntry>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateReport {
    pub updated: Vec<String>,
    pub phantomized: Vec<String>,
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteReport {
    pub phantomized: Vec<String>,
    pub removed: Vec<String>,
}

/// Normalize caller inputs to vault-relative paths, deduplicated in order.
fn normalize_inputs(vault: &Vault, inputs: &[String]) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for input in inputs {
        let rel = vault.relativize(input)?;
        if seen.insert(rel.clone()) {
            out.push(rel);
        }
    }
    Ok(out)
}

/// Register new note files: validate under post-add maps, handle the two
/// existing-link ambiguity patterns (rewriting when auto-disambiguate is
/// on), insert rows, promote matching phantoms, re-resolve outgoing links.
pub fn add(vault: &Vault, options: &AddOptions) -> Result<AddReport> {
    let mut store = IndexStore::open_live(vault)?;
    let files = normalize_inputs(vault, &options.files)?;

    for rel in &files {
        if !vault.file_exists(rel) {
            return Err(Error::FileNotFound(rel.clone()));
        }
        if sqlite::note_by_path(store.conn(), rel)?.is_some() {
            return Err(Error::FileAlreadyRegistered(rel.clone()));
        }
    }

    let pre_maps = sqlite::resolve_map_from_store(store.conn())?;
    let mut post_maps = pre_maps.clone();
    for rel in &files {
        post_maps.add_note(rel);
    }

    let mut parsed: Vec<(String, Vec<LinkOccurrence>)> = Vec::new();
    for rel in &files {
        let content = vault.read_note(rel)?;
        parsed.push((rel.clone(), parse_links(&content)));
    }

    // Existing-link ambiguity. Pattern A: a previously unique non-root
    // target acquires a basename collision. Pattern B: a phantom's
    // basename suddenly has more than one file. Root-priority keeps
    // resolution stable in either pattern, so a surviving root file means
    // silent skip.
    let all_edges = sqlite::link_edges(store.conn())?;
    let mut fix_targets: HashMap<String, String> = HashMap::new();
    let mut edge_rewrites: Vec<(i64, RewriteEntry)> = Vec::new();
    let mut keys_seen = HashSet::new();
    for rel in &files {
        let key = basename_key(rel);
        if !keys_seen.insert(key.clone()) {
            continue;
        }
        match pre_maps.notes.count(&key) {
            1 => {
                let old_path = pre_maps.notes.unique(&key).cloned().unwrap_or_default();
                if is_root_file(&old_path) {
                    continue;
                }
                let affected: Vec<_> = all_edges
                    .iter()
                    .filter(|le| {
                        le.target_path.as_deref() == Some(old_path.as_str())
                            && parse_raw_link(&le.edge.raw_link, le.edge.link_type)
                                .is_some_and(|occ| occ.is_basename)
                    })
                    .collect();
                if affected.is_empty() {
                    continue;
                }
                if !options.auto_disambiguate {
                    return Err(Error::AddWouldAmbiguate(rel.clone()));
                }
                for le in affected {
                    let new_raw =
                        rewrite_raw_link(&le.edge.raw_link, le.edge.link_type, &old_path);
                    edge_rewrites.push((
                        le.edge.id,
                        RewriteEntry {
                            path: le.source_path.clone(),
                            line: le.edge.line_start,
                            old: le.edge.raw_link.clone(),
                            new: new_raw,
                        },
                    ));
                }
                fix_targets.insert(key, old_path);
            }
            0 => {
                let phantom_exists = sqlite::node_id_by_key(
                    store.conn(),
                    &crate::graph::phantom_key(note_basename(rel)),
                )?
                .is_some();
                if phantom_exists
                    && post_maps.notes.count(&key) > 1
                    && post_maps.notes.root(&key).is_none()
                {
                    return Err(Error::AddWouldAmbiguate(rel.clone()));
                }
            }
            _ => {}
        }
    }

    // Links inside the new files must themselves be unambiguous after the
    // add; a collision that auto-disambiguate is already fixing gets the
    // same path rewrite instead of an error.
    let mut new_file_rewrites: Vec<RewriteEntry> = Vec::new();
    for (rel, occurrences) in &parsed {
        for occ in occurrences {
            match validate_occurrence(occ, rel, &post_maps) {
                Ok(()) => {}
                Err(Error::AmbiguousLink { .. })
                    if options.auto_disambiguate
                        && fix_targets.contains_key(&occ.target.to_lowercase()) =>
                {
                    let old_path = &fix_targets[&occ.target.to_lowercase()];
                    new_file_rewrites.push(RewriteEntry {
                        path: rel.clone(),
                        line: occ.line_start,
                        old: occ.raw_link.clone(),
                        new: rewrite_raw_link(&occ.raw_link, occ.link_type, old_path),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }

    let mut plan: Vec<RewriteEntry> = edge_rewrites.iter().map(|(_, e)| e.clone()).collect();
    plan.extend(new_file_rewrites);
    let (backups, rewrite_mtimes) = apply_rewrites(vault, &plan)?;

    let outcome = (|| -> Result<AddReport> {
        let mut report = AddReport {
            rewritten: plan.clone(),
            ..AddReport::default()
        };
        let tx = store.transaction()?;

        let mut note_ids: HashMap<&str, i64> = HashMap::new();
        for rel in &files {
            let mtime = vault.mtime(rel)?;
            note_ids.insert(rel, sqlite::insert_note(&tx, rel, mtime)?);
            report.added.push(rel.clone());
        }

        // Phantom promotion: per basename, the root file wins when several
        // new files share it (pattern B guarantees one exists then).
        let mut promoted_keys = HashSet::new();
        for rel in &files {
            let key = basename_key(rel);
            if promoted_keys.contains(&key) {
                continue;
            }
            let claimant = files
                .iter()
                .filter(|f| basename_key(f.as_str()) == key)
                .find(|f| is_root_file(f.as_str()))
                .unwrap_or(rel);
            if sqlite::promote_phantom_onto(&tx, note_basename(claimant), note_ids[claimant.as_str()])? {
                report.promoted.push(claimant.clone());
            }
            promoted_keys.insert(key);
        }

        // Outgoing links of the new files, re-read in case a rewrite
        // touched them.
        for rel in &files {
            let content = vault.read_note(rel)?;
            let source_id = note_ids[rel.as_str()];
            for occ in parse_links(&content) {
                let resolution = resolve(&occ, rel, &post_maps)?;
                let target_id = sqlite::target_id_for(&tx, source_id, &resolution)?;
                sqlite::insert_edge(&tx, source_id, target_id, &occ)?;
            }
        }

        // Rewritten raw links and the mtimes of every touched source.
        for (edge_id, entry) in &edge_rewrites {
            sqlite::update_edge_raw(&tx, *edge_id, &entry.new)?;
        }
        for (path, mtime) in &rewrite_mtimes {
            if let Some(id) = note_ids.get(path.as_str()) {
                sqlite::update_note_mtime(&tx, *id, *mtime)?;
            } else if let Some(node) = sqlite::note_by_path(&tx, path)? {
                sqlite::update_note_mtime(&tx, node.id, *mtime)?;
            }
        }

        sqlite::orphan_cleanup(&tx)?;
        tx.commit()?;
        Ok(report)
    })();

    match outcome {
        Ok(report) => {
            info!(
                added = report.added.len(),
                promoted = report.promoted.len(),
                rewritten = report.rewritten.len(),
                "files registered"
            );
            Ok(report)
        }
        Err(err) => {
            restore_backups(&backups);
            Err(err)
        }
    }
}

/// Reconcile registered files with their disk state: re-index present
/// files, phantomize or drop absent ones.
pub fn update(vault: &Vault, files: &[String]) -> Result<UpdateReport> {
    let mut store = IndexStore::open_live(vault)?;
    let files = normalize_inputs(vault, files)?;

    let mut nodes: Vec<(String, NodeRecord)> = Vec::new();
    for rel in &files {
        let node = sqlite::note_by_path(store.conn(), rel)?
            .ok_or_else(|| Error::FileNotRegistered(rel.clone()))?;
        nodes.push((rel.clone(), node));
    }

    let mut maps = sqlite::resolve_map_from_store(store.conn())?;
    let mut present: Vec<(String, NodeRecord, Vec<LinkOccurrence>)> = Vec::new();
    let mut absent: Vec<(String, NodeRecord)> = Vec::new();
    for (rel, node) in nodes {
        if vault.file_exists(&rel) {
            let content = vault.read_note(&rel)?;
            present.push((rel, node, parse_links(&content)));
        } else {
            maps.remove_note(&rel);
            absent.push((rel, node));
        }
    }

    // Same validation rules as build, against the post-update maps.
    for (rel, _, occurrences) in &present {
        for occ in occurrences {
            validate_occurrence(occ, rel, &maps)?;
        }
    }

    let mut report = UpdateReport::default();
    let tx = store.transaction()?;
    for (rel, node) in &absent {
        if sqlite::incoming_count_excluding_self(&tx, node.id)? > 0 {
            sqlite::phantomize_note(&tx, node)?;
            report.phantomized.push(rel.clone());
        } else {
            sqlite::delete_note_completely(&tx, node.id)?;
            report.removed.push(rel.clone());
        }
    }
    for (rel, node, occurrences) in &present {
        sqlite::delete_outgoing_edges(&tx, node.id)?;
        sqlite::update_note_mtime(&tx, node.id, vault.mtime(rel)?)?;
        for occ in occurrences {
            let resolution = resolve(occ, rel, &maps)?;
            let target_id = sqlite::target_id_for(&tx, node.id, &resolution)?;
            sqlite::insert_edge(&tx, node.id, target_id, occ)?;
        }
        report.updated.push(rel.clone());
    }
    sqlite::orphan_cleanup(&tx)?;
    tx.commit()?;

    info!(
        updated = report.updated.len(),
        phantomized = report.phantomized.len(),
        removed = report.removed.len(),
        "index reconciled"
    );
    Ok(report)
}

/// Deregister notes. Without `remove_files` the files must already be
/// gone from disk; with it, they are unlinked after a vault-escape check
/// on the stored paths.
pub fn delete(vault: &Vault, files: &[String], remove_files: bool) -> Result<DeleteReport> {
    let mut store = IndexStore::open_live(vault)?;
    let files = normalize_inputs(vault, files)?;

    let mut nodes: Vec<(String, NodeRecord)> = Vec::new();
    for rel in &files {
        let node = sqlite::note_by_path(store.conn(), rel)?
            .ok_or_else(|| Error::FileNotRegistered(rel.clone()))?;
        nodes.push((rel.clone(), node));
    }

    if remove_files {
        // Stored paths can be tampered with; never unlink outside the vault.
        for (_, node) in &nodes {
            let stored = node.path.as_deref().unwrap_or_default();
            if stored.is_empty() || path_escapes_vault(stored) {
                return Err(Error::PathEscapesVault(stored.to_string()));
            }
        }
        for (_, node) in &nodes {
            let stored = node.path.as_deref().unwrap_or_default();
            let abs = vault.abs(stored);
            match std::fs::remove_file(&abs) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(Error::io(abs, err)),
            }
        }
    } else {
        for (rel, _) in &nodes {
            if vault.file_exists(rel) {
                return Err(Error::FileStillExists(rel.clone()));
            }
        }
    }

    let mut report = DeleteReport::default();
    let tx = store.transaction()?;
    for (rel, node) in &nodes {
        if sqlite::incoming_count_excluding_self(&tx, node.id)? > 0 {
            sqlite::phantomize_note(&tx, node)?;
            report.phantomized.push(rel.clone());
        } else {
            sqlite::delete_note_completely(&tx, node.id)?;
            report.removed.push(rel.clone());
        }
    }
    sqlite::orphan_cleanup(&tx)?;
    tx.commit()?;

    info!(
        phantomized = report.phantomized.len(),
        removed = report.removed.len(),
        "files deregistered"
    );
    Ok(report)
}
