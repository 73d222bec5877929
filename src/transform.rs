use serde::Serialize;
use tracing::info;

use crate::parse::{LinkOccurrence, LinkType, markdown_parts, parse_links, wikilink_parts};
use crate::paths::{
    asset_basename_key, basename_key, file_name, join_relative, normalize_path, note_basename,
    parent_dir, path_escapes_vault, strip_md,
};
use crate::resolve::{ResolveMap, Resolution, resolve_path_target};
use crate::rewrite::{RewriteEntry, apply_rewrites, rewrite_raw_link};
use crate::vault::Vault;
use crate::Result;

/// Output format for `convert`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkFormat {
    Wikilink,
    Markdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedLink {
    pub path: String,
    pub line: u32,
    pub raw: String,
    pub candidates: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TransformReport {
    pub dry_run: bool,
    pub rewritten: Vec<RewriteEntry>,
    pub skipped: Vec<SkippedLink>,
}

/// Disk-only view for the transformations: they never open the index.
struct Snapshot {
    notes: Vec<String>,
    maps: ResolveMap,
}

fn snapshot(vault: &Vault) -> Result<Snapshot> {
    let notes = vault.scan_notes()?;
    let assets = vault.scan_assets()?;
    let maps = ResolveMap::from_lists(&notes, &assets);
    Ok(Snapshot { notes, maps })
}

fn target_files(vault: &Vault, snapshot: &Snapshot, files: &[String]) -> Result<Vec<String>> {
    if files.is_empty() {
        return Ok(snapshot.notes.clone());
    }
    files.iter().map(|f| vault.relativize(f)).collect()
}

fn finish(vault: &Vault, mut report: TransformReport, dry_run: bool) -> Result<TransformReport> {
    report.dry_run = dry_run;
    if !dry_run && !report.rewritten.is_empty() {
        // Backups drop on success; there is no index state to keep in sync.
        let _ = apply_rewrites(vault, &report.rewritten)?;
    }
    info!(
        rewrites = report.rewritten.len(),
        skipped = report.skipped.len(),
        dry_run,
        "transformation planned"
    );
    Ok(report)
}

/// The path a path-shaped occurrence refers to, vault-relative, before any
/// existence check.
fn occurrence_path(occ: &LinkOccurrence, source: &str) -> String {
    if occ.is_relative {
        join_relative(parent_dir(source), &occ.target)
    } else {
        normalize_path(occ.target.strip_prefix('/').unwrap_or(&occ.target))
    }
}

/// Rewrite path links whose target basename is unique (or root-rescued)
/// into basename links.
pub fn simplify(vault: &Vault, dry_run: bool, files: &[String]) -> Result<TransformReport> {
    let snap = snapshot(vault)?;
    let mut report = TransformReport::default();

    for path in target_files(vault, &snap, files)? {
        let content = vault.read_note(&path)?;
        for occ in parse_links(&content) {
            if !occ.is_path_link() {
                continue;
            }
            let target_path = occurrence_path(&occ, &path);
            if target_path == ".." || target_path.starts_with("../") {
                continue;
            }
            let new_target = match resolve_path_target(&target_path, &snap.maps) {
                Resolution::Note(found) => {
                    let key = basename_key(&found);
                    match snap.maps.notes.root(&key) {
                        // A path link into a shadowed non-root file is
                        // intentional; leave it.
                        Some(root) if *root != found => continue,
                        Some(_) => note_basename(&found).to_string(),
                        None if snap.maps.notes.count(&key) == 1 => {
                            note_basename(&found).to_string()
                        }
                        None => {
                            report.skipped.push(SkippedLink {
                                path: path.clone(),
                                line: occ.line_start,
                                raw: occ.raw_link.clone(),
                                candidates: snap.maps.notes.candidates(&key),
                            });
                            continue;
                        }
                    }
                }
                Resolution::Asset(found) => {
                    let key = asset_basename_key(&found);
                    // The note namespace wins basename resolution; a
                    // colliding note basename makes the short form lie.
                    if snap.maps.notes.count(&key) > 0 {
                        continue;
                    }
                    match snap.maps.assets.root(&key) {
                        Some(root) if *root != found => continue,
                        Some(_) => file_name(&found).to_string(),
                        None if snap.maps.assets.count(&key) == 1 => {
                            file_name(&found).to_string()
                        }
                        None => {
                            report.skipped.push(SkippedLink {
                                path: path.clone(),
                                line: occ.line_start,
                                raw: occ.raw_link.clone(),
                                candidates: snap.maps.assets.candidates(&key),
                            });
                            continue;
                        }
                    }
                }
                // Broken targets are repair's concern.
                _ => continue,
            };
            let new_raw = rewrite_raw_link(&occ.raw_link, occ.link_type, &new_target);
            if new_raw != occ.raw_link {
                report.rewritten.push(RewriteEntry {
                    path: path.clone(),
                    line: occ.line_start,
                    old: occ.raw_link.clone(),
                    new: new_raw,
                });
            }
        }
    }

    finish(vault, report, dry_run)
}

fn target_is_note(occ: &LinkOccurrence, source: &str, maps: &ResolveMap) -> bool {
    if occ.is_basename {
        return maps.notes.count(&occ.target.to_lowercase()) > 0;
    }
    matches!(
        resolve_path_target(&occurrence_path(occ, source), maps),
        Resolution::Note(_)
    )
}

/// Lossless form conversion between wikilinks and markdown links,
/// preserving subpaths and aliases. URLs are never touched (the parser
/// does not surface them).
pub fn convert(
    vault: &Vault,
    to: LinkFormat,
    dry_run: bool,
    files: &[String],
) -> Result<TransformReport> {
    let snap = snapshot(vault)?;
    let mut report = TransformReport::default();

    for path in target_files(vault, &snap, files)? {
        let content = vault.read_note(&path)?;
        for occ in parse_links(&content) {
            let new_raw = match (to, occ.link_type) {
                (LinkFormat::Wikilink, LinkType::Markdown) => {
                    markdown_to_wikilink(&occ)
                }
                (LinkFormat::Markdown, LinkType::Wikilink) => {
                    wikilink_to_markdown(&occ, &path, &snap.maps)
                }
                _ => None,
            };
            if let Some(new_raw) = new_raw.filter(|r| *r != occ.raw_link) {
                report.rewritten.push(RewriteEntry {
                    path: path.clone(),
                    line: occ.line_start,
                    old: occ.raw_link.clone(),
                    new: new_raw,
                });
            }
        }
    }

    finish(vault, report, dry_run)
}

fn markdown_to_wikilink(occ: &LinkOccurrence) -> Option<String> {
    let (display, _) = markdown_parts(&occ.raw_link)?;
    let mut inner = format!("{}{}", occ.target, occ.subpath);
    // The display text becomes the alias unless it just repeats the
    // target, so `[B](B.md)` and `[[B]]` round-trip.
    let implied = if occ.is_self_link() {
        occ.subpath.trim_start_matches('#')
    } else {
        occ.target.as_str()
    };
    if !display.is_empty() && display != implied {
        inner.push('|');
        inner.push_str(display);
    }
    Some(format!("[[{inner}]]"))
}

fn wikilink_to_markdown(occ: &LinkOccurrence, source: &str, maps: &ResolveMap) -> Option<String> {
    let (_, _, alias) = wikilink_parts(&occ.raw_link)?;
    let display = alias.unwrap_or(if occ.is_self_link() {
        occ.subpath.trim_start_matches('#')
    } else {
        occ.target.as_str()
    });
    let mut url = occ.target.clone();
    if !url.is_empty() && target_is_note(occ, source, maps) {
        url.push_str(".md");
    }
    url.push_str(&occ.subpath);
    Some(format!("[{display}]({url})"))
}

/// Fix links that escape the vault or point at no known file. One
/// basename candidate wins; none falls back to a bare basename (a phantom
/// on the next build); several get reported, except escapes which always
/// collapse to the bare basename.
pub fn repair(vault: &Vault, dry_run: bool) -> Result<TransformReport> {
    let snap = snapshot(vault)?;
    let globs = vault.config().build_exclude_globs();
    let mut report = TransformReport::default();

    for path in snap.notes.clone() {
        let content = vault.read_note(&path)?;
        for occ in parse_links(&content) {
            if !occ.is_path_link() {
                continue;
            }
            let target_path = occurrence_path(&occ, &path);
            let escapes = target_path == ".."
                || target_path.starts_with("../")
                || path_escapes_vault(&target_path);
            if !escapes {
                match resolve_path_target(&target_path, &snap.maps) {
                    Resolution::Note(_) | Resolution::Asset(_) => continue,
                    _ => {}
                }
                // A file that exists but is excluded from builds was
                // linked by path on purpose; keep it.
                if excluded_target_on_disk(vault, &globs, &target_path) {
                    continue;
                }
            }

            let segment = file_name(&target_path);
            let bare = strip_md(segment).to_string();
            let new_target = if escapes {
                bare
            } else {
                let mut candidates = snap.maps.notes.candidates(&bare.to_lowercase());
                if candidates.is_empty() {
                    candidates = snap.maps.assets.candidates(&segment.to_lowercase());
                }
                match candidates.len() {
                    0 => bare,
                    1 => {
                        let found = &candidates[0];
                        if snap.maps.notes.contains(found) {
                            note_basename(found).to_string()
                        } else {
                            file_name(found).to_string()
                        }
                    }
                    _ => {
                        report.skipped.push(SkippedLink {
                            path: path.clone(),
                            line: occ.line_start,
                            raw: occ.raw_link.clone(),
                            candidates,
                        });
                        continue;
                    }
                }
            };
            let new_raw = rewrite_raw_link(&occ.raw_link, occ.link_type, &new_target);
            if new_raw != occ.raw_link {
                report.rewritten.push(RewriteEntry {
                    path: path.clone(),
                    line: occ.line_start,
                    old: occ.raw_link.clone(),
                    new: new_raw,
                });
            }
        }
    }

    finish(vault, report, dry_run)
}

fn excluded_target_on_disk(vault: &Vault, globs: &[crate::config::Glob], target: &str) -> bool {
    let with_md = format!("{target}.md");
    for candidate in [target, with_md.as_str()] {
        if vault.file_exists(candidate) && crate::config::any_glob_matches(globs, candidate) {
            return true;
        }
    }
    false
}
