use std::collections::{HashMap, HashSet};

use crate::parse::LinkOccurrence;
use crate::paths::{
    asset_basename_key, basename_key, file_name, is_root_file, join_relative, normalize_path,
    parent_dir, path_escapes_vault, strip_md,
};
use crate::{Error, Result};

/// Lookup tables for one node kind (notes or assets): exact and lowercased
/// path maps, basename candidate lists, and the per-basename root file.
#[derive(Debug, Clone, Default)]
pub struct SideMap {
    paths: HashSet<String>,
    lower_paths: HashMap<String, String>,
    lower_noext: HashMap<String, String>,
    by_base: HashMap<String, Vec<String>>,
    root_base: HashMap<String, String>,
}

impl SideMap {
    fn insert(&mut self, path: &str, base: String, noext: Option<String>) {
        self.paths.insert(path.to_string());
        self.lower_paths.insert(path.to_lowercase(), path.to_string());
        if let Some(key) = noext {
            self.lower_noext.insert(key, path.to_string());
        }
        let list = self.by_base.entry(base.clone()).or_default();
        if !list.iter().any(|p| p == path) {
            list.push(path.to_string());
        }
        if is_root_file(path) {
            self.root_base.insert(base, path.to_string());
        }
    }

    fn remove(&mut self, path: &str, base: &str, noext: Option<&str>) {
        self.paths.remove(path);
        self.lower_paths.remove(&path.to_lowercase());
        if let Some(key) = noext {
            self.lower_noext.remove(key);
        }
        if let Some(list) = self.by_base.get_mut(base) {
            list.retain(|p| p != path);
            if list.is_empty() {
                self.by_base.remove(base);
            }
        }
        if self.root_base.get(base).is_some_and(|p| p == path) {
            self.root_base.remove(base);
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    pub fn count(&self, base: &str) -> usize {
        self.by_base.get(base).map_or(0, Vec::len)
    }

    /// The single path for a basename key, when exactly one exists.
    pub fn unique(&self, base: &str) -> Option<&String> {
        match self.by_base.get(base) {
            Some(list) if list.len() == 1 => list.first(),
            _ => None,
        }
    }

    pub fn root(&self, base: &str) -> Option<&String> {
        self.root_base.get(base)
    }

    pub fn candidates(&self, base: &str) -> Vec<String> {
        let mut out = self.by_base.get(base).cloned().unwrap_or_default();
        out.sort();
        out
    }

    fn lookup_lower(&self, lower: &str) -> Option<&String> {
        self.lower_paths
            .get(lower)
            .or_else(|| self.lower_noext.get(lower))
    }
}

/// In-memory mirror of the note/asset spine of the graph, built per
/// mutation and adjusted to the intended post-mutation state before
/// validation runs.
#[derive(Debug, Clone, Default)]
pub struct ResolveMap {
    pub notes: SideMap,
    pub assets: SideMap,
}

impl ResolveMap {
    pub fn from_lists<S: AsRef<str>>(notes: &[S], assets: &[S]) -> Self {
        let mut maps = Self::default();
        for path in notes {
            maps.add_note(path.as_ref());
        }
        for path in assets {
            maps.add_asset(path.as_ref());
        }
        maps
    }

    pub fn add_note(&mut self, path: &str) {
        let noext = strip_md(path).to_lowercase();
        self.notes.insert(path, basename_key(path), Some(noext));
    }

    pub fn remove_note(&mut self, path: &str) {
        let noext = strip_md(path).to_lowercase();
        self.notes
            .remove(path, &basename_key(path), Some(noext.as_str()));
    }

    pub fn add_asset(&mut self, path: &str) {
        self.assets.insert(path, asset_basename_key(path), None);
    }

    pub fn remove_asset(&mut self, path: &str) {
        self.assets.remove(path, &asset_basename_key(path), None);
    }
}

/// What a link occurrence points at, before store ids enter the picture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    SelfLink,
    Tag(String),
    Note(String),
    Asset(String),
    Phantom(String),
}

/// Map an occurrence to its target. Errors only on vault escape; a target
/// with no file behind it resolves to a phantom.
pub fn resolve(occ: &LinkOccurrence, source: &str, maps: &ResolveMap) -> Result<Resolution> {
    if occ.is_self_link() {
        return Ok(Resolution::SelfLink);
    }
    if occ.is_tag() {
        return Ok(Resolution::Tag(occ.target.clone()));
    }
    if occ.is_relative {
        let joined = join_relative(parent_dir(source), &occ.target);
        if joined == ".." || joined.starts_with("../") {
            return Err(escape_error(source, occ));
        }
        return Ok(resolve_path_target(&joined, maps));
    }
    if let Some(stripped) = occ.target.strip_prefix('/') {
        // Absolute form appears in markdown links only.
        let normalized = normalize_path(stripped);
        if path_escapes_vault(&normalized) {
            return Err(escape_error(source, occ));
        }
        return Ok(resolve_path_target(&normalized, maps));
    }
    if occ.is_basename {
        return Ok(resolve_basename(&occ.target, maps));
    }
    let normalized = normalize_path(&occ.target);
    if path_escapes_vault(&normalized) {
        return Err(escape_error(source, occ));
    }
    Ok(resolve_path_target(&normalized, maps))
}

/// Five-tier basename lookup: note unique, note root, asset unique, asset
/// root, phantom.
pub fn resolve_basename(target: &str, maps: &ResolveMap) -> Resolution {
    let key = target.to_lowercase();
    if let Some(path) = maps.notes.unique(&key) {
        return Resolution::Note(path.clone());
    }
    if let Some(path) = maps.notes.root(&key) {
        return Resolution::Note(path.clone());
    }
    if let Some(path) = maps.assets.unique(&key) {
        return Resolution::Asset(path.clone());
    }
    if let Some(path) = maps.assets.root(&key) {
        return Resolution::Asset(path.clone());
    }
    Resolution::Phantom(target.to_string())
}

/// Path lookup: note by exact (lowercased) path, note with `.md` appended,
/// then asset. A miss produces a phantom named after the final segment
/// with only a `.md` suffix stripped.
pub fn resolve_path_target(path: &str, maps: &ResolveMap) -> Resolution {
    let lower = path.to_lowercase();
    if let Some(found) = maps.notes.lookup_lower(&lower) {
        return Resolution::Note(found.clone());
    }
    if let Some(found) = maps.assets.lookup_lower(&lower) {
        return Resolution::Asset(found.clone());
    }
    Resolution::Phantom(strip_md(file_name(path)).to_string())
}

/// The shared ambiguity rule: more than one note with the key and no root
/// note; with no note candidates at all, the same test on assets.
pub fn basename_ambiguous(maps: &ResolveMap, target: &str) -> bool {
    let key = target.to_lowercase();
    let note_count = maps.notes.count(&key);
    if note_count > 0 {
        return note_count > 1 && maps.notes.root(&key).is_none();
    }
    let asset_count = maps.assets.count(&key);
    asset_count > 1 && maps.assets.root(&key).is_none()
}

pub fn ambiguity_candidates(maps: &ResolveMap, target: &str) -> Vec<String> {
    let key = target.to_lowercase();
    if maps.notes.count(&key) > 0 {
        maps.notes.candidates(&key)
    } else {
        maps.assets.candidates(&key)
    }
}

/// Pre-commit validation used by Build, Add, Update, and Move: escape
/// checks for path-shaped links, the ambiguity rule for basename links.
pub fn validate_occurrence(
    occ: &LinkOccurrence,
    source: &str,
    maps: &ResolveMap,
) -> Result<()> {
    if occ.is_tag() || occ.is_self_link() {
        return Ok(());
    }
    if occ.is_relative {
        let joined = join_relative(parent_dir(source), &occ.target);
        if joined == ".." || joined.starts_with("../") {
            return Err(escape_error(source, occ));
        }
        return Ok(());
    }
    if occ.is_basename {
        if basename_ambiguous(maps, &occ.target) {
            return Err(Error::AmbiguousLink {
                source_file: source.to_string(),
                raw: occ.raw_link.clone(),
                candidates: ambiguity_candidates(maps, &occ.target),
            });
        }
        return Ok(());
    }
    let stripped = occ.target.strip_prefix('/').unwrap_or(&occ.target);
    if path_escapes_vault(stripped) {
        return Err(escape_error(source, occ));
    }
    Ok(())
}

fn escape_error(source: &str, occ: &LinkOccurrence) -> Error {
    Error::LinkEscapesVault {
        source_file: source.to_string(),
        raw: occ.raw_link.clone(),
    }
}
