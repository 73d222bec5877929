use std::collections::HashMap;

use serde::Serialize;
use tracing::info;

use crate::parse::{LinkOccurrence, parse_links};
use crate::resolve::{ResolveMap, resolve, validate_occurrence};
use crate::sqlite::{self, IndexStore};
use crate::vault::Vault;
use crate::{Error, Result};

const MAX_BUILD_ERRORS: usize = 5;

#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    pub notes: usize,
    pub assets: usize,
    pub edges: usize,
    pub tags: usize,
    pub phantoms: usize,
}

/// Full rebuild: scan, validate, write a fresh store at the temp path,
/// then atomically swap it in. A failed build leaves the live index
/// untouched.
pub fn build(vault: &Vault) -> Result<BuildReport> {
    let data_dir = vault.data_dir();
    std::fs::create_dir_all(&data_dir).map_err(|e| Error::io(&data_dir, e))?;

    let notes = vault.scan_notes()?;
    let assets = vault.scan_assets()?;
    let maps = ResolveMap::from_lists(&notes, &assets);
    info!(notes = notes.len(), assets = assets.len(), "scanned vault");

    let mut parsed: Vec<(String, Vec<LinkOccurrence>, i64)> = Vec::new();
    let mut errors: Vec<String> = Vec::new();
    let mut saw_ambiguity = false;
    'notes: for path in &notes {
        let content = vault.read_note(path)?;
        let occurrences = parse_links(&content);
        for occ in &occurrences {
            if let Err(err) = validate_occurrence(occ, path, &maps) {
                saw_ambiguity |= matches!(err, Error::AmbiguousLink { .. });
                errors.push(err.to_string());
                if errors.len() >= MAX_BUILD_ERRORS {
                    break 'notes;
                }
            }
        }
        let mtime = vault.mtime(path)?;
        parsed.push((path.clone(), occurrences, mtime));
    }
    if !errors.is_empty() {
        let mut message = errors.join("\n");
        if saw_ambiguity {
            message.push_str(
                "\nhint: disambiguate colliding links, e.g. `mdhop add --auto-disambiguate`",
            );
        }
        return Err(Error::Validation(message));
    }

    let tmp = vault.index_tmp_path();
    sqlite::remove_stale_tmp(&tmp);
    match write_store(vault, &tmp, &parsed, &assets, &maps) {
        Ok(report) => {
            sqlite::swap_into_live(&tmp, &vault.index_path())?;
            info!(
                notes = report.notes,
                assets = report.assets,
                edges = report.edges,
                "index built"
            );
            Ok(report)
        }
        Err(err) => {
            sqlite::remove_stale_tmp(&tmp);
            Err(err)
        }
    }
}

fn write_store(
    vault: &Vault,
    tmp: &std::path::Path,
    parsed: &[(String, Vec<LinkOccurrence>, i64)],
    assets: &[String],
    maps: &ResolveMap,
) -> Result<BuildReport> {
    let mut store = IndexStore::create(tmp)?;
    let report;
    {
        let tx = store.transaction()?;

        let mut note_ids: HashMap<&str, i64> = HashMap::new();
        for (path, _, mtime) in parsed {
            note_ids.insert(path, sqlite::insert_note(&tx, path, *mtime)?);
        }
        for path in assets {
            sqlite::insert_asset(&tx, path, vault.mtime(path)?)?;
        }

        let mut edges = 0usize;
        for (path, occurrences, _) in parsed {
            let source_id = note_ids[path.as_str()];
            for occ in occurrences {
                let resolution = resolve(occ, path, maps)?;
                let target_id = sqlite::target_id_for(&tx, source_id, &resolution)?;
                sqlite::insert_edge(&tx, source_id, target_id, occ)?;
                edges += 1;
            }
        }

        let stats = sqlite::stats(&tx)?;
        report = BuildReport {
            notes: parsed.len(),
            assets: assets.len(),
            edges,
            tags: stats.tags,
            phantoms: stats.phantoms,
        };
        tx.commit()?;
    }
    store.close()?;
    Ok(report)
}
