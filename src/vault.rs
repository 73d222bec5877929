use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::{Config, Glob, any_glob_matches};
use crate::paths::{has_md_extension, normalize_path, path_escapes_vault};
use crate::{Error, Result};

/// Directory holding mdhop state inside the vault.
pub const DATA_DIR: &str = ".mdhop";
/// Live index filename inside the data directory.
pub const INDEX_FILE: &str = "index.sqlite";
/// Optional configuration file at the vault root.
pub const CONFIG_FILE: &str = "mdhop.yaml";

/// A vault root plus its loaded configuration. All vault-relative paths are
/// forward-slash strings; this type owns the translation to OS paths.
#[derive(Debug, Clone)]
pub struct Vault {
    root: PathBuf,
    config: Config,
}

impl Vault {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::VaultNotFound(root));
        }
        let root = std::fs::canonicalize(&root).map_err(|e| Error::io(&root, e))?;
        let config = Config::load(&root.join(CONFIG_FILE))?;
        Ok(Self { root, config })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    pub fn index_path(&self) -> PathBuf {
        self.data_dir().join(INDEX_FILE)
    }

    /// Sibling path the builder writes to before the atomic rename.
    pub fn index_tmp_path(&self) -> PathBuf {
        self.data_dir().join(format!("{INDEX_FILE}.tmp"))
    }

    pub fn abs(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub fn file_exists(&self, rel: &str) -> bool {
        self.abs(rel).is_file()
    }

    /// Seconds since epoch for a vault file, as stored in node rows.
    pub fn mtime(&self, rel: &str) -> Result<i64> {
        let abs = self.abs(rel);
        let meta = std::fs::metadata(&abs).map_err(|e| Error::io(&abs, e))?;
        Ok(unix_mtime(&meta))
    }

    pub fn read_note(&self, rel: &str) -> Result<String> {
        let abs = self.abs(rel);
        std::fs::read_to_string(&abs).map_err(|e| Error::io(&abs, e))
    }

    /// Turn caller input (absolute, or relative to the vault root) into a
    /// normalized vault-relative path.
    pub fn relativize(&self, input: &str) -> Result<String> {
        let p = Path::new(input);
        let rel = if p.is_absolute() {
            let stripped = p
                .strip_prefix(&self.root)
                .map_err(|_| Error::PathEscapesVault(input.to_string()))?;
            stripped.to_string_lossy().into_owned()
        } else {
            input.to_string()
        };
        let rel = normalize_path(&rel);
        if rel.is_empty() || path_escapes_vault(&rel) {
            return Err(Error::PathEscapesVault(input.to_string()));
        }
        Ok(rel)
    }

    /// All `.md` files, vault-relative, sorted. Only the data directory is
    /// pruned; note walks deliberately include other hidden directories.
    pub fn scan_notes(&self) -> Result<Vec<String>> {
        let globs = self.config.build_exclude_globs();
        let mut out = Vec::new();
        for entry in WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.file_name().to_string_lossy() != DATA_DIR)
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(rel) = self.rel_of(entry.path()) else {
                continue;
            };
            if has_md_extension(&rel) && !any_glob_matches(&globs, &rel) {
                out.push(rel);
            }
        }
        out.sort();
        Ok(out)
    }

    /// All non-`.md` regular files, vault-relative, sorted. Hidden files
    /// and directories are skipped along with the data directory.
    pub fn scan_assets(&self) -> Result<Vec<String>> {
        let globs = self.config.build_exclude_globs();
        let mut out = Vec::new();
        for entry in WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                !(name.starts_with('.') && e.path() != self.root.as_path())
            })
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(rel) = self.rel_of(entry.path()) else {
                continue;
            };
            if !has_md_extension(&rel) && !any_glob_matches(&globs, &rel) {
                out.push(rel);
            }
        }
        out.sort();
        Ok(out)
    }

    fn rel_of(&self, abs: &Path) -> Option<String> {
        let rel = abs.strip_prefix(&self.root).ok()?;
        let rel = rel.to_string_lossy().replace('\\', "/");
        if rel.is_empty() { None } else { Some(rel) }
    }
}

pub(crate) fn unix_mtime(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
