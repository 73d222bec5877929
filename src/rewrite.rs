use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use tracing::debug;

use crate::parse::{LinkType, markdown_parts, wikilink_parts};
use crate::paths::{has_md_extension, strip_md};
use crate::vault::{Vault, unix_mtime};
use crate::{Error, Result};

/// One planned in-place link substitution: on `line` of `path`, replace
/// occurrences of `old` with `new` outside inline code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewriteEntry {
    pub path: String,
    pub line: u32,
    pub old: String,
    pub new: String,
}

/// Original bytes and permission bits of a rewritten file, owned copies so
/// restoration never depends on a reused buffer.
pub struct FileBackup {
    abs: PathBuf,
    bytes: Vec<u8>,
    perm: fs::Permissions,
}

impl FileBackup {
    fn restore(&self) -> std::io::Result<()> {
        fs::write(&self.abs, &self.bytes)?;
        fs::set_permissions(&self.abs, self.perm.clone())
    }
}

/// Best-effort rollback of every file written so far.
pub fn restore_backups(backups: &[FileBackup]) {
    for backup in backups {
        if let Err(err) = backup.restore() {
            debug!(path = %backup.abs.display(), error = %err, "backup restore failed");
        }
    }
}

/// Apply rewrites grouped per file. On success returns the backups (the
/// caller holds them until its transaction commits) and each touched
/// file's new mtime keyed by vault-relative path. On failure every file
/// written so far is restored before the error surfaces.
pub fn apply_rewrites(
    vault: &Vault,
    entries: &[RewriteEntry],
) -> Result<(Vec<FileBackup>, BTreeMap<String, i64>)> {
    let mut by_file: BTreeMap<&str, Vec<&RewriteEntry>> = BTreeMap::new();
    for entry in entries {
        by_file.entry(&entry.path).or_default().push(entry);
    }

    let mut backups = Vec::new();
    let mut mtimes = BTreeMap::new();
    for (path, file_entries) in by_file {
        match rewrite_file(vault, path, &file_entries, &mut backups) {
            Ok(mtime) => {
                mtimes.insert(path.to_string(), mtime);
            }
            Err(err) => {
                restore_backups(&backups);
                return Err(err);
            }
        }
    }
    Ok((backups, mtimes))
}

fn rewrite_file(
    vault: &Vault,
    path: &str,
    entries: &[&RewriteEntry],
    backups: &mut Vec<FileBackup>,
) -> Result<i64> {
    let abs = vault.abs(path);
    let original = fs::read(&abs).map_err(|e| Error::io(&abs, e))?;
    let perm = fs::metadata(&abs)
        .map_err(|e| Error::io(&abs, e))?
        .permissions();
    let text = String::from_utf8(original.clone())
        .map_err(|e| Error::io(&abs, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

    let mut lines: Vec<String> = text.split_inclusive('\n').map(str::to_string).collect();
    for entry in entries {
        let Some(line) = lines.get_mut(entry.line as usize - 1) else {
            continue;
        };
        *line = replace_outside_code(line, &entry.old, &entry.new);
    }

    backups.push(FileBackup {
        abs: abs.clone(),
        bytes: original,
        perm: perm.clone(),
    });
    fs::write(&abs, lines.concat()).map_err(|e| Error::io(&abs, e))?;
    fs::set_permissions(&abs, perm).map_err(|e| Error::io(&abs, e))?;
    let meta = fs::metadata(&abs).map_err(|e| Error::io(&abs, e))?;
    Ok(unix_mtime(&meta))
}

/// Replace occurrences of `old` outside inline code spans. Backticks
/// toggle; an unmatched backtick turns the rest of the line into code.
fn replace_outside_code(line: &str, old: &str, new: &str) -> String {
    if old.is_empty() {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len());
    let mut in_code = false;
    let mut i = 0usize;
    while i < line.len() {
        let c = line[i..].chars().next().unwrap_or('\u{0}');
        if c == '`' {
            in_code = !in_code;
            out.push(c);
            i += 1;
            continue;
        }
        if !in_code && line[i..].starts_with(old) {
            out.push_str(new);
            i += old.len();
            continue;
        }
        out.push(c);
        i += c.len_utf8();
    }
    out
}

/// Regenerate a raw link around a new target, preserving alias and
/// subpath. Wikilinks never carry `.md`; markdown URLs keep it iff the
/// original URL ended in `.md`.
pub fn rewrite_raw_link(raw: &str, link_type: LinkType, new_target: &str) -> String {
    match link_type {
        LinkType::Wikilink => {
            let Some((_, subpath, alias)) = wikilink_parts(raw) else {
                return raw.to_string();
            };
            let mut inner = strip_md(new_target).to_string();
            inner.push_str(subpath);
            if let Some(alias) = alias {
                inner.push('|');
                inner.push_str(alias);
            }
            format!("[[{inner}]]")
        }
        LinkType::Markdown => {
            let Some((display, url)) = markdown_parts(raw) else {
                return raw.to_string();
            };
            let (old_target, fragment) = match url.find('#') {
                Some(pos) => (&url[..pos], &url[pos..]),
                None => (url, ""),
            };
            let mut target = strip_md(new_target).to_string();
            if has_md_extension(old_target) {
                target.push_str(".md");
            }
            format!("[{display}]({target}{fragment})")
        }
        LinkType::Tag | LinkType::Frontmatter => raw.to_string(),
    }
}
