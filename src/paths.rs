//! String-level path helpers for vault-relative paths.
//!
//! Stored paths always use forward slashes, so these operate on `&str`
//! rather than `std::path::Path`; OS paths only appear at the filesystem
//! boundary in [`crate::Vault`].

/// Collapse `.` and `..` segments and convert backslashes to forward
/// slashes. Leading `..` segments survive so callers can detect escapes.
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let mut out: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if matches!(out.last(), None | Some(&"..")) {
                    out.push("..");
                } else {
                    out.pop();
                }
            }
            seg => out.push(seg),
        }
    }
    out.join("/")
}

/// Final path segment, extension and all.
pub fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

/// Directory portion of a vault-relative path; empty for root files.
pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

/// Strip a trailing `.md` (case-insensitive). Other extensions are part of
/// the name: `Note.v1` stays `Note.v1`.
pub fn strip_md(name: &str) -> &str {
    let len = name.len();
    if len > 3 && name[len - 3..].eq_ignore_ascii_case(".md") {
        &name[..len - 3]
    } else {
        name
    }
}

/// Note display name: filename without the `.md` suffix.
pub fn note_basename(path: &str) -> &str {
    strip_md(file_name(path))
}

/// Case-insensitive collision key for notes.
pub fn basename_key(path: &str) -> String {
    note_basename(path).to_lowercase()
}

/// Case-insensitive collision key for assets: the full filename.
pub fn asset_basename_key(path: &str) -> String {
    file_name(path).to_lowercase()
}

pub fn is_root_file(path: &str) -> bool {
    !path.contains('/')
}

pub fn has_md_extension(path: &str) -> bool {
    let name = file_name(path);
    name.len() > 3 && name[name.len() - 3..].eq_ignore_ascii_case(".md")
}

/// True iff the path points outside the vault after normalization.
/// A single leading `/` is tolerated (markdown absolute links).
pub fn path_escapes_vault(path: &str) -> bool {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let normalized = normalize_path(trimmed);
    normalized == ".." || normalized.starts_with("../")
}

/// Join a link target onto its source file's directory and normalize.
pub fn join_relative(source_dir: &str, target: &str) -> String {
    if source_dir.is_empty() {
        normalize_path(target)
    } else {
        normalize_path(&format!("{source_dir}/{target}"))
    }
}

/// Path of `target` relative to `source_dir`, with a `./` prefix when the
/// result does not already start with `../`, so the output always reads as
/// a relative link.
pub fn relative_to(source_dir: &str, target: &str) -> String {
    let rel = pathdiff::diff_paths(target, source_dir)
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .unwrap_or_else(|| target.to_string());
    if rel.starts_with("../") {
        rel
    } else {
        format!("./{rel}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_dot_segments() {
        assert_eq!(normalize_path("./a/b"), "a/b");
        assert_eq!(normalize_path("a/./b"), "a/b");
        assert_eq!(normalize_path("a/../b"), "b");
        assert_eq!(normalize_path("a//b"), "a/b");
        assert_eq!(normalize_path("a\\b"), "a/b");
    }

    #[test]
    fn normalize_keeps_leading_parent_segments() {
        assert_eq!(normalize_path("../x"), "../x");
        assert_eq!(normalize_path("a/../../x"), "../x");
        assert_eq!(normalize_path(".."), "..");
    }

    #[test]
    fn basenames_strip_only_final_md() {
        assert_eq!(note_basename("sub/Note.v1.md"), "Note.v1");
        assert_eq!(note_basename("sub/Note.v1"), "Note.v1");
        assert_eq!(note_basename("A.MD"), "A");
        assert_eq!(basename_key("sub/Note.md"), "note");
        assert_eq!(asset_basename_key("sub/Image.PNG"), "image.png");
    }

    #[test]
    fn root_detection() {
        assert!(is_root_file("a.md"));
        assert!(!is_root_file("sub/a.md"));
    }

    #[test]
    fn escape_detection() {
        assert!(path_escapes_vault("../x"));
        assert!(path_escapes_vault("a/../../x"));
        assert!(path_escapes_vault(".."));
        assert!(!path_escapes_vault("/a/b"));
        assert!(!path_escapes_vault("a/b"));
        assert!(!path_escapes_vault("a/../b"));
    }

    #[test]
    fn relative_paths_are_prefixed() {
        assert_eq!(relative_to("", "X.md"), "./X.md");
        assert_eq!(relative_to("sub", "sub/X.md"), "./X.md");
        assert_eq!(relative_to("sub", "X.md"), "../X.md");
        assert_eq!(relative_to("a/b", "a/c/X.md"), "../c/X.md");
    }
}
