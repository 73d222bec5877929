use crate::parse::LinkType;

/// Node variants stored in the index. Notes and assets mirror files on
/// disk; tags and phantoms exist only because edges reference them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Note,
    Asset,
    Tag,
    Phantom,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Note => "note",
            Self::Asset => "asset",
            Self::Tag => "tag",
            Self::Phantom => "phantom",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "note" => Some(Self::Note),
            "asset" => Some(Self::Asset),
            "tag" => Some(Self::Tag),
            "phantom" => Some(Self::Phantom),
            _ => None,
        }
    }
}

/// A `nodes` table row. `path` and `mtime` are set exactly when
/// `exists` is set (notes and assets).
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub id: i64,
    pub kind: NodeKind,
    pub name: String,
    pub path: Option<String>,
    pub exists: bool,
    pub mtime: Option<i64>,
}

/// An `edges` table row. Sources are always notes; one row per
/// occurrence, never deduplicated.
#[derive(Debug, Clone)]
pub struct EdgeRecord {
    pub id: i64,
    pub source_id: i64,
    pub target_id: i64,
    pub link_type: LinkType,
    pub raw_link: String,
    pub subpath: String,
    pub line_start: u32,
    pub line_end: u32,
}

// node_key formation: the key portion is lowercased so lookups are
// case-insensitive; display names and stored paths keep their case.

pub fn note_key(path: &str) -> String {
    format!("note:path:{}", path.to_lowercase())
}

pub fn asset_key(path: &str) -> String {
    format!("asset:path:{}", path.to_lowercase())
}

/// `name` includes the leading `#`.
pub fn tag_key(name: &str) -> String {
    format!("tag:name:{}", name.to_lowercase())
}

pub fn phantom_key(name: &str) -> String {
    format!("phantom:name:{}", name.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_lowercase_only_the_key_portion() {
        assert_eq!(note_key("Sub/Note.md"), "note:path:sub/note.md");
        assert_eq!(asset_key("Img/Pic.PNG"), "asset:path:img/pic.png");
        assert_eq!(tag_key("#Project/Rust"), "tag:name:#project/rust");
        assert_eq!(phantom_key("Missing"), "phantom:name:missing");
    }

    #[test]
    fn phantom_names_keep_non_md_extensions_distinct() {
        assert_ne!(phantom_key("image.png"), phantom_key("image"));
    }
}
