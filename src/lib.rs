mod build;
mod config;
mod error;
mod graph;
mod move_note;
mod mutate;
mod parse;
mod paths;
mod resolve;
mod rewrite;
mod sqlite;
mod transform;
mod vault;

pub use crate::build::{BuildReport, build};
pub use crate::config::{BuildConfig, Config, ExcludeConfig, Glob};
pub use crate::error::{Error, Result};
pub use crate::graph::{EdgeRecord, NodeKind, NodeRecord};
pub use crate::move_note::{MoveReport, move_note};
pub use crate::mutate::{
    AddOptions, AddReport, DeleteReport, UpdateReport, add, delete, update,
};
pub use crate::parse::{LinkOccurrence, LinkType, parse_links};
pub use crate::resolve::{ResolveMap, Resolution, resolve};
pub use crate::rewrite::RewriteEntry;
pub use crate::sqlite::{
    IndexStats, IndexStore, incoming_edges, live_stats, node_by_id, nodes_of_kind, note_by_path,
};
pub use crate::transform::{
    LinkFormat, SkippedLink, TransformReport, convert, repair, simplify,
};
pub use crate::vault::{CONFIG_FILE, DATA_DIR, INDEX_FILE, Vault};
