use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde::Serialize;

use crate::graph::{EdgeRecord, NodeKind, NodeRecord, asset_key, note_key, phantom_key, tag_key};
use crate::parse::{LinkOccurrence, LinkType};
use crate::paths::{file_name, note_basename};
use crate::resolve::{ResolveMap, Resolution};
use crate::vault::Vault;
use crate::{Error, Result};

/// Handle over the SQLite index. Row-level operations are free functions
/// over `&Connection` so they compose with transactions via deref.
pub struct IndexStore {
    conn: Connection,
}

impl IndexStore {
    /// Open (or create) a store at an explicit path and initialize the
    /// schema. Used by Build against the temp path.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Open the live index of a vault; missing index is a user-visible
    /// error asking for a build.
    pub fn open_live(vault: &Vault) -> Result<Self> {
        let path = vault.index_path();
        if !path.is_file() {
            return Err(Error::IndexNotFound(path));
        }
        Ok(Self {
            conn: Connection::open(path)?,
        })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| Error::Sqlite(e))
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA foreign_keys=ON;

             CREATE TABLE IF NOT EXISTS nodes(
               id INTEGER PRIMARY KEY,
               node_key TEXT UNIQUE NOT NULL,
               type TEXT NOT NULL,
               name TEXT NOT NULL,
               path TEXT,
               exists_flag INTEGER NOT NULL DEFAULT 1,
               mtime INTEGER
             );
             CREATE INDEX IF NOT EXISTS idx_nodes_type_name ON nodes(type, name);
             CREATE INDEX IF NOT EXISTS idx_nodes_path ON nodes(path);

             CREATE TABLE IF NOT EXISTS edges(
               id INTEGER PRIMARY KEY,
               source_id INTEGER NOT NULL,
               target_id INTEGER NOT NULL,
               link_type TEXT NOT NULL,
               raw_link TEXT NOT NULL,
               subpath TEXT,
               line_start INTEGER,
               line_end INTEGER,
               FOREIGN KEY(source_id) REFERENCES nodes(id),
               FOREIGN KEY(target_id) REFERENCES nodes(id)
             );
             CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id);
             CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);
            ",
        )?;
        Ok(())
    }
}

/// Replace the live index with the freshly built temp store.
pub fn swap_into_live(tmp: &Path, live: &Path) -> Result<()> {
    std::fs::rename(tmp, live).map_err(|e| Error::io(tmp, e))
}

fn row_to_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<NodeRecord> {
    let kind: String = row.get(1)?;
    Ok(NodeRecord {
        id: row.get(0)?,
        kind: NodeKind::from_str(&kind).unwrap_or(NodeKind::Phantom),
        name: row.get(2)?,
        path: row.get(3)?,
        exists: row.get::<_, i64>(4)? != 0,
        mtime: row.get(5)?,
    })
}

const NODE_COLS: &str = "id, type, name, path, exists_flag, mtime";

fn row_to_edge(row: &rusqlite::Row<'_>) -> rusqlite::Result<EdgeRecord> {
    let link_type: String = row.get(3)?;
    Ok(EdgeRecord {
        id: row.get(0)?,
        source_id: row.get(1)?,
        target_id: row.get(2)?,
        link_type: LinkType::from_str(&link_type).unwrap_or(LinkType::Wikilink),
        raw_link: row.get(4)?,
        subpath: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        line_start: row.get::<_, i64>(6)? as u32,
        line_end: row.get::<_, i64>(7)? as u32,
    })
}

const EDGE_COLS: &str = "id, source_id, target_id, link_type, raw_link, subpath, line_start, line_end";

pub fn node_id_by_key(conn: &Connection, key: &str) -> Result<Option<i64>> {
    Ok(conn
        .query_row("SELECT id FROM nodes WHERE node_key=?1", params![key], |r| {
            r.get(0)
        })
        .optional()?)
}

pub fn node_by_id(conn: &Connection, id: i64) -> Result<Option<NodeRecord>> {
    let sql = format!("SELECT {NODE_COLS} FROM nodes WHERE id=?1");
    Ok(conn.query_row(&sql, params![id], row_to_node).optional()?)
}

pub fn note_by_path(conn: &Connection, path: &str) -> Result<Option<NodeRecord>> {
    let sql = format!("SELECT {NODE_COLS} FROM nodes WHERE node_key=?1");
    Ok(conn
        .query_row(&sql, params![note_key(path)], row_to_node)
        .optional()?)
}

pub fn nodes_of_kind(conn: &Connection, kind: NodeKind) -> Result<Vec<NodeRecord>> {
    let sql = format!("SELECT {NODE_COLS} FROM nodes WHERE type=?1 ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![kind.as_str()], row_to_node)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Resolve-map snapshot over the registered note and asset rows.
pub fn resolve_map_from_store(conn: &Connection) -> Result<ResolveMap> {
    let mut maps = ResolveMap::default();
    for note in nodes_of_kind(conn, NodeKind::Note)? {
        if let Some(path) = &note.path {
            maps.add_note(path);
        }
    }
    for asset in nodes_of_kind(conn, NodeKind::Asset)? {
        if let Some(path) = &asset.path {
            maps.add_asset(path);
        }
    }
    Ok(maps)
}

pub fn insert_note(conn: &Connection, path: &str, mtime: i64) -> Result<i64> {
    conn.execute(
        "INSERT INTO nodes(node_key, type, name, path, exists_flag, mtime)
         VALUES(?1, 'note', ?2, ?3, 1, ?4)",
        params![note_key(path), note_basename(path), path, mtime],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_asset(conn: &Connection, path: &str, mtime: i64) -> Result<i64> {
    conn.execute(
        "INSERT INTO nodes(node_key, type, name, path, exists_flag, mtime)
         VALUES(?1, 'asset', ?2, ?3, 1, ?4)",
        params![asset_key(path), file_name(path), path, mtime],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Tag upsert keyed case-insensitively; the first-seen display name wins.
pub fn upsert_tag(conn: &Connection, name: &str) -> Result<i64> {
    let key = tag_key(name);
    if let Some(id) = node_id_by_key(conn, &key)? {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO nodes(node_key, type, name, path, exists_flag, mtime)
         VALUES(?1, 'tag', ?2, NULL, 0, NULL)",
        params![key, name],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Phantom upsert; as with tags, the first occurrence fixes the casing.
pub fn upsert_phantom(conn: &Connection, name: &str) -> Result<i64> {
    let key = phantom_key(name);
    if let Some(id) = node_id_by_key(conn, &key)? {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO nodes(node_key, type, name, path, exists_flag, mtime)
         VALUES(?1, 'phantom', ?2, NULL, 0, NULL)",
        params![key, name],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Turn a resolver verdict into the target node id, creating tag/phantom
/// rows on demand.
pub fn target_id_for(conn: &Connection, source_id: i64, resolution: &Resolution) -> Result<i64> {
    match resolution {
        Resolution::SelfLink => Ok(source_id),
        Resolution::Tag(name) => upsert_tag(conn, name),
        Resolution::Phantom(name) => upsert_phantom(conn, name),
        Resolution::Note(path) => node_id_by_key(conn, &note_key(path))?
            .ok_or_else(|| Error::FileNotRegistered(path.clone())),
        Resolution::Asset(path) => node_id_by_key(conn, &asset_key(path))?
            .ok_or_else(|| Error::FileNotRegistered(path.clone())),
    }
}

pub fn insert_edge(
    conn: &Connection,
    source_id: i64,
    target_id: i64,
    occ: &LinkOccurrence,
) -> Result<()> {
    conn.execute(
        "INSERT INTO edges(source_id, target_id, link_type, raw_link, subpath, line_start, line_end)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            source_id,
            target_id,
            occ.link_type.as_str(),
            occ.raw_link,
            occ.subpath,
            occ.line_start as i64,
            occ.line_end as i64,
        ],
    )?;
    Ok(())
}

pub fn incoming_edges(conn: &Connection, target_id: i64) -> Result<Vec<EdgeRecord>> {
    let sql = format!("SELECT {EDGE_COLS} FROM edges WHERE target_id=?1 ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![target_id], row_to_edge)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// All wikilink/markdown edges with endpoint context, for vault-wide
/// planning passes.
#[derive(Debug, Clone)]
pub struct LinkEdge {
    pub edge: EdgeRecord,
    pub source_path: String,
    pub source_mtime: i64,
    pub target_kind: NodeKind,
    pub target_path: Option<String>,
    pub target_name: String,
}

pub fn link_edges(conn: &Connection) -> Result<Vec<LinkEdge>> {
    let sql = format!(
        "SELECT {cols}, s.path, s.mtime, t.type, t.path, t.name
         FROM edges e
         JOIN nodes s ON s.id = e.source_id
         JOIN nodes t ON t.id = e.target_id
         WHERE e.link_type IN ('wikilink', 'markdown')
         ORDER BY e.id",
        cols = "e.id, e.source_id, e.target_id, e.link_type, e.raw_link, e.subpath, e.line_start, e.line_end"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        let edge = row_to_edge(row)?;
        let target_kind: String = row.get(10)?;
        Ok(LinkEdge {
            edge,
            source_path: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
            source_mtime: row.get::<_, Option<i64>>(9)?.unwrap_or_default(),
            target_kind: NodeKind::from_str(&target_kind).unwrap_or(NodeKind::Phantom),
            target_path: row.get(11)?,
            target_name: row.get(12)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn delete_outgoing_edges(conn: &Connection, source_id: i64) -> Result<()> {
    conn.execute("DELETE FROM edges WHERE source_id=?1", params![source_id])?;
    Ok(())
}

pub fn delete_edges_touching(conn: &Connection, id: i64) -> Result<()> {
    conn.execute(
        "DELETE FROM edges WHERE source_id=?1 OR target_id=?1",
        params![id],
    )?;
    Ok(())
}

/// Incoming references that keep a node alive; self-references don't count.
pub fn incoming_count_excluding_self(conn: &Connection, id: i64) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(1) FROM edges WHERE target_id=?1 AND source_id<>?1",
        params![id],
        |r| r.get(0),
    )?)
}

pub fn reassign_edge_targets(conn: &Connection, from_id: i64, to_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE edges SET target_id=?2 WHERE target_id=?1",
        params![from_id, to_id],
    )?;
    Ok(())
}

pub fn update_edge_raw(conn: &Connection, edge_id: i64, raw: &str) -> Result<()> {
    conn.execute(
        "UPDATE edges SET raw_link=?2 WHERE id=?1",
        params![edge_id, raw],
    )?;
    Ok(())
}

pub fn update_note_mtime(conn: &Connection, id: i64, mtime: i64) -> Result<()> {
    conn.execute(
        "UPDATE nodes SET mtime=?2 WHERE id=?1",
        params![id, mtime],
    )?;
    Ok(())
}

/// Rekey a moved note in place: new path, display name, and mtime.
pub fn update_note_identity(conn: &Connection, id: i64, path: &str, mtime: i64) -> Result<()> {
    conn.execute(
        "UPDATE nodes SET node_key=?2, name=?3, path=?4, mtime=?5 WHERE id=?1",
        params![id, note_key(path), note_basename(path), path, mtime],
    )?;
    Ok(())
}

pub fn delete_node(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM nodes WHERE id=?1", params![id])?;
    Ok(())
}

/// Promote a phantom whose key matches `name` onto an existing note or
/// asset node: incoming edges move over (ids preserved), the phantom row
/// goes away. Returns whether a promotion happened.
pub fn promote_phantom_onto(conn: &Connection, name: &str, node_id: i64) -> Result<bool> {
    let Some(phantom_id) = node_id_by_key(conn, &phantom_key(name))? else {
        return Ok(false);
    };
    reassign_edge_targets(conn, phantom_id, node_id)?;
    delete_node(conn, phantom_id)?;
    Ok(true)
}

/// Note → phantom demotion when the file disappeared but references
/// remain. Reuses an existing phantom row when one holds the key,
/// otherwise converts the note row in place.
pub fn phantomize_note(conn: &Connection, node: &NodeRecord) -> Result<()> {
    delete_outgoing_edges(conn, node.id)?;
    let key = phantom_key(&node.name);
    if let Some(phantom_id) = node_id_by_key(conn, &key)? {
        reassign_edge_targets(conn, node.id, phantom_id)?;
        delete_node(conn, node.id)?;
    } else {
        conn.execute(
            "UPDATE nodes SET node_key=?2, type='phantom', path=NULL, mtime=NULL, exists_flag=0
             WHERE id=?1",
            params![node.id, key],
        )?;
    }
    Ok(())
}

/// Remove a note nothing else references: all touching edges, then the row.
pub fn delete_note_completely(conn: &Connection, id: i64) -> Result<()> {
    delete_edges_touching(conn, id)?;
    delete_node(conn, id)
}

/// Drop tag and phantom nodes no edge targets anymore. Runs at the end of
/// every mutation transaction.
pub fn orphan_cleanup(conn: &Connection) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM nodes
         WHERE type IN ('tag', 'phantom')
           AND id NOT IN (SELECT DISTINCT target_id FROM edges)",
        [],
    )?)
}

/// Read-only counts projection surfaced by `mdhop stats`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub notes: usize,
    pub assets: usize,
    pub tags: usize,
    pub phantoms: usize,
    pub edges: usize,
    pub wikilink_edges: usize,
    pub markdown_edges: usize,
    pub tag_edges: usize,
    pub frontmatter_edges: usize,
}

pub fn stats(conn: &Connection) -> Result<IndexStats> {
    let node_count = |kind: &str| -> Result<usize> {
        let n: i64 = conn.query_row(
            "SELECT COUNT(1) FROM nodes WHERE type=?1",
            params![kind],
            |r| r.get(0),
        )?;
        Ok(n as usize)
    };
    let edge_count = |lt: &str| -> Result<usize> {
        let n: i64 = conn.query_row(
            "SELECT COUNT(1) FROM edges WHERE link_type=?1",
            params![lt],
            |r| r.get(0),
        )?;
        Ok(n as usize)
    };
    let edges: i64 = conn.query_row("SELECT COUNT(1) FROM edges", [], |r| r.get(0))?;
    Ok(IndexStats {
        notes: node_count("note")?,
        assets: node_count("asset")?,
        tags: node_count("tag")?,
        phantoms: node_count("phantom")?,
        edges: edges as usize,
        wikilink_edges: edge_count("wikilink")?,
        markdown_edges: edge_count("markdown")?,
        tag_edges: edge_count("tag")?,
        frontmatter_edges: edge_count("frontmatter")?,
    })
}

/// Counts from a vault's live index.
pub fn live_stats(vault: &Vault) -> Result<IndexStats> {
    let store = IndexStore::open_live(vault)?;
    stats(store.conn())
}

/// Remove a leftover temp store from an interrupted build.
pub fn remove_stale_tmp(tmp: &PathBuf) {
    if tmp.exists() {
        let _ = std::fs::remove_file(tmp);
    }
}
