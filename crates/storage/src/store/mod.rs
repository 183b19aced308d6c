#![forbid(unsafe_code)]

mod collect;
mod error;
mod events;
mod retention;
mod revisions;

pub use collect::CollectReport;
pub use error::StoreError;
pub use retention::RetentionReport;

use crate::config::RevisionConfig;
use nr_core::reconstruct::merge_diffs;
use nr_core::{Document, DocumentState, ItemKind, Revision};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DB_FILE_NAME: &str = "revisions.db";
const SCHEMA_VERSION: i64 = 1;

const REVISION_COLUMNS: &str = "id, parent_id, item_kind, item_id, item_updated_at_ms, \
     title_diff, body_diff, metadata_diff, created_at_ms";

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    storage_dir: PathBuf,
    config: RevisionConfig,
}

/// Persistent bookkeeping shared by the collector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreState {
    /// When revisioning was first enabled on this store. Documents created
    /// earlier are treated as pre-existing.
    pub revisions_enabled_since_ms: i64,
    /// Lower bound (inclusive) of the next collection window. Starts at
    /// `revisions_enabled_since_ms`.
    pub collected_until_ms: i64,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_config(storage_dir, RevisionConfig::default())
    }

    pub fn open_with_config(
        storage_dir: impl AsRef<Path>,
        config: RevisionConfig,
    ) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let conn = Connection::open(storage_dir.join(DB_FILE_NAME))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        preflight_gate(&conn)?;
        install_schema(&conn)?;

        tracing::debug!(dir = %storage_dir.display(), "revision store opened");
        Ok(Self {
            conn,
            storage_dir,
            config,
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn config(&self) -> &RevisionConfig {
        &self.config
    }

    pub fn state(&self) -> Result<StoreState, StoreError> {
        read_state(&self.conn)
    }

    /// Opens a write transaction that takes the database write lock up front,
    /// so two writers never interleave on one item's chain.
    fn write_tx(&mut self) -> Result<Transaction<'_>, StoreError> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }
}

fn preflight_gate(conn: &Connection) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let mut rows = stmt.query([])?;
    let mut tables = BTreeSet::new();
    while let Some(row) = rows.next()? {
        tables.insert(row.get::<_, String>(0)?);
    }

    if tables.is_empty() {
        return Ok(());
    }

    let required: BTreeSet<&str> = ["store_state", "revisions"].into_iter().collect();

    if tables
        .iter()
        .any(|table| !required.contains(table.as_str()))
    {
        return Err(StoreError::ResetRequired("unsupported tables detected"));
    }

    for table in required {
        if !tables.contains(table) {
            return Err(StoreError::ResetRequired("required table is missing"));
        }
    }

    let version = conn
        .query_row(
            "SELECT schema_version FROM store_state WHERE singleton=1",
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;

    match version {
        Some(v) if v == SCHEMA_VERSION => Ok(()),
        Some(_) => Err(StoreError::ResetRequired("schema version mismatch")),
        None => Err(StoreError::ResetRequired("schema state row is missing")),
    }
}

fn install_schema(conn: &Connection) -> Result<(), StoreError> {
    let now_ms = now_ms();

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS store_state (
          singleton INTEGER PRIMARY KEY CHECK(singleton = 1),
          schema_version INTEGER NOT NULL,
          revisions_enabled_since_ms INTEGER NOT NULL,
          collected_until_ms INTEGER NOT NULL,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS revisions (
          id TEXT PRIMARY KEY,
          parent_id TEXT,
          item_kind TEXT NOT NULL,
          item_id TEXT NOT NULL,
          item_updated_at_ms INTEGER NOT NULL,
          title_diff TEXT NOT NULL,
          body_diff TEXT NOT NULL,
          metadata_diff TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL,
          CHECK(parent_id IS NULL OR parent_id <> id)
        );

        CREATE INDEX IF NOT EXISTS idx_revisions_item_updated
          ON revisions(item_kind, item_id, item_updated_at_ms);

        CREATE INDEX IF NOT EXISTS idx_revisions_updated
          ON revisions(item_updated_at_ms);
        "#,
    )?;

    conn.execute(
        "INSERT INTO store_state(singleton, schema_version, revisions_enabled_since_ms, collected_until_ms, created_at_ms, updated_at_ms) \
         VALUES (1, ?1, ?2, ?2, ?2, ?2) \
         ON CONFLICT(singleton) DO UPDATE SET schema_version=excluded.schema_version, updated_at_ms=excluded.updated_at_ms",
        params![SCHEMA_VERSION, now_ms],
    )?;

    Ok(())
}

fn read_state(conn: &Connection) -> Result<StoreState, StoreError> {
    conn.query_row(
        "SELECT revisions_enabled_since_ms, collected_until_ms FROM store_state WHERE singleton=1",
        [],
        |row| {
            Ok(StoreState {
                revisions_enabled_since_ms: row.get(0)?,
                collected_until_ms: row.get(1)?,
            })
        },
    )
    .optional()?
    .ok_or(StoreError::ResetRequired("schema state row is missing"))
}

fn revision_from_row(row: &Row<'_>) -> Result<Revision, StoreError> {
    let kind = row.get::<_, String>(2)?;
    Ok(Revision {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        item_kind: ItemKind::parse(&kind)
            .ok_or(StoreError::InvalidInput("unknown item kind in revision row"))?,
        item_id: row.get(3)?,
        item_updated_at_ms: row.get(4)?,
        title_diff: row.get(5)?,
        body_diff: row.get(6)?,
        metadata_diff: row.get(7)?,
        created_at_ms: row.get(8)?,
    })
}

/// All revisions of one item in canonical order: `item_updated_at_ms`
/// ascending, ties by write time then id.
fn load_revisions_for_item(
    conn: &Connection,
    kind: ItemKind,
    item_id: &str,
) -> Result<Vec<Revision>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REVISION_COLUMNS} FROM revisions \
         WHERE item_kind=?1 AND item_id=?2 \
         ORDER BY item_updated_at_ms ASC, created_at_ms ASC, id ASC"
    ))?;
    let mut rows = stmt.query(params![kind.as_str(), item_id])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(revision_from_row(row)?);
    }
    Ok(out)
}

fn latest_revision(
    conn: &Connection,
    kind: ItemKind,
    item_id: &str,
) -> Result<Option<Revision>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REVISION_COLUMNS} FROM revisions \
         WHERE item_kind=?1 AND item_id=?2 \
         ORDER BY item_updated_at_ms DESC, created_at_ms DESC, id DESC \
         LIMIT 1"
    ))?;
    let mut rows = stmt.query(params![kind.as_str(), item_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(revision_from_row(row)?)),
        None => Ok(None),
    }
}

fn revision_by_id(conn: &Connection, id: &str) -> Result<Option<Revision>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REVISION_COLUMNS} FROM revisions WHERE id=?1"
    ))?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(revision_from_row(row)?)),
        None => Ok(None),
    }
}

fn item_has_revisions(conn: &Connection, kind: ItemKind, item_id: &str) -> Result<bool, StoreError> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM revisions WHERE item_kind=?1 AND item_id=?2 LIMIT 1",
            params![kind.as_str(), item_id],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .is_some())
}

/// Builds the revision capturing `document` on top of `parent_id` (or the
/// empty state). Nothing is written.
fn build_revision(
    conn: &Connection,
    document: &Document,
    parent_id: Option<&str>,
    now_ms: i64,
) -> Result<Revision, StoreError> {
    let base = match parent_id {
        Some(parent_id) => {
            let parent = revision_by_id(conn, parent_id)?
                .filter(|parent| {
                    parent.item_kind == document.kind && parent.item_id == document.id.as_str()
                })
                .ok_or_else(|| StoreError::UnknownRevision {
                    id: parent_id.to_string(),
                })?;
            let revisions = load_revisions_for_item(conn, document.kind, document.id.as_str())?;
            merge_diffs(&parent, &revisions)?
        }
        None => DocumentState::empty(),
    };
    Ok(Revision::capture(
        document,
        parent_id.map(str::to_string),
        &base,
        now_ms,
    ))
}

fn insert_revision_tx(tx: &Transaction<'_>, revision: &Revision) -> Result<(), StoreError> {
    tx.execute(
        &format!(
            "INSERT INTO revisions({REVISION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
        ),
        params![
            revision.id,
            revision.parent_id,
            revision.item_kind.as_str(),
            revision.item_id,
            revision.item_updated_at_ms,
            revision.title_diff,
            revision.body_diff,
            revision.metadata_diff,
            revision.created_at_ms,
        ],
    )?;
    tracing::debug!(
        revision_id = %revision.id,
        parent_id = ?revision.parent_id,
        item_id = %revision.item_id,
        item_updated_at_ms = revision.item_updated_at_ms,
        "revision written"
    );
    Ok(())
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration,
        Err(_) => return 0,
    };

    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
