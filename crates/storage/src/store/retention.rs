#![forbid(unsafe_code)]

use super::*;
use nr_core::CompactedRoot;
use nr_core::reconstruct::revision_note;
use std::collections::HashSet;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetentionReport {
    /// Items that had at least one revision past the cutoff.
    pub items: usize,
    pub deleted: usize,
    /// Surviving revisions rewritten into self-contained roots.
    pub rewritten: usize,
}

impl SqliteStore {
    /// Retention with the configured TTL.
    pub fn delete_expired_revisions(&mut self) -> Result<RetentionReport, StoreError> {
        let ttl_ms = self.config.ttl_ms();
        self.delete_old_revisions(ttl_ms)
    }

    pub fn delete_old_revisions(&mut self, ttl_ms: i64) -> Result<RetentionReport, StoreError> {
        if ttl_ms < 0 {
            return Err(StoreError::InvalidInput("ttl must not be negative"));
        }
        self.delete_revisions_before(now_ms().saturating_sub(ttl_ms))
    }

    /// Drops every revision with `item_updated_at_ms < cutoff_ms`. For each
    /// affected item the oldest surviving revision becomes a root holding its
    /// full content, so everything at or after the cutoff still reconstructs.
    /// Each item is handled in its own transaction.
    pub fn delete_revisions_before(
        &mut self,
        cutoff_ms: i64,
    ) -> Result<RetentionReport, StoreError> {
        let items = expired_items(&self.conn, cutoff_ms)?;
        let mut report = RetentionReport::default();

        for (kind, item_id) in items {
            let (deleted, rewritten) = self.compact_item(kind, &item_id, cutoff_ms)?;
            report.items += 1;
            report.deleted += deleted;
            report.rewritten += rewritten;
        }

        tracing::info!(
            cutoff_ms,
            items = report.items,
            deleted = report.deleted,
            rewritten = report.rewritten,
            "old revisions deleted"
        );
        Ok(report)
    }

    fn compact_item(
        &mut self,
        kind: ItemKind,
        item_id: &str,
        cutoff_ms: i64,
    ) -> Result<(usize, usize), StoreError> {
        let tx = self.write_tx()?;
        let revisions = load_revisions_for_item(&tx, kind, item_id)?;

        let expired: HashSet<&str> = revisions
            .iter()
            .filter(|revision| revision.item_updated_at_ms < cutoff_ms)
            .map(|revision| revision.id.as_str())
            .collect();
        if expired.is_empty() {
            return Ok((0, 0));
        }

        // Reconstruct before anything is deleted: the chains still reach
        // through the expired revisions.
        let oldest_surviving = revisions
            .iter()
            .position(|revision| revision.item_updated_at_ms >= cutoff_ms);
        let mut roots: Vec<CompactedRoot> = Vec::new();
        for (position, revision) in revisions.iter().enumerate() {
            if revision.item_updated_at_ms < cutoff_ms {
                continue;
            }
            let orphaned = revision
                .parent_id
                .as_deref()
                .is_some_and(|parent_id| expired.contains(parent_id));
            if Some(position) == oldest_surviving || orphaned {
                let state = revision_note(&revisions, position)?;
                roots.push(revision.compact(&state));
            }
        }

        let deleted = tx.execute(
            "DELETE FROM revisions WHERE item_kind=?1 AND item_id=?2 AND item_updated_at_ms < ?3",
            params![kind.as_str(), item_id, cutoff_ms],
        )?;
        for root in &roots {
            rewrite_compacted_root_tx(&tx, root)?;
        }
        tx.commit()?;

        tracing::debug!(
            item_id,
            deleted,
            rewritten = roots.len(),
            "item revisions compacted"
        );
        Ok((deleted, roots.len()))
    }
}

/// Distinct items owning revisions older than `cutoff_ms`, most recently
/// touched first.
fn expired_items(
    conn: &Connection,
    cutoff_ms: i64,
) -> Result<Vec<(ItemKind, String)>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT item_kind, item_id, MAX(item_updated_at_ms) AS newest \
         FROM revisions \
         WHERE item_updated_at_ms < ?1 \
         GROUP BY item_kind, item_id \
         ORDER BY newest DESC, item_id ASC",
    )?;
    let mut rows = stmt.query(params![cutoff_ms])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let kind = row.get::<_, String>(0)?;
        let kind = ItemKind::parse(&kind)
            .ok_or(StoreError::InvalidInput("unknown item kind in revision row"))?;
        out.push((kind, row.get::<_, String>(1)?));
    }
    Ok(out)
}

/// The only write path that alters an existing revision row.
fn rewrite_compacted_root_tx(tx: &Transaction<'_>, root: &CompactedRoot) -> Result<(), StoreError> {
    let updated = tx.execute(
        "UPDATE revisions SET parent_id=NULL, title_diff=?2, body_diff=?3, metadata_diff=?4 WHERE id=?1",
        params![
            root.id(),
            root.title_diff(),
            root.body_diff(),
            root.metadata_diff()
        ],
    )?;
    if updated == 0 {
        return Err(StoreError::UnknownRevision {
            id: root.id().to_string(),
        });
    }
    Ok(())
}
