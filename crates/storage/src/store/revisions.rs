#![forbid(unsafe_code)]

use super::*;
use nr_core::ItemId;
use nr_core::reconstruct::{Reconstruction, reconstruct};
use rusqlite::params_from_iter;
use std::collections::HashSet;

impl SqliteStore {
    /// Every revision of one item, oldest first.
    pub fn revisions_for_item(
        &self,
        kind: ItemKind,
        item_id: &ItemId,
    ) -> Result<Vec<Revision>, StoreError> {
        load_revisions_for_item(&self.conn, kind, item_id.as_str())
    }

    pub fn latest_revision_for_item(
        &self,
        kind: ItemKind,
        item_id: &ItemId,
    ) -> Result<Option<Revision>, StoreError> {
        latest_revision(&self.conn, kind, item_id.as_str())
    }

    pub fn revision(&self, id: &str) -> Result<Option<Revision>, StoreError> {
        if id.trim().is_empty() {
            return Err(StoreError::InvalidInput("revision id must not be empty"));
        }
        revision_by_id(&self.conn, id)
    }

    /// The subset of `item_ids` that has at least one revision.
    pub fn items_with_revisions(
        &self,
        kind: ItemKind,
        item_ids: &[ItemId],
    ) -> Result<BTreeSet<String>, StoreError> {
        let mut out = BTreeSet::new();
        if item_ids.is_empty() {
            return Ok(out);
        }

        let placeholders = vec!["?"; item_ids.len()].join(",");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT item_id FROM revisions WHERE item_kind=? AND item_id IN ({placeholders})"
        ))?;
        let values = std::iter::once(kind.as_str()).chain(item_ids.iter().map(ItemId::as_str));
        let mut rows = stmt.query(params_from_iter(values))?;
        while let Some(row) = rows.next()? {
            out.insert(row.get::<_, String>(0)?);
        }
        Ok(out)
    }

    /// The subset of `item_ids` with no revision, deduplicated, input order kept.
    pub fn items_without_revisions(
        &self,
        kind: ItemKind,
        item_ids: &[ItemId],
    ) -> Result<Vec<ItemId>, StoreError> {
        let with = self.items_with_revisions(kind, item_ids)?;
        let mut seen = HashSet::new();
        Ok(item_ids
            .iter()
            .filter(|id| !with.contains(id.as_str()) && seen.insert(id.as_str()))
            .cloned()
            .collect())
    }

    /// Content of `revisions[index]`; `revisions` is a listing as returned by
    /// [`Self::revisions_for_item`].
    pub fn revision_note(
        &self,
        revisions: &[Revision],
        index: usize,
    ) -> Result<DocumentState, StoreError> {
        Ok(nr_core::reconstruct::revision_note(revisions, index)?)
    }

    /// Like [`Self::revision_note`] but also reports the folded chain.
    pub fn reconstruct_revision(
        &self,
        revisions: &[Revision],
        index: usize,
    ) -> Result<Reconstruction, StoreError> {
        Ok(reconstruct(revisions, index)?)
    }

    /// Content of `revision`, loading the item's listing from the store.
    pub fn merge_revision(&self, revision: &Revision) -> Result<DocumentState, StoreError> {
        let revisions =
            load_revisions_for_item(&self.conn, revision.item_kind, &revision.item_id)?;
        Ok(merge_diffs(revision, &revisions)?)
    }

    /// Captures `document` as a new revision. With `parent_id` the delta is
    /// taken against that revision verbatim (two divergent edits of one base
    /// both point at it); without, against the item's latest revision.
    pub fn create_note_revision(
        &mut self,
        document: &Document,
        parent_id: Option<&str>,
    ) -> Result<Revision, StoreError> {
        let now_ms = now_ms();
        let tx = self.write_tx()?;

        let parent_id = match parent_id {
            Some(parent_id) => Some(parent_id.to_string()),
            None => latest_revision(&tx, document.kind, document.id.as_str())?
                .map(|revision| revision.id),
        };

        let revision = build_revision(&tx, document, parent_id.as_deref(), now_ms)?;
        insert_revision_tx(&tx, &revision)?;
        tx.commit()?;
        Ok(revision)
    }
}
