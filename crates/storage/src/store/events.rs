#![forbid(unsafe_code)]

use super::*;

impl SqliteStore {
    /// Hook for the document store, called after every save with the version
    /// that was replaced (`None` on creation).
    ///
    /// Only a pre-existing document (created before revisioning was enabled)
    /// that has no revision gets one here, holding the content being
    /// overwritten. Everything else waits for `collect_revisions`.
    pub fn on_document_saved(
        &mut self,
        before: Option<&Document>,
        after: &Document,
    ) -> Result<Option<Revision>, StoreError> {
        if !self.config.enabled {
            return Ok(None);
        }
        let Some(before) = before else {
            return Ok(None);
        };
        if before.kind != after.kind || before.id != after.id {
            return Err(StoreError::InvalidInput(
                "saved document does not match the version it replaces",
            ));
        }
        if !after.content_differs(before) {
            return Ok(None);
        }

        let state = self.state()?;
        if before.created_at_ms >= state.revisions_enabled_since_ms {
            return Ok(None);
        }

        let now_ms = now_ms();
        let tx = self.write_tx()?;
        if item_has_revisions(&tx, before.kind, before.id.as_str())? {
            return Ok(None);
        }

        let revision = build_revision(&tx, before, None, now_ms)?;
        insert_revision_tx(&tx, &revision)?;
        tx.commit()?;

        tracing::info!(
            item_id = %before.id,
            revision_id = %revision.id,
            "first revision saved for pre-existing document"
        );
        Ok(Some(revision))
    }

    /// Hook for the document store, called with the last state of a deleted
    /// document. A document that never got a revision is captured once so
    /// its content survives the deletion.
    pub fn on_document_deleted(&mut self, last: &Document) -> Result<Option<Revision>, StoreError> {
        if !self.config.enabled {
            return Ok(None);
        }

        let now_ms = now_ms();
        let tx = self.write_tx()?;
        if item_has_revisions(&tx, last.kind, last.id.as_str())? {
            return Ok(None);
        }

        let revision = build_revision(&tx, last, None, now_ms)?;
        insert_revision_tx(&tx, &revision)?;
        tx.commit()?;

        tracing::info!(
            item_id = %last.id,
            revision_id = %revision.id,
            "revision saved for deleted document"
        );
        Ok(Some(revision))
    }
}
