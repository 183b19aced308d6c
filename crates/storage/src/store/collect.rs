#![forbid(unsafe_code)]

use super::*;
use crate::source::DocumentSource;
use nr_core::ItemId;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectReport {
    pub scanned: usize,
    pub created: usize,
    /// Documents left for a later pass because of the minimum interval.
    pub deferred: usize,
    /// Collection window start for the next pass.
    pub checkpoint_ms: i64,
}

#[derive(Debug)]
enum Outcome {
    Created(Revision),
    AlreadyCaptured,
    NeverEdited,
    Untouched,
    Unchanged,
    TooSoon,
}

impl SqliteStore {
    /// Captures every revisioned document changed since the last pass that
    /// has no revision for its current version yet. Re-running over an
    /// overlapping window is harmless: a version already captured is skipped.
    pub fn collect_revisions(
        &mut self,
        source: &dyn DocumentSource,
    ) -> Result<CollectReport, StoreError> {
        let state = self.state()?;
        let mut report = CollectReport {
            checkpoint_ms: state.collected_until_ms,
            ..CollectReport::default()
        };
        if !self.config.enabled {
            return Ok(report);
        }

        let mut checkpoint = state.collected_until_ms;
        let mut held_back: Option<i64> = None;

        for &kind in ItemKind::REVISIONED {
            let documents = source.documents_updated_since(kind, state.collected_until_ms)?;
            for document in &documents {
                report.scanned += 1;
                match self.collect_document(document, state.revisions_enabled_since_ms)? {
                    Outcome::Created(_) => report.created += 1,
                    Outcome::TooSoon => {
                        report.deferred += 1;
                        held_back = Some(
                            held_back.map_or(document.updated_at_ms, |held| {
                                held.min(document.updated_at_ms)
                            }),
                        );
                    }
                    Outcome::AlreadyCaptured
                    | Outcome::NeverEdited
                    | Outcome::Untouched
                    | Outcome::Unchanged => {}
                }
                checkpoint = checkpoint.max(document.updated_at_ms);
            }
        }

        if let Some(held) = held_back {
            checkpoint = checkpoint.min(held);
        }
        if checkpoint > state.collected_until_ms {
            self.conn.execute(
                "UPDATE store_state SET collected_until_ms=MAX(collected_until_ms, ?1), updated_at_ms=?2 WHERE singleton=1",
                params![checkpoint, now_ms()],
            )?;
        }
        report.checkpoint_ms = self.state()?.collected_until_ms;

        tracing::info!(
            scanned = report.scanned,
            created = report.created,
            deferred = report.deferred,
            checkpoint_ms = report.checkpoint_ms,
            "revision collection finished"
        );
        Ok(report)
    }

    /// Captures the current version of one document right away, outside the
    /// collection window. Returns `None` when there is nothing new to record.
    pub fn collect_item(
        &mut self,
        source: &dyn DocumentSource,
        kind: ItemKind,
        item_id: &ItemId,
    ) -> Result<Option<Revision>, StoreError> {
        if !self.config.enabled {
            return Ok(None);
        }
        let Some(document) = source.document(kind, item_id)? else {
            return Err(StoreError::UnknownId);
        };
        let enabled_since = self.state()?.revisions_enabled_since_ms;
        match self.collect_document(&document, enabled_since)? {
            Outcome::Created(revision) => Ok(Some(revision)),
            _ => Ok(None),
        }
    }

    fn collect_document(
        &mut self,
        document: &Document,
        enabled_since_ms: i64,
    ) -> Result<Outcome, StoreError> {
        let min_interval_ms = self.config.min_revision_interval_ms;
        let now_ms = now_ms();
        let tx = self.write_tx()?;

        let latest = latest_revision(&tx, document.kind, document.id.as_str())?;
        match &latest {
            Some(latest) => {
                if latest.item_updated_at_ms >= document.updated_at_ms {
                    return Ok(Outcome::AlreadyCaptured);
                }
                if document.updated_at_ms - latest.item_updated_at_ms < min_interval_ms {
                    return Ok(Outcome::TooSoon);
                }
            }
            None => {
                // Pre-existing documents untouched since enabling are left to
                // the first-overwrite hook.
                if document.updated_at_ms < enabled_since_ms {
                    return Ok(Outcome::Untouched);
                }
                let created_while_enabled = document.created_at_ms >= enabled_since_ms;
                if created_while_enabled && document.updated_at_ms <= document.created_at_ms {
                    return Ok(Outcome::NeverEdited);
                }
            }
        }

        let parent_id = latest.map(|revision| revision.id);
        let revision = build_revision(&tx, document, parent_id.as_deref(), now_ms)?;
        if !revision.has_changes() {
            return Ok(Outcome::Unchanged);
        }

        insert_revision_tx(&tx, &revision)?;
        tx.commit()?;
        Ok(Outcome::Created(revision))
    }
}
