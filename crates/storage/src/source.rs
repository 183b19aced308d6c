#![forbid(unsafe_code)]

use nr_core::{Document, ItemId, ItemKind};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{message}")]
pub struct SourceError {
    message: String,
}

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Read side of the document store that owns live notes.
pub trait DocumentSource {
    /// Documents of `kind` whose `updated_at_ms >= since_ms`.
    fn documents_updated_since(
        &self,
        kind: ItemKind,
        since_ms: i64,
    ) -> Result<Vec<Document>, SourceError>;

    fn document(&self, kind: ItemKind, id: &ItemId) -> Result<Option<Document>, SourceError>;
}

/// In-process document store. Callers forward its save/delete results to
/// `SqliteStore::on_document_saved` / `on_document_deleted`.
#[derive(Clone, Debug, Default)]
pub struct MemoryDocuments {
    documents: BTreeMap<(ItemKind, ItemId), Document>,
}

impl MemoryDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a document, returning the version it replaced.
    pub fn save(&mut self, document: Document) -> Option<Document> {
        self.documents
            .insert((document.kind, document.id.clone()), document)
    }

    pub fn delete(&mut self, kind: ItemKind, id: &ItemId) -> Option<Document> {
        self.documents.remove(&(kind, id.clone()))
    }

    pub fn get(&self, kind: ItemKind, id: &ItemId) -> Option<&Document> {
        self.documents.get(&(kind, id.clone()))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl DocumentSource for MemoryDocuments {
    fn documents_updated_since(
        &self,
        kind: ItemKind,
        since_ms: i64,
    ) -> Result<Vec<Document>, SourceError> {
        let mut out: Vec<Document> = self
            .documents
            .values()
            .filter(|document| document.kind == kind && document.updated_at_ms >= since_ms)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.updated_at_ms
                .cmp(&b.updated_at_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(out)
    }

    fn document(&self, kind: ItemKind, id: &ItemId) -> Result<Option<Document>, SourceError> {
        Ok(self.get(kind, id).cloned())
    }
}
