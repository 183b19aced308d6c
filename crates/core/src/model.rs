#![forbid(unsafe_code)]

use crate::ids::{ItemId, new_revision_id};
use crate::patch::{create_object_patch, create_text_patch, parse_object_patch};
use serde::{Deserialize, Serialize};

pub type Metadata = serde_json::Map<String, serde_json::Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Note,
}

impl ItemKind {
    /// Kinds the collector walks on every pass.
    pub const REVISIONED: &'static [ItemKind] = &[ItemKind::Note];

    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Note => "note",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "note" => Some(ItemKind::Note),
            _ => None,
        }
    }
}

/// Live document as owned by the document store.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub kind: ItemKind,
    pub id: ItemId,
    pub title: String,
    pub body: String,
    pub metadata: Metadata,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl Document {
    pub fn note(id: ItemId, title: impl Into<String>, body: impl Into<String>, at_ms: i64) -> Self {
        Self {
            kind: ItemKind::Note,
            id,
            title: title.into(),
            body: body.into(),
            metadata: Metadata::new(),
            created_at_ms: at_ms,
            updated_at_ms: at_ms,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn state(&self) -> DocumentState {
        DocumentState {
            title: self.title.clone(),
            body: self.body.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// True when title, body or metadata differ from `other`.
    pub fn content_differs(&self, other: &Document) -> bool {
        self.title != other.title || self.body != other.body || self.metadata != other.metadata
    }
}

/// Materialized document content at some revision.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentState {
    pub title: String,
    pub body: String,
    pub metadata: Metadata,
}

impl DocumentState {
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub id: String,
    pub parent_id: Option<String>,
    pub item_kind: ItemKind,
    pub item_id: String,
    pub item_updated_at_ms: i64,
    pub title_diff: String,
    pub body_diff: String,
    pub metadata_diff: String,
    pub created_at_ms: i64,
}

impl Revision {
    /// Builds a new revision holding the delta from `base` (the parent's
    /// reconstructed state, or the empty state) to `document`.
    pub fn capture(
        document: &Document,
        parent_id: Option<String>,
        base: &DocumentState,
        created_at_ms: i64,
    ) -> Self {
        Self {
            id: new_revision_id(),
            parent_id,
            item_kind: document.kind,
            item_id: document.id.as_str().to_string(),
            item_updated_at_ms: document.updated_at_ms,
            title_diff: create_text_patch(&base.title, &document.title),
            body_diff: create_text_patch(&base.body, &document.body),
            metadata_diff: create_object_patch(&base.metadata, &document.metadata).to_json(),
            created_at_ms,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// False when applying this revision to its parent would change nothing.
    /// An unparseable metadata patch counts as a change.
    pub fn has_changes(&self) -> bool {
        !self.title_diff.is_empty()
            || !self.body_diff.is_empty()
            || parse_object_patch(&self.metadata_diff).map_or(true, |patch| !patch.is_empty())
    }

    /// Turns this revision into a self-contained root holding `state`, which
    /// must be the revision's reconstructed content.
    pub fn compact(&self, state: &DocumentState) -> CompactedRoot {
        CompactedRoot::from_state(self.id.clone(), state)
    }
}

/// A revision rewritten by retention: no parent, every patch relative to the
/// empty document. Only constructible from a full state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompactedRoot {
    id: String,
    title_diff: String,
    body_diff: String,
    metadata_diff: String,
}

impl CompactedRoot {
    pub fn from_state(id: String, state: &DocumentState) -> Self {
        let empty = DocumentState::empty();
        Self {
            id,
            title_diff: create_text_patch(&empty.title, &state.title),
            body_diff: create_text_patch(&empty.body, &state.body),
            metadata_diff: create_object_patch(&empty.metadata, &state.metadata).to_json(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title_diff(&self) -> &str {
        &self.title_diff
    }

    pub fn body_diff(&self) -> &str {
        &self.body_diff
    }

    pub fn metadata_diff(&self) -> &str {
        &self.metadata_diff
    }

    /// The row as it reads after the rewrite.
    pub fn apply_to(&self, revision: &Revision) -> Revision {
        Revision {
            parent_id: None,
            title_diff: self.title_diff.clone(),
            body_diff: self.body_diff.clone(),
            metadata_diff: self.metadata_diff.clone(),
            ..revision.clone()
        }
    }
}
