#![forbid(unsafe_code)]

//! Rebuilds a document from its revision list.
//!
//! The list for one item is an arena: revisions reference their parent by id
//! and the walk resolves ids through a lookup table built over the slice.
//! Only revisions reachable from the target through `parent_id` are folded,
//! so sibling branches created by concurrent edits never leak into each
//! other's content.

use crate::model::{DocumentState, Revision};
use crate::patch::{PatchError, apply_object_patch_json, apply_text_patch};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconstructError {
    #[error("revision {id} is not in the supplied list")]
    RevisionNotFound { id: String },
    #[error("revision index {index} out of range ({len} revisions)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("revision chain loops back to {revision_id}")]
    Cycle { revision_id: String },
    #[error("revision {revision_id} cannot be applied: {source}")]
    Patch {
        revision_id: String,
        #[source]
        source: PatchError,
    },
}

impl ReconstructError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::RevisionNotFound { .. } | Self::IndexOutOfRange { .. } => "REVISION_NOT_FOUND",
            Self::Cycle { .. } => "REVISION_CHAIN_CORRUPT",
            Self::Patch { source, .. } => source.code(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Reconstruction {
    pub state: DocumentState,
    /// Ids of the folded revisions, root first, target last.
    pub chain: Vec<String>,
    /// False when the walk stopped at a parent id absent from the list and
    /// the oldest available ancestor was treated as the root.
    pub complete: bool,
}

/// Consideration order for `revisions` (positions into the slice): input
/// order with the target moved last, so it wins over revisions that share
/// its timestamp.
pub fn move_revision_to_top(
    target_id: &str,
    revisions: &[Revision],
) -> Result<Vec<usize>, ReconstructError> {
    let target = revisions
        .iter()
        .rposition(|revision| revision.id == target_id)
        .ok_or_else(|| ReconstructError::RevisionNotFound {
            id: target_id.to_string(),
        })?;

    let mut order: Vec<usize> = (0..revisions.len()).filter(|&i| i != target).collect();
    order.push(target);
    Ok(order)
}

/// Positions of the target's ancestors, root first, plus whether the chain
/// reached a real root.
///
/// Parents are resolved by id only, so the walk does not depend on how ties
/// in the listing are ordered and needs no [`move_revision_to_top`] pass.
pub fn ancestor_chain(
    revisions: &[Revision],
    target_index: usize,
) -> Result<(Vec<usize>, bool), ReconstructError> {
    let target = revisions
        .get(target_index)
        .ok_or(ReconstructError::IndexOutOfRange {
            index: target_index,
            len: revisions.len(),
        })?;

    let by_id: HashMap<&str, usize> = revisions
        .iter()
        .enumerate()
        .map(|(position, revision)| (revision.id.as_str(), position))
        .collect();

    let mut chain = vec![target_index];
    let mut visited = HashSet::from([target_index]);
    let mut current = target;
    let mut complete = true;

    while let Some(parent_id) = current.parent_id.as_deref() {
        let Some(&parent) = by_id.get(parent_id) else {
            tracing::warn!(
                revision_id = %current.id,
                parent_id,
                item_id = %current.item_id,
                "parent revision missing; treating oldest available ancestor as root"
            );
            complete = false;
            break;
        };
        if !visited.insert(parent) {
            return Err(ReconstructError::Cycle {
                revision_id: parent_id.to_string(),
            });
        }
        chain.push(parent);
        current = &revisions[parent];
    }

    chain.reverse();
    Ok((chain, complete))
}

/// Applies one revision's three patches on top of `state`.
pub fn apply_revision(
    state: &DocumentState,
    revision: &Revision,
) -> Result<DocumentState, ReconstructError> {
    let wrap = |source: PatchError| ReconstructError::Patch {
        revision_id: revision.id.clone(),
        source,
    };
    Ok(DocumentState {
        title: apply_text_patch(&state.title, &revision.title_diff).map_err(wrap)?,
        body: apply_text_patch(&state.body, &revision.body_diff).map_err(wrap)?,
        metadata: apply_object_patch_json(&state.metadata, &revision.metadata_diff)
            .map_err(wrap)?,
    })
}

/// Rebuilds the document as of `revisions[target_index]`. `revisions` must
/// belong to one item and be ordered by `item_updated_at_ms` ascending.
pub fn reconstruct(
    revisions: &[Revision],
    target_index: usize,
) -> Result<Reconstruction, ReconstructError> {
    let (chain, complete) = ancestor_chain(revisions, target_index)?;

    let mut state = DocumentState::empty();
    for &position in &chain {
        state = apply_revision(&state, &revisions[position])?;
    }

    Ok(Reconstruction {
        state,
        chain: chain
            .iter()
            .map(|&position| revisions[position].id.clone())
            .collect(),
        complete,
    })
}

pub fn revision_note(
    revisions: &[Revision],
    target_index: usize,
) -> Result<DocumentState, ReconstructError> {
    Ok(reconstruct(revisions, target_index)?.state)
}

/// Same as [`revision_note`] with the target given by identity.
pub fn merge_diffs(
    target: &Revision,
    revisions: &[Revision],
) -> Result<DocumentState, ReconstructError> {
    let index = revisions
        .iter()
        .rposition(|revision| revision.id == target.id)
        .ok_or_else(|| ReconstructError::RevisionNotFound {
            id: target.id.clone(),
        })?;
    revision_note(revisions, index)
}
