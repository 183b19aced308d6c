#![forbid(unsafe_code)]

//! Patch codec: the only place that knows how field deltas are encoded.
//!
//! Text fields use a character diff serialized as context hunks; the
//! metadata map uses a shallow key-level patch with tombstones. Both
//! directions are pure functions so the diff engine can be swapped without
//! touching collection, reconstruction or retention.

mod object;
mod text;

pub use object::*;
pub use text::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("malformed patch: {reason}")]
    Malformed { reason: &'static str },
    #[error("unapplyable patch: hunk {hunk} does not match at offset {offset}")]
    Unapplyable { hunk: usize, offset: usize },
    #[error("malformed object patch: {0}")]
    ObjectJson(#[from] serde_json::Error),
}

impl PatchError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Malformed { .. } | Self::ObjectJson(_) => "PATCH_MALFORMED",
            Self::Unapplyable { .. } => "PATCH_UNAPPLYABLE",
        }
    }
}
