#![forbid(unsafe_code)]

pub mod ids;
pub mod model;
pub mod patch;
pub mod reconstruct;

pub use ids::{ItemId, ItemIdError};
pub use model::{CompactedRoot, Document, DocumentState, ItemKind, Metadata, Revision};
pub use patch::{ObjectPatch, PatchError};
pub use reconstruct::{ReconstructError, Reconstruction};
