#![forbid(unsafe_code)]

use crate::source::SourceError;
use nr_core::ReconstructError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("RESET_REQUIRED: {0}")]
    ResetRequired(&'static str),
    #[error("unknown id")]
    UnknownId,
    #[error("unknown revision: {id}")]
    UnknownRevision { id: String },
    #[error(transparent)]
    Reconstruct(#[from] ReconstructError),
    #[error("config: {0}")]
    Config(String),
    #[error("document source: {0}")]
    Source(#[from] SourceError),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "IO",
            Self::Sql(_) => "SQLITE",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::ResetRequired(_) => "RESET_REQUIRED",
            Self::UnknownId => "UNKNOWN_ID",
            Self::UnknownRevision { .. } => "UNKNOWN_REVISION",
            Self::Reconstruct(err) => err.code(),
            Self::Config(_) => "CONFIG",
            Self::Source(_) => "SOURCE_FAILED",
        }
    }
}
