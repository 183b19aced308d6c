#![forbid(unsafe_code)]

use thiserror::Error;

const MAX_ID_LEN: usize = 128;

/// Identifier of a revisioned document (a note id in practice).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(String);

impl ItemId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn try_new(value: impl Into<String>) -> Result<Self, ItemIdError> {
        let value = value.into();
        validate_id(&value)?;
        Ok(Self(value))
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ItemIdError {
    #[error("id must not be empty")]
    Empty,
    #[error("id is too long")]
    TooLong,
    #[error("id must not have surrounding whitespace")]
    Untrimmed,
    #[error("id contains control characters")]
    ContainsControl,
}

/// Validates a document or revision identifier without taking ownership.
pub fn validate_id(value: &str) -> Result<(), ItemIdError> {
    if value.trim().is_empty() {
        return Err(ItemIdError::Empty);
    }
    if value.len() > MAX_ID_LEN {
        return Err(ItemIdError::TooLong);
    }
    if value.trim() != value {
        return Err(ItemIdError::Untrimmed);
    }
    if value.chars().any(|c| c.is_control()) {
        return Err(ItemIdError::ContainsControl);
    }
    Ok(())
}

/// Fresh revision id: 32 lowercase hex chars.
pub fn new_revision_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
