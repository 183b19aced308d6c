#![forbid(unsafe_code)]

use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::path::Path;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

pub const ENV_ENABLED: &str = "NR_REVISIONS_ENABLED";
pub const ENV_TTL_DAYS: &str = "NR_REVISIONS_TTL_DAYS";
pub const ENV_MIN_INTERVAL_MS: &str = "NR_REVISIONS_MIN_INTERVAL_MS";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevisionConfig {
    /// Master switch for collection and the save/delete hooks.
    pub enabled: bool,
    /// Revisions older than this are compacted by `delete_expired_revisions`.
    pub ttl_days: u32,
    /// Collection leaves a document alone until its latest revision is at
    /// least this much older than the document's current version.
    pub min_revision_interval_ms: i64,
}

impl Default for RevisionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_days: 90,
            min_revision_interval_ms: 0,
        }
    }
}

impl RevisionConfig {
    pub fn ttl_ms(&self) -> i64 {
        i64::from(self.ttl_days) * MS_PER_DAY
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, StoreError> {
        Self::parse(contents, "inline config")
    }

    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|err| StoreError::Config(format!("failed to read {}: {err}", path.display())))?;
        Self::parse(&contents, &path.display().to_string())
    }

    fn parse(contents: &str, origin: &str) -> Result<Self, StoreError> {
        let config: Self = toml::from_str(contents)
            .map_err(|err| StoreError::Config(format!("failed to parse {origin}: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Same as [`Self::apply_env_overrides`] with an explicit variable lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(ENV_ENABLED) {
            match raw.trim() {
                "1" | "true" | "yes" => self.enabled = true,
                "0" | "false" | "no" => self.enabled = false,
                "" => {}
                other => tracing::warn!("invalid {ENV_ENABLED}={other}, ignoring"),
            }
        }

        if let Some(raw) = lookup(ENV_TTL_DAYS) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                match trimmed.parse::<u32>() {
                    Ok(value) => self.ttl_days = value,
                    Err(err) => tracing::warn!("invalid {ENV_TTL_DAYS}, ignoring: {err}"),
                }
            }
        }

        if let Some(raw) = lookup(ENV_MIN_INTERVAL_MS) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                match trimmed.parse::<i64>() {
                    Ok(value) if value >= 0 => self.min_revision_interval_ms = value,
                    Ok(value) => tracing::warn!("negative {ENV_MIN_INTERVAL_MS}={value}, ignoring"),
                    Err(err) => tracing::warn!("invalid {ENV_MIN_INTERVAL_MS}, ignoring: {err}"),
                }
            }
        }
    }

    fn validate(&self) -> Result<(), StoreError> {
        if self.min_revision_interval_ms < 0 {
            return Err(StoreError::Config(
                "min_revision_interval_ms must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}
