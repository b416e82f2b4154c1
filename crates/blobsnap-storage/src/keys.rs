//! Path templates and key validation shared by all storage backends.
//!
//! A template holds exactly one `{0}` slot. Direct objects fill it with the
//! UTC timestamp formatted as `yyyy.MM.dd.HH.mm.ss`; the latest alias fills it
//! with the literal `latest`. For `reports/{0}.json` this gives
//! `reports/2024.05.01.12.00.00.json` and `reports/latest.json`.

use crate::traits::{StorageError, StorageResult};
use blobsnap_core::constants::{LATEST_TOKEN, TEMPLATE_SLOT, TIMESTAMP_FORMAT};
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// A validated path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate(String);

impl PathTemplate {
    pub fn parse(template: &str) -> StorageResult<Self> {
        let slots = template.matches(TEMPLATE_SLOT).count();
        if slots != 1 {
            return Err(StorageError::InvalidArgument(format!(
                "Path template '{}' must contain exactly one {} slot, found {}",
                template, TEMPLATE_SLOT, slots
            )));
        }
        Ok(PathTemplate(template.to_string()))
    }

    /// Fill the slot with `value`.
    pub fn render(&self, value: &str) -> String {
        self.0.replacen(TEMPLATE_SLOT, value, 1)
    }

    pub fn latest_key(&self) -> String {
        self.render(LATEST_TOKEN)
    }

    pub fn direct_key(&self, timestamp: DateTime<Utc>) -> String {
        self.render(&timestamp.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PathTemplate {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PathTemplate::parse(s)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reject keys that could escape their container.
///
/// Keys must be non-empty and must not contain `..` segments or a leading `/`.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidArgument("Storage key is empty".to_string()));
    }
    if key.starts_with('/') || key.split('/').any(|segment| segment == "..") {
        return Err(StorageError::InvalidArgument(format!(
            "Storage key '{}' contains invalid path segments",
            key
        )));
    }
    Ok(())
}

/// Container names are a single path segment that does not start with `.`.
pub fn validate_container(container: &str) -> StorageResult<()> {
    if container.is_empty()
        || container.contains('/')
        || container.contains('\\')
        || container.starts_with('.')
    {
        return Err(StorageError::InvalidArgument(format!(
            "Invalid container name '{}'",
            container
        )));
    }
    Ok(())
}
