use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Storage backend types
///
/// This enum defines the available storage backend types.
/// It's defined in core because it's used in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Local,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "s3" => Ok(StorageBackend::S3),
            "local" => Ok(StorageBackend::Local),
            _ => Err(anyhow::anyhow!("Invalid storage backend: {}", s)),
        }
    }
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageBackend::S3 => write!(f, "s3"),
            StorageBackend::Local => write!(f, "local"),
        }
    }
}

/// Visibility a container is created with.
///
/// Mirrors the usual blob-store levels: `Private` allows no anonymous access,
/// `Blob` allows anonymous reads of individual objects, `Container` also
/// allows anonymous listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerAccess {
    Private,
    #[default]
    Blob,
    Container,
}

impl FromStr for ContainerAccess {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "private" | "off" => Ok(ContainerAccess::Private),
            "blob" => Ok(ContainerAccess::Blob),
            "container" => Ok(ContainerAccess::Container),
            _ => Err(anyhow::anyhow!("Invalid container access level: {}", s)),
        }
    }
}

impl Display for ContainerAccess {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ContainerAccess::Private => write!(f, "private"),
            ContainerAccess::Blob => write!(f, "blob"),
            ContainerAccess::Container => write!(f, "container"),
        }
    }
}
