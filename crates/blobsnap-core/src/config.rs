//! Configuration module
//!
//! Storage is addressed by a connection string of `;`-separated `Key=Value`
//! pairs (keys are case-insensitive):
//!
//! - `Backend=local;Path=/var/lib/blobsnap;BaseUrl=http://localhost:8080/blobs`
//! - `Backend=s3;Bucket=my-bucket;Region=eu-west-1;Endpoint=http://localhost:9000`
//!
//! `Endpoint` is optional and only needed for S3-compatible providers.

use std::collections::HashMap;
use std::env;

use anyhow::Context;

use crate::constants::{CONNECTION_STRING_ENV, CONTAINER_ACCESS_ENV};
use crate::storage_types::{ContainerAccess, StorageBackend};

/// Backend-specific storage settings parsed from a connection string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageConfig {
    Local {
        base_path: String,
        base_url: String,
    },
    S3 {
        bucket: String,
        region: String,
        endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, etc.)
    },
}

impl StorageConfig {
    pub fn from_connection_string(connection_string: &str) -> Result<Self, anyhow::Error> {
        let mut pairs = HashMap::new();
        for part in connection_string.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = part
                .split_once('=')
                .with_context(|| format!("Malformed connection string segment '{}'", part))?;
            pairs.insert(key.trim().to_lowercase(), value.trim().to_string());
        }

        let backend: StorageBackend = pairs
            .get("backend")
            .context("Connection string is missing 'Backend'")?
            .parse()?;

        let mut required = |name: &str| {
            pairs
                .remove(name)
                .filter(|value| !value.is_empty())
                .with_context(|| format!("Connection string is missing '{}' for {} backend", name, backend))
        };

        match backend {
            StorageBackend::Local => Ok(StorageConfig::Local {
                base_path: required("path")?,
                base_url: required("baseurl")?,
            }),
            StorageBackend::S3 => Ok(StorageConfig::S3 {
                bucket: required("bucket")?,
                region: required("region")?,
                endpoint: required("endpoint").ok(),
            }),
        }
    }

    pub fn backend(&self) -> StorageBackend {
        match self {
            StorageConfig::Local { .. } => StorageBackend::Local,
            StorageConfig::S3 { .. } => StorageBackend::S3,
        }
    }
}

/// Application configuration gathered from the environment.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub connection_string: Option<String>,
    pub container_access: ContainerAccess,
}

impl AppConfig {
    /// Load configuration from the process environment (and `.env`, if present).
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let container_access = match lookup(CONTAINER_ACCESS_ENV) {
            Some(value) => value
                .parse()
                .with_context(|| format!("Invalid {}", CONTAINER_ACCESS_ENV))?,
            None => ContainerAccess::default(),
        };

        Ok(AppConfig {
            connection_string: lookup(CONNECTION_STRING_ENV).filter(|s| !s.trim().is_empty()),
            container_access,
        })
    }

    pub fn storage(&self) -> Result<StorageConfig, anyhow::Error> {
        let connection_string = self
            .connection_string
            .as_deref()
            .with_context(|| format!("{} is not set", CONNECTION_STRING_ENV))?;
        StorageConfig::from_connection_string(connection_string)
    }
}
