//! Helpers shared by the `blobsnap` binary.

use anyhow::Context;
use blobsnap_core::constants::CONNECTION_STRING_ENV;
use blobsnap_core::AppConfig;
use blobsnap_services::{
    ContainerAccess, Content, EqualityStrategy, JsonEquality, ObjectLocation, SkipReason,
    UploadOutcome,
};
use clap::{ArgAction, Parser, ValueEnum};
use std::ffi::OsString;
use serde::Serialize;
use std::io::SeekFrom;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncSeekExt};

#[derive(Debug, Parser)]
#[command(name = "blobsnap", about = "Upload stdin as a timestamped blob snapshot")]
pub struct Cli {
    /// Storage connection string
    #[arg(long, env = CONNECTION_STRING_ENV, hide_env_values = true)]
    pub connection_string: Option<String>,
    /// Container to upload into (created if missing)
    #[arg(long)]
    pub container: String,
    /// Object key template with a single {0} slot, e.g. reports/{0}.json
    #[arg(long)]
    pub path_format: String,
    /// Write the timestamped object
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub update_direct: bool,
    /// Also write the `latest` object
    #[arg(long)]
    pub update_latest: bool,
    /// Skip the upload when the content matches the current `latest` object
    #[arg(long)]
    pub only_unique: bool,
    /// Content type recorded on written objects
    #[arg(long)]
    pub content_type: Option<String>,
    /// How to compare content that differs byte-wise from `latest`
    #[arg(long, value_enum, default_value_t = CompareMode::Hash)]
    pub compare: CompareMode,
    /// Access level for a newly created container
    #[arg(long)]
    pub container_access: Option<ContainerAccess>,
}

/// Parse the command line, then read configuration through `lookup`.
///
/// Arguments come first so `--help` and missing options are reported by clap
/// even when the environment holds invalid settings. Clap failures are
/// returned as `clap::Error` inside the `anyhow::Error`.
pub fn load_settings<I, T, F>(args: I, lookup: F) -> anyhow::Result<(Cli, AppConfig)>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    F: Fn(&str) -> Option<String>,
{
    let cli = Cli::try_parse_from(args)?;
    let config = AppConfig::from_vars(lookup)?;
    Ok((cli, config))
}

/// How a candidate that differs byte-wise from the latest object is judged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum CompareMode {
    /// Only identical content counts as unchanged.
    #[default]
    Hash,
    /// Documents that parse to the same JSON value count as unchanged.
    Json,
}

impl CompareMode {
    pub fn strategy(self) -> Option<Arc<dyn EqualityStrategy>> {
        match self {
            CompareMode::Hash => None,
            CompareMode::Json => Some(Arc::new(JsonEquality)),
        }
    }
}

/// Turn the input stream into upload content.
///
/// Uniqueness checks read the content twice, so in that case the input is
/// first spooled into an anonymous temporary file.
pub async fn read_content<R>(mut input: R, seekable: bool) -> anyhow::Result<Content>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    if !seekable {
        return Ok(Content::stream(input));
    }

    let spool = tempfile::tempfile().context("Create spool file")?;
    let mut spool = tokio::fs::File::from_std(spool);
    let size = tokio::io::copy(&mut input, &mut spool)
        .await
        .context("Spool input")?;
    spool
        .seek(SeekFrom::Start(0))
        .await
        .context("Rewind spool file")?;
    tracing::debug!(size_bytes = size, "Input spooled");
    Ok(Content::seekable(spool))
}

/// JSON printed on stdout for a finished run.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Report {
    Uploaded {
        #[serde(skip_serializing_if = "Option::is_none")]
        direct: Option<ObjectLocation>,
        #[serde(skip_serializing_if = "Option::is_none")]
        latest: Option<ObjectLocation>,
    },
    Skipped {
        reason: SkipReason,
    },
}

impl From<UploadOutcome> for Report {
    fn from(outcome: UploadOutcome) -> Self {
        match outcome {
            UploadOutcome::Uploaded(result) => Report::Uploaded {
                direct: result.direct,
                latest: result.latest,
            },
            UploadOutcome::Skipped(reason) => Report::Skipped { reason },
        }
    }
}

/// Initialize tracing for the CLI. Logs go to stderr; stdout carries the report.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
