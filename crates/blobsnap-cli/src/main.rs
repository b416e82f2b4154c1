//! Blobsnap CLI: upload stdin as a timestamped snapshot, optionally moving
//! the `latest` alias and skipping content that has not changed.
//!
//! Storage is addressed by BLOBSNAP_CONNECTION_STRING (or `--connection-string`),
//! e.g. `Backend=local;Path=/var/lib/blobsnap;BaseUrl=http://localhost:8080/blobs`.

use anyhow::Context;
use blobsnap_cli::{init_tracing, load_settings, read_content, Report};
use blobsnap_core::config::StorageConfig;
use blobsnap_services::{
    create_storage, PathTemplate, SystemClock, TracingSink, UniqueUploadRequest, UniqueUploader,
    UploadOrchestrator, UploadRequest,
};
use serde::Serialize;
use std::sync::Arc;

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize report")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let (cli, config) = match load_settings(std::env::args_os(), |name| std::env::var(name).ok()) {
        Ok(settings) => settings,
        Err(e) => match e.downcast::<clap::Error>() {
            Ok(clap_error) => clap_error.exit(),
            Err(e) => return Err(e),
        },
    };
    init_tracing();

    let storage_config = match cli.connection_string.as_deref() {
        Some(connection_string) => StorageConfig::from_connection_string(connection_string)?,
        None => config.storage()?,
    };
    let template = PathTemplate::parse(&cli.path_format)?;
    let storage = create_storage(&storage_config)
        .await
        .context("Failed to initialize storage")?;

    let orchestrator = UploadOrchestrator::new(storage, Arc::new(SystemClock))
        .with_container_access(cli.container_access.unwrap_or(config.container_access));
    let uploader = UniqueUploader::new(orchestrator, Arc::new(TracingSink::new()));

    let content = read_content(tokio::io::stdin(), cli.only_unique).await?;
    let mut upload = UploadRequest::new(cli.container, template, content)
        .write_direct(cli.update_direct)
        .write_latest(cli.update_latest);
    if let Some(content_type) = cli.content_type {
        upload = upload.content_type(content_type);
    }

    let mut request = UniqueUploadRequest::new(upload).only_unique(cli.only_unique);
    if let Some(strategy) = cli.compare.strategy() {
        request = request.equality(strategy);
    }

    let outcome = uploader
        .upload_if_unique(request)
        .await
        .context("Upload failed")?;
    print_json(&Report::from(outcome))?;
    Ok(())
}
