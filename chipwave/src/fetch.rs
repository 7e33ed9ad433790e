//! Module transport: download over HTTP or read from disk

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {code}: {reason}")]
    Status { code: u16, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Module is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },
    #[error("No module source given")]
    EmptySource,
}

/// Build the HTTP client used for module downloads
pub fn client(timeout_secs: u64) -> Result<reqwest::Client, TransportError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()?;
    Ok(client)
}

fn is_http(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Last path segment of `source`, without query or fragment
pub fn filename_hint(source: &str) -> String {
    let path = source.split(['?', '#']).next().unwrap_or(source);
    // Drop the scheme and host of URLs
    let path = match path.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map_or("", |(_, p)| p),
        None => path,
    };
    let path = path.trim_end_matches(['/', '\\']);
    path.rsplit(['/', '\\']).next().unwrap_or(path).to_string()
}

/// Fetch module bytes from an `http(s)://` URL, a `file://` URL or a local path
///
/// Modules larger than `max_bytes` are rejected before being fully buffered
/// when the size is known up front.
pub async fn fetch_module(
    client: &reqwest::Client,
    source: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, TransportError> {
    let source = source.trim();
    if source.is_empty() {
        return Err(TransportError::EmptySource);
    }

    let data = if is_http(source) {
        fetch_http(client, source, max_bytes).await?
    } else {
        fetch_file(source, max_bytes).await?
    };
    debug!("Fetched {} ({} bytes)", source, data.len());
    Ok(data)
}

async fn fetch_http(
    client: &reqwest::Client,
    url: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, TransportError> {
    let mut response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::Status {
            code: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("unknown").to_string(),
        });
    }
    if let Some(size) = response.content_length() {
        check_size(size, max_bytes)?;
    }

    let mut data = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        data.extend_from_slice(&chunk);
        check_size(data.len() as u64, max_bytes)?;
    }
    Ok(data)
}

async fn fetch_file(source: &str, max_bytes: u64) -> Result<Vec<u8>, TransportError> {
    let path = PathBuf::from(source.strip_prefix("file://").unwrap_or(source));
    let size = tokio::fs::metadata(&path).await?.len();
    check_size(size, max_bytes)?;
    Ok(tokio::fs::read(&path).await?)
}

fn check_size(size: u64, limit: u64) -> Result<(), TransportError> {
    if size > limit {
        Err(TransportError::TooLarge { size, limit })
    } else {
        Ok(())
    }
}
