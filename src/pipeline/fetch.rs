//! Capped streaming downloads into the cache.
//!
//! Bodies are streamed chunk by chunk into `<dest>.part` and renamed onto
//! `dest` only once complete, so a crash or an aborted download never leaves
//! a truncated artifact under the final name. The byte cap is checked against
//! `Content-Length` up front and again while streaming, since servers are free
//! to omit or understate the header.

use crate::error::FulltextError;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Build the HTTP client shared by all downloads of one assembler.
pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client, FulltextError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("paper-fulltext/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| FulltextError::Internal(format!("HTTP client: {e}")))
}

/// Download `url` to `dest`, aborting once more than `max_bytes` arrive.
///
/// Returns the number of bytes written. On any failure the partial file is
/// removed and `dest` is left untouched.
pub async fn download_capped(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    max_bytes: u64,
    timeout_secs: u64,
) -> Result<u64, FulltextError> {
    info!("Downloading {url}");
    let part = part_path(dest);
    let result = stream_to_file(client, url, &part, max_bytes, timeout_secs).await;
    match result {
        Ok(written) => {
            tokio::fs::rename(&part, dest)
                .await
                .map_err(|e| FulltextError::io(dest, e))?;
            debug!("Downloaded {written} bytes to {}", dest.display());
            Ok(written)
        }
        Err(e) => {
            if let Err(rm) = tokio::fs::remove_file(&part).await {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    warn!("Could not remove partial download {}: {rm}", part.display());
                }
            }
            Err(e)
        }
    }
}

async fn stream_to_file(
    client: &reqwest::Client,
    url: &str,
    part: &Path,
    max_bytes: u64,
    timeout_secs: u64,
) -> Result<u64, FulltextError> {
    let map_reqwest = |e: reqwest::Error| {
        if e.is_timeout() {
            FulltextError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            FulltextError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_reqwest)?;
    if !response.status().is_success() {
        return Err(FulltextError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }
    if response.content_length().is_some_and(|len| len > max_bytes) {
        warn!("Refusing {url}: declared length exceeds {max_bytes} bytes");
        return Err(FulltextError::DownloadTooLarge {
            url: url.to_string(),
            limit_bytes: max_bytes,
        });
    }

    let mut file = tokio::fs::File::create(part)
        .await
        .map_err(|e| FulltextError::io(part, e))?;
    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(map_reqwest)?;
        written += chunk.len() as u64;
        if written > max_bytes {
            warn!("Aborting {url}: more than {max_bytes} bytes");
            return Err(FulltextError::DownloadTooLarge {
                url: url.to_string(),
                limit_bytes: max_bytes,
            });
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| FulltextError::io(part, e))?;
    }
    file.flush().await.map_err(|e| FulltextError::io(part, e))?;
    Ok(written)
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}
