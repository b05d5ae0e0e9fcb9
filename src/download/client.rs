//! HTTP client wrapper for streaming file transfers.
//!
//! One [`HttpClient`] is created per engine instance and reused for every
//! transfer in that run, so all downloads share a connection pool. A transfer
//! streams into a `.part` file, validates the byte count against
//! Content-Length, and only then renames into the final path; a destination
//! file is never partially visible.

use std::path::Path;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Config;
use crate::link::FileLink;
use crate::user_agent::BROWSER_USER_AGENT;

use super::error::DownloadError;

/// Emit an in-progress update at most once per this many bytes.
const PROGRESS_UPDATE_BYTES: u64 = 100 * 1024;

/// Byte-count observer for an in-flight transfer: `(bytes_so_far, total)`.
pub(crate) type ProgressFn<'a> = &'a (dyn Fn(u64, Option<u64>) + Send + Sync);

/// HTTP client for downloading files with streaming support.
///
/// Designed to be created once per engine and reused, taking advantage of
/// connection pooling. Cloning is cheap and shares the pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a client with the configured timeouts, gzip decompression,
    /// and the shared browser-like User-Agent.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(config: &Config) -> Self {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.read_timeout())
            .gzip(true)
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Performs one transfer attempt: GET `link`, stream the body into
    /// `part_path`, validate, and rename to `final_path`.
    ///
    /// On any failure the `.part` file is removed (best effort) and nothing
    /// appears at `final_path`. Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` on transport errors, non-2xx status, IO
    /// failure, Content-Length mismatch, or cancellation.
    pub async fn fetch_to_path(
        &self,
        link: &FileLink,
        final_path: &Path,
        part_path: &Path,
        chunk_size: usize,
        cancel: &CancellationToken,
        on_progress: ProgressFn<'_>,
    ) -> Result<u64, DownloadError> {
        let url = link.as_str();
        debug!(url, "starting transfer attempt");

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(std::string::ToString::to_string);
            return Err(DownloadError::http_status_with_retry_after(
                url,
                status.as_u16(),
                retry_after,
            ));
        }

        let content_length = response.content_length();

        let file = File::create(part_path)
            .await
            .map_err(|e| DownloadError::io(part_path.to_path_buf(), e))?;

        let stream_result = stream_to_part(
            file,
            response,
            url,
            part_path,
            chunk_size,
            cancel,
            content_length,
            on_progress,
        )
        .await;

        let bytes_written = match stream_result {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(path = %part_path.display(), "removing partial file after error");
                let _ = tokio::fs::remove_file(part_path).await;
                return Err(e);
            }
        };

        if let Some(expected) = content_length
            && expected != bytes_written
        {
            let _ = tokio::fs::remove_file(part_path).await;
            return Err(DownloadError::size_mismatch(
                final_path.to_path_buf(),
                expected,
                bytes_written,
            ));
        }

        tokio::fs::rename(part_path, final_path)
            .await
            .map_err(|e| DownloadError::io(final_path.to_path_buf(), e))?;

        debug!(url, bytes = bytes_written, path = %final_path.display(), "transfer complete");
        Ok(bytes_written)
    }
}

/// Streams the response body into the part file, reporting progress at a
/// bounded frequency and aborting promptly on cancellation.
#[allow(clippy::too_many_arguments)]
async fn stream_to_part(
    file: File,
    response: reqwest::Response,
    url: &str,
    part_path: &Path,
    chunk_size: usize,
    cancel: &CancellationToken,
    content_length: Option<u64>,
    on_progress: ProgressFn<'_>,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::with_capacity(chunk_size, file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;
    let mut last_reported: u64 = 0;

    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => return Err(DownloadError::cancelled(url)),
            next = stream.next() => next,
        };
        let Some(chunk_result) = next else { break };
        let chunk = chunk_result.map_err(|e| DownloadError::network(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(part_path.to_path_buf(), e))?;
        bytes_written += chunk.len() as u64;

        // Not every chunk: only after another PROGRESS_UPDATE_BYTES arrived.
        if bytes_written - last_reported >= PROGRESS_UPDATE_BYTES {
            on_progress(bytes_written, content_length);
            last_reported = bytes_written;
        }
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(part_path.to_path_buf(), e))?;

    on_progress(bytes_written, content_length);
    Ok(bytes_written)
}
