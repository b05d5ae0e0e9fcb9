//! Download engine for concurrent file downloads with retry support.
//!
//! The engine downloads a batch of validated links using a semaphore-based
//! concurrency bound, with automatic retry on transient failures using
//! exponential backoff. One file's failure never aborts the batch: every
//! link produces a [`DownloadRecord`], and only infrastructure problems
//! (destination directory creation) fail the batch itself.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use linkfetch::{Config, DownloadEngine, FileLink, NullProgressSink};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(Config::default())?;
//! let links = vec![FileLink::parse("https://example.com/report.pdf").ok_or("bad link")?];
//! let records = engine
//!     .download_all(&links, Path::new("./downloads"), Arc::new(NullProgressSink))
//!     .await?;
//! println!("{} records", records.len());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigError};
use crate::link::FileLink;

use super::client::HttpClient;
use super::error::DownloadError;
use super::filename::{destination_filename, part_path};
use super::progress::{ProgressKind, ProgressSink, ProgressUpdate};
use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_error, parse_retry_after};

/// Error type for batch-level engine failures.
///
/// Per-file failures are never surfaced here; they live in the records.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The injected configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The destination directory could not be created.
    #[error("cannot create destination directory {path}: {source}")]
    DestinationDir {
        /// The directory that could not be created.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Terminal outcome of one download task.
#[derive(Debug, Clone)]
pub enum DownloadOutcome {
    /// The file already existed on disk or in the run cache; no transfer.
    Skipped {
        /// The pre-existing local path.
        path: PathBuf,
    },
    /// The file was written to its final path.
    Succeeded {
        /// The written local path.
        path: PathBuf,
        /// Bytes transferred.
        bytes: u64,
    },
    /// All attempts failed; the batch continued without this file.
    Failed {
        /// Text of the last error.
        error: String,
        /// How many attempts were made.
        attempts: u32,
    },
}

/// The outcome of one link in a batch, tagged with its source link.
///
/// Records are returned in input order, but that is incidental; callers
/// needing to correlate should use [`DownloadRecord::link`].
#[derive(Debug, Clone)]
pub struct DownloadRecord {
    /// The link this record describes.
    pub link: FileLink,
    /// What happened to it.
    pub outcome: DownloadOutcome,
}

impl DownloadRecord {
    /// Whether this record is a failure.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, DownloadOutcome::Failed { .. })
    }

    /// The local path, for Skipped and Succeeded records.
    #[must_use]
    pub fn local_path(&self) -> Option<&Path> {
        match &self.outcome {
            DownloadOutcome::Skipped { path } | DownloadOutcome::Succeeded { path, .. } => {
                Some(path)
            }
            DownloadOutcome::Failed { .. } => None,
        }
    }
}

/// Download engine for concurrent file downloads with retry support.
///
/// # Concurrency Model
///
/// - Each download runs in its own Tokio task
/// - A semaphore permit is acquired before spawning each download
/// - Permits are released automatically when downloads complete (RAII)
///
/// # Retry Behavior
///
/// - Transient errors (network issues, 5xx, 429) are retried with
///   exponential backoff capped at 30 seconds
/// - A 429 Retry-After header, when parseable, overrides the computed backoff
/// - Permanent errors (404, 400, local IO) fail immediately without retry
///
/// # Shared State
///
/// One HTTP client (connection pool) and one URL→path cache per engine
/// instance, shared by all of its tasks and dropped with the engine. Engines
/// are independent; nothing is shared between two instances.
#[derive(Debug)]
pub struct DownloadEngine {
    client: HttpClient,
    config: Config,
    semaphore: Arc<Semaphore>,
    cache: Arc<DashMap<String, PathBuf>>,
    cancel: CancellationToken,
}

impl DownloadEngine {
    /// Creates an engine from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when the configuration fails
    /// validation (see [`Config::validate`]).
    pub fn new(config: Config) -> Result<Self, EngineError> {
        config.validate()?;

        debug!(
            concurrency = config.concurrency,
            retry_attempts = config.retry_attempts,
            chunk_size = config.chunk_size,
            "creating download engine"
        );

        Ok(Self {
            client: HttpClient::new(&config),
            semaphore: Arc::new(Semaphore::new(config.concurrency)),
            cache: Arc::new(DashMap::new()),
            cancel: CancellationToken::new(),
            config,
        })
    }

    /// Token callers can use to cancel the batch (e.g. on Ctrl-C or a closed
    /// progress view). Cancelling stops new attempts and abandons in-flight
    /// transfers at their next suspension point.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Downloads every link into `destination_dir` concurrently.
    ///
    /// Emits progress through `sink` and returns one record per input link.
    /// Individual failures are recorded, never propagated.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DestinationDir`] when the destination cannot
    /// be created, and [`EngineError::SemaphoreClosed`] if the concurrency
    /// gate is broken. Nothing else fails the batch.
    pub async fn download_all(
        &self,
        links: &[FileLink],
        destination_dir: &Path,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Vec<DownloadRecord>, EngineError> {
        tokio::fs::create_dir_all(destination_dir)
            .await
            .map_err(|source| EngineError::DestinationDir {
                path: destination_dir.to_path_buf(),
                source,
            })?;

        info!(
            count = links.len(),
            destination = %destination_dir.display(),
            "starting download batch"
        );

        let mut handles = Vec::with_capacity(links.len());
        for link in links {
            // Blocks while the configured number of downloads are in flight.
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| EngineError::SemaphoreClosed)?;

            let client = self.client.clone();
            let config = self.config.clone();
            let link = link.clone();
            let destination_dir = destination_dir.to_path_buf();
            let cache = Arc::clone(&self.cache);
            let cancel = self.cancel.clone();
            let sink = Arc::clone(&sink);

            handles.push(tokio::spawn(async move {
                // Permit is dropped when this block exits (RAII)
                let _permit = permit;
                download_one(&client, &config, link, &destination_dir, &cache, &cancel, &sink)
                    .await
            }));
        }

        debug!(task_count = handles.len(), "waiting for downloads");

        let mut records = Vec::with_capacity(links.len());
        for (link, handle) in links.iter().zip(handles) {
            match handle.await {
                Ok(record) => records.push(record),
                Err(e) => {
                    // Task panics are recorded, not propagated.
                    warn!(url = %link, error = %e, "download task panicked");
                    records.push(DownloadRecord {
                        link: link.clone(),
                        outcome: DownloadOutcome::Failed {
                            error: format!("task panic: {e}"),
                            attempts: 0,
                        },
                    });
                }
            }
        }

        let failed = records.iter().filter(|r| r.is_failed()).count();
        info!(
            total = records.len(),
            failed,
            completed = records.len() - failed,
            "download batch complete"
        );

        Ok(records)
    }
}

/// Downloads one link, emitting progress and producing its record.
///
/// The skip check (disk, then run cache) happens before any network call or
/// delay. The retry loop then follows the shared policy: randomized delay
/// before each attempt, exponential backoff between attempts, permanent
/// errors fail immediately.
async fn download_one(
    client: &HttpClient,
    config: &Config,
    link: FileLink,
    destination_dir: &Path,
    cache: &DashMap<String, PathBuf>,
    cancel: &CancellationToken,
    sink: &Arc<dyn ProgressSink>,
) -> DownloadRecord {
    let filename = destination_filename(&link);
    let final_path = destination_dir.join(&filename);

    let on_disk = tokio::fs::try_exists(&final_path).await.unwrap_or(false);
    if on_disk || cache.contains_key(link.as_str()) {
        debug!(url = %link, path = %final_path.display(), "skipping existing file");
        sink.emit(ProgressUpdate::new(
            link.as_str(),
            format!("{filename} already exists, skipping..."),
            ProgressKind::Skipped,
        ));
        return DownloadRecord {
            link,
            outcome: DownloadOutcome::Skipped { path: final_path },
        };
    }

    sink.emit(ProgressUpdate::new(
        link.as_str(),
        format!("Starting download of {filename}"),
        ProgressKind::Started,
    ));

    let part = part_path(&final_path);
    let policy = RetryPolicy::with_max_attempts(config.retry_attempts);
    let mut attempt = 0u32;

    loop {
        // Randomized politeness delay before every attempt.
        if let Err(e) = cancellable_sleep(random_delay(config), cancel, &link).await {
            return fail_record(link, &filename, e, attempt, sink);
        }

        let sink_for_chunks = Arc::clone(sink);
        let progress_url = link.as_str().to_string();
        let progress_name = filename.clone();
        let on_progress = move |bytes: u64, total: Option<u64>| {
            let message = match total {
                Some(total) if total > 0 => {
                    format!("Downloading {progress_name}: {}%", bytes * 100 / total)
                }
                _ => format!("Downloading {progress_name}: {bytes} bytes"),
            };
            sink_for_chunks.emit(ProgressUpdate::new(
                progress_url.clone(),
                message,
                ProgressKind::Transferred {
                    bytes_downloaded: bytes,
                    total_bytes: total,
                },
            ));
        };

        match client
            .fetch_to_path(
                &link,
                &final_path,
                &part,
                config.chunk_size,
                cancel,
                &on_progress,
            )
            .await
        {
            Ok(bytes) => {
                cache.insert(link.as_str().to_string(), final_path.clone());
                sink.emit(ProgressUpdate::new(
                    link.as_str(),
                    format!("Successfully downloaded {filename}"),
                    ProgressKind::Succeeded,
                ));
                return DownloadRecord {
                    link,
                    outcome: DownloadOutcome::Succeeded {
                        path: final_path,
                        bytes,
                    },
                };
            }
            Err(e) => {
                let failure_type = classify_error(&e);

                // A 429 with a parseable Retry-After overrides the backoff.
                let retry_after_delay = if failure_type == FailureType::RateLimited {
                    retry_after_from_error(&e)
                } else {
                    None
                };

                match policy.should_retry(failure_type, attempt) {
                    RetryDecision::Retry {
                        delay: backoff_delay,
                        attempt: next_attempt,
                    } => {
                        let delay = retry_after_delay.unwrap_or(backoff_delay);
                        info!(
                            url = %link,
                            attempt = next_attempt,
                            max_attempts = policy.max_attempts(),
                            delay_ms = delay.as_millis(),
                            using_retry_after = retry_after_delay.is_some(),
                            error = %e,
                            "retrying download"
                        );
                        if let Err(cancelled) = cancellable_sleep(delay, cancel, &link).await {
                            return fail_record(link, &filename, cancelled, next_attempt, sink);
                        }
                        attempt = next_attempt;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        debug!(url = %link, %reason, "not retrying download");
                        return fail_record(link, &filename, e, attempt + 1, sink);
                    }
                }
            }
        }
    }
}

/// Builds a Failed record and emits the terminal failure update.
fn fail_record(
    link: FileLink,
    filename: &str,
    error: DownloadError,
    attempts: u32,
    sink: &Arc<dyn ProgressSink>,
) -> DownloadRecord {
    warn!(url = %link, %error, attempts, "download failed");
    sink.emit(ProgressUpdate::new(
        link.as_str(),
        format!("Failed to download {filename}: {error}"),
        ProgressKind::Failed,
    ));
    DownloadRecord {
        link,
        outcome: DownloadOutcome::Failed {
            error: error.to_string(),
            attempts,
        },
    }
}

/// Uniform random duration within the configured delay bounds.
fn random_delay(config: &Config) -> Duration {
    let (min, max) = config.delay_bounds();
    if max <= min {
        return min;
    }
    rand::thread_rng().gen_range(min..=max)
}

/// Sleeps unless cancellation arrives first.
async fn cancellable_sleep(
    delay: Duration,
    cancel: &CancellationToken,
    link: &FileLink,
) -> Result<(), DownloadError> {
    if delay.is_zero() {
        if cancel.is_cancelled() {
            return Err(DownloadError::cancelled(link.as_str()));
        }
        return Ok(());
    }
    tokio::select! {
        () = cancel.cancelled() => Err(DownloadError::cancelled(link.as_str())),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Pulls the Retry-After delay out of a rate-limited error, when present.
fn retry_after_from_error(error: &DownloadError) -> Option<Duration> {
    let DownloadError::HttpStatus {
        retry_after: Some(header),
        ..
    } = error
    else {
        return None;
    };
    parse_retry_after(header)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_new_rejects_invalid_config() {
        let config = Config {
            concurrency: 0,
            ..Config::default()
        };
        assert!(matches!(
            DownloadEngine::new(config),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_engine_new_accepts_defaults() {
        assert!(DownloadEngine::new(Config::default()).is_ok());
    }

    #[test]
    fn test_record_helpers() {
        let link = FileLink::parse("https://example.com/a.pdf").unwrap();
        let failed = DownloadRecord {
            link: link.clone(),
            outcome: DownloadOutcome::Failed {
                error: "boom".to_string(),
                attempts: 3,
            },
        };
        assert!(failed.is_failed());
        assert!(failed.local_path().is_none());

        let succeeded = DownloadRecord {
            link,
            outcome: DownloadOutcome::Succeeded {
                path: PathBuf::from("/tmp/a.pdf"),
                bytes: 10,
            },
        };
        assert!(!succeeded.is_failed());
        assert_eq!(succeeded.local_path().unwrap(), Path::new("/tmp/a.pdf"));
    }

    #[test]
    fn test_retry_after_from_error() {
        let error =
            DownloadError::http_status_with_retry_after("u", 429, Some("7".to_string()));
        assert_eq!(retry_after_from_error(&error), Some(Duration::from_secs(7)));

        let error = DownloadError::http_status("u", 429);
        assert_eq!(retry_after_from_error(&error), None);

        let error = DownloadError::timeout("u");
        assert_eq!(retry_after_from_error(&error), None);
    }

    #[test]
    fn test_random_delay_within_bounds() {
        let config = Config {
            delay_min_secs: 0.01,
            delay_max_secs: 0.02,
            ..Config::default()
        };
        for _ in 0..100 {
            let d = random_delay(&config);
            assert!(d >= Duration::from_secs_f64(0.01));
            assert!(d <= Duration::from_secs_f64(0.02));
        }
    }
}
