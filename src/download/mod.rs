//! Concurrent download engine: streaming transfers, retry with backoff,
//! skip-if-present, and progress reporting.
//!
//! # Features
//!
//! - Streaming downloads (memory-efficient for large files)
//! - Semaphore-bounded concurrency with per-file failure isolation
//! - Exponential-capped backoff shared with the page fetcher
//! - Temp-file writes with atomic rename (no partially-visible files)
//! - Neutral progress channel consumable by any front end
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
//! let links: Vec<FileLink> =
//!     FileLink::parse("https://example.com/paper.pdf").into_iter().collect();
//! let records = engine
//!     .download_all(&links, Path::new("./downloads"), Arc::new(NullProgressSink))
//!     .await?;
//! for record in &records {
//!     println!("{}: failed={}", record.link, record.is_failed());
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod engine;
mod error;
mod filename;
mod progress;
mod retry;

pub use engine::{DownloadEngine, DownloadOutcome, DownloadRecord, EngineError};
pub use error::DownloadError;
pub use progress::{
    ChannelProgressSink, NullProgressSink, ProgressKind, ProgressSink, ProgressUpdate,
};
pub use retry::{
    DEFAULT_RETRY_ATTEMPTS, FailureType, RetryDecision, RetryPolicy, classify_error,
    classify_status, parse_retry_after,
};

// Note: no module-local Result aliases; signatures spell out
// `Result<T, DownloadError>` explicitly.
