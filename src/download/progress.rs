//! Neutral progress channel between the engine and its consumers.
//!
//! The engine knows nothing about how progress is displayed. It emits
//! [`ProgressUpdate`] values through a [`ProgressSink`]; any consumer (CLI
//! spinner, logger, test harness) drains them independently. A channel-backed
//! sink is provided for the common case.

use tokio::sync::mpsc;

/// What a progress update reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressKind {
    /// A transfer attempt has started.
    Started,
    /// Bytes arrived; sent at a bounded frequency, not per chunk.
    Transferred {
        /// Bytes written so far.
        bytes_downloaded: u64,
        /// Expected total, when the server sent Content-Length.
        total_bytes: Option<u64>,
    },
    /// The file already existed (on disk or in the run cache); no transfer.
    Skipped,
    /// Terminal success; the file is at its final path.
    Succeeded,
    /// Terminal failure after exhausting the retry policy.
    Failed,
}

/// One progress notification for one file.
///
/// `message` is human-readable and ready to display; `kind` carries the
/// structure for consumers that want more than text. Updates for a single
/// URL are monotonic (Skipped/Succeeded/Failed is always last), but updates
/// for different URLs interleave arbitrarily.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Source URL the update concerns.
    pub url: String,
    /// Display-ready status text.
    pub message: String,
    /// Structured classification of the update.
    pub kind: ProgressKind,
}

impl ProgressUpdate {
    pub(crate) fn new(url: impl Into<String>, message: impl Into<String>, kind: ProgressKind) -> Self {
        Self {
            url: url.into(),
            message: message.into(),
            kind,
        }
    }

    /// Whether this is the last update the engine will send for its URL.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            ProgressKind::Skipped | ProgressKind::Succeeded | ProgressKind::Failed
        )
    }
}

/// Consumer side of the progress stream.
///
/// Implementations must be cheap and non-blocking; the engine calls `emit`
/// from inside transfer loops.
pub trait ProgressSink: Send + Sync {
    /// Delivers one update. Delivery failures are the sink's problem, not
    /// the engine's.
    fn emit(&self, update: ProgressUpdate);
}

/// Sink that forwards updates into a tokio mpsc channel.
pub struct ChannelProgressSink {
    tx: mpsc::UnboundedSender<ProgressUpdate>,
}

impl ChannelProgressSink {
    /// Creates a sink and the receiver a consumer drains.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, update: ProgressUpdate) {
        // Receiver gone means nobody is watching; drop the update.
        let _ = self.tx.send(update);
    }
}

/// Sink that discards every update.
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn emit(&self, _update: ProgressUpdate) {}
}
