//! Optional "show me the link" collaborator.
//!
//! Opens the source page in the system browser with a text fragment pointing
//! at a found link's filename, so the user can see the link in context.
//! Failures here are reported to the caller and nowhere else: a browser that
//! refuses to launch must never affect extraction or download state.

use std::process::Stdio;

use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::link::FileLink;

/// Errors from the browser collaborator. Independent failure domain.
#[derive(Debug, Error)]
pub enum RevealError {
    /// The page URL could not be combined with the highlight fragment.
    #[error("cannot build highlight URL for {page}: {detail}")]
    BadUrl {
        /// The page URL.
        page: String,
        /// What was wrong.
        detail: String,
    },

    /// No opener command worked on this platform.
    #[error("no system browser opener succeeded for {url}")]
    NoOpener {
        /// The URL that was not opened.
        url: String,
    },
}

/// Builds the page URL with a text fragment highlighting the link's filename.
///
/// Browsers that support scroll-to-text will jump to and highlight the first
/// occurrence; others just open the page, which is an acceptable fallback.
///
/// # Errors
///
/// Returns [`RevealError::BadUrl`] when `page_url` does not parse.
pub fn highlight_url(page_url: &str, link: &FileLink) -> Result<String, RevealError> {
    let page = Url::parse(page_url).map_err(|e| RevealError::BadUrl {
        page: page_url.to_string(),
        detail: e.to_string(),
    })?;

    let mut target = page.to_string();
    if let Some(name) = link.file_name() {
        // Strip any existing fragment before appending ours.
        if let Some(pos) = target.find('#') {
            target.truncate(pos);
        }
        target.push_str("#:~:text=");
        target.push_str(&urlencoding::encode(&name));
    }
    Ok(target)
}

/// Opens the page in the system browser, highlighting `link`.
///
/// # Errors
///
/// Returns [`RevealError`] when the URL cannot be built or no platform
/// opener launches. Callers should log and move on; this is a convenience,
/// not a load-bearing step.
pub async fn show_in_browser(page_url: &str, link: &FileLink) -> Result<(), RevealError> {
    let target = highlight_url(page_url, link)?;
    debug!(url = %target, "opening browser");

    for opener in platform_openers() {
        let spawned = tokio::process::Command::new(opener)
            .arg(&target)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(_) => return Ok(()),
            Err(e) => {
                warn!(%opener, error = %e, "browser opener failed, trying next");
            }
        }
    }

    Err(RevealError::NoOpener { url: target })
}

/// Candidate opener commands for the current platform, in preference order.
fn platform_openers() -> &'static [&'static str] {
    if cfg!(target_os = "macos") {
        &["open"]
    } else if cfg!(target_os = "windows") {
        &["explorer"]
    } else {
        &["xdg-open", "sensible-browser", "x-www-browser"]
    }
}
