//! Shared User-Agent string for page fetches and file downloads.
//!
//! Some servers return 403 to unknown clients, so all requests go out with a
//! browser-like User-Agent. Both HTTP clients pull from here so the traffic
//! stays consistent and easy to update.

/// Browser-like User-Agent sent with page fetches and downloads.
pub(crate) const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
