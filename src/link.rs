//! Validated file links produced by the extractor and consumed by the engine.
//!
//! A [`FileLink`] is an absolute http/https URL that passed the validation
//! rules shared by both components: host present, bounded length, none of the
//! characters that commonly break servers or shells.

use std::fmt;

use url::Url;

/// Maximum accepted URL length (common server-side limit).
const MAX_URL_LEN: usize = 2048;

/// Characters rejected anywhere in a link.
const DISALLOWED_CHARS: &[char] = &['<', '>', '"', '{', '}', '|', '\\', '^', '[', ']', '`'];

/// A validated absolute URL to a downloadable resource.
///
/// Construction goes through [`FileLink::parse`], so holding a `FileLink`
/// guarantees the invariants: http/https scheme, non-empty host, length at
/// most 2048 characters, and no disallowed characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileLink {
    url: Url,
}

impl FileLink {
    /// Parses and validates a URL string into a `FileLink`.
    ///
    /// Returns `None` when the string is not an absolute http/https URL, has
    /// no host, is longer than 2048 characters, or contains a disallowed
    /// character. Extraction treats a `None` as "discard this candidate",
    /// never as an error.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() > MAX_URL_LEN || raw.contains(DISALLOWED_CHARS) {
            return None;
        }
        let url = Url::parse(raw).ok()?;
        Self::from_url(url)
    }

    /// Validates an already-parsed URL.
    #[must_use]
    pub fn from_url(url: Url) -> Option<Self> {
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return None;
        }
        let serialized = url.as_str();
        if serialized.len() > MAX_URL_LEN || serialized.contains(DISALLOWED_CHARS) {
            return None;
        }
        Some(Self { url })
    }

    /// The link as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// The underlying parsed URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Whether the URL path ends with `extension`, compared case-insensitively.
    ///
    /// Extensions are literal suffixes (".pdf" matches "report.PDF" but not
    /// "report.pdfx"). The query string is not part of the comparison.
    #[must_use]
    pub fn path_has_extension(&self, extension: &str) -> bool {
        let path = self.url.path();
        path.len() >= extension.len()
            && path[path.len() - extension.len()..].eq_ignore_ascii_case(extension)
    }

    /// The percent-decoded final path segment, used to derive the destination
    /// filename. `None` when the path has no non-empty final segment
    /// (e.g. `https://example.com/`).
    #[must_use]
    pub fn file_name(&self) -> Option<String> {
        let last = self.url.path_segments()?.next_back()?;
        if last.is_empty() {
            return None;
        }
        match urlencoding::decode(last) {
            Ok(decoded) => Some(decoded.into_owned()),
            Err(_) => Some(last.to_string()),
        }
    }
}

impl fmt::Display for FileLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

impl AsRef<str> for FileLink {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_http_and_https() {
        assert!(FileLink::parse("http://example.com/a.pdf").is_some());
        assert!(FileLink::parse("https://example.com/a.pdf").is_some());
    }

    #[test]
    fn test_parse_rejects_other_schemes() {
        assert!(FileLink::parse("ftp://example.com/a.pdf").is_none());
        assert!(FileLink::parse("file:///tmp/a.pdf").is_none());
        assert!(FileLink::parse("mailto:someone@example.com").is_none());
    }

    #[test]
    fn test_parse_rejects_relative_and_garbage() {
        assert!(FileLink::parse("not-a-url").is_none());
        assert!(FileLink::parse("/relative/path.pdf").is_none());
        assert!(FileLink::parse("").is_none());
    }

    #[test]
    fn test_parse_rejects_disallowed_characters() {
        assert!(FileLink::parse("https://example.com/a<b>.pdf").is_none());
        assert!(FileLink::parse("https://example.com/a{b}.pdf").is_none());
        assert!(FileLink::parse("https://example.com/a|b.pdf").is_none());
    }

    #[test]
    fn test_parse_rejects_overlong_url() {
        let url = format!("https://example.com/{}.pdf", "a".repeat(MAX_URL_LEN));
        assert!(FileLink::parse(&url).is_none());
    }

    #[test]
    fn test_extension_match_is_case_insensitive() {
        let link = FileLink::parse("https://example.com/Report.PDF").unwrap();
        assert!(link.path_has_extension(".pdf"));
        assert!(link.path_has_extension(".PDF"));
        assert!(!link.path_has_extension(".doc"));
    }

    #[test]
    fn test_extension_match_ignores_query() {
        let link = FileLink::parse("https://example.com/doc.pdf?download=1").unwrap();
        assert!(link.path_has_extension(".pdf"));
    }

    #[test]
    fn test_extension_is_literal_suffix() {
        let link = FileLink::parse("https://example.com/report.pdfx").unwrap();
        assert!(!link.path_has_extension(".pdf"));
    }

    #[test]
    fn test_file_name_percent_decoded() {
        let link = FileLink::parse("https://example.com/docs/annual%20report.pdf").unwrap();
        assert_eq!(link.file_name().unwrap(), "annual report.pdf");
    }

    #[test]
    fn test_file_name_last_segment_only() {
        let link = FileLink::parse("https://example.com/a/b/c.pdf").unwrap();
        assert_eq!(link.file_name().unwrap(), "c.pdf");
    }

    #[test]
    fn test_file_name_none_for_bare_host() {
        let link = FileLink::parse("https://example.com/").unwrap();
        assert!(link.file_name().is_none());
    }
}
