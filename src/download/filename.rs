//! Destination filename derivation for downloads.
//!
//! The destination name is the percent-decoded last path segment of the URL,
//! sanitized for filesystem safety. Transfers land in a `.part` sibling first
//! and are renamed into place only after validation.

use std::path::{Component, Path, PathBuf};

use crate::link::FileLink;

/// Fallback name when a URL has no usable final path segment.
const FALLBACK_FILENAME: &str = "download.bin";

/// Suffix for in-flight temporary files.
const PART_SUFFIX: &str = ".part";

/// Derives the destination filename for a link.
///
/// Percent-decodes the last path segment and sanitizes it. URLs with no
/// usable segment (`https://host/`) fall back to `download.bin`.
#[must_use]
pub fn destination_filename(link: &FileLink) -> String {
    let Some(raw) = link.file_name() else {
        return FALLBACK_FILENAME.to_string();
    };
    let sanitized = sanitize_filename(&raw);
    // Percent-decoding can smuggle separators or dot segments back in;
    // anything that still looks like a path gets the fallback name.
    if sanitized.contains('/')
        || sanitized.contains('\\')
        || sanitized.trim_matches('_').is_empty()
    {
        return FALLBACK_FILENAME.to_string();
    }
    sanitized
}

/// Path of the temporary file a transfer streams into.
#[must_use]
pub fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map_or_else(|| FALLBACK_FILENAME.to_string(), |n| n.to_string_lossy().into_owned());
    name.push_str(PART_SUFFIX);
    destination.with_file_name(name)
}

/// Sanitizes a filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems:
/// / \ : * ? " < > |
fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}
