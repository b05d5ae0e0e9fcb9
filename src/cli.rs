//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use linkfetch::Config;

/// Scrape a web page for file links and download a selection concurrently.
///
/// Without flags, linkfetch scans the page for links matching the remembered
/// file type, then downloads them all to the remembered output directory.
#[derive(Parser, Debug)]
#[command(name = "linkfetch")]
#[command(author, version, about)]
pub struct Args {
    /// Page URL to scan (defaults to the last-used URL)
    pub url: Option<String>,

    /// File extension to match, e.g. ".pdf" (repeatable; defaults to the
    /// last-used file type)
    #[arg(short = 'e', long = "extension", value_name = "EXT")]
    pub extensions: Vec<String>,

    /// Destination directory (defaults to the last-used directory)
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// List matching links without downloading
    #[arg(long)]
    pub list: bool,

    /// Open the page in the system browser highlighting the Nth found link
    /// (1-based), then continue as usual
    #[arg(long, value_name = "N")]
    pub show: Option<usize>,

    /// Optional JSON config file with engine defaults
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Maximum concurrent downloads (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Maximum attempts per request (1-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub retry_attempts: Option<u8>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Applies CLI overrides on top of a loaded configuration.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(concurrency) = self.concurrency {
            config.concurrency = usize::from(concurrency);
        }
        if let Some(retry_attempts) = self.retry_attempts {
            config.retry_attempts = u32::from(retry_attempts);
        }
    }

    /// Extensions normalized to ".ext" form, lowercased.
    #[must_use]
    pub fn normalized_extensions(&self) -> Vec<String> {
        self.extensions
            .iter()
            .map(|ext| {
                let ext = ext.trim().to_ascii_lowercase();
                if ext.starts_with('.') {
                    ext
                } else {
                    format!(".{ext}")
                }
            })
            .collect()
    }
}
