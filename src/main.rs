//! CLI entry point for the linkfetch tool.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use linkfetch::{
    ChannelProgressSink, Config, DownloadEngine, DownloadOutcome, LinkExtractor, ProgressUpdate,
    SETTINGS_FILE, Settings, reveal,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (warn)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let settings_path = PathBuf::from(SETTINGS_FILE);
    let mut settings = Settings::load(&settings_path);

    // Resolve inputs: flags win, remembered values fill the gaps
    let page_url = args
        .url
        .clone()
        .or_else(|| (!settings.last_url.is_empty()).then(|| settings.last_url.clone()))
        .context("no page URL given and none remembered; pass one as an argument")?;

    let extensions = {
        let from_args = args.normalized_extensions();
        if from_args.is_empty() {
            vec![settings.last_file_type.clone()]
        } else {
            from_args
        }
    };

    let output_dir = args.output.clone().unwrap_or_else(|| {
        if settings.last_output_directory.is_empty() {
            PathBuf::from(".")
        } else {
            PathBuf::from(&settings.last_output_directory)
        }
    });

    // Configuration: defaults -> optional file -> CLI flags
    let mut config = match &args.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::default(),
    };
    args.apply_to(&mut config);
    config.validate()?;

    let extractor = LinkExtractor::new(&config);
    let links = extractor.extract(&page_url, &extensions).await?;

    // Remember the effective inputs for the next run
    settings.last_url.clone_from(&page_url);
    settings.last_output_directory = output_dir.display().to_string();
    if let Some(first) = extensions.first() {
        settings.last_file_type.clone_from(first);
    }

    if links.is_empty() {
        println!("No files matching {extensions:?} found at {page_url}");
        save_settings(&settings, &settings_path);
        return Ok(());
    }

    println!("Found {} file link(s):", links.len());
    for (index, link) in links.iter().enumerate() {
        println!("  {:>3}. {link}", index + 1);
    }

    // Browser collaborator: failures are logged, never fatal
    if let Some(n) = args.show {
        match links.get(n.wrapping_sub(1)) {
            Some(link) => {
                if let Err(e) = reveal::show_in_browser(&page_url, link).await {
                    warn!(error = %e, "could not open browser");
                }
            }
            None => warn!(n, found = links.len(), "--show index out of range"),
        }
    }

    if args.list {
        save_settings(&settings, &settings_path);
        return Ok(());
    }

    let engine = DownloadEngine::new(config)?;

    // Ctrl-C cancels the batch; in-flight transfers abandon their temp files
    let cancel = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling downloads");
            cancel.cancel();
        }
    });

    let (sink, rx) = ChannelProgressSink::new();
    let drain = spawn_progress_drain(rx, args.quiet);

    let records = engine
        .download_all(&links, &output_dir, Arc::new(sink))
        .await?;

    // The sink is dropped with the engine call; the drain ends when the
    // channel closes.
    let _ = drain.await;

    let mut succeeded = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;
    for record in &records {
        match &record.outcome {
            DownloadOutcome::Succeeded { .. } => succeeded += 1,
            DownloadOutcome::Skipped { .. } => skipped += 1,
            DownloadOutcome::Failed { error, .. } => {
                failed += 1;
                eprintln!("FAILED {}: {error}", record.link);
            }
        }
    }
    println!("Done: {succeeded} downloaded, {skipped} skipped, {failed} failed");

    info!(succeeded, skipped, failed, "run complete");
    save_settings(&settings, &settings_path);

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Drains the progress channel into a spinner so engine output stays decoupled
/// from how it is rendered.
fn spawn_progress_drain(
    mut rx: mpsc::UnboundedReceiver<ProgressUpdate>,
    quiet: bool,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let spinner = if quiet {
            ProgressBar::hidden()
        } else {
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::with_template("{spinner} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            spinner.enable_steady_tick(std::time::Duration::from_millis(100));
            spinner
        };

        while let Some(update) = rx.recv().await {
            if update.is_terminal() {
                // Terminal outcomes stay visible above the spinner
                spinner.println(update.message);
            } else {
                spinner.set_message(update.message);
            }
        }

        spinner.finish_and_clear();
    })
}

/// Best-effort settings persistence at shutdown.
fn save_settings(settings: &Settings, path: &std::path::Path) {
    if let Err(e) = settings.save(path) {
        warn!(error = %e, "could not save settings");
    }
}
