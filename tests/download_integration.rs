//! Integration tests for the download engine.
//!
//! These tests verify the full batch flow with mock HTTP servers: skip
//! detection, retry behavior, partial-failure isolation, idempotence, and
//! cancellation.

use std::path::Path;
use std::sync::Arc;

use linkfetch::{
    ChannelProgressSink, Config, DownloadEngine, DownloadOutcome, EngineError, FileLink,
    NullProgressSink, ProgressKind,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Engine config with no politeness delay so tests stay quick; retry backoff
/// still applies where a test exercises it.
fn test_config() -> Config {
    Config {
        delay_min_secs: 0.0,
        delay_max_secs: 0.0,
        retry_attempts: 3,
        concurrency: 4,
        ..Config::default()
    }
}

fn engine() -> DownloadEngine {
    DownloadEngine::new(test_config()).expect("test config is valid")
}

fn link(url: &str) -> FileLink {
    FileLink::parse(url).expect("test URL is valid")
}

/// Helper to create a mock server with a file endpoint.
async fn setup_mock_file(path_str: &str, content: &[u8]) -> MockServer {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(path_str))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
        .mount(&mock_server)
        .await;

    mock_server
}

#[tokio::test]
async fn test_download_writes_file_with_expected_content() {
    let content = b"This is the complete file content.\nLine 2.";
    let mock_server = setup_mock_file("/report.pdf", content).await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    let links = vec![link(&format!("{}/report.pdf", mock_server.uri()))];
    let records = engine()
        .download_all(&links, temp_dir.path(), Arc::new(NullProgressSink))
        .await
        .expect("batch should run");

    assert_eq!(records.len(), 1);
    let path = records[0].local_path().expect("record should carry a path");
    assert_eq!(path, temp_dir.path().join("report.pdf"));
    assert_eq!(std::fs::read(path).unwrap(), content);
    assert!(
        matches!(records[0].outcome, DownloadOutcome::Succeeded { bytes, .. } if bytes == content.len() as u64)
    );
}

#[tokio::test]
async fn test_existing_file_is_skipped_with_zero_requests() {
    let mock_server = MockServer::start().await;

    // expect(0): verified on drop, any request fails the test
    Mock::given(method("GET"))
        .and(path("/report.pdf"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("report.pdf"), b"already here").unwrap();

    let links = vec![link(&format!("{}/report.pdf", mock_server.uri()))];
    let records = engine()
        .download_all(&links, temp_dir.path(), Arc::new(NullProgressSink))
        .await
        .unwrap();

    assert!(matches!(records[0].outcome, DownloadOutcome::Skipped { .. }));
    // The pre-existing content is untouched
    assert_eq!(
        std::fs::read(temp_dir.path().join("report.pdf")).unwrap(),
        b"already here"
    );
}

#[tokio::test]
async fn test_percent_encoded_filename_is_decoded() {
    let mock_server = setup_mock_file("/annual%20report.pdf", b"pdf").await;
    let temp_dir = TempDir::new().unwrap();

    let links = vec![link(&format!("{}/annual%20report.pdf", mock_server.uri()))];
    let records = engine()
        .download_all(&links, temp_dir.path(), Arc::new(NullProgressSink))
        .await
        .unwrap();

    assert_eq!(
        records[0].local_path().unwrap(),
        temp_dir.path().join("annual report.pdf")
    );
}

#[tokio::test]
async fn test_transient_500_recovers_within_retry_budget() {
    let mock_server = MockServer::start().await;
    let content = b"eventually fine";

    // Two failures, then success with a correct Content-Length
    Mock::given(method("GET"))
        .and(path("/flaky.pdf"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let links = vec![link(&format!("{}/flaky.pdf", mock_server.uri()))];
    let records = engine()
        .download_all(&links, temp_dir.path(), Arc::new(NullProgressSink))
        .await
        .unwrap();

    assert!(
        matches!(records[0].outcome, DownloadOutcome::Succeeded { .. }),
        "expected success after retries, got: {:?}",
        records[0].outcome
    );
    let written = std::fs::read(temp_dir.path().join("flaky.pdf")).unwrap();
    assert_eq!(written.len(), content.len(), "size must match Content-Length");
}

#[tokio::test]
async fn test_permanent_404_fails_after_single_attempt() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/gone.pdf"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let links = vec![link(&format!("{}/gone.pdf", mock_server.uri()))];
    let records = engine()
        .download_all(&links, temp_dir.path(), Arc::new(NullProgressSink))
        .await
        .unwrap();

    match &records[0].outcome {
        DownloadOutcome::Failed { error, attempts } => {
            assert_eq!(*attempts, 1, "permanent errors must not consume retries");
            assert!(error.contains("404"), "error should name the status: {error}");
        }
        other => panic!("expected Failed, got: {other:?}"),
    }
    assert!(!temp_dir.path().join("gone.pdf").exists());
}

#[tokio::test]
async fn test_persistent_failure_exhausts_all_attempts_and_leaves_no_file() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/broken.pdf"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let links = vec![link(&format!("{}/broken.pdf", mock_server.uri()))];
    let records = engine()
        .download_all(&links, temp_dir.path(), Arc::new(NullProgressSink))
        .await
        .unwrap();

    match &records[0].outcome {
        DownloadOutcome::Failed { attempts, .. } => {
            assert_eq!(*attempts, 3, "all retry attempts should be consumed");
        }
        other => panic!("expected Failed, got: {other:?}"),
    }
    assert!(
        !temp_dir.path().join("broken.pdf").exists(),
        "no file may appear at the destination"
    );
}

#[tokio::test]
async fn test_one_failure_does_not_abort_the_batch() {
    let mock_server = MockServer::start().await;
    for name in ["a", "b", "c", "d", "e"] {
        Mock::given(method("GET"))
            .and(path(format!("/{name}.pdf")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .mount(&mock_server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/bad.pdf"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let links: Vec<FileLink> = ["a", "b", "c", "d", "e", "bad"]
        .iter()
        .map(|name| link(&format!("{}/{name}.pdf", mock_server.uri())))
        .collect();

    let records = engine()
        .download_all(&links, temp_dir.path(), Arc::new(NullProgressSink))
        .await
        .unwrap();

    assert_eq!(records.len(), 6);
    let failed = records.iter().filter(|r| r.is_failed()).count();
    assert_eq!(failed, 1, "exactly the bad URL should fail");
    for name in ["a", "b", "c", "d", "e"] {
        assert!(temp_dir.path().join(format!("{name}.pdf")).exists());
    }
}

#[tokio::test]
async fn test_rerunning_batch_skips_everything() {
    let mock_server = setup_mock_file("/once.pdf", b"data").await;
    let temp_dir = TempDir::new().unwrap();
    let links = vec![link(&format!("{}/once.pdf", mock_server.uri()))];

    let first = engine()
        .download_all(&links, temp_dir.path(), Arc::new(NullProgressSink))
        .await
        .unwrap();
    assert!(matches!(first[0].outcome, DownloadOutcome::Succeeded { .. }));

    // Fresh engine, same inputs: idempotent
    let second = engine()
        .download_all(&links, temp_dir.path(), Arc::new(NullProgressSink))
        .await
        .unwrap();
    assert!(
        matches!(second[0].outcome, DownloadOutcome::Skipped { .. }),
        "second run must skip, got: {:?}",
        second[0].outcome
    );
}

#[tokio::test]
async fn test_run_cache_skips_resolved_urls_without_network() {
    let mock_server = MockServer::start().await;

    // expect(1): the run cache must answer the second request
    Mock::given(method("GET"))
        .and(path("/dup.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"data".to_vec()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let url = format!("{}/dup.pdf", mock_server.uri());

    let engine = engine();
    let links = vec![link(&url)];
    let first = engine
        .download_all(&links, temp_dir.path(), Arc::new(NullProgressSink))
        .await
        .unwrap();
    assert!(matches!(first[0].outcome, DownloadOutcome::Succeeded { .. }));

    // Remove the file: only the run cache can skip now, and the disk check
    // stays authoritative across engines (a fresh engine would re-download)
    std::fs::remove_file(temp_dir.path().join("dup.pdf")).unwrap();

    let second = engine
        .download_all(&links, temp_dir.path(), Arc::new(NullProgressSink))
        .await
        .unwrap();
    assert!(
        matches!(second[0].outcome, DownloadOutcome::Skipped { .. }),
        "cache should skip the resolved URL, got: {:?}",
        second[0].outcome
    );
}

#[tokio::test]
async fn test_cancellation_stops_new_attempts() {
    let mock_server = setup_mock_file("/slow.pdf", b"data").await;
    let temp_dir = TempDir::new().unwrap();

    let engine = engine();
    engine.cancellation_token().cancel();

    let links = vec![link(&format!("{}/slow.pdf", mock_server.uri()))];
    let records = engine
        .download_all(&links, temp_dir.path(), Arc::new(NullProgressSink))
        .await
        .unwrap();

    match &records[0].outcome {
        DownloadOutcome::Failed { error, .. } => {
            assert!(error.contains("cancelled"), "unexpected error: {error}");
        }
        other => panic!("expected cancelled failure, got: {other:?}"),
    }
    assert!(!temp_dir.path().join("slow.pdf").exists());
    assert!(
        !temp_dir.path().join("slow.pdf.part").exists(),
        "no temp file should be promoted or left behind"
    );
}

#[tokio::test]
async fn test_unwritable_destination_fails_the_batch() {
    let temp_dir = TempDir::new().unwrap();
    // A file where the destination directory should be
    let blocker = temp_dir.path().join("blocker");
    std::fs::write(&blocker, b"file, not dir").unwrap();

    let links = vec![link("https://example.com/a.pdf")];
    let result = engine()
        .download_all(&links, &blocker.join("sub"), Arc::new(NullProgressSink))
        .await;

    assert!(
        matches!(result, Err(EngineError::DestinationDir { .. })),
        "expected DestinationDir error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_progress_channel_reports_terminal_outcome_per_file() {
    let mock_server = setup_mock_file("/tracked.pdf", b"data").await;
    let temp_dir = TempDir::new().unwrap();

    let (sink, mut rx) = ChannelProgressSink::new();
    let links = vec![link(&format!("{}/tracked.pdf", mock_server.uri()))];
    let records = engine()
        .download_all(&links, temp_dir.path(), Arc::new(sink))
        .await
        .unwrap();
    assert!(matches!(records[0].outcome, DownloadOutcome::Succeeded { .. }));

    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }

    let terminal: Vec<_> = updates.iter().filter(|u| u.is_terminal()).collect();
    assert_eq!(terminal.len(), 1, "exactly one terminal update per file");
    assert_eq!(terminal[0].kind, ProgressKind::Succeeded);
    // Terminal update comes last for its file
    assert!(updates.last().unwrap().is_terminal());
}

#[tokio::test]
async fn test_skip_emits_skip_progress_message() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("seen.pdf"), b"x").unwrap();

    let (sink, mut rx) = ChannelProgressSink::new();
    let links = vec![link("https://example.com/seen.pdf")];
    let records = engine()
        .download_all(&links, temp_dir.path(), Arc::new(sink))
        .await
        .unwrap();
    assert!(matches!(records[0].outcome, DownloadOutcome::Skipped { .. }));

    let update = rx.try_recv().expect("skip update should be emitted");
    assert_eq!(update.kind, ProgressKind::Skipped);
    assert!(update.message.contains("already exists"));
}

#[tokio::test]
async fn test_records_cover_every_input_link() {
    let mock_server = setup_mock_file("/x.pdf", b"x").await;
    let temp_dir = TempDir::new().unwrap();

    let links = vec![
        link(&format!("{}/x.pdf", mock_server.uri())),
        link(&format!("{}/missing.pdf", mock_server.uri())),
    ];
    let records = engine()
        .download_all(&links, temp_dir.path(), Arc::new(NullProgressSink))
        .await
        .unwrap();

    assert_eq!(records.len(), links.len());
    // Every record can be traced back to its source URL
    for (link, record) in links.iter().zip(&records) {
        assert_eq!(record.link.as_str(), link.as_str());
    }
}

#[tokio::test]
async fn test_destination_directory_is_created_recursively() {
    let mock_server = setup_mock_file("/deep.pdf", b"x").await;
    let temp_dir = TempDir::new().unwrap();
    let nested: &Path = &temp_dir.path().join("a/b/c");

    let links = vec![link(&format!("{}/deep.pdf", mock_server.uri()))];
    let records = engine()
        .download_all(&links, nested, Arc::new(NullProgressSink))
        .await
        .unwrap();

    assert!(matches!(records[0].outcome, DownloadOutcome::Succeeded { .. }));
    assert!(nested.join("deep.pdf").exists());
}
