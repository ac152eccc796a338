//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! crawl cycle end-to-end against the bundled HTTP browser.

use crate::common::FakeLauncher;
use sitevisit::config::Config;
use sitevisit::crawler::{run_crawl, run_crawl_with};
use sitevisit::storage::{CrawlStatus, SqliteStorage};
use sitevisit::HarnessError;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration that keeps all output under `dir`
fn create_test_config(dir: &Path, sites: Vec<String>) -> Config {
    let mut config = Config::default();
    config.manager.num_browsers = 2;
    config.manager.data_directory = dir.join("datadir").display().to_string();
    config.manager.log_path = dir.join("datadir/crawl.log").display().to_string();
    config.visit.sleep_secs = 0; // No idling in tests
    config.visit.timeout_secs = 10;
    config.sites = sites;
    config
}

fn open_database(dir: &Path) -> SqliteStorage {
    SqliteStorage::open(&dir.join("datadir/crawl-data.sqlite")).expect("Failed to open database")
}

#[tokio::test]
async fn test_full_crawl_records_instrumentation() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    // Redirect from the entry page to the landing page
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/home"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/home"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .insert_header("set-cookie", "session=abc; Path=/; HttpOnly")
                .set_body_string(
                    r#"<html><head><title>Home</title>
                    <script src="/static/app.js"></script>
                    <script>console.log("inline");</script>
                    </head><body>Welcome</body></html>"#,
                ),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html><head><title>About</title></head></html>"),
        )
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(
        temp_dir.path(),
        vec![format!("{}/", base_url), format!("{}/about", base_url)],
    );

    let report = run_crawl(&config, "test-hash").await.expect("Crawl failed");

    assert_eq!(report.sites, 2);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 0);
    assert!(report.storage_warnings.is_empty());

    let storage = open_database(temp_dir.path());
    let crawl = storage.get_crawl(report.crawl_id).unwrap();
    assert_eq!(crawl.status, CrawlStatus::Completed);
    assert_eq!(crawl.config_hash, "test-hash");

    let visits = storage.visits(report.crawl_id).unwrap();
    assert_eq!(visits.len(), 2);
    assert_eq!(visits[0].site_rank, 0);
    assert_eq!(visits[0].title.as_deref(), Some("Home"));
    assert_eq!(
        visits[0].final_url.as_deref(),
        Some(format!("{}/home", base_url).as_str())
    );
    assert_eq!(visits[1].title.as_deref(), Some("About"));

    let counts: std::collections::HashMap<_, _> = storage
        .instrument_counts(report.crawl_id)
        .unwrap()
        .into_iter()
        .collect();
    // Two hops for the redirected site, one for the other
    assert_eq!(counts["http_exchanges"], 3);
    assert_eq!(counts["navigations"], 3);
    assert_eq!(counts["cookies"], 1);
    assert_eq!(counts["scripts"], 2);
    assert_eq!(counts["dns_responses"], 2);

    assert!(temp_dir.path().join("datadir/crawl.log").exists());
}

#[tokio::test]
async fn test_http_error_status_is_still_a_visit() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(
        temp_dir.path(),
        vec![format!("{}/missing", mock_server.uri())],
    );

    let report = run_crawl(&config, "hash").await.expect("Crawl failed");
    assert_eq!(report.succeeded, 1);

    let storage = open_database(temp_dir.path());
    let visits = storage.visits(report.crawl_id).unwrap();
    assert_eq!(visits[0].status_code, Some(404));
}

#[tokio::test]
async fn test_slow_site_times_out_without_stopping_crawl() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/fast"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = create_test_config(
        temp_dir.path(),
        vec![
            format!("{}/slow", mock_server.uri()),
            format!("{}/fast", mock_server.uri()),
        ],
    );
    config.visit.timeout_secs = 1;

    let report = run_crawl(&config, "hash").await.expect("Crawl failed");

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);

    let storage = open_database(temp_dir.path());
    let visits = storage.visits(report.crawl_id).unwrap();
    assert!(!visits[0].success);
    assert!(visits[0].error.as_deref().unwrap().contains("timeout"));
    assert!(visits[1].success);
}

#[tokio::test]
async fn test_crawl_with_fake_launcher() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(
        temp_dir.path(),
        vec![
            "https://a.example/".to_string(),
            "https://error.test/".to_string(),
            "https://c.example/".to_string(),
        ],
    );

    let report = run_crawl_with(&config, "hash", FakeLauncher::new(Duration::ZERO))
        .await
        .expect("Crawl failed");

    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);

    let storage = open_database(temp_dir.path());
    assert_eq!(storage.count_visits(report.crawl_id, Some(false)).unwrap(), 1);
}

#[tokio::test]
async fn test_no_workers_is_fatal() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(temp_dir.path(), vec!["https://a.example/".to_string()]);
    let mut launcher = FakeLauncher::new(Duration::ZERO);
    launcher.max_launches = 0;

    let result = run_crawl_with(&config, "hash", launcher).await;

    assert!(matches!(result, Err(HarnessError::NoWorkers { requested: 2 })));

    // Storage was closed, so the crawl is marked complete with no visits
    let storage = open_database(temp_dir.path());
    let crawl = storage.latest_crawl().unwrap().unwrap();
    assert_eq!(crawl.status, CrawlStatus::Completed);
    assert_eq!(storage.count_visits(crawl.id, None).unwrap(), 0);
}

#[tokio::test]
async fn test_pool_exhausted_mid_crawl_interrupts_crawl() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(
        temp_dir.path(),
        vec![
            "https://panic.test/".to_string(),
            "https://panic.test/".to_string(),
            "https://a.example/".to_string(),
            "https://b.example/".to_string(),
        ],
    );
    // Both initial browsers launch, neither can be relaunched after its crash
    let mut launcher = FakeLauncher::new(Duration::ZERO);
    launcher.max_launches = 2;

    let report = run_crawl_with(&config, "hash", launcher)
        .await
        .expect("an exhausted pool still finishes the crawl");

    assert_eq!(report.sites, 4);
    assert_eq!(report.succeeded, 0);
    assert_eq!(report.failed, 4);
    assert_eq!(report.unassigned, 2);
    assert!(report.storage_warnings.is_empty());

    let storage = open_database(temp_dir.path());
    let crawl = storage.get_crawl(report.crawl_id).unwrap();
    assert_eq!(crawl.status, CrawlStatus::Interrupted);
    assert!(crawl.finished_at.is_some());

    let visits = storage.visits(report.crawl_id).unwrap();
    assert_eq!(visits.len(), 4);
    assert!(visits.iter().all(|v| !v.success));
    for visit in &visits[2..] {
        assert_eq!(visit.worker_id, None);
        assert_eq!(visit.error.as_deref(), Some("no worker available"));
    }
    assert!(visits[..2].iter().all(|v| v.worker_id.is_some()));
}

#[tokio::test]
async fn test_unwritable_data_directory_is_fatal() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let blocker = temp_dir.path().join("datadir");
    std::fs::write(&blocker, "not a directory").unwrap();

    let config = create_test_config(temp_dir.path(), vec!["https://a.example/".to_string()]);
    let result = run_crawl(&config, "hash").await;

    assert!(matches!(result, Err(HarnessError::Config(_))));
}
