//! Integration tests for country scans
//!
//! These tests run the full scan flow against mock HTTP servers and temporary
//! datasets: validation, record persistence, failure counts across scans, and
//! dataset rewriting with pruning.

use civiscan::config::Settings;
use civiscan::dataset::{validated_output_path, Dataset, DomainEntry, Page, ValidationStatus};
use civiscan::scanner::Scanner;
use std::path::{Path, PathBuf};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestEnv {
    _dir: tempfile::TempDir,
    settings: Settings,
    dataset_dir: PathBuf,
}

fn test_env() -> TestEnv {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let dataset_dir = dir.path().join("countries");
    std::fs::create_dir_all(&dataset_dir).expect("Failed to create dataset dir");
    let settings = Settings {
        crawl_timeout_seconds: 5,
        crawl_rate_limit_per_host: 1_000.0,
        metadata_db_url: dir.path().join("metadata.db").display().to_string(),
    };
    TestEnv {
        _dir: dir,
        settings,
        dataset_dir,
    }
}

fn write_dataset(path: &Path, urls: &[String]) {
    let dataset = Dataset {
        domain_count: 1,
        page_count: urls.len(),
        domains: vec![DomainEntry {
            canonical_domain: "example.gov".to_string(),
            pages: urls.iter().map(Page::new).collect(),
            extra: serde_json::Map::new(),
        }],
        extra: serde_json::Map::new(),
    };
    dataset.save(path).expect("Failed to write dataset");
}

fn page_urls(dataset: &Dataset) -> Vec<String> {
    dataset.page_urls()
}

async fn mock_basic_site(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200))
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/moved"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/landing"))
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/landing"))
        .respond_with(ResponseTemplate::new(200))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_scan_stamps_outcomes_and_rewrites_redirects() {
    let env = test_env();
    let mock_server = MockServer::start().await;
    mock_basic_site(&mock_server).await;
    let base = mock_server.uri();

    let input = env.dataset_dir.join("iceland.json");
    let urls = vec![
        format!("{}/ok", base),
        format!("{}/missing", base),
        format!("{}/moved", base),
    ];
    write_dataset(&input, &urls);

    let mut scanner = Scanner::new(&env.settings).expect("Failed to build scanner");
    let stats = scanner
        .scan_country("ICELAND", &input, 0.0)
        .await
        .expect("Scan failed");

    assert_eq!(stats.total_urls, 3);
    assert_eq!(stats.urls_validated, 3);
    assert_eq!(stats.urls_skipped, 0);
    assert_eq!(stats.valid_urls, 2);
    assert_eq!(stats.invalid_urls, 1);
    assert_eq!(stats.redirected_urls, 1);
    assert_eq!(stats.urls_removed, 0);
    assert_eq!(stats.output_path, validated_output_path(&input));

    let output = Dataset::load(&stats.output_path).expect("Failed to load output");
    assert_eq!(output.page_count, 3);

    let pages = &output.domains[0].pages;
    assert_eq!(pages[0].validation_status, Some(ValidationStatus::Valid));
    assert_eq!(pages[0].status_code, Some(200));

    assert_eq!(pages[1].validation_status, Some(ValidationStatus::Invalid));
    assert_eq!(pages[1].status_code, Some(404));

    // The redirected page now points at its target for future scans.
    assert_eq!(pages[2].url, format!("{}/landing", base));
    assert_eq!(pages[2].original_url, Some(format!("{}/moved", base)));
    assert_eq!(pages[2].validation_status, Some(ValidationStatus::Valid));

    // The input dataset is untouched.
    let original = Dataset::load(&input).expect("Failed to reload input");
    assert_eq!(page_urls(&original), urls);
}

#[tokio::test]
async fn test_second_failure_prunes_url() {
    let env = test_env();
    let mock_server = MockServer::start().await;
    mock_basic_site(&mock_server).await;
    let base = mock_server.uri();

    let input = env.dataset_dir.join("malta.json");
    let bad_url = format!("{}/missing", base);
    write_dataset(&input, &[format!("{}/ok", base), bad_url.clone()]);

    let mut scanner = Scanner::new(&env.settings).expect("Failed to build scanner");

    let first = scanner
        .scan_country("MALTA", &input, 0.0)
        .await
        .expect("First scan failed");
    assert_eq!(first.urls_removed, 0);

    let second = scanner
        .scan_country("MALTA", &input, 0.0)
        .await
        .expect("Second scan failed");
    assert_eq!(second.urls_skipped, 0);
    assert_eq!(second.urls_removed, 1);

    let output = Dataset::load(&second.output_path).expect("Failed to load output");
    assert!(!page_urls(&output).contains(&bad_url));
    assert_eq!(output.page_count, 1);
}

#[tokio::test]
async fn test_twice_failed_url_skipped_without_request() {
    let env = test_env();
    let mock_server = MockServer::start().await;
    mock_basic_site(&mock_server).await;
    let base = mock_server.uri();

    let input = env.dataset_dir.join("norway.json");
    write_dataset(&input, &[format!("{}/ok", base), format!("{}/missing", base)]);

    let mut scanner = Scanner::new(&env.settings).expect("Failed to build scanner");
    for _ in 0..2 {
        scanner
            .scan_country("NORWAY", &input, 0.0)
            .await
            .expect("Scan failed");
    }

    // Third scan: the twice-failed URL is pruned from history alone.
    let third = scanner
        .scan_country("NORWAY", &input, 0.0)
        .await
        .expect("Third scan failed");
    assert_eq!(third.urls_skipped, 1);
    assert_eq!(third.urls_validated, 1);
    assert_eq!(third.urls_removed, 1);
}

#[tokio::test]
async fn test_intermittent_failures_accumulate_across_scans() {
    let env = test_env();
    let mock_server = MockServer::start().await;

    // Down, up, down again across three scans.
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let input = env.dataset_dir.join("austria.json");
    let flaky_url = format!("{}/flaky", mock_server.uri());
    write_dataset(&input, &[flaky_url.clone()]);

    let mut scanner = Scanner::new(&env.settings).expect("Failed to build scanner");

    let first = scanner
        .scan_country("AUSTRIA", &input, 0.0)
        .await
        .expect("First scan failed");
    assert_eq!(first.invalid_urls, 1);
    assert_eq!(first.urls_removed, 0);

    let second = scanner
        .scan_country("AUSTRIA", &input, 0.0)
        .await
        .expect("Second scan failed");
    assert_eq!(second.valid_urls, 1);
    assert_eq!(second.urls_removed, 0);

    // One valid scan in between does not clear the earlier failure; the
    // second failure overall reaches the threshold and prunes the URL.
    let third = scanner
        .scan_country("AUSTRIA", &input, 0.0)
        .await
        .expect("Third scan failed");
    assert_eq!(third.invalid_urls, 1);
    assert_eq!(third.urls_removed, 1);
    assert!(!page_urls(&Dataset::load(&third.output_path).unwrap()).contains(&flaky_url));
}

#[tokio::test]
async fn test_empty_dataset_scan() {
    let env = test_env();
    let input = env.dataset_dir.join("iceland.json");
    write_dataset(&input, &[]);

    let mut scanner = Scanner::new(&env.settings).expect("Failed to build scanner");
    let stats = scanner
        .scan_country("ICELAND", &input, 0.0)
        .await
        .expect("Scan failed");

    assert_eq!(stats.total_urls, 0);
    assert_eq!(stats.urls_validated, 0);
    assert!(stats.output_path.exists());
}

#[tokio::test]
async fn test_missing_dataset_is_an_error() {
    let env = test_env();
    let mut scanner = Scanner::new(&env.settings).expect("Failed to build scanner");

    let missing = env.dataset_dir.join("atlantis.json");
    let result = scanner.scan_country("ATLANTIS", &missing, 0.0).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_scan_all_isolates_failures() {
    let env = test_env();
    let mock_server = MockServer::start().await;
    mock_basic_site(&mock_server).await;
    let base = mock_server.uri();

    write_dataset(
        &env.dataset_dir.join("iceland.json"),
        &[format!("{}/ok", base)],
    );
    // A malformed dataset must not stop the other countries.
    std::fs::write(env.dataset_dir.join("malta.json"), "{not json").unwrap();

    let mut scanner = Scanner::new(&env.settings).expect("Failed to build scanner");
    let outcomes = scanner
        .scan_all_countries(&env.dataset_dir, 0.0)
        .await
        .expect("scan_all failed");

    assert_eq!(outcomes.len(), 2);
    let iceland = outcomes.iter().find(|(c, _)| c == "ICELAND").unwrap();
    let malta = outcomes.iter().find(|(c, _)| c == "MALTA").unwrap();
    assert!(iceland.1.is_ok());
    assert!(malta.1.is_err());
}
