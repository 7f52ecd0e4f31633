// Tests for the scrape runner and its report

use sitecopy_core::scrape::{
    ScrapeOptions, execute_scrape, extract_url_path, generate_scrape_report, write_summary_json,
};
use sitecopy_scanner::result::{CrawlResult, CrawlSummary};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

// ============================================================================
// URL Path Extraction Tests
// ============================================================================

#[test]
fn test_extract_url_path_root() {
    assert_eq!(extract_url_path("http://example.com/"), "/");
    assert_eq!(extract_url_path("http://example.com"), "/");
}

#[test]
fn test_extract_url_path_drops_query_and_fragment() {
    assert_eq!(extract_url_path("http://example.com/blog?page=2#top"), "/blog");
}

#[test]
fn test_extract_url_path_invalid_is_returned_unchanged() {
    assert_eq!(extract_url_path("not a url"), "not a url");
}

// ============================================================================
// Options Tests
// ============================================================================

#[test]
fn test_options_map_onto_target() {
    let mut options = ScrapeOptions::new("https://example.com/docs/");
    options.output_dir = PathBuf::from("mirror");
    options.max_depth = 3;
    options.ignore_robots = true;
    options.threads = 2;
    options.timeout_secs = 5;

    let target = options.to_target().unwrap();
    assert_eq!(target.host, "example.com");
    assert_eq!(target.max_depth, 3);
    assert!(target.ignore_robots);
    assert_eq!(target.workers, 2);
    assert_eq!(target.timeout.as_secs(), 5);
    assert_eq!(target.site_root(), PathBuf::from("mirror/example.com"));
}

#[test]
fn test_options_reject_bad_seed() {
    assert!(ScrapeOptions::new("::nope::").to_target().is_err());
}

// ============================================================================
// Scrape Execution Tests
// ============================================================================

#[tokio::test]
async fn test_execute_scrape_mirrors_site() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(r#"<a href="/about">About</a><img src="/img/logo.png">"#),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<p>about us</p>"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img/logo.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(b"\x89PNG\r\n".as_slice()),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let out = tempfile::tempdir().unwrap();
    let mut options = ScrapeOptions::new(mock_server.uri());
    options.output_dir = out.path().to_path_buf();
    options.threads = 2;

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    let results: Arc<Mutex<Vec<CrawlResult>>> = Arc::new(Mutex::new(Vec::new()));
    let results_clone = results.clone();

    let summary = execute_scrape(
        options.clone(),
        Some(Arc::new(move |url: String| {
            seen_clone.lock().unwrap().push(url);
        })),
        Some(Arc::new(move |result: CrawlResult| {
            results_clone.lock().unwrap().push(result);
        })),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.saved, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(seen.lock().unwrap().len(), 3);
    assert_eq!(results.lock().unwrap().len(), 3);

    let site = options.to_target().unwrap().site_root();
    assert!(site.join("index.html").is_file());
    assert_eq!(std::fs::read_to_string(site.join("about.html")).unwrap(), "<p>about us</p>");
    assert_eq!(std::fs::read(site.join("img/logo.png")).unwrap(), b"\x89PNG\r\n");
}

#[tokio::test]
async fn test_execute_scrape_reports_invalid_seed() {
    let err = execute_scrape(
        ScrapeOptions::new("ftp://example.com/"),
        None,
        None,
        CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(err.contains("only http and https"));
}

// ============================================================================
// Report Tests
// ============================================================================

fn sample_summary() -> CrawlSummary {
    let mut page = CrawlResult::new("https://example.com/about".to_string(), 2);
    page.status_code = 200;
    page.content_type = Some("text/html".to_string());
    page.local_path = Some(PathBuf::from("sites/example.com/about.html"));

    let mut image = CrawlResult::new("https://example.com/img/logo.png".to_string(), 2);
    image.status_code = 200;
    image.content_type = Some("image/png".to_string());
    image.local_path = Some(PathBuf::from("sites/example.com/img/logo.png"));

    let broken = CrawlResult::with_error(
        "https://example.com/broken".to_string(),
        2,
        "HTTP 500 for https://example.com/broken".to_string(),
    );

    CrawlSummary {
        seed: "https://example.com/".to_string(),
        results: vec![page, image, broken],
        fetched: 2,
        saved: 2,
        failed: 1,
        ..Default::default()
    }
}

#[test]
fn test_report_contains_counts() {
    let report = generate_scrape_report(&sample_summary());
    assert!(report.contains("Seed: https://example.com/"));
    assert!(report.contains("Resources fetched: 2"));
    assert!(report.contains("Files saved: 2"));
    assert!(report.contains("Failed: 1"));
    assert!(!report.contains("Stopped early"));
}

#[test]
fn test_report_lists_resources_by_status() {
    let report = generate_scrape_report(&sample_summary());
    assert!(report.contains("/about -> sites/example.com/about.html"));
    assert!(report.contains("/img/logo.png"));
    assert!(report.contains("image/png"));
    assert!(report.contains("https://example.com/broken"));
}

#[test]
fn test_report_marks_cancelled_runs() {
    let summary = CrawlSummary {
        cancelled: true,
        ..sample_summary()
    };
    assert!(generate_scrape_report(&summary).contains("Stopped early on request"));
}

#[test]
fn test_write_summary_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reports/run.json");
    write_summary_json(&sample_summary(), &path).unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["fetched"], 2);
    assert_eq!(value["results"].as_array().unwrap().len(), 3);
}
