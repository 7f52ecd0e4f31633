use sitecopy::commands::command_argument_builder;
use sitecopy::handlers::*;
use std::path::{Path, PathBuf};
use tracing::Level;

fn scrape_matches(argv: &[&str]) -> clap::ArgMatches {
    let matches = command_argument_builder()
        .try_get_matches_from(argv)
        .unwrap();
    let (name, sub) = matches.subcommand().unwrap();
    assert_eq!(name, "scrape");
    sub.clone()
}

#[test]
fn test_parse_seed_url_accepts_http_and_https() {
    assert_eq!(
        parse_seed_url("https://example.com/blog/").unwrap().as_str(),
        "https://example.com/blog/"
    );
    assert!(parse_seed_url("http://127.0.0.1:8080").is_ok());
}

#[test]
fn test_parse_seed_url_rejects_relative_and_other_schemes() {
    assert!(parse_seed_url("example.com").is_err());
    assert!(
        parse_seed_url("ftp://example.com/")
            .unwrap_err()
            .contains("unsupported scheme 'ftp'")
    );
}

#[test]
fn test_expand_dir_trims_trailing_slash() {
    assert_eq!(expand_dir("sites/"), PathBuf::from("sites"));
    assert_eq!(expand_dir("/"), PathBuf::from("/"));
}

#[test]
fn test_expand_dir_expands_home() {
    let expanded = expand_dir("~/mirrors");
    assert!(!expanded.to_string_lossy().starts_with('~'));
    assert!(expanded.ends_with("mirrors"));
}

#[test]
fn test_site_directory_from_host_or_url() {
    let out = Path::new("sites");
    assert_eq!(site_directory(out, "example.com"), PathBuf::from("sites/example.com"));
    assert_eq!(
        site_directory(out, "https://example.com/about"),
        PathBuf::from("sites/example.com")
    );
    assert_eq!(
        site_directory(out, "http://127.0.0.1:8080/"),
        PathBuf::from("sites/127.0.0.1:8080")
    );
}

#[test]
fn test_log_levels() {
    assert_eq!(log_level(false, false), Level::WARN);
    assert_eq!(log_level(true, false), Level::INFO);
    assert_eq!(log_level(false, true), Level::DEBUG);
    assert_eq!(log_level(true, true), Level::DEBUG);
}

#[test]
fn test_extract_url_path() {
    assert_eq!(extract_url_path("https://example.com/api/users"), "/api/users");
    assert_eq!(extract_url_path("https://example.com/"), "/");
    assert_eq!(extract_url_path("https://example.com"), "/");
}

#[test]
fn test_scrape_defaults() {
    let sub = scrape_matches(&["sitecopy", "scrape", "https://example.com/"]);
    let options = scrape_options_from_args(&sub).unwrap();

    assert_eq!(options.url, "https://example.com/");
    assert_eq!(options.output_dir, PathBuf::from("sites"));
    assert_eq!(options.max_depth, 0);
    assert_eq!(options.threads, 8);
    assert_eq!(options.timeout_secs, 30);
    assert!(options.cache_dir.is_none());
    assert!(!options.ignore_robots);
}

#[test]
fn test_scrape_flags() {
    let sub = scrape_matches(&[
        "sitecopy", "s", "https://example.com/", "-o", "out/", "-c", "cache", "-m", "3", "-u",
        "tester/1.0", "-i", "-t", "2", "--timeout", "5",
    ]);
    let options = scrape_options_from_args(&sub).unwrap();

    assert_eq!(options.output_dir, PathBuf::from("out"));
    assert_eq!(options.cache_dir, Some(PathBuf::from("cache")));
    assert_eq!(options.max_depth, 3);
    assert_eq!(options.user_agent, "tester/1.0");
    assert!(options.ignore_robots);
    assert_eq!(options.threads, 2);
    assert_eq!(options.timeout_secs, 5);
}

#[test]
fn test_scrape_rejects_invalid_seed() {
    let sub = scrape_matches(&["sitecopy", "scrape", "not-a-url"]);
    assert!(scrape_options_from_args(&sub).is_err());
}

#[test]
fn test_preview_alias_and_defaults() {
    let matches = command_argument_builder()
        .try_get_matches_from(["sitecopy", "p", "example.com"])
        .unwrap();
    let (name, sub) = matches.subcommand().unwrap();
    assert_eq!(name, "preview");
    assert_eq!(sub.get_one::<String>("address").unwrap(), "127.0.0.1");
    assert_eq!(*sub.get_one::<u16>("port").unwrap(), 8000);
    assert_eq!(sub.get_one::<String>("output-dir").unwrap(), "sites");
}

#[tokio::test]
async fn test_run_preview_reports_missing_site() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("example.com");
    let err = run_preview(&missing, "127.0.0.1", 0).await.unwrap_err();
    assert!(format!("{:#}", err).contains("Cannot preview"));
}

#[test]
fn test_completion_message_reflects_an_early_stop() {
    let finished = sitecopy_scanner::CrawlSummary::default();
    assert_eq!(completion_message(&finished), "Scrape complete!");

    let stopped = sitecopy_scanner::CrawlSummary {
        cancelled: true,
        ..Default::default()
    };
    assert_eq!(completion_message(&stopped), "Scrape stopped early");
}
