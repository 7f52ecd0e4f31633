use anyhow::Context;
use clap::ArgMatches;
use colored::Colorize;
use sitecopy_core::preview::PreviewServer;
use sitecopy_core::scrape::{
    ScrapeOptions, cancel_on_ctrl_c, execute_scrape, generate_scrape_report, write_summary_json,
};
use sitecopy_scanner::CrawlSummary;
use sitecopy_scanner::paths::host_key;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::Level;
use url::Url;

// Re-export scrape types and functions from sitecopy-core
pub use sitecopy_core::scrape::{ScrapeProgressCallback, extract_url_path};

/// Log level picked from the `--verbose`/`--debug` flags. Warnings only by default.
pub fn log_level(verbose: bool, debug: bool) -> Level {
    if debug {
        Level::DEBUG
    } else if verbose {
        Level::INFO
    } else {
        Level::WARN
    }
}

pub fn init_logging(level: Level) {
    // A second init (e.g. from tests) is harmless; the first subscriber stays.
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
}

/// Expands `~` and drops trailing separators.
pub fn expand_dir(raw: &str) -> PathBuf {
    let expanded = shellexpand::tilde(raw);
    let trimmed = expanded.trim_end_matches('/');
    if trimmed.is_empty() {
        PathBuf::from(expanded.as_ref())
    } else {
        PathBuf::from(trimmed)
    }
}

/// The seed must be an absolute http(s) URL.
pub fn parse_seed_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("URL not valid: {}: {}", raw, e))?;
    let scheme = url.scheme().to_string();
    match scheme.as_str() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        "http" | "https" => Err(format!("URL not valid: {} has no host", raw)),
        other => Err(format!("URL not valid: unsupported scheme '{}'", other)),
    }
}

/// Directory a scraped site lives in. `site` may be a bare host (`example.com`,
/// `127.0.0.1:8080`) or the URL it was scraped from.
pub fn site_directory(output_dir: &Path, site: &str) -> PathBuf {
    let host = Url::parse(site)
        .ok()
        .filter(|u| u.scheme() == "http" || u.scheme() == "https")
        .and_then(|u| host_key(&u))
        .unwrap_or_else(|| site.trim_matches('/').to_string());
    output_dir.join(host)
}

pub fn scrape_options_from_args(args: &ArgMatches) -> Result<ScrapeOptions, String> {
    let url = args
        .get_one::<String>("URL")
        .ok_or_else(|| "A seed URL is required".to_string())?;
    let seed = parse_seed_url(url)?;

    let mut options = ScrapeOptions::new(seed.as_str());
    if let Some(dir) = args.get_one::<String>("output-dir") {
        options.output_dir = expand_dir(dir);
    }
    options.cache_dir = args.get_one::<String>("cache").map(|dir| expand_dir(dir));
    if let Some(depth) = args.get_one::<usize>("max-depth") {
        options.max_depth = *depth;
    }
    if let Some(agent) = args.get_one::<String>("user-agent") {
        options.user_agent = agent.clone();
    }
    options.ignore_robots = args.get_flag("ignore-robots");
    if let Some(threads) = args.get_one::<usize>("threads") {
        options.threads = (*threads).max(1);
    }
    if let Some(timeout) = args.get_one::<u64>("timeout") {
        options.timeout_secs = *timeout;
    }
    Ok(options)
}

pub async fn handle_scrape(sub_matches: &ArgMatches) {
    init_logging(log_level(
        sub_matches.get_flag("verbose"),
        sub_matches.get_flag("debug"),
    ));

    let mut options = match scrape_options_from_args(sub_matches) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };
    options.show_progress_bars = true;

    println!("\n{} {}", "Scraping".bright_white().bold(), options.url.bright_cyan());
    println!("{} {}", "Output:".blue(), options.output_dir.display());
    println!("{} {}", "Workers:".blue(), options.threads);
    let depth = if options.max_depth == 0 {
        "unlimited".to_string()
    } else {
        options.max_depth.to_string()
    };
    println!("{} {}", "Max depth:".blue(), depth);
    if let Some(cache) = &options.cache_dir {
        println!("{} {}", "Cache:".blue(), cache.display());
    }
    if options.ignore_robots {
        println!("{} {}", "robots.txt:".blue(), "ignored".yellow());
    }
    println!();

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let summary = match execute_scrape(options, None, None, cancel).await {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("{} Scrape failed: {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };

    if summary.cancelled {
        println!("\n{} {}\n", "!".yellow().bold(), completion_message(&summary));
    } else {
        println!("\n{} {}\n", "✓".green().bold(), completion_message(&summary));
    }
    print!("{}", generate_scrape_report(&summary));

    if let Some(report_path) = sub_matches.get_one::<PathBuf>("report") {
        match write_summary_json(&summary, report_path) {
            Ok(()) => println!(
                "{} Report written to {}",
                "✓".green().bold(),
                report_path.display()
            ),
            Err(e) => {
                eprintln!("{} {}", "✗".red().bold(), e);
                std::process::exit(1);
            }
        }
    }
}

pub fn completion_message(summary: &CrawlSummary) -> &'static str {
    if summary.cancelled {
        "Scrape stopped early"
    } else {
        "Scrape complete!"
    }
}

/// Binds the preview server and serves until Ctrl-C.
pub async fn run_preview(site_root: &Path, address: &str, port: u16) -> anyhow::Result<()> {
    let server = PreviewServer::bind(address, port, site_root)
        .await
        .with_context(|| format!("Cannot preview {} on {}:{}", site_root.display(), address, port))?;

    let listening = server.local_addr().context("Listener has no local address")?;
    println!(
        "{} {} at {}",
        "Previewing".bright_white().bold(),
        site_root.display().to_string().bright_cyan(),
        format!("http://{}", listening).underline()
    );
    println!("{}", "Press Ctrl-C to stop".bright_black());

    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());

    server.serve(shutdown).await.context("Preview server failed")
}

pub async fn handle_preview(sub_matches: &ArgMatches) {
    init_logging(Level::INFO);

    let Some(site) = sub_matches.get_one::<String>("SITE") else {
        eprintln!("{} A site to preview is required", "✗".red().bold());
        std::process::exit(1);
    };
    let output_dir = sub_matches
        .get_one::<String>("output-dir")
        .map(|dir| expand_dir(dir))
        .unwrap_or_else(|| PathBuf::from("sites"));
    let address = sub_matches
        .get_one::<String>("address")
        .map(String::as_str)
        .unwrap_or("127.0.0.1");
    let port = sub_matches.get_one::<u16>("port").copied().unwrap_or(8000);

    let site_root = site_directory(&output_dir, site);
    if let Err(e) = run_preview(&site_root, address, port).await {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}
