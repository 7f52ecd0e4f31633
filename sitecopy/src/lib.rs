pub mod commands;
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    expand_dir, log_level, parse_seed_url, scrape_options_from_args, site_directory,
};

// Re-export scrape functionality from sitecopy-core
pub use sitecopy_core::scrape::{
    ScrapeOptions, execute_scrape, extract_url_path, generate_scrape_report,
};
