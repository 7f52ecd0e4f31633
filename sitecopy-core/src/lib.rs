pub mod preview;
pub mod scrape;

pub use preview::{PreviewServer, resolve_request_path};
pub use scrape::{
    ScrapeOptions, ScrapeProgressCallback, ScrapeResultCallback, cancel_on_ctrl_c,
    execute_scrape, extract_url_path, generate_scrape_report, write_summary_json,
};
