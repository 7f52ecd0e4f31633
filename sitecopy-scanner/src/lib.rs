pub mod cache;
pub mod crawler;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod frontier;
pub mod materialize;
pub mod paths;
pub mod result;
pub mod scope;
pub mod target;

pub use cache::ResponseCache;
pub use crawler::{CrawlState, Crawler, ProgressCallback, ResultCallback};
pub use error::ScanError;
pub use fetch::{FetchResult, Fetcher, HttpFetcher};
pub use result::{CrawlResult, CrawlSummary};
pub use target::CrawlTarget;
