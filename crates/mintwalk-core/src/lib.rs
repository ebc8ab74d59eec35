pub mod api;
pub mod cache;
pub mod checkpoint;
pub mod crawl;
pub mod error;
pub mod fetch;
pub mod node;
mod persist;
#[cfg(test)]
mod test_util;
pub mod throttle;
pub mod types;

pub use crawl::{CrawlState, CrawlSummary, Crawler, StepStats, TerminationReason};
pub use error::{CheckpointError, CoreError, FetchError};
pub use node::AccountNode;
pub use types::CrawlConfig;
