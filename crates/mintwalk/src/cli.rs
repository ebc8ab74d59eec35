use std::path::PathBuf;

use clap::Parser;

/// Resumable breadth-first crawl of a token's transfers, rooted at
/// its minter.
#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// Token mint address. Its creator is looked up and used as the root.
    pub token: String,

    /// Crawl from this account instead of looking up the token's creator.
    /// Transfers are then not restricted to a window around the mint time.
    #[arg(long)]
    pub root: Option<String>,

    /// Explorer API base URL.
    #[arg(
        long,
        default_value = "https://pro-api.solscan.io/v2.0",
        env = "MINTWALK_API_URL"
    )]
    pub api_url: String,

    /// Explorer API key, sent in the `token` header.
    #[arg(long, env = "SOLSCAN_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Directory holding per-token checkpoints and transfer caches.
    #[arg(long, default_value = "data", env = "MINTWALK_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Maximum BFS depth.
    #[arg(long, default_value = "6")]
    pub max_steps: u32,

    /// Minimum delay between explorer calls, in milliseconds.
    #[arg(long, default_value = "200")]
    pub inter_call_delay_ms: u64,

    /// Continue from the latest checkpoint.
    #[arg(long)]
    pub resume: bool,

    /// Concurrent fetches within one step.
    #[arg(long, default_value = "1")]
    pub concurrency: usize,

    /// Attach each address at most once instead of once per parent.
    #[arg(long)]
    pub dedup_addresses: bool,

    /// Replace existing checkpoint files instead of refusing to.
    #[arg(long)]
    pub overwrite_checkpoints: bool,

    /// Pages of transfers followed per account.
    #[arg(long, default_value = "1")]
    pub max_pages: u32,

    /// Transfers requested per page.
    #[arg(long, default_value = "100")]
    pub page_size: u32,

    /// Half-width of the block-time window around the mint time, in hours.
    #[arg(long, default_value = "24")]
    pub window_hours: u64,

    /// Write the crawled `(from, to)` edge list to this JSON file.
    #[arg(long)]
    pub export_edges: Option<PathBuf>,
}
