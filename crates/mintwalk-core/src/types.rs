//! Shared domain types: explorer records, token metadata and crawl
//! configuration.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CoreError;

/// Deepest crawl accepted. Each tree level nests two JSON containers in a
/// checkpoint, and `serde_json` refuses documents nested beyond 128.
pub const MAX_STEPS_LIMIT: u32 = 60;

// ==============================================================================
// Explorer Records
// ==============================================================================

/// One transfer as reported by the explorer. Unknown fields are ignored.
///
/// Only the two addresses drive the crawl. `amount` and `block_time` are kept
/// when they read as unsigned integers and are `None` otherwise, so an odd
/// value never costs the rest of the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub from_address: String,
    pub to_address: String,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub amount: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub block_time: Option<u64>,
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Token metadata used to seed the crawl root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMeta {
    pub address: String,
    /// The minter; root of the crawl.
    pub creator: String,
    /// Unix seconds.
    pub created_time: u64,
    pub name: Option<String>,
    pub image: Option<String>,
}

/// A page of transfer records plus the cursor for the next page, if any.
#[derive(Debug, Clone, Default)]
pub struct TransferPage {
    pub records: Vec<TransferRecord>,
    pub next_page: Option<u32>,
}

// ==============================================================================
// Crawl Configuration
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Upper bound on BFS depth.
    pub max_steps: u32,
    /// Minimum spacing between outbound explorer calls.
    pub inter_call_delay_ms: u64,
    /// Continue from the latest checkpoint instead of starting fresh.
    pub resume: bool,
    /// Concurrent fetches within one step.
    pub concurrency: usize,
    /// Attach each address at most once across the whole tree.
    pub dedup_addresses: bool,
    /// Pages of transfers followed per account.
    pub max_pages: u32,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_steps: 6,
            inter_call_delay_ms: 200,
            resume: false,
            concurrency: 1,
            dedup_addresses: false,
            max_pages: 1,
        }
    }
}

impl CrawlConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_steps == 0 {
            return Err(CoreError::InvalidConfig(
                "max_steps must be at least 1".to_owned(),
            ));
        }
        if self.max_steps > MAX_STEPS_LIMIT {
            return Err(CoreError::InvalidConfig(format!(
                "max_steps must not exceed {MAX_STEPS_LIMIT}"
            )));
        }
        if self.concurrency == 0 {
            return Err(CoreError::InvalidConfig(
                "concurrency must be at least 1".to_owned(),
            ));
        }
        if self.max_pages == 0 {
            return Err(CoreError::InvalidConfig(
                "max_pages must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}
