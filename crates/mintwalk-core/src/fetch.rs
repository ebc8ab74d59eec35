//! Two-tier transfer source: the live explorer first, the on-disk transfer
//! cache when the explorer fails.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::api::LedgerApi;
use crate::cache::TransferCache;
use crate::error::FetchError;
use crate::throttle::Throttle;
use crate::types::{TokenMeta, TransferRecord};

pub struct TransferFetcher {
    api: Arc<dyn LedgerApi>,
    throttle: Arc<Throttle>,
    cache: Option<TransferCache>,
    max_pages: u32,
}

impl TransferFetcher {
    /// Every explorer call made through this fetcher waits on `throttle`.
    pub fn new(api: Arc<dyn LedgerApi>, throttle: Arc<Throttle>) -> Self {
        Self {
            api,
            throttle,
            cache: None,
            max_pages: 1,
        }
    }

    pub fn with_cache(mut self, cache: TransferCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Recipients of `address`'s outgoing transfers, in explorer order.
    ///
    /// Live results are written through to the cache under `step`. When the
    /// explorer fails, the cached snapshot for `(step, address)` is used
    /// instead; without one the explorer error is returned.
    pub async fn fetch_outgoing_transfers(
        &self,
        address: &str,
        step: u32,
    ) -> Result<Vec<String>, FetchError> {
        match self.fetch_live(address).await {
            Ok(records) => {
                if let Some(cache) = &self.cache {
                    if let Err(e) = cache.store(step, address, &records) {
                        warn!(address, step, error = %e, "failed to cache transfers");
                    }
                }
                Ok(extract_recipients(address, &records))
            }
            Err(err) => match self.load_cached(address, step) {
                Some(records) => {
                    warn!(
                        address,
                        step,
                        error = %err,
                        cached = records.len(),
                        "explorer fetch failed; using cached transfers"
                    );
                    Ok(extract_recipients(address, &records))
                }
                None => Err(err),
            },
        }
    }

    async fn fetch_live(&self, address: &str) -> Result<Vec<TransferRecord>, FetchError> {
        let mut records = Vec::new();
        let mut page = 1;

        for _ in 0..self.max_pages {
            self.throttle.acquire().await;
            let result = self.api.get_transfer_page(address, page).await?;
            debug!(address, page, count = result.records.len(), "fetched transfer page");
            records.extend(result.records);

            match result.next_page {
                Some(next) => page = next,
                None => break,
            }
        }

        Ok(records)
    }

    fn load_cached(&self, address: &str, step: u32) -> Option<Vec<TransferRecord>> {
        let cache = self.cache.as_ref()?;
        match cache.load(step, address) {
            Ok(records) => records,
            Err(e) => {
                warn!(address, step, error = %e, "ignoring unreadable transfer cache entry");
                None
            }
        }
    }
}

/// Look up the token's creator and mint time, spaced by `throttle` like
/// any transfer call.
pub async fn lookup_token_meta(
    api: &dyn LedgerApi,
    throttle: &Throttle,
    token: &str,
) -> Result<TokenMeta, FetchError> {
    throttle.acquire().await;
    let meta = api.get_token_meta(token).await?;
    debug!(token, creator = %meta.creator, created_time = meta.created_time, "token metadata");
    Ok(meta)
}

/// Recipients of transfers actually sent by `address`, keeping the first
/// occurrence of each recipient in record order.
pub fn extract_recipients(address: &str, records: &[TransferRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|record| record.from_address == address && !record.to_address.is_empty())
        .filter(|record| seen.insert(record.to_address.as_str()))
        .map(|record| record.to_address.clone())
        .collect()
}
