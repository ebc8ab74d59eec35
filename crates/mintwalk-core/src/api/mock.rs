use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::types::{TokenMeta, TransferPage, TransferRecord};

use super::LedgerApi;

/// A mock explorer for testing. Returns canned transfer lists populated via
/// the builder pattern and records every page request it serves.
pub struct MockApi {
    transfers: HashMap<String, Vec<TransferRecord>>,
    failing: HashSet<String>,
    page_size: usize,
    token_meta: Option<TokenMeta>,
    calls: Mutex<Vec<(String, u32)>>,
}

impl MockApi {
    pub fn builder() -> MockApiBuilder {
        MockApiBuilder {
            transfers: HashMap::new(),
            failing: HashSet::new(),
            page_size: usize::MAX,
            token_meta: None,
        }
    }

    /// `(address, page)` pairs requested so far, in call order.
    pub fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().expect("mock call log poisoned").clone()
    }
}

pub struct MockApiBuilder {
    transfers: HashMap<String, Vec<TransferRecord>>,
    failing: HashSet<String>,
    page_size: usize,
    token_meta: Option<TokenMeta>,
}

impl MockApiBuilder {
    /// Register plain `from -> to` transfers for `from`.
    pub fn with_recipients(self, from: &str, to: &[&str]) -> Self {
        let records = to
            .iter()
            .map(|to| TransferRecord {
                from_address: from.to_owned(),
                to_address: (*to).to_owned(),
                amount: Some(1),
                block_time: Some(0),
            })
            .collect();
        self.with_records(from, records)
    }

    pub fn with_records(mut self, address: &str, records: Vec<TransferRecord>) -> Self {
        self.transfers.insert(address.to_owned(), records);
        self
    }

    /// Every request for `address` fails with a 503.
    pub fn failing(mut self, address: &str) -> Self {
        self.failing.insert(address.to_owned());
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_token_meta(mut self, meta: TokenMeta) -> Self {
        self.token_meta = Some(meta);
        self
    }

    pub fn build(self) -> MockApi {
        MockApi {
            transfers: self.transfers,
            failing: self.failing,
            page_size: self.page_size,
            token_meta: self.token_meta,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LedgerApi for MockApi {
    async fn get_transfer_page(
        &self,
        address: &str,
        page: u32,
    ) -> Result<TransferPage, FetchError> {
        self.calls
            .lock()
            .expect("mock call log poisoned")
            .push((address.to_owned(), page));

        if self.failing.contains(address) {
            return Err(FetchError::Status {
                status: 503,
                body: "service unavailable".into(),
            });
        }

        let all = self.transfers.get(address).cloned().unwrap_or_default();
        let start = (page.saturating_sub(1) as usize).saturating_mul(self.page_size);
        let records: Vec<TransferRecord> =
            all.iter().skip(start).take(self.page_size).cloned().collect();
        let next_page = (start.saturating_add(self.page_size) < all.len()).then_some(page + 1);

        Ok(TransferPage { records, next_page })
    }

    async fn get_token_meta(&self, token: &str) -> Result<TokenMeta, FetchError> {
        self.token_meta
            .clone()
            .filter(|meta| meta.address == token)
            .ok_or_else(|| FetchError::Api(format!("unknown token {token}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pages_split_records() {
        let api = MockApi::builder()
            .with_recipients("A", &["B", "C", "D"])
            .with_page_size(2)
            .build();

        let first = api.get_transfer_page("A", 1).await.expect("page 1");
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.next_page, Some(2));

        let second = api.get_transfer_page("A", 2).await.expect("page 2");
        assert_eq!(second.records.len(), 1);
        assert_eq!(second.records[0].to_address, "D");
        assert_eq!(second.next_page, None);
        assert_eq!(api.calls(), vec![("A".to_owned(), 1), ("A".to_owned(), 2)]);
    }

    #[tokio::test]
    async fn token_meta_must_match_address() {
        let api = MockApi::builder()
            .with_token_meta(TokenMeta {
                address: "Tok".into(),
                creator: "Mint1".into(),
                created_time: 1,
                name: None,
                image: None,
            })
            .build();
        assert_eq!(api.get_token_meta("Tok").await.expect("known").creator, "Mint1");
        assert!(api.get_token_meta("Other").await.is_err());
    }
}
