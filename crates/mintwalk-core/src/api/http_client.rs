use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Url};
use tracing::{debug, trace};

use crate::error::{CoreError, FetchError};
use crate::types::{TokenMeta, TransferPage};

use super::parsing::{parse_envelope, parse_token_meta, parse_transfer_records};
use super::LedgerApi;

/// Response bodies longer than this are cut in error messages.
const ERROR_BODY_LIMIT: usize = 512;

/// Restricts transfer queries to one token and a block-time window around
/// its mint time.
#[derive(Debug, Clone)]
pub struct TransferFilter {
    pub token: String,
    pub mint_time: u64,
    pub window: Duration,
}

impl TransferFilter {
    fn time_range(&self) -> (u64, u64) {
        let window = self.window.as_secs();
        (
            self.mint_time.saturating_sub(window),
            self.mint_time.saturating_add(window),
        )
    }
}

/// Solscan Pro v2 client over HTTPS.
pub struct SolscanClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    page_size: u32,
    filter: Option<TransferFilter>,
}

impl SolscanClient {
    /// Create a client for `base_url` (e.g. `https://pro-api.solscan.io/v2.0`).
    ///
    /// The API key, when present, is sent in the `token` header on every
    /// request.
    pub fn new(base_url: &str, api_key: Option<&str>, page_size: u32) -> Result<Self, CoreError> {
        if page_size == 0 {
            return Err(CoreError::InvalidConfig(
                "page size must be at least 1".to_owned(),
            ));
        }
        let base_url = parse_base_url(base_url)?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(8)
            .build()
            .map_err(FetchError::Transport)?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.map(str::to_owned),
            page_size,
            filter: None,
        })
    }

    pub fn with_filter(mut self, filter: TransferFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    fn transfer_params(&self, address: &str, page: u32) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("address", address.to_owned()),
            ("activity_type[]", "ACTIVITY_SPL_TRANSFER".to_owned()),
            ("exclude_amount_zero", "true".to_owned()),
            ("flow", "out".to_owned()),
            ("page", page.to_string()),
            ("page_size", self.page_size.to_string()),
            ("sort_by", "block_time".to_owned()),
            ("sort_order", "desc".to_owned()),
        ];
        if let Some(filter) = &self.filter {
            let (from, to) = filter.time_range();
            params.push(("token", filter.token.clone()));
            params.push(("block_time[]", from.to_string()));
            params.push(("block_time[]", to.to_string()));
        }
        params
    }

    async fn get(
        &self,
        path: &str,
        params: &[(&'static str, String)],
    ) -> Result<serde_json::Value, FetchError> {
        let url = format!("{}/{path}", self.base_url);
        debug!(api.path = path, api.params = params.len(), "explorer request");

        let mut builder = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .query(params);
        if let Some(key) = &self.api_key {
            builder = builder.header("token", key);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(api.path = path, %status, body_len = body.len(), "explorer response");
        trace!(api.path = path, body = %body, "explorer response body");

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: truncate(&body, ERROR_BODY_LIMIT),
            });
        }

        parse_envelope(&body)
    }
}

#[async_trait]
impl LedgerApi for SolscanClient {
    async fn get_transfer_page(
        &self,
        address: &str,
        page: u32,
    ) -> Result<TransferPage, FetchError> {
        let params = self.transfer_params(address, page);
        let data = self.get("account/transfer", &params).await?;
        let records = parse_transfer_records(data)?;

        // A full page means the explorer may hold more.
        let next_page = (records.len() >= self.page_size as usize).then_some(page + 1);
        Ok(TransferPage { records, next_page })
    }

    async fn get_token_meta(&self, token: &str) -> Result<TokenMeta, FetchError> {
        let params = [("address", token.to_owned())];
        let data = self.get("token/meta", &params).await?;
        parse_token_meta(token, data)
    }
}

fn parse_base_url(base_url: &str) -> Result<String, CoreError> {
    let parsed = Url::parse(base_url).map_err(|e| {
        CoreError::InvalidConfig(format!(
            "invalid api url `{base_url}`: expected HTTP(S) URL ({e})"
        ))
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(base_url.trim_end_matches('/').to_owned()),
        other => Err(CoreError::InvalidConfig(format!(
            "unsupported api url scheme `{other}`; expected http or https"
        ))),
    }
}

fn truncate(body: &str, limit: usize) -> String {
    match body.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_owned(),
    }
}
