//! Ledger explorer abstraction layer.
//!
//! Defines the [`LedgerApi`] trait and provides a Solscan Pro HTTP
//! implementation ([`SolscanClient`]) plus a test mock (`mock::MockApi`).

mod http_client;
#[cfg(test)]
pub mod mock;
mod parsing;

pub use http_client::{SolscanClient, TransferFilter};

use async_trait::async_trait;

use crate::error::FetchError;
use crate::types::{TokenMeta, TransferPage};

/// The explorer calls the crawler needs.
///
/// Implementations handle authentication, query construction and response
/// decoding. Throttling is applied by the caller so that every
/// implementation, including test doubles, is spaced the same way.
#[async_trait]
pub trait LedgerApi: Send + Sync {
    /// Fetch one page of outgoing transfers sent by `address`.
    async fn get_transfer_page(&self, address: &str, page: u32)
        -> Result<TransferPage, FetchError>;

    /// Look up a token's creator and mint time.
    async fn get_token_meta(&self, token: &str) -> Result<TokenMeta, FetchError>;
}
