pub mod http_fetcher;

use async_trait::async_trait;

use crate::app::Result;

pub use http_fetcher::{HttpFetcher, DEFAULT_TIMEOUT_SECS};

/// Single-attempt retrieval of a remote resource.
#[async_trait]
pub trait Fetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}
