mod http;

pub use http::HttpRangeFetcher;

use crate::error::Result;
use async_trait::async_trait;

/// Byte-range access to a remote resource.
///
/// Implementations return exactly the requested span or an error; a short
/// response must never be passed through silently.
#[async_trait]
pub trait RangeFetch: Send + Sync {
    /// Fetch the inclusive byte range `from..=to` of the resource.
    async fn fetch_range(&self, from: u64, to: u64) -> Result<Vec<u8>>;

    /// Total size of the resource in bytes.
    fn size(&self) -> u64;
}
