use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::RangeFetch;
use crate::error::{Error, Result};

/// HTTP Range fetcher for remote ZIP resources.
pub struct HttpRangeFetcher {
    client: Client,
    url: String,
    size: u64,
    transferred_bytes: AtomicU64,
    max_retry: u32,
}

impl HttpRangeFetcher {
    /// Create a new HTTP Range fetcher.
    ///
    /// Sends a HEAD request to verify Range support and learn the total
    /// resource size before any range is requested.
    pub async fn new(url: String) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        let resp = client.head(&url).send().await?;

        if !resp.status().is_success() {
            return Err(Error::TransportStatus {
                status: resp.status(),
            });
        }

        let accept_ranges = resp
            .headers()
            .get("accept-ranges")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("none");

        if !accept_ranges.contains("bytes") {
            return Err(Error::RangesUnsupported);
        }

        let size = resp
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .ok_or(Error::UnknownLength)?;

        Ok(Self {
            client,
            url,
            size,
            transferred_bytes: AtomicU64::new(0),
            max_retry: 10,
        })
    }

    /// Total bytes received from the network so far.
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RangeFetch for HttpRangeFetcher {
    async fn fetch_range(&self, from: u64, to: u64) -> Result<Vec<u8>> {
        let expected = (to - from + 1) as usize;
        let mut out = Vec::with_capacity(expected);
        let mut retry_count = 0u32;

        while out.len() < expected {
            let current_start = from + out.len() as u64;
            let range = format!("bytes={}-{}", current_start, to);

            let result = self
                .client
                .get(&self.url)
                .header("Range", &range)
                .send()
                .await;

            let resp = match result {
                Ok(resp) => resp,
                Err(e) if e.is_timeout() || e.is_connect() => {
                    retry_count += 1;
                    if retry_count >= self.max_retry {
                        return Err(e.into());
                    }
                    eprintln!(
                        "Connection error, retry {}/{}: {}",
                        retry_count, self.max_retry, e
                    );
                    tokio::time::sleep(Duration::from_millis(500 * retry_count as u64)).await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = resp.status();
            if status == StatusCode::PARTIAL_CONTENT {
                let bytes = resp.bytes().await?;
                if bytes.is_empty() {
                    // An empty 206 body can never complete the span.
                    return Err(Error::Truncated {
                        from,
                        to,
                        expected: expected as u64,
                        got: out.len() as u64,
                    });
                }
                let take = bytes.len().min(expected - out.len());
                out.extend_from_slice(&bytes[..take]);
                self.transferred_bytes
                    .fetch_add(take as u64, Ordering::Relaxed);
            } else if status == StatusCode::OK {
                // Server ignored the Range header and sent the whole
                // resource; slice out the requested span.
                let bytes = resp.bytes().await?;
                if (bytes.len() as u64) <= to {
                    return Err(Error::Truncated {
                        from,
                        to,
                        expected: expected as u64,
                        got: bytes.len() as u64,
                    });
                }
                out.clear();
                out.extend_from_slice(&bytes[from as usize..=to as usize]);
                self.transferred_bytes
                    .fetch_add(out.len() as u64, Ordering::Relaxed);
            } else {
                return Err(Error::TransportStatus { status });
            }
        }

        Ok(out)
    }

    fn size(&self) -> u64 {
        self.size
    }
}
