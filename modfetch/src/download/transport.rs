//! Network transport abstraction.
//!
//! The downloader reaches remote resources only through [`Transport`], which
//! allows tests to inject an in-memory implementation.

use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, RANGE};
use reqwest::{Client, StatusCode};

use super::error::DownloadError;
use crate::BoxFuture;

/// Stream of body bytes.
pub type ByteStream = BoxStream<'static, Result<Bytes, DownloadError>>;

/// What a probe learned about a remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemoteResource {
    /// Size in bytes, if advertised.
    pub size: Option<u64>,
    /// Whether byte range requests are accepted.
    pub accepts_ranges: bool,
}

/// An inclusive byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// Value of the HTTP `Range` header.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }

    /// Split `size` bytes into at most `count` contiguous ranges.
    pub fn split(size: u64, count: usize) -> Vec<ByteRange> {
        if size == 0 {
            return Vec::new();
        }
        let count = (count.max(1) as u64).min(size);
        let base = size / count;
        let extra = size % count;

        let mut ranges = Vec::with_capacity(count as usize);
        let mut start = 0;
        for i in 0..count {
            let len = base + u64::from(i < extra);
            ranges.push(ByteRange {
                start,
                end: start + len - 1,
            });
            start += len;
        }
        ranges
    }
}

/// Fetches remote resources.
pub trait Transport: Send + Sync {
    /// Look up size and range support without fetching the body.
    fn probe<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<RemoteResource, DownloadError>>;

    /// Fetch the whole body, or only `range` of it.
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        range: Option<ByteRange>,
    ) -> BoxFuture<'a, Result<ByteStream, DownloadError>>;
}

/// HTTP transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DownloadError::Client(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }

    fn request_error(&self, url: &str, e: reqwest::Error) -> DownloadError {
        if e.is_timeout() {
            DownloadError::Timeout {
                url: url.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            DownloadError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

impl Transport for HttpTransport {
    fn probe<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<RemoteResource, DownloadError>> {
        Box::pin(async move {
            let response = self
                .client
                .head(url)
                .send()
                .await
                .map_err(|e| self.request_error(url, e))?;

            if !response.status().is_success() {
                return Err(DownloadError::DownloadFailed {
                    url: url.to_string(),
                    reason: format!("HEAD request failed with status {}", response.status()),
                });
            }

            let size = response
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());

            let accepts_ranges = response
                .headers()
                .get(ACCEPT_RANGES)
                .map(|v| v.to_str().unwrap_or("") == "bytes")
                .unwrap_or(false);

            Ok(RemoteResource { size, accepts_ranges })
        })
    }

    fn fetch<'a>(
        &'a self,
        url: &'a str,
        range: Option<ByteRange>,
    ) -> BoxFuture<'a, Result<ByteStream, DownloadError>> {
        Box::pin(async move {
            let mut request = self.client.get(url);
            if let Some(range) = range {
                request = request.header(RANGE, range.header_value());
            }

            let response = request.send().await.map_err(|e| self.request_error(url, e))?;
            let status = response.status();

            if range.is_some() && status == StatusCode::OK {
                return Err(DownloadError::RangeIgnored { url: url.to_string() });
            }
            if !status.is_success() {
                return Err(DownloadError::DownloadFailed {
                    url: url.to_string(),
                    reason: format!("GET request failed with status {status}"),
                });
            }

            let url = url.to_string();
            let timeout_secs = self.timeout.as_secs();
            let body = stream::unfold(Some(response), move |state| {
                let url = url.clone();
                async move {
                    let mut response = state?;
                    match response.chunk().await {
                        Ok(Some(bytes)) => Some((Ok(bytes), Some(response))),
                        Ok(None) => None,
                        Err(e) if e.is_timeout() => Some((Err(DownloadError::Timeout { url, timeout_secs }), None)),
                        Err(e) => Some((
                            Err(DownloadError::DownloadFailed {
                                url,
                                reason: e.to_string(),
                            }),
                            None,
                        )),
                    }
                }
            });

            Ok(body.boxed())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_even() {
        let ranges = ByteRange::split(100, 4);
        assert_eq!(ranges.len(), 4);
        assert_eq!(ranges[0], ByteRange { start: 0, end: 24 });
        assert_eq!(ranges[3], ByteRange { start: 75, end: 99 });
        assert_eq!(ranges.iter().map(ByteRange::len).sum::<u64>(), 100);
    }

    #[test]
    fn test_split_uneven_is_contiguous() {
        let ranges = ByteRange::split(10, 3);
        assert_eq!(
            ranges,
            vec![
                ByteRange { start: 0, end: 3 },
                ByteRange { start: 4, end: 6 },
                ByteRange { start: 7, end: 9 },
            ]
        );
    }

    #[test]
    fn test_split_more_chunks_than_bytes() {
        assert_eq!(ByteRange::split(2, 4).len(), 2);
        assert!(ByteRange::split(0, 4).is_empty());
    }

    #[test]
    fn test_header_value() {
        assert_eq!(ByteRange { start: 5, end: 9 }.header_value(), "bytes=5-9");
    }

    #[test]
    fn test_http_transport_builds() {
        assert!(HttpTransport::new(Duration::from_secs(5)).is_ok());
    }
}
