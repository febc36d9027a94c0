//! HTTP transport used by the download chain and the registry lookup.

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use wslkit_common::error::{Result, WslkitError};

/// Unknown-length downloads report progress every this many bytes.
const UNKNOWN_TOTAL_REPORT_INTERVAL: u64 = 1024 * 1024;

/// Snapshot of a transfer in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Completion percentage, 0 while the total is unknown.
    pub percent: u8,
    /// Bytes received so far.
    pub downloaded: u64,
    /// Total size, when the server reports a content length.
    pub total: Option<u64>,
}

/// Progress callback.
pub type ProgressFn<'a> = dyn Fn(DownloadProgress) + Send + Sync + 'a;

/// A callback that ignores progress.
pub fn no_progress(_: DownloadProgress) {}

/// Turns a stream of chunk sizes into throttled progress events.
///
/// With a known total an event fires whenever the integer percentage
/// changes; otherwise every [`UNKNOWN_TOTAL_REPORT_INTERVAL`] bytes.
#[derive(Debug)]
pub struct ProgressTracker {
    total: Option<u64>,
    downloaded: u64,
    last_percent: Option<u8>,
    last_report: u64,
}

impl ProgressTracker {
    /// Starts tracking a transfer of `total` bytes.
    #[must_use]
    pub const fn new(total: Option<u64>) -> Self {
        Self {
            total,
            downloaded: 0,
            last_percent: None,
            last_report: 0,
        }
    }

    /// Records `n` more bytes and returns an event if one is due.
    pub fn advance(&mut self, n: u64) -> Option<DownloadProgress> {
        self.downloaded += n;
        match self.total {
            Some(_) => {
                let current = self.current();
                if self.last_percent == Some(current.percent) {
                    return None;
                }
                self.last_percent = Some(current.percent);
                Some(current)
            }
            None => {
                if self.downloaded - self.last_report < UNKNOWN_TOTAL_REPORT_INTERVAL {
                    return None;
                }
                self.last_report = self.downloaded;
                Some(self.current())
            }
        }
    }

    /// Current progress.
    #[must_use]
    pub fn current(&self) -> DownloadProgress {
        let percent = match self.total {
            Some(0) => 100,
            Some(total) => {
                let ratio = self.downloaded.min(total).saturating_mul(100) / total;
                u8::try_from(ratio).unwrap_or(100)
            }
            None => 0,
        };
        DownloadProgress {
            percent,
            downloaded: self.downloaded,
            total: self.total,
        }
    }
}

/// Minimal HTTP surface needed by the catalog.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Issues a HEAD request and returns the advertised content length.
    async fn content_length(&self, url: &str) -> Result<Option<u64>>;

    /// Streams the body of `url` into `dest`, returning the bytes written.
    async fn download(&self, url: &str, dest: &Path, progress: &ProgressFn<'_>) -> Result<u64>;

    /// Fetches `url` as text.
    async fn get_text(&self, url: &str) -> Result<String>;
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Builds a client identifying itself as `user_agent`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| transport_error("<client>", "failed to build HTTP client", e))?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(url, "request failed", e))?
            .error_for_status()
            .map_err(|e| transport_error(url, "server returned an error status", e))
    }
}

fn transport_error(url: &str, message: &str, source: reqwest::Error) -> WslkitError {
    WslkitError::Network {
        url: url.to_string(),
        message: message.to_string(),
        source: Some(Box::new(source)),
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn content_length(&self, url: &str) -> Result<Option<u64>> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| transport_error(url, "HEAD request failed", e))?
            .error_for_status()
            .map_err(|e| transport_error(url, "HEAD returned an error status", e))?;
        Ok(response.content_length())
    }

    async fn download(&self, url: &str, dest: &Path, progress: &ProgressFn<'_>) -> Result<u64> {
        tracing::info!(url, dest = %dest.display(), "downloading");
        let response = self.get(url).await?;
        let total = response.content_length();

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| WslkitError::io(dest, e))?;
        let mut tracker = ProgressTracker::new(total);
        progress(tracker.current());

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| transport_error(url, "failed to read body", e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| WslkitError::io(dest, e))?;
            if let Some(event) = tracker.advance(chunk.len() as u64) {
                progress(event);
            }
        }
        file.sync_all().await.map_err(|e| WslkitError::io(dest, e))?;

        let written = tracker.current().downloaded;
        if let Some(expected) = total {
            if written != expected {
                return Err(WslkitError::network(
                    url,
                    format!("truncated body: expected {expected} bytes, got {written}"),
                ));
            }
        }
        progress(tracker.current());
        tracing::debug!(url, bytes = written, "download complete");
        Ok(written)
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        self.get(url)
            .await?
            .text()
            .await
            .map_err(|e| transport_error(url, "failed to read body", e))
    }
}
