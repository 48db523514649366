//! HTTP downloads.

use reqwest::blocking::Client;
use std::io::Write;
use std::time::Duration;

use super::{DownloadError, Downloader};

/// Downloads over HTTP/HTTPS with a blocking client.
pub struct HttpDownloader {
    client: Client,
    timeout: Duration,
}

impl HttpDownloader {
    /// Create a downloader with the default 5-minute timeout.
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(300))
    }

    /// Create a downloader with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .user_agent(concat!("stagehand/", env!("CARGO_PKG_VERSION")))
                .timeout(timeout)
                .build()
                .expect("Failed to build HTTP client"),
            timeout,
        }
    }

    /// Get the configured timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl Downloader for HttpDownloader {
    fn fetch(&self, url: &str, sink: &mut dyn Write) -> Result<(), DownloadError> {
        let transport = |e: reqwest::Error| DownloadError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };

        let mut response = self.client.get(url).send().map_err(transport)?;

        if !response.status().is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                code: response.status().as_u16(),
            });
        }

        let bytes = response.copy_to(sink).map_err(transport)?;
        tracing::debug!("Fetched {} bytes from {}", bytes, url);

        sink.flush().map_err(|source| DownloadError::Io {
            url: url.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn default_timeout_is_five_minutes() {
        assert_eq!(HttpDownloader::default().timeout(), Duration::from_secs(300));
    }

    #[test]
    fn fetch_streams_body_into_sink() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/data.csv");
            then.status(200).body("a,b\n1,2\n");
        });

        let mut sink = Vec::new();
        HttpDownloader::with_timeout(Duration::from_secs(10))
            .fetch(&server.url("/data.csv"), &mut sink)
            .unwrap();

        assert_eq!(sink, b"a,b\n1,2\n");
    }

    #[test]
    fn fetch_reports_status_code() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/missing.csv");
            then.status(404).body("Not Found");
        });

        let mut sink = Vec::new();
        let err = HttpDownloader::with_timeout(Duration::from_secs(10))
            .fetch(&server.url("/missing.csv"), &mut sink)
            .unwrap_err();

        assert!(matches!(err, DownloadError::Status { code: 404, .. }));
        assert!(err.to_string().contains("response code 404"));
        assert!(sink.is_empty());
    }

    #[test]
    fn fetch_reports_connection_failure() {
        let mut sink = Vec::new();
        let err = HttpDownloader::with_timeout(Duration::from_secs(2))
            .fetch("http://127.0.0.1:1/nothing", &mut sink)
            .unwrap_err();
        assert!(matches!(err, DownloadError::Transport { .. }));
    }
}
