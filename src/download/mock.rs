//! Mock downloader for testing.
//!
//! Serves canned responses by URL; unknown URLs answer 404. Requests are
//! recorded for later assertion.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;

use super::{DownloadError, Downloader};

#[derive(Debug, Clone)]
enum MockResponse {
    Body(Vec<u8>),
    Status(u16),
    Error(String),
}

/// Mock downloader implementation for testing.
#[derive(Debug, Default)]
pub struct MockDownloader {
    responses: Mutex<HashMap<String, MockResponse>>,
    requests: Mutex<Vec<String>>,
}

impl MockDownloader {
    /// A downloader with no canned responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`.
    pub fn respond(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.set(url, MockResponse::Body(body.into()));
    }

    /// Answer `url` with an HTTP status.
    pub fn respond_status(&self, url: &str, code: u16) {
        self.set(url, MockResponse::Status(code));
    }

    /// Fail `url` as if the connection broke.
    pub fn fail(&self, url: &str, message: &str) {
        self.set(url, MockResponse::Error(message.to_string()));
    }

    /// URLs requested so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn set(&self, url: &str, response: MockResponse) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(url.to_string(), response);
        }
    }
}

impl Downloader for MockDownloader {
    fn fetch(&self, url: &str, sink: &mut dyn Write) -> Result<(), DownloadError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }

        let response = self
            .responses
            .lock()
            .ok()
            .and_then(|responses| responses.get(url).cloned())
            .unwrap_or(MockResponse::Status(404));

        match response {
            MockResponse::Body(body) => sink.write_all(&body).map_err(|source| DownloadError::Io {
                url: url.to_string(),
                source,
            }),
            MockResponse::Status(code) => Err(DownloadError::Status {
                url: url.to_string(),
                code,
            }),
            MockResponse::Error(message) => Err(DownloadError::Transport {
                url: url.to_string(),
                message,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serves_canned_body_and_records_request() {
        let downloader = MockDownloader::new();
        downloader.respond("http://x/data.csv", "a,b");

        let mut sink = Vec::new();
        downloader.fetch("http://x/data.csv", &mut sink).unwrap();

        assert_eq!(sink, b"a,b");
        assert_eq!(downloader.requests(), vec!["http://x/data.csv"]);
    }

    #[test]
    fn unknown_url_is_not_found() {
        let downloader = MockDownloader::new();
        let err = downloader.fetch("http://x/nope", &mut Vec::new()).unwrap_err();
        assert!(matches!(err, DownloadError::Status { code: 404, .. }));
    }
}
