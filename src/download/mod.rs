//! The downloader boundary.
//!
//! The download provider fetches bytes only through the [`Downloader`]
//! trait, so tests can deliver canned content without a network.

pub mod hash;
pub mod http;
pub mod mock;

pub use hash::{HashAlgorithm, HashingWriter};
pub use http::HttpDownloader;
pub use mock::MockDownloader;

use std::io::Write;
use thiserror::Error;

/// A download that did not complete.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The server answered with a non-success status.
    #[error("Error downloading {url}: response code {code}")]
    Status { url: String, code: u16 },

    /// The request failed before a response arrived, or the body broke off.
    #[error("Error downloading {url}: {message}")]
    Transport { url: String, message: String },

    /// Writing the received bytes failed.
    #[error("Error downloading {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

/// Capability to fetch a URL into a byte sink.
pub trait Downloader: Send + Sync {
    /// Stream the body at `url` into `sink`.
    ///
    /// Non-success HTTP statuses are [`DownloadError::Status`].
    fn fetch(&self, url: &str, sink: &mut dyn Write) -> Result<(), DownloadError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_message() {
        let err = DownloadError::Status {
            url: "http://x/data.csv".into(),
            code: 404,
        };
        assert_eq!(
            err.to_string(),
            "Error downloading http://x/data.csv: response code 404"
        );
    }

    #[test]
    fn transport_error_message() {
        let err = DownloadError::Transport {
            url: "http://x/data.csv".into(),
            message: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "Error downloading http://x/data.csv: connection refused"
        );
    }
}
