//! Error types for file transfer and placement.
//!
//! Every variant is scoped to one version's file; none of them aborts a run.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while transferring or placing one file.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout { url: String },

    /// HTTP error response.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus { url: String, status: u16 },

    /// The server did not declare a body length, so the transfer cannot be
    /// validated.
    #[error("no Content-Length declared for {url}; refusing to download")]
    MissingContentLength { url: String },

    /// File system error (create, write, rename, copy).
    #[error("IO error writing to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The stored URL is empty or malformed.
    #[error("invalid URL: '{url}'")]
    InvalidUrl { url: String },

    /// The adapter produced a deposit path outside the mirror root.
    #[error("unsafe deposit path {path}: must be relative without '..'")]
    UnsafePath { path: PathBuf },

    /// Transferred byte count does not match the declared length.
    #[error(
        "integrity check failed for {path}: expected {expected_bytes} bytes, got {actual_bytes}"
    )]
    Integrity {
        path: PathBuf,
        expected_bytes: u64,
        actual_bytes: u64,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Maps a reqwest error to `Timeout` or `Network`.
    pub fn from_reqwest(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::timeout(url)
        } else {
            Self::network(url, source)
        }
    }

    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    pub fn missing_content_length(url: impl Into<String>) -> Self {
        Self::MissingContentLength { url: url.into() }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    pub fn unsafe_path(path: impl Into<PathBuf>) -> Self {
        Self::UnsafePath { path: path.into() }
    }

    pub fn integrity(path: impl Into<PathBuf>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            path: path.into(),
            expected_bytes,
            actual_bytes,
        }
    }
}
