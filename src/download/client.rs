//! Remote file transfer.
//!
//! [`HttpClient::get`] streams one URL into one local file and reports how
//! many bytes were written next to the length the server declared. Deciding
//! whether the file is good, and where it finally lives, is the download
//! manager's job.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use crate::user_agent;

/// Result of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transferred {
    /// Bytes written to the destination.
    pub bytes: u64,
    /// Length declared by the server's `Content-Length` header.
    pub declared: u64,
}

impl Transferred {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.bytes == self.declared
    }
}

/// HTTP client for streaming files to disk.
///
/// Created once per run and cloned into workers to share its connection pool.
/// Transparent decompression is off so the declared length describes the
/// bytes that land on disk.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a client with the default timeouts (30 s connect, 300 s idle read).
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a client with explicit timeout values.
    ///
    /// The read timeout bounds each wait for the next chunk, not the whole
    /// transfer, so a slow but live stream is never cut off.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialised.
    #[instrument(level = "debug")]
    pub fn with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .gzip(false)
            .user_agent(user_agent::default_user_agent())
            .build()?;
        Ok(Self { client })
    }

    /// Streams `url` into `dest`, creating or truncating it.
    ///
    /// Nothing is written when the request fails or the server does not
    /// declare a `Content-Length`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] for an invalid URL, a transport failure, a
    /// non-success status, a missing length, or a write failure. A failed
    /// stream may leave a partial `dest` behind.
    #[instrument(skip(self), fields(url = %url, dest = %dest.display()))]
    pub async fn get(&self, url: &str, dest: &Path) -> Result<Transferred, DownloadError> {
        if url.trim().is_empty() || Url::parse(url).is_err() {
            return Err(DownloadError::invalid_url(url));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        let declared = response
            .content_length()
            .ok_or_else(|| DownloadError::missing_content_length(url))?;

        let mut file = File::create(dest)
            .await
            .map_err(|e| DownloadError::io(dest, e))?;
        let bytes = stream_to_file(&mut file, response, url, dest).await?;

        debug!(bytes, declared, "transfer finished");
        Ok(Transferred { bytes, declared })
    }
}

async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::from_reqwest(url, e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;

        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;
    writer
        .get_ref()
        .sync_all()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}
