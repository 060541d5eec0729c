//! File transfer and the bounded-concurrency download phase.
//!
//! # Example
//!
//! ```no_run
//! use stockpile_core::download::HttpClient;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new()?;
//! let transferred = client
//!     .get(
//!         "https://registry.npmjs.org/left-pad/-/left-pad-1.0.0.tgz",
//!         Path::new("./left-pad-1.0.0.tgz.part"),
//!     )
//!     .await?;
//! println!("{} of {} bytes", transferred.bytes, transferred.declared);
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod error;
mod manager;

pub use client::{HttpClient, Transferred};
pub use constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
pub use error::DownloadError;
pub use manager::{
    DownloadManager, DownloadStats, DownloadSummary, ManagerError, partial_path_for,
    validate_deposit_path,
};
