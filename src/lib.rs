//! Stockpile Core Library
//!
//! Mirrors package-ecosystem artifacts and their transitive dependencies into
//! a local directory tree, tracking what has been seen, walked and fetched in
//! one `SQLite` store per channel.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`config`] - JSON configuration, validation and path resolution
//! - [`filter`] - Per-artifact version/popularity/date rules
//! - [`db`] / [`store`] - Persistent artifact and version state machine
//! - [`channel`] - Ecosystem adapters and the dependency graph walker
//! - [`download`] - File transfer and the bounded-concurrency download phase
//! - [`pipeline`] - Per-channel orchestration and the blacklist operation
//! - [`events`] - Progress events for an external observer

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cancel;
pub mod channel;
pub mod config;
pub mod db;
pub mod download;
pub mod events;
pub mod filter;
pub mod pipeline;
pub mod seeds;
pub mod store;

#[cfg(test)]
pub mod test_support;

pub(crate) mod user_agent;

// Re-export commonly used types
pub use cancel::CancelFlag;
pub use channel::{Adapter, AdapterError, DiscoveredVersion, GraphWalker, NpmAdapter, WalkReport};
pub use config::{ChannelConfig, ChannelKind, Config, ConfigError};
pub use db::{Database, DbError};
pub use download::{DownloadError, DownloadManager, DownloadSummary, HttpClient};
pub use events::{ChannelEvent, EventSink};
pub use filter::{FilterEngine, FilterError};
pub use pipeline::{ChannelReport, PipelineError, RunOptions, RunOutcome, blacklist, run_all};
pub use store::{
    Artifact, ArtifactRepository, ArtifactStatus, ArtifactStore, ArtifactVersion, StoreError,
    VersionStatus,
};
