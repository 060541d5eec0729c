//! Ecosystem adapters and the dependency graph walker.
//!
//! # Architecture
//!
//! - [`Adapter`] - Async trait each ecosystem implements: inspect an artifact,
//!   map a version to its on-disk location
//! - [`GraphWalker`] - Iterative, cycle-safe traversal that records what it
//!   discovers in the artifact store
//! - [`NpmAdapter`] - npm registry implementation
//!
//! Adapters never touch the store. The walker owns all state transitions.

mod npm;
mod walker;

pub use npm::{DEFAULT_NPM_REGISTRY, NpmAdapter};
pub use walker::{GraphWalker, VisitedSet, WalkMetrics, WalkReport};

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::config::{ChannelConfig, ChannelKind, ConfigError};
use crate::store::ArtifactVersion;

/// One version reported by an ecosystem for an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredVersion {
    pub version: String,
    /// Source URL of the downloadable file.
    pub url: String,
    /// Declared dependency names (no version ranges).
    pub dependencies: Vec<String>,
    pub downloads: Option<u64>,
    pub published_at: Option<NaiveDate>,
}

impl DiscoveredVersion {
    /// A version with no dependencies or metadata.
    #[must_use]
    pub fn new(version: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            url: url.into(),
            dependencies: Vec::new(),
            downloads: None,
            published_at: None,
        }
    }

    /// Adds declared dependency names.
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }
}

/// Errors raised while inspecting an artifact.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The registry could not be reached.
    #[error("network error inspecting {artifact}: {source}")]
    Network {
        artifact: String,
        #[source]
        source: reqwest::Error,
    },

    /// The registry answered with a non-success status.
    #[error("HTTP {status} inspecting {artifact}")]
    HttpStatus { artifact: String, status: u16 },

    /// The registry answered with a document this adapter cannot read.
    #[error("unexpected metadata for {artifact}: {reason}")]
    Metadata { artifact: String, reason: String },
}

impl AdapterError {
    pub fn network(artifact: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            artifact: artifact.into(),
            source,
        }
    }

    pub fn http_status(artifact: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            artifact: artifact.into(),
            status,
        }
    }

    pub fn metadata(artifact: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Metadata {
            artifact: artifact.into(),
            reason: reason.into(),
        }
    }
}

/// Capability interface every ecosystem implements.
///
/// # Object Safety
///
/// Uses `async_trait` so channels can hold an `Arc<dyn Adapter>`.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Ecosystem tag, used in logs.
    fn kind(&self) -> ChannelKind;

    /// Fetches the known versions of `name` with their dependency edges.
    async fn inspect(&self, name: &str) -> Result<Vec<DiscoveredVersion>, AdapterError>;

    /// Relative path, under the mirror root, where a version's file belongs.
    fn deposit_path(&self, artifact: &str, version: &ArtifactVersion) -> PathBuf;
}

/// Builds the adapter for a configured channel.
///
/// # Errors
///
/// Returns [`ConfigError::NoAdapter`] for ecosystems without an adapter, or
/// the adapter's own option errors.
pub fn build_adapter(config: &ChannelConfig) -> Result<Arc<dyn Adapter>, ConfigError> {
    match config.kind {
        ChannelKind::Npm => Ok(Arc::new(NpmAdapter::from_config(config)?)),
        kind @ (ChannelKind::Nuget
        | ChannelKind::Maven
        | ChannelKind::Git
        | ChannelKind::Docker
        | ChannelKind::Helm) => Err(ConfigError::NoAdapter {
            channel: config.id.clone(),
            kind,
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::Path;

    use super::*;
    use crate::config::OutputConfig;

    fn channel(kind: ChannelKind) -> ChannelConfig {
        ChannelConfig {
            id: kind.as_str().to_string(),
            kind,
            input: PathBuf::from("seeds.txt"),
            force: false,
            filters: Vec::new(),
            max_concurrency: 5,
            output: OutputConfig {
                full: PathBuf::from("mirror"),
                delta: PathBuf::from("delta"),
            },
            options: BTreeMap::new(),
        }
    }

    #[test]
    fn test_build_adapter_for_npm() {
        let adapter = build_adapter(&channel(ChannelKind::Npm)).unwrap();
        assert_eq!(adapter.kind(), ChannelKind::Npm);
        assert_eq!(
            adapter.deposit_path(
                "left-pad",
                &ArtifactVersion {
                    artifact_name: "left-pad".to_string(),
                    version: "1.0.0".to_string(),
                    url: "https://registry.npmjs.org/left-pad/-/left-pad-1.0.0.tgz".to_string(),
                    status_str: "unprocessed".to_string(),
                    downloads: None,
                    published_at: None,
                }
            ),
            Path::new("left-pad/left-pad-1.0.0.tgz")
        );
    }

    #[test]
    fn test_build_adapter_rejects_unsupported_ecosystems() {
        for kind in [
            ChannelKind::Nuget,
            ChannelKind::Maven,
            ChannelKind::Git,
            ChannelKind::Docker,
            ChannelKind::Helm,
        ] {
            let err = build_adapter(&channel(kind)).err().unwrap();
            assert!(matches!(err, ConfigError::NoAdapter { .. }));
            assert!(err.to_string().contains("no adapter available"));
        }
    }

    #[test]
    fn test_discovered_version_builder() {
        let found = DiscoveredVersion::new("1.0.0", "https://example.com/a.tgz")
            .with_dependencies(["b", "c"]);
        assert_eq!(found.dependencies, ["b", "c"]);
        assert_eq!(found.downloads, None);
    }
}
