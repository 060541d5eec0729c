//! npm registry adapter.
//!
//! Reads the registry's packument (`GET {registry}/{name}`) and reports every
//! published version with its tarball URL, declared dependency names and
//! publish date. Peer and dev dependencies are followed only when the channel
//! enables them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use super::{Adapter, AdapterError, DiscoveredVersion};
use crate::config::{ChannelConfig, ChannelKind, ConfigError};
use crate::download::CONNECT_TIMEOUT_SECS;
use crate::filter::parse_date;
use crate::store::ArtifactVersion;
use crate::user_agent;

/// Public npm registry.
pub const DEFAULT_NPM_REGISTRY: &str = "https://registry.npmjs.org/";

/// Metadata documents are small; fail faster than file transfers.
const METADATA_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct Packument {
    #[serde(default)]
    versions: BTreeMap<String, PackumentVersion>,
    #[serde(default)]
    time: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackumentVersion {
    dist: Option<Dist>,
    #[serde(default)]
    dependencies: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    peer_dependencies: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Dist {
    tarball: Option<String>,
}

/// Adapter for npm-compatible registries.
pub struct NpmAdapter {
    client: Client,
    registry: Url,
    include_peer: bool,
    include_dev: bool,
}

impl std::fmt::Debug for NpmAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NpmAdapter")
            .field("registry", &self.registry.as_str())
            .field("include_peer", &self.include_peer)
            .field("include_dev", &self.include_dev)
            .finish_non_exhaustive()
    }
}

impl NpmAdapter {
    /// Builds the adapter from channel options `registry`, `include_peer`
    /// and `include_dev`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an unparsable registry URL, a non-boolean
    /// flag, or a client construction failure.
    pub fn from_config(config: &ChannelConfig) -> Result<Self, ConfigError> {
        let raw = config.option("registry").unwrap_or(DEFAULT_NPM_REGISTRY);
        let registry = parse_registry(raw).ok_or_else(|| ConfigError::InvalidOption {
            channel: config.id.clone(),
            option: "registry".to_string(),
            reason: format!("'{raw}' is not an http(s) URL"),
        })?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(METADATA_TIMEOUT_SECS))
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()
            .map_err(|source| ConfigError::Client {
                channel: config.id.clone(),
                source,
            })?;

        Ok(Self {
            client,
            registry,
            include_peer: config.bool_option("include_peer", false)?,
            include_dev: config.bool_option("include_dev", false)?,
        })
    }

    /// Registry base URL, always with a trailing slash.
    #[must_use]
    pub fn registry(&self) -> &Url {
        &self.registry
    }

    fn metadata_url(&self, name: &str) -> String {
        format!("{}{}", self.registry, encode_name(name))
    }

    fn discovered(&self, packument: Packument) -> Vec<DiscoveredVersion> {
        let Packument { versions, time } = packument;
        versions
            .into_iter()
            .filter_map(|(version, meta)| {
                let Some(url) = meta.dist.and_then(|dist| dist.tarball) else {
                    debug!(version = %version, "version has no tarball; skipped");
                    return None;
                };

                let mut dependencies: Vec<String> = meta.dependencies.into_keys().collect();
                if self.include_peer {
                    dependencies.extend(meta.peer_dependencies.into_keys());
                }
                if self.include_dev {
                    dependencies.extend(meta.dev_dependencies.into_keys());
                }
                dependencies.sort();
                dependencies.dedup();

                let published_at = time
                    .get(&version)
                    .and_then(serde_json::Value::as_str)
                    .and_then(parse_date);

                Some(DiscoveredVersion {
                    version,
                    url,
                    dependencies,
                    downloads: None,
                    published_at,
                })
            })
            .collect()
    }
}

#[async_trait]
impl Adapter for NpmAdapter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Npm
    }

    #[instrument(skip(self), fields(adapter = "npm", artifact = %name))]
    async fn inspect(&self, name: &str) -> Result<Vec<DiscoveredVersion>, AdapterError> {
        let url = self.metadata_url(name);
        debug!(url = %url, "fetching packument");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AdapterError::network(name, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::http_status(name, status.as_u16()));
        }

        let packument: Packument = response
            .json()
            .await
            .map_err(|e| AdapterError::metadata(name, e.to_string()))?;

        Ok(self.discovered(packument))
    }

    fn deposit_path(&self, artifact: &str, version: &ArtifactVersion) -> PathBuf {
        registry_relative_path(&self.registry, &version.url)
            .unwrap_or_else(|| fallback_path(artifact, &version.version))
    }
}

fn parse_registry(raw: &str) -> Option<Url> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return None;
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Some(url)
}

/// Encodes a package name as a single registry path segment.
///
/// Scoped names keep their leading `@` and encode the slash: `@types%2Fnode`.
fn encode_name(name: &str) -> String {
    match name.strip_prefix('@') {
        Some(rest) => format!("@{}", urlencoding::encode(rest)),
        None => urlencoding::encode(name).into_owned(),
    }
}

/// Maps a tarball URL on the registry to its path below the registry root,
/// collapsing npm's `/-/` separator.
fn registry_relative_path(registry: &Url, tarball: &str) -> Option<PathBuf> {
    let tarball = Url::parse(tarball).ok()?;
    if tarball.scheme() != registry.scheme()
        || tarball.host_str() != registry.host_str()
        || tarball.port_or_known_default() != registry.port_or_known_default()
    {
        return None;
    }

    let relative = tarball.path().strip_prefix(registry.path())?;
    let decoded = urlencoding::decode(relative).ok()?;
    let collapsed = decoded.replace("/-/", "/");
    let path = Path::new(collapsed.trim_start_matches('/'));
    if path.as_os_str().is_empty() {
        return None;
    }
    Some(path.to_path_buf())
}

fn fallback_path(artifact: &str, version: &str) -> PathBuf {
    let base = artifact.rsplit('/').next().unwrap_or(artifact);
    PathBuf::from(artifact).join(format!("{base}-{version}.tgz"))
}
