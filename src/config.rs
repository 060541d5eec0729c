//! JSON configuration model.
//!
//! One file describes the store location, the delta directory naming, named
//! filter groups and the list of channels to mirror. Relative paths are
//! resolved against the directory holding the configuration file.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, TimeZone};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::filter::{FilterEngine, FilterError};

/// Minimum allowed per-channel download concurrency.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed per-channel download concurrency.
pub const MAX_CONCURRENCY: usize = 100;

/// Default per-channel download concurrency.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default `strftime` pattern for delta directory names.
pub const DEFAULT_DELTA_FORMAT: &str = "%Y%m%d%H%M%S";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for this schema.
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A field holds a value outside its accepted range.
    #[error("Invalid config value for `{field}`: {reason}")]
    Invalid {
        /// Dotted field path, e.g. `channels[npm].max_concurrency`.
        field: String,
        reason: String,
    },

    /// A filter group or rule is unusable.
    #[error("channel '{channel}': {source}")]
    Filter {
        channel: String,
        #[source]
        source: FilterError,
    },

    /// No adapter exists for the channel's ecosystem.
    #[error("channel '{channel}': no adapter available for type '{kind}'")]
    NoAdapter { channel: String, kind: ChannelKind },

    /// An adapter rejected one of its options.
    #[error("channel '{channel}': invalid option `{option}`: {reason}")]
    InvalidOption {
        channel: String,
        option: String,
        reason: String,
    },

    /// The channel's HTTP client could not be constructed.
    #[error("channel '{channel}': cannot build HTTP client: {source}")]
    Client {
        channel: String,
        #[source]
        source: reqwest::Error,
    },

    /// A command named a channel that is not configured.
    #[error("unknown channel '{0}'")]
    UnknownChannel(String),
}

impl ConfigError {
    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Ecosystem a channel mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Npm,
    Nuget,
    Maven,
    Git,
    Docker,
    Helm,
}

impl ChannelKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Nuget => "nuget",
            Self::Maven => "maven",
            Self::Git => "git",
            Self::Docker => "docker",
            Self::Helm => "helm",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One configured filter rule, before compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterRuleConfig {
    /// Regular expression; matching versions are excluded.
    #[serde(default)]
    pub version: Option<String>,
    /// Versions with fewer downloads are excluded.
    #[serde(default)]
    pub min_downloads: Option<u64>,
    /// Versions published before this date (`YYYY-MM-DD`) are excluded.
    #[serde(default)]
    pub min_date: Option<String>,
}

/// Filter groups: group id → rule key (artifact name or `*`) → rule.
pub type FilterGroups = BTreeMap<String, BTreeMap<String, FilterRuleConfig>>;

/// Output locations of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutputConfig {
    /// Mirror root.
    pub full: PathBuf,
    /// Root under which per-run delta directories are created.
    pub delta: PathBuf,
}

/// One channel definition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelConfig {
    /// Unique channel id; also names the channel's database file.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    /// Seed list file.
    pub input: PathBuf,
    /// Re-walk dependencies of versions already processed.
    #[serde(default)]
    pub force: bool,
    /// Filter group ids, applied in order.
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default = "default_concurrency")]
    pub max_concurrency: usize,
    pub output: OutputConfig,
    /// Adapter-specific options.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl ChannelConfig {
    /// Returns a boolean option, accepting `true`/`false` in any case.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] for any other value.
    pub fn bool_option(&self, name: &str, default: bool) -> Result<bool, ConfigError> {
        let Some(raw) = self.options.get(name) else {
            return Ok(default);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(ConfigError::InvalidOption {
                channel: self.id.clone(),
                option: name.to_string(),
                reason: format!("expected true or false, got '{raw}'"),
            }),
        }
    }

    /// Returns a string option.
    #[must_use]
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_db_path() -> PathBuf {
    PathBuf::from("db")
}

fn default_delta_format() -> String {
    DEFAULT_DELTA_FORMAT.to_string()
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Directory holding one `SQLite` file per channel.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// `strftime` pattern naming each run's delta directory.
    #[serde(default = "default_delta_format")]
    pub delta_format: String,
    /// Skip delta copies; the mirror itself is the staging area.
    #[serde(default)]
    pub staging: bool,
    #[serde(default)]
    pub filters: FilterGroups,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

impl Config {
    /// Loads, resolves and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or fails
    /// validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let base = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base);
        config.validate()?;
        debug!(path = %path.display(), channels = config.channels.len(), "config loaded");
        Ok(config)
    }

    /// Parses configuration JSON without resolving paths or validating.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for malformed input.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Rewrites relative paths so they are anchored at `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        self.db_path = anchor(base, &self.db_path);
        for channel in &mut self.channels {
            channel.input = anchor(base, &channel.input);
            channel.output.full = anchor(base, &channel.output.full);
            channel.output.delta = anchor(base, &channel.output.delta);
        }
    }

    /// Checks every value that would otherwise fail at channel construction.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if StrftimeItems::new(&self.delta_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::invalid(
                "delta_format",
                format!("'{}' is not a valid strftime pattern", self.delta_format),
            ));
        }

        let mut seen = HashSet::new();
        for channel in &self.channels {
            if channel.id.trim().is_empty() {
                return Err(ConfigError::invalid("channels[].id", "must not be empty"));
            }
            if channel.id.contains(['/', '\\']) || channel.id.starts_with('.') {
                return Err(ConfigError::invalid(
                    format!("channels[{}].id", channel.id),
                    "must be usable as a file name",
                ));
            }
            if !seen.insert(channel.id.as_str()) {
                return Err(ConfigError::invalid(
                    format!("channels[{}].id", channel.id),
                    "duplicate channel id",
                ));
            }
            if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&channel.max_concurrency) {
                return Err(ConfigError::invalid(
                    format!("channels[{}].max_concurrency", channel.id),
                    format!(
                        "{}. Expected range: {MIN_CONCURRENCY}..={MAX_CONCURRENCY}",
                        channel.max_concurrency
                    ),
                ));
            }
            self.filter_engine(channel)?;
        }
        Ok(())
    }

    /// Looks up a channel by id.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownChannel`] if no channel has that id.
    pub fn channel(&self, id: &str) -> Result<&ChannelConfig, ConfigError> {
        self.channels
            .iter()
            .find(|channel| channel.id == id)
            .ok_or_else(|| ConfigError::UnknownChannel(id.to_string()))
    }

    /// Compiles the filter groups a channel selects.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Filter`] for unknown groups or malformed rules.
    pub fn filter_engine(&self, channel: &ChannelConfig) -> Result<FilterEngine, ConfigError> {
        FilterEngine::from_groups(&self.filters, &channel.filters).map_err(|source| {
            ConfigError::Filter {
                channel: channel.id.clone(),
                source,
            }
        })
    }

    /// Formats a timestamp with `delta_format`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the pattern cannot be rendered.
    pub fn delta_stamp<Tz>(&self, now: &DateTime<Tz>) -> Result<String, ConfigError>
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let mut stamp = String::new();
        write!(stamp, "{}", now.format(&self.delta_format)).map_err(|_| {
            ConfigError::invalid(
                "delta_format",
                format!("'{}' cannot be rendered", self.delta_format),
            )
        })?;
        Ok(stamp)
    }
}

fn anchor(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::*;

    const SAMPLE: &str = r#"{
        "db_path": "./db",
        "delta_format": "%Y%m%d",
        "filters": {
            "stable": { "*": { "version": "-(alpha|beta|rc)" } },
            "popular": { "*": { "min_downloads": 100, "min_date": "2015-01-01" } }
        },
        "channels": [
            {
                "id": "npm",
                "type": "npm",
                "input": "npm.txt",
                "filters": ["stable", "popular"],
                "output": { "full": "./mirror/npm", "delta": "./delta/npm" },
                "options": { "include_peer": "TRUE" }
            }
        ]
    }"#;

    #[test]
    fn test_parse_sample_config_with_defaults() {
        let config = Config::from_json(SAMPLE).unwrap();

        assert_eq!(config.delta_format, "%Y%m%d");
        assert!(!config.staging);
        let channel = &config.channels[0];
        assert_eq!(channel.kind, ChannelKind::Npm);
        assert_eq!(channel.max_concurrency, DEFAULT_CONCURRENCY);
        assert!(!channel.force);
        assert!(channel.bool_option("include_peer", false).unwrap());
        assert!(!channel.bool_option("include_dev", false).unwrap());
        config.validate().unwrap();
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config.db_path, PathBuf::from("db"));
        assert_eq!(config.delta_format, DEFAULT_DELTA_FORMAT);
        assert!(config.channels.is_empty());
    }

    #[test]
    fn test_unknown_channel_type_is_parse_error() {
        let raw = SAMPLE.replace(r#""type": "npm""#, r#""type": "cargo""#);
        assert!(Config::from_json(&raw).is_err());
    }

    #[test]
    fn test_resolve_paths_anchors_relative_paths() {
        let mut config = Config::from_json(SAMPLE).unwrap();
        config.resolve_paths(Path::new("/srv/stockpile"));

        assert_eq!(config.db_path, PathBuf::from("/srv/stockpile/./db"));
        assert_eq!(
            config.channels[0].input,
            PathBuf::from("/srv/stockpile/npm.txt")
        );
    }

    #[test]
    fn test_validate_rejects_bad_concurrency() {
        let raw = SAMPLE.replace(r#""type": "npm","#, r#""type": "npm", "max_concurrency": 0,"#);
        let config = Config::from_json(&raw).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_concurrency"));
    }

    #[test]
    fn test_validate_rejects_unknown_filter_group() {
        let raw = SAMPLE.replace(r#"["stable", "popular"]"#, r#"["stable", "nightly"]"#);
        let config = Config::from_json(&raw).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Filter {
                source: FilterError::UnknownGroup(_),
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_duplicate_channel_ids() {
        let mut config = Config::from_json(SAMPLE).unwrap();
        let copy = config.channels[0].clone();
        config.channels.push(copy);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_validate_rejects_bad_delta_format() {
        let mut config = Config::from_json(SAMPLE).unwrap();
        config.delta_format = "%Q".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_delta_stamp_formats_timestamp() {
        let config = Config::from_json(SAMPLE).unwrap();
        let now = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap()
            .and_utc();
        assert_eq!(config.delta_stamp(&now).unwrap(), "20240601");
        assert!(!config.delta_stamp(&Utc::now()).unwrap().is_empty());
    }

    #[test]
    fn test_bool_option_rejects_garbage() {
        let mut config = Config::from_json(SAMPLE).unwrap();
        config.channels[0]
            .options
            .insert("include_dev".to_string(), "sometimes".to_string());
        assert!(matches!(
            config.channels[0].bool_option("include_dev", false),
            Err(ConfigError::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_channel_lookup() {
        let config = Config::from_json(SAMPLE).unwrap();
        assert!(config.channel("npm").is_ok());
        assert!(matches!(
            config.channel("nuget"),
            Err(ConfigError::UnknownChannel(_))
        ));
    }

    #[test]
    fn test_load_reads_file_relative_to_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = Config::load(&path).unwrap();

        assert!(config.db_path.starts_with(dir.path()));
        assert!(config.channels[0].output.full.starts_with(dir.path()));
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::load(&dir.path().join("absent.json")),
            Err(ConfigError::Read { .. })
        ));
    }
}
