//! Download filter rules.
//!
//! A channel selects zero or more named filter groups from the configuration.
//! Their rules are merged (later groups win for the same key) into one
//! effective rule set keyed by artifact name, plus an optional wildcard `*`
//! rule applied to every artifact.
//!
//! A rule excludes a version when any of its conditions matches:
//! - the version string matches the rule's regular expression
//! - the download count is below `min_downloads`
//! - the publish date is before `min_date`
//!
//! Filtering only decides what gets downloaded. Dependency discovery never
//! consults it.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::config::FilterRuleConfig;

/// Rule key that applies to every artifact.
pub const WILDCARD: &str = "*";

/// Errors raised while compiling filter configuration.
#[derive(Debug, Error)]
pub enum FilterError {
    /// A channel referenced a filter group that is not defined.
    #[error("unknown filter group '{0}'")]
    UnknownGroup(String),

    /// A version pattern did not compile.
    #[error("invalid version pattern for '{key}': {source}")]
    InvalidPattern {
        /// Rule key (artifact name or `*`).
        key: String,
        /// The regex compile error.
        #[source]
        source: regex::Error,
    },

    /// A `min_date` value could not be parsed.
    #[error("invalid min_date '{value}' for '{key}': expected YYYY-MM-DD")]
    InvalidDate {
        /// Rule key (artifact name or `*`).
        key: String,
        /// The rejected value.
        value: String,
    },
}

/// One compiled rule.
#[derive(Debug, Clone, Default)]
pub struct FilterRule {
    version: Option<Regex>,
    min_downloads: u64,
    min_date: Option<NaiveDate>,
}

impl FilterRule {
    /// Compiles a configured rule.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::InvalidPattern`] or [`FilterError::InvalidDate`].
    pub fn compile(key: &str, config: &FilterRuleConfig) -> Result<Self, FilterError> {
        let version = config
            .version
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|source| FilterError::InvalidPattern {
                key: key.to_string(),
                source,
            })?;

        let min_date = config
            .min_date
            .as_deref()
            .map(|raw| {
                parse_date(raw).ok_or_else(|| FilterError::InvalidDate {
                    key: key.to_string(),
                    value: raw.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            version,
            min_downloads: config.min_downloads.unwrap_or(0),
            min_date,
        })
    }

    /// Returns true when this rule excludes the version.
    fn excludes(&self, version: &str, downloads: Option<u64>, published: Option<NaiveDate>) -> bool {
        if self.version.as_ref().is_some_and(|re| re.is_match(version)) {
            return true;
        }
        if self.min_downloads > 0 && downloads.is_some_and(|count| count < self.min_downloads) {
            return true;
        }
        if let (Some(min_date), Some(published)) = (self.min_date, published)
            && published < min_date
        {
            return true;
        }
        false
    }
}

/// Parses `YYYY-MM-DD` or an RFC 3339 timestamp into a calendar date.
pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|ts| ts.date_naive()))
}

/// Immutable effective rule set for one channel.
#[derive(Debug, Clone, Default)]
pub struct FilterEngine {
    rules: HashMap<String, FilterRule>,
}

impl FilterEngine {
    /// An engine with no rules; keeps everything.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds the effective rule set from the configured groups selected by a
    /// channel, in selection order.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::UnknownGroup`] for an undefined group, or a
    /// compile error for a malformed rule.
    pub fn from_groups(
        groups: &BTreeMap<String, BTreeMap<String, FilterRuleConfig>>,
        selected: &[String],
    ) -> Result<Self, FilterError> {
        let mut rules = HashMap::new();
        for group_id in selected {
            let group = groups
                .get(group_id)
                .ok_or_else(|| FilterError::UnknownGroup(group_id.clone()))?;
            for (key, config) in group {
                rules.insert(key.clone(), FilterRule::compile(key, config)?);
            }
        }
        debug!(rules = rules.len(), groups = selected.len(), "filter engine built");
        Ok(Self { rules })
    }

    /// Returns the number of effective rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Decides whether a version should be downloaded.
    ///
    /// The exact-name rule is consulted first, then the wildcard rule. Unknown
    /// download counts or publish dates never trigger their condition.
    #[must_use]
    pub fn evaluate(
        &self,
        name: &str,
        version: &str,
        downloads: Option<u64>,
        published: Option<NaiveDate>,
    ) -> bool {
        for key in [name, WILDCARD] {
            if let Some(rule) = self.rules.get(key)
                && rule.excludes(version, downloads, published)
            {
                debug!(artifact = %name, version = %version, rule = %key, "version filtered out");
                return false;
            }
        }
        true
    }
}
