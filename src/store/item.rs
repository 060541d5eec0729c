//! Artifact and version records with their status definitions.

use std::fmt;

use chrono::NaiveDate;
use sqlx::FromRow;

/// Date format used for the `published_at` column.
pub(crate) const PUBLISHED_DATE_FORMAT: &str = "%Y-%m-%d";

/// Outcome of the most recent metadata inspection of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactStatus {
    /// Inspected successfully (or not yet inspected).
    Active,
    /// The last inspection failed; retried on the next run.
    Error,
}

impl ArtifactStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ArtifactStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "error" => Ok(Self::Error),
            _ => Err(format!("invalid artifact status: {s}")),
        }
    }
}

/// Processing state of a single artifact version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionStatus {
    /// Registered, dependency edges not yet enqueued.
    Unprocessed,
    /// Dependency edges enqueued at least once.
    Processed,
    /// Excluded from downloads by an operator.
    Blacklisted,
}

impl VersionStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unprocessed => "unprocessed",
            Self::Processed => "processed",
            Self::Blacklisted => "blacklisted",
        }
    }
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for VersionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unprocessed" => Ok(Self::Unprocessed),
            "processed" => Ok(Self::Processed),
            "blacklisted" => Ok(Self::Blacklisted),
            _ => Err(format!("invalid version status: {s}")),
        }
    }
}

/// A stored artifact version.
#[derive(Debug, Clone, FromRow, PartialEq, Eq)]
pub struct ArtifactVersion {
    /// Owning artifact name.
    pub artifact_name: String,
    /// Version string as reported by the registry.
    pub version: String,
    /// Source URL of the downloadable file.
    pub url: String,
    /// Current processing status (stored as text, parsed via `status()`).
    #[sqlx(rename = "status")]
    pub status_str: String,
    /// Registry download count, when the adapter reported one.
    pub downloads: Option<i64>,
    /// Publish date (`YYYY-MM-DD`), when the adapter reported one.
    pub published_at: Option<String>,
}

impl ArtifactVersion {
    /// Returns the parsed status enum.
    ///
    /// Falls back to `Unprocessed` if the status string is invalid, so an
    /// unreadable row gets walked again rather than skipped.
    #[must_use]
    pub fn status(&self) -> VersionStatus {
        self.status_str.parse().unwrap_or(VersionStatus::Unprocessed)
    }

    #[must_use]
    pub fn is_processed(&self) -> bool {
        self.status() == VersionStatus::Processed
    }

    #[must_use]
    pub fn is_blacklisted(&self) -> bool {
        self.status() == VersionStatus::Blacklisted
    }

    /// Download count as an unsigned value, if known.
    #[must_use]
    pub fn download_count(&self) -> Option<u64> {
        self.downloads.and_then(|value| u64::try_from(value).ok())
    }

    /// Parsed publish date, if known and well-formed.
    #[must_use]
    pub fn published_on(&self) -> Option<NaiveDate> {
        self.published_at
            .as_deref()
            .and_then(|raw| NaiveDate::parse_from_str(raw, PUBLISHED_DATE_FORMAT).ok())
    }
}

/// Raw artifact row, before versions are attached.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct ArtifactRow {
    pub(crate) name: String,
    #[sqlx(rename = "status")]
    pub(crate) status_str: String,
}

/// An artifact together with its versions in registration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Unique ecosystem name.
    pub name: String,
    /// Inspection status.
    pub status: ArtifactStatus,
    /// Known versions, oldest registration first.
    pub versions: Vec<ArtifactVersion>,
}

impl Artifact {
    pub(crate) fn from_row(row: ArtifactRow, versions: Vec<ArtifactVersion>) -> Self {
        Self {
            name: row.name,
            status: row.status_str.parse().unwrap_or(ArtifactStatus::Active),
            versions,
        }
    }

    /// Looks up a version by its version string.
    #[must_use]
    pub fn version(&self, version: &str) -> Option<&ArtifactVersion> {
        self.versions.iter().find(|v| v.version == version)
    }
}

/// Input for registering a version.
#[derive(Debug, Clone, Copy)]
pub struct NewArtifactVersion<'a> {
    pub version: &'a str,
    pub url: &'a str,
    pub downloads: Option<u64>,
    pub published_at: Option<NaiveDate>,
}

impl<'a> NewArtifactVersion<'a> {
    /// A version with only the required fields.
    #[must_use]
    pub fn new(version: &'a str, url: &'a str) -> Self {
        Self {
            version,
            url,
            downloads: None,
            published_at: None,
        }
    }
}
