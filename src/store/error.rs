//! Error types for artifact store operations.

use thiserror::Error;

/// Errors that can occur during artifact store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A query or statement failed.
    #[error("store query failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    /// The (artifact, version) pair has no row in the store.
    #[error(
        "version not found: {artifact}@{version}\n  Suggestion: Run the channel first so the version is discovered, then retry"
    )]
    VersionNotFound { artifact: String, version: String },
}

impl StoreError {
    #[must_use]
    pub fn version_not_found(artifact: &str, version: &str) -> Self {
        Self::VersionNotFound {
            artifact: artifact.to_string(),
            version: version.to_string(),
        }
    }

    /// True for `SQLITE_BUSY`/`SQLITE_LOCKED`, which a later run may not hit.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        let Self::Database(sqlx::Error::Database(db_error)) = self else {
            return false;
        };
        matches!(db_error.code().as_deref(), Some("5" | "6"))
            || db_error.message().contains("database is locked")
    }
}
