//! Persistent artifact store.
//!
//! `SQLite`-backed record of every artifact a channel has encountered and of
//! every version discovered for it, together with the processing state
//! machine (`unprocessed` → `processed`, operator-driven `blacklisted`).
//!
//! Every mutation is a single autocommitted statement, so it is durable when
//! the call returns. A crashed run leaves rows that the next run resumes from.
//!
//! # Example
//!
//! ```ignore
//! use stockpile_core::store::{ArtifactStore, NewArtifactVersion};
//! use stockpile_core::Database;
//!
//! let store = ArtifactStore::new(Database::new_in_memory().await?);
//! let artifact = store.get_or_create("left-pad").await?;
//! store
//!     .add_version_if_absent(&artifact.name, &NewArtifactVersion::new("1.0.0", url))
//!     .await?;
//! store.mark_processed("left-pad", "1.0.0").await?;
//! ```

mod error;
mod item;
mod repository;

pub use error::StoreError;
pub use item::{Artifact, ArtifactStatus, ArtifactVersion, NewArtifactVersion, VersionStatus};
pub use repository::ArtifactRepository;

use item::{ArtifactRow, PUBLISHED_DATE_FORMAT};
use tracing::{debug, instrument};

use crate::db::Database;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

const VERSION_COLUMNS: &str =
    "artifact_name, version, url, status, downloads, published_at";

/// Artifact store over one channel's database.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    db: Database,
}

impl ArtifactStore {
    /// Creates a store over the given database connection.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns the artifact named `name`, inserting an empty active row first
    /// if none exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a query fails.
    #[instrument(skip(self), fields(artifact = %name))]
    pub async fn get_or_create(&self, name: &str) -> Result<Artifact> {
        let inserted = sqlx::query(
            r"INSERT INTO artifacts (name, status) VALUES (?, ?)
              ON CONFLICT(name) DO NOTHING",
        )
        .bind(name)
        .bind(ArtifactStatus::Active.as_str())
        .execute(self.db.pool())
        .await?;

        if inserted.rows_affected() > 0 {
            debug!("created artifact");
        }

        self.get(name)
            .await?
            .ok_or_else(|| StoreError::ArtifactNotFound(name.to_string()))
    }

    /// Returns the artifact with its versions, or `None` if unknown.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a query fails.
    #[instrument(skip(self), fields(artifact = %name))]
    pub async fn get(&self, name: &str) -> Result<Option<Artifact>> {
        let row = sqlx::query_as::<_, ArtifactRow>(
            "SELECT name, status FROM artifacts WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(self.db.pool())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let versions = sqlx::query_as::<_, ArtifactVersion>(&format!(
            "SELECT {VERSION_COLUMNS} FROM artifact_versions WHERE artifact_name = ? ORDER BY rowid"
        ))
        .bind(name)
        .fetch_all(self.db.pool())
        .await?;

        Ok(Some(Artifact::from_row(row, versions)))
    }

    /// Registers a version unless the `(artifact, version)` key already
    /// exists, and returns the stored record either way.
    ///
    /// Re-adding never changes an existing row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails (for instance when
    /// the artifact row does not exist).
    #[instrument(skip(self, new), fields(artifact = %artifact, version = %new.version))]
    pub async fn add_version_if_absent(
        &self,
        artifact: &str,
        new: &NewArtifactVersion<'_>,
    ) -> Result<ArtifactVersion> {
        let downloads = new
            .downloads
            .map(|count| i64::try_from(count).unwrap_or(i64::MAX));
        let published_at = new
            .published_at
            .map(|date| date.format(PUBLISHED_DATE_FORMAT).to_string());

        sqlx::query(
            r"INSERT INTO artifact_versions
                (artifact_name, version, url, status, downloads, published_at)
              VALUES (?, ?, ?, ?, ?, ?)
              ON CONFLICT(artifact_name, version) DO NOTHING",
        )
        .bind(artifact)
        .bind(new.version)
        .bind(new.url)
        .bind(VersionStatus::Unprocessed.as_str())
        .bind(downloads)
        .bind(published_at)
        .execute(self.db.pool())
        .await?;

        self.get_version(artifact, new.version)
            .await?
            .ok_or_else(|| StoreError::version_not_found(artifact, new.version))
    }

    /// Fetches one version record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn get_version(
        &self,
        artifact: &str,
        version: &str,
    ) -> Result<Option<ArtifactVersion>> {
        let row = sqlx::query_as::<_, ArtifactVersion>(&format!(
            "SELECT {VERSION_COLUMNS} FROM artifact_versions WHERE artifact_name = ? AND version = ?"
        ))
        .bind(artifact)
        .bind(version)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row)
    }

    /// Transitions a version from `unprocessed` to `processed`.
    ///
    /// Already processed or blacklisted versions are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VersionNotFound`] if the version does not exist.
    #[instrument(skip(self))]
    pub async fn mark_processed(&self, artifact: &str, version: &str) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE artifact_versions
              SET status = ?, updated_at = datetime('now')
              WHERE artifact_name = ? AND version = ? AND status = ?",
        )
        .bind(VersionStatus::Processed.as_str())
        .bind(artifact)
        .bind(version)
        .bind(VersionStatus::Unprocessed.as_str())
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 && self.get_version(artifact, version).await?.is_none() {
            return Err(StoreError::version_not_found(artifact, version));
        }
        Ok(())
    }

    /// Permanently excludes a version from downloads.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VersionNotFound`] if the version does not exist.
    #[instrument(skip(self))]
    pub async fn mark_blacklisted(&self, artifact: &str, version: &str) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE artifact_versions
              SET status = ?, updated_at = datetime('now')
              WHERE artifact_name = ? AND version = ?",
        )
        .bind(VersionStatus::Blacklisted.as_str())
        .bind(artifact)
        .bind(version)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::version_not_found(artifact, version));
        }
        Ok(())
    }

    /// Records the outcome of an artifact inspection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ArtifactNotFound`] if the artifact does not exist.
    #[instrument(skip(self))]
    pub async fn set_artifact_status(&self, name: &str, status: ArtifactStatus) -> Result<()> {
        let result = sqlx::query(
            "UPDATE artifacts SET status = ?, updated_at = datetime('now') WHERE name = ?",
        )
        .bind(status.as_str())
        .bind(name)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ArtifactNotFound(name.to_string()));
        }
        Ok(())
    }

    /// Lists every artifact with its versions.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a query fails.
    #[instrument(skip(self))]
    pub async fn list_all(&self) -> Result<Vec<Artifact>> {
        let rows = sqlx::query_as::<_, ArtifactRow>(
            "SELECT name, status FROM artifacts ORDER BY rowid",
        )
        .fetch_all(self.db.pool())
        .await?;

        let versions = sqlx::query_as::<_, ArtifactVersion>(&format!(
            "SELECT {VERSION_COLUMNS} FROM artifact_versions ORDER BY rowid"
        ))
        .fetch_all(self.db.pool())
        .await?;

        let mut by_artifact: std::collections::HashMap<String, Vec<ArtifactVersion>> =
            std::collections::HashMap::new();
        for version in versions {
            by_artifact
                .entry(version.artifact_name.clone())
                .or_default()
                .push(version);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let versions = by_artifact.remove(&row.name).unwrap_or_default();
                Artifact::from_row(row, versions)
            })
            .collect())
    }

    /// Names of artifacts a previous run left unfinished: failed inspections,
    /// artifacts with no versions yet, and artifacts with unprocessed versions.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn list_pending_artifacts(&self) -> Result<Vec<String>> {
        let names: Vec<(String,)> = sqlx::query_as(
            r"SELECT a.name FROM artifacts a
              WHERE a.status = ?
                 OR NOT EXISTS (
                    SELECT 1 FROM artifact_versions v WHERE v.artifact_name = a.name
                 )
                 OR EXISTS (
                    SELECT 1 FROM artifact_versions v
                    WHERE v.artifact_name = a.name AND v.status = ?
                 )
              ORDER BY a.rowid",
        )
        .bind(ArtifactStatus::Error.as_str())
        .bind(VersionStatus::Unprocessed.as_str())
        .fetch_all(self.db.pool())
        .await?;

        Ok(names.into_iter().map(|(name,)| name).collect())
    }

    /// Returns the number of artifacts.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn count_artifacts(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM artifacts")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }

    /// Returns the number of versions across all artifacts.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn count_versions(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM artifact_versions")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    async fn store() -> ArtifactStore {
        ArtifactStore::new(Database::new_in_memory().await.unwrap())
    }

    const URL: &str = "https://registry.npmjs.org/left-pad/-/left-pad-1.0.0.tgz";

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let store = store().await;

        let first = store.get_or_create("left-pad").await.unwrap();
        let second = store.get_or_create("left-pad").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.status, ArtifactStatus::Active);
        assert!(first.versions.is_empty());
        assert_eq!(store.count_artifacts().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_add_version_if_absent_keeps_first_record() {
        let store = store().await;
        store.get_or_create("left-pad").await.unwrap();

        let first = store
            .add_version_if_absent("left-pad", &NewArtifactVersion::new("1.0.0", URL))
            .await
            .unwrap();
        store.mark_processed("left-pad", "1.0.0").await.unwrap();
        let again = store
            .add_version_if_absent(
                "left-pad",
                &NewArtifactVersion::new("1.0.0", "https://elsewhere.example/x.tgz"),
            )
            .await
            .unwrap();

        assert_eq!(first.url, URL);
        assert_eq!(again.url, URL, "re-adding must not overwrite the url");
        assert_eq!(again.status(), VersionStatus::Processed);
        assert_eq!(store.count_versions().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_add_version_requires_artifact_row() {
        let store = store().await;
        let result = store
            .add_version_if_absent("ghost", &NewArtifactVersion::new("1.0.0", URL))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_add_version_stores_optional_metadata() {
        let store = store().await;
        store.get_or_create("left-pad").await.unwrap();
        let date = NaiveDate::from_ymd_opt(2016, 3, 22).unwrap();

        let version = store
            .add_version_if_absent(
                "left-pad",
                &NewArtifactVersion {
                    version: "1.0.0",
                    url: URL,
                    downloads: Some(1234),
                    published_at: Some(date),
                },
            )
            .await
            .unwrap();

        assert_eq!(version.download_count(), Some(1234));
        assert_eq!(version.published_on(), Some(date));
    }

    #[tokio::test]
    async fn test_mark_processed_does_not_override_blacklist() {
        let store = store().await;
        store.get_or_create("a").await.unwrap();
        store
            .add_version_if_absent("a", &NewArtifactVersion::new("1.0.0", URL))
            .await
            .unwrap();

        store.mark_blacklisted("a", "1.0.0").await.unwrap();
        store.mark_processed("a", "1.0.0").await.unwrap();

        let version = store.get_version("a", "1.0.0").await.unwrap().unwrap();
        assert_eq!(version.status(), VersionStatus::Blacklisted);
    }

    #[tokio::test]
    async fn test_mark_unknown_version_is_not_found() {
        let store = store().await;
        store.get_or_create("a").await.unwrap();

        assert!(matches!(
            store.mark_processed("a", "0.0.1").await,
            Err(StoreError::VersionNotFound { .. })
        ));
        assert!(matches!(
            store.mark_blacklisted("a", "0.0.1").await,
            Err(StoreError::VersionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_all_groups_versions_in_registration_order() {
        let store = store().await;
        store.get_or_create("b").await.unwrap();
        store.get_or_create("a").await.unwrap();
        for version in ["2.0.0", "1.0.0", "1.5.0"] {
            store
                .add_version_if_absent("b", &NewArtifactVersion::new(version, URL))
                .await
                .unwrap();
        }

        let all = store.list_all().await.unwrap();

        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "b");
        let order: Vec<&str> = all[0].versions.iter().map(|v| v.version.as_str()).collect();
        assert_eq!(order, ["2.0.0", "1.0.0", "1.5.0"]);
        assert!(all[1].versions.is_empty());
    }

    #[tokio::test]
    async fn test_list_pending_artifacts() {
        let store = store().await;
        // finished: processed version, active
        store.get_or_create("done").await.unwrap();
        store
            .add_version_if_absent("done", &NewArtifactVersion::new("1.0.0", URL))
            .await
            .unwrap();
        store.mark_processed("done", "1.0.0").await.unwrap();
        // never inspected
        store.get_or_create("queued").await.unwrap();
        // failed inspection
        store.get_or_create("broken").await.unwrap();
        store
            .add_version_if_absent("broken", &NewArtifactVersion::new("1.0.0", URL))
            .await
            .unwrap();
        store.mark_processed("broken", "1.0.0").await.unwrap();
        store
            .set_artifact_status("broken", ArtifactStatus::Error)
            .await
            .unwrap();
        // interrupted mid-walk
        store.get_or_create("partial").await.unwrap();
        store
            .add_version_if_absent("partial", &NewArtifactVersion::new("1.0.0", URL))
            .await
            .unwrap();

        let pending = store.list_pending_artifacts().await.unwrap();

        assert_eq!(pending, ["queued", "broken", "partial"]);
    }

    #[tokio::test]
    async fn test_set_artifact_status_round_trip() {
        let store = store().await;
        store.get_or_create("x").await.unwrap();

        store.set_artifact_status("x", ArtifactStatus::Error).await.unwrap();
        assert_eq!(
            store.get("x").await.unwrap().unwrap().status,
            ArtifactStatus::Error
        );

        store.set_artifact_status("x", ArtifactStatus::Active).await.unwrap();
        assert_eq!(
            store.get("x").await.unwrap().unwrap().status,
            ArtifactStatus::Active
        );
        assert!(store.set_artifact_status("missing", ArtifactStatus::Error).await.is_err());
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        {
            let store = ArtifactStore::new(Database::open_channel(temp_dir.path(), "npm").await.unwrap());
            store.get_or_create("left-pad").await.unwrap();
            store
                .add_version_if_absent("left-pad", &NewArtifactVersion::new("1.0.0", URL))
                .await
                .unwrap();
            store.mark_processed("left-pad", "1.0.0").await.unwrap();
        }

        let reopened =
            ArtifactStore::new(Database::open_channel(temp_dir.path(), "npm").await.unwrap());
        let artifact = reopened.get("left-pad").await.unwrap().unwrap();
        assert!(artifact.version("1.0.0").unwrap().is_processed());
    }
}
