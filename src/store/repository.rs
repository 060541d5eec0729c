//! Repository seam for artifact store operations.
//!
//! The graph walker, download manager and pipeline depend on this trait rather
//! than on [`ArtifactStore`] directly.

use async_trait::async_trait;

use super::{
    Artifact, ArtifactStatus, ArtifactStore, ArtifactVersion, NewArtifactVersion, Result,
};

/// Data-access contract for artifacts and their versions.
#[async_trait]
pub trait ArtifactRepository: Send + Sync {
    /// Returns the artifact, inserting an empty row first if needed.
    async fn get_or_create(&self, name: &str) -> Result<Artifact>;

    /// Registers a version unless it already exists; returns the stored record.
    async fn add_version_if_absent(
        &self,
        artifact: &str,
        new: &NewArtifactVersion<'_>,
    ) -> Result<ArtifactVersion>;

    /// Transitions an unprocessed version to processed.
    async fn mark_processed(&self, artifact: &str, version: &str) -> Result<()>;

    /// Excludes a version from downloads.
    async fn mark_blacklisted(&self, artifact: &str, version: &str) -> Result<()>;

    /// Records the outcome of an inspection.
    async fn set_artifact_status(&self, name: &str, status: ArtifactStatus) -> Result<()>;

    /// Lists every artifact with its versions.
    async fn list_all(&self) -> Result<Vec<Artifact>>;

    /// Names of artifacts left unfinished by an earlier run.
    async fn list_pending_artifacts(&self) -> Result<Vec<String>>;

    /// Returns the number of artifacts.
    async fn count_artifacts(&self) -> Result<i64>;

    /// Returns the number of versions.
    async fn count_versions(&self) -> Result<i64>;
}

#[async_trait]
impl ArtifactRepository for ArtifactStore {
    async fn get_or_create(&self, name: &str) -> Result<Artifact> {
        ArtifactStore::get_or_create(self, name).await
    }

    async fn add_version_if_absent(
        &self,
        artifact: &str,
        new: &NewArtifactVersion<'_>,
    ) -> Result<ArtifactVersion> {
        ArtifactStore::add_version_if_absent(self, artifact, new).await
    }

    async fn mark_processed(&self, artifact: &str, version: &str) -> Result<()> {
        ArtifactStore::mark_processed(self, artifact, version).await
    }

    async fn mark_blacklisted(&self, artifact: &str, version: &str) -> Result<()> {
        ArtifactStore::mark_blacklisted(self, artifact, version).await
    }

    async fn set_artifact_status(&self, name: &str, status: ArtifactStatus) -> Result<()> {
        ArtifactStore::set_artifact_status(self, name, status).await
    }

    async fn list_all(&self) -> Result<Vec<Artifact>> {
        ArtifactStore::list_all(self).await
    }

    async fn list_pending_artifacts(&self) -> Result<Vec<String>> {
        ArtifactStore::list_pending_artifacts(self).await
    }

    async fn count_artifacts(&self) -> Result<i64> {
        ArtifactStore::count_artifacts(self).await
    }

    async fn count_versions(&self) -> Result<i64> {
        ArtifactStore::count_versions(self).await
    }
}
