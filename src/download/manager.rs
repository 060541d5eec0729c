//! Download manager for the mirror's download phase.
//!
//! Takes a snapshot of the store, selects every version that is neither
//! blacklisted nor filtered out (and whose artifact did not fail this run),
//! and downloads each one in its own Tokio task gated by a semaphore.
//!
//! Per version:
//! 1. Resolve and validate the deposit path below the mirror root.
//! 2. Skip when a non-empty file is already there; delete an empty one.
//! 3. Stream into a `.part` sibling.
//! 4. Rename into place only if the byte count matches the declared length.
//! 5. Copy the finished file into the run's delta directory, unless staging.
//!
//! A failing version never affects the others.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::client::Transferred;
use super::constants::PARTIAL_SUFFIX;
use super::{DownloadError, HttpClient};
use crate::cancel::CancelFlag;
use crate::channel::Adapter;
use crate::config::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY};
use crate::events::{ChannelEvent, EventSink};
use crate::filter::FilterEngine;
use crate::store::{ArtifactRepository, ArtifactVersion, StoreError};

/// Error type for download phase operations.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency { value: usize },

    /// The snapshot or counters could not be read.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Counters updated concurrently by download tasks.
#[derive(Debug, Default)]
pub struct DownloadStats {
    downloaded: AtomicUsize,
    skipped: AtomicUsize,
    filtered: AtomicUsize,
    failed: AtomicUsize,
}

impl DownloadStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Files transferred and placed this run.
    #[must_use]
    pub fn downloaded(&self) -> usize {
        self.downloaded.load(Ordering::SeqCst)
    }

    /// Versions whose file was already present.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Versions excluded by blacklist or filter rules.
    #[must_use]
    pub fn filtered(&self) -> usize {
        self.filtered.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    fn increment_downloaded(&self) {
        self.downloaded.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Totals published with the `Completed` event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    /// Artifacts in the store.
    pub packages: usize,
    /// Versions in the store.
    pub versions: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub filtered: usize,
    pub failed: usize,
}

impl DownloadSummary {
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

enum UnitOutcome {
    Downloaded(u64),
    AlreadyPresent,
}

/// Shared, read-only state for download tasks.
#[derive(Clone)]
struct UnitContext {
    channel: String,
    client: HttpClient,
    adapter: Arc<dyn Adapter>,
    mirror_root: PathBuf,
    delta_dir: Option<PathBuf>,
    events: EventSink,
}

/// Bounded-parallel consumer of the artifact store.
pub struct DownloadManager {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    filter: Arc<FilterEngine>,
    cancel: CancelFlag,
    context: UnitContext,
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadManager")
            .field("channel", &self.context.channel)
            .field("concurrency", &self.concurrency)
            .field("mirror_root", &self.context.mirror_root)
            .field("delta_dir", &self.context.delta_dir)
            .finish_non_exhaustive()
    }
}

impl DownloadManager {
    /// Creates a manager for one channel.
    ///
    /// `delta_dir` is this run's delta directory, or `None` in staging mode.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::InvalidConcurrency`] if `concurrency` is
    /// outside 1..=100.
    #[instrument(level = "debug", skip(client, adapter, filter))]
    pub fn new(
        channel: &str,
        concurrency: usize,
        client: HttpClient,
        adapter: Arc<dyn Adapter>,
        filter: Arc<FilterEngine>,
        mirror_root: PathBuf,
        delta_dir: Option<PathBuf>,
    ) -> Result<Self, ManagerError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(ManagerError::InvalidConcurrency { value: concurrency });
        }

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            filter,
            cancel: CancelFlag::new(),
            context: UnitContext {
                channel: channel.to_string(),
                client,
                adapter,
                mirror_root,
                delta_dir,
                events: EventSink::disabled(),
            },
        })
    }

    /// Creates a manager with the default concurrency.
    ///
    /// # Errors
    ///
    /// Never fails for the default value; the signature mirrors [`Self::new`].
    pub fn with_default_concurrency(
        channel: &str,
        client: HttpClient,
        adapter: Arc<dyn Adapter>,
        filter: Arc<FilterEngine>,
        mirror_root: PathBuf,
        delta_dir: Option<PathBuf>,
    ) -> Result<Self, ManagerError> {
        Self::new(
            channel,
            DEFAULT_CONCURRENCY,
            client,
            adapter,
            filter,
            mirror_root,
            delta_dir,
        )
    }

    #[must_use]
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.context.events = events;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Downloads every selected version and emits one `Completed` event.
    ///
    /// `failed_artifacts` are the artifacts whose discovery failed this run;
    /// their versions are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Store`] if the snapshot or the final counts
    /// cannot be read. Individual download failures are only counted.
    #[instrument(skip(self, store, failed_artifacts), fields(channel = %self.context.channel, op = "download"))]
    pub async fn run(
        &self,
        store: &dyn ArtifactRepository,
        failed_artifacts: &HashSet<String>,
    ) -> Result<DownloadSummary, ManagerError> {
        let snapshot = store.list_all().await?;
        let context = Arc::new(self.context.clone());
        let stats = Arc::new(DownloadStats::new());
        let mut handles = Vec::new();

        info!(artifacts = snapshot.len(), "starting download phase");

        'artifacts: for artifact in snapshot {
            if failed_artifacts.contains(&artifact.name) {
                debug!(artifact = %artifact.name, "artifact failed this run; downloads skipped");
                continue;
            }

            for version in artifact.versions {
                if version.is_blacklisted()
                    || !self.filter.evaluate(
                        &artifact.name,
                        &version.version,
                        version.download_count(),
                        version.published_on(),
                    )
                {
                    stats.increment_filtered();
                    continue;
                }

                if self.cancel.is_cancelled() {
                    warn!("download phase cancelled; no further units submitted");
                    break 'artifacts;
                }

                let permit = self
                    .semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| ManagerError::SemaphoreClosed)?;

                let context = Arc::clone(&context);
                let stats = Arc::clone(&stats);
                let name = artifact.name.clone();

                handles.push(tokio::spawn(async move {
                    let _permit = permit;
                    run_unit(&context, &stats, &name, &version).await;
                }));
            }
        }

        debug!(task_count = handles.len(), "waiting for downloads to complete");
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "download task panicked");
                stats.increment_failed();
            }
        }

        let summary = DownloadSummary {
            packages: usize::try_from(store.count_artifacts().await?).unwrap_or(0),
            versions: usize::try_from(store.count_versions().await?).unwrap_or(0),
            downloaded: stats.downloaded(),
            skipped: stats.skipped(),
            filtered: stats.filtered(),
            failed: stats.failed(),
        };
        info!(
            downloaded = summary.downloaded,
            skipped = summary.skipped,
            filtered = summary.filtered,
            failed = summary.failed,
            "download phase complete"
        );

        context.events.emit(ChannelEvent::Completed {
            channel: context.channel.clone(),
            summary,
        });
        Ok(summary)
    }
}

async fn run_unit(context: &UnitContext, stats: &DownloadStats, artifact: &str, version: &ArtifactVersion) {
    match place_version(context, artifact, version).await {
        Ok(UnitOutcome::AlreadyPresent) => {
            debug!(artifact = %artifact, version = %version.version, "already downloaded");
            stats.increment_skipped();
        }
        Ok(UnitOutcome::Downloaded(bytes)) => {
            info!(artifact = %artifact, version = %version.version, bytes, "download completed");
            stats.increment_downloaded();
            context.events.emit(ChannelEvent::Downloaded {
                channel: context.channel.clone(),
                artifact: artifact.to_string(),
                version: version.version.clone(),
                bytes,
            });
        }
        Err(e) => {
            warn!(
                artifact = %artifact,
                version = %version.version,
                url = %version.url,
                error = %e,
                "download failed"
            );
            stats.increment_failed();
            context.events.emit(ChannelEvent::DownloadFailed {
                channel: context.channel.clone(),
                artifact: artifact.to_string(),
                version: version.version.clone(),
                error: e.to_string(),
            });
        }
    }
}

#[instrument(skip(context, version), fields(version = %version.version))]
async fn place_version(
    context: &UnitContext,
    artifact: &str,
    version: &ArtifactVersion,
) -> Result<UnitOutcome, DownloadError> {
    let relative = context.adapter.deposit_path(artifact, version);
    validate_deposit_path(&relative)?;
    if version.url.trim().is_empty() {
        return Err(DownloadError::invalid_url(&version.url));
    }

    let target = context.mirror_root.join(&relative);
    match tokio::fs::metadata(&target).await {
        Ok(meta) if meta.len() > 0 => return Ok(UnitOutcome::AlreadyPresent),
        Ok(_) => {
            debug!(path = %target.display(), "removing empty file before re-download");
            tokio::fs::remove_file(&target)
                .await
                .map_err(|e| DownloadError::io(&target, e))?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(DownloadError::io(&target, e)),
    }

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::io(parent, e))?;
    }

    context.events.emit(ChannelEvent::Downloading {
        channel: context.channel.clone(),
        artifact: artifact.to_string(),
        version: version.version.clone(),
    });

    let partial = partial_path_for(&target);
    let transferred = match context.client.get(&version.url, &partial).await {
        Ok(transferred) => transferred,
        Err(e) => {
            discard(&partial).await;
            return Err(e);
        }
    };
    finalize(&partial, &target, transferred).await?;

    if let Some(delta_dir) = &context.delta_dir {
        copy_to_delta(&target, &delta_dir.join(&relative)).await?;
    }

    Ok(UnitOutcome::Downloaded(transferred.bytes))
}

/// Moves a complete transfer into place, or discards an incomplete one.
async fn finalize(partial: &Path, target: &Path, transferred: Transferred) -> Result<(), DownloadError> {
    if !transferred.is_complete() {
        discard(partial).await;
        return Err(DownloadError::integrity(
            target,
            transferred.declared,
            transferred.bytes,
        ));
    }
    tokio::fs::rename(partial, target)
        .await
        .map_err(|e| DownloadError::io(target, e))
}

async fn copy_to_delta(source: &Path, dest: &Path) -> Result<(), DownloadError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::io(parent, e))?;
    }
    tokio::fs::copy(source, dest)
        .await
        .map_err(|e| DownloadError::io(dest, e))?;
    Ok(())
}

async fn discard(partial: &Path) {
    if let Err(e) = tokio::fs::remove_file(partial).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %partial.display(), error = %e, "failed to remove partial file");
    }
}

/// Rejects deposit paths that could escape the mirror root.
///
/// # Errors
///
/// Returns [`DownloadError::UnsafePath`] for empty or absolute paths and for
/// paths with `..` components.
pub fn validate_deposit_path(path: &Path) -> Result<(), DownloadError> {
    let mut has_file = false;
    for component in path.components() {
        match component {
            Component::Normal(_) => has_file = true,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(DownloadError::unsafe_path(path));
            }
        }
    }
    if has_file {
        Ok(())
    } else {
        Err(DownloadError::unsafe_path(path))
    }
}

/// Temporary sibling a transfer streams into: `<name>.part`.
#[must_use]
pub fn partial_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    target.with_file_name(name)
}
