//! Channel orchestration.
//!
//! A channel run is: read the seed list, walk the dependency graph from the
//! seeds, resume artifacts a previous run left unfinished, then run the
//! download phase. Channels are independent and run as concurrent tasks, each
//! with its own store, visited set and download pool.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use thiserror::Error;
use tracing::{Instrument, info, info_span, instrument, warn};

use crate::cancel::CancelFlag;
use crate::channel::{Adapter, GraphWalker, WalkReport, build_adapter};
use crate::config::{ChannelConfig, Config, ConfigError};
use crate::db::{Database, DbError};
use crate::download::{DownloadManager, DownloadSummary, HttpClient, ManagerError};
use crate::events::{ChannelEvent, EventSink};
use crate::filter::FilterEngine;
use crate::seeds::{SeedError, load_seeds};
use crate::store::{ArtifactStore, StoreError};

/// Errors that stop a channel (or, for configuration, the whole run).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The channel's store could not be opened or migrated.
    #[error("store unavailable: {0}")]
    Database(#[from] DbError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Seeds(#[from] SeedError),

    #[error(transparent)]
    Download(#[from] ManagerError),

    /// The shared transfer client could not be built.
    #[error("cannot build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// A channel task panicked or was aborted.
    #[error("channel '{channel}' task failed: {reason}")]
    Task { channel: String, reason: String },
}

/// Options for one invocation of [`run_all`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Force staging mode on top of the configured value.
    pub staging: bool,
    /// Channel ids to run; empty means every configured channel.
    pub channels: Vec<String>,
}

/// What one channel run did.
#[derive(Debug, Clone)]
pub struct ChannelReport {
    pub channel: String,
    pub walk: WalkReport,
    pub downloads: DownloadSummary,
}

impl ChannelReport {
    /// True when nothing failed and the run was not cancelled.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.walk.failed.is_empty() && !self.downloads.has_failures() && !self.walk.cancelled
    }
}

/// A configured channel, validated and ready to open its store.
pub struct Channel {
    config: ChannelConfig,
    db_dir: PathBuf,
    adapter: Arc<dyn Adapter>,
    filter: Arc<FilterEngine>,
    delta_dir: Option<PathBuf>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.config.id)
            .field("kind", &self.config.kind)
            .field("delta_dir", &self.delta_dir)
            .finish_non_exhaustive()
    }
}

impl Channel {
    /// Builds the adapter and filter engine for a channel.
    ///
    /// `delta_stamp` names this run's delta directory; `None` means staging.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for unsupported ecosystems, bad options or bad
    /// filter configuration.
    pub fn from_config(
        config: &Config,
        channel: &ChannelConfig,
        delta_stamp: Option<&str>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            config: channel.clone(),
            db_dir: config.db_path.clone(),
            adapter: build_adapter(channel)?,
            filter: Arc::new(config.filter_engine(channel)?),
            delta_dir: delta_stamp.map(|stamp| channel.output.delta.join(stamp)),
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Runs discovery then downloads.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] when the store cannot be opened, the seed
    /// list cannot be read, or the download snapshot fails. Per-artifact and
    /// per-version failures are reported in the [`ChannelReport`] instead.
    #[instrument(skip_all, fields(channel = %self.config.id))]
    pub async fn run(
        &self,
        client: HttpClient,
        events: EventSink,
        cancel: CancelFlag,
    ) -> Result<ChannelReport, PipelineError> {
        let id = self.config.id.as_str();
        let db = Database::open_channel(&self.db_dir, id).await?;
        let store = Arc::new(ArtifactStore::new(db));

        let seeds = load_seeds(&self.config.input).await?;
        info!(seeds = seeds.len(), kind = %self.adapter.kind(), "channel started");
        events.emit(ChannelEvent::Started {
            channel: id.to_string(),
            seeds: seeds.len(),
        });

        let mut walker = GraphWalker::new(id, Arc::clone(&self.adapter), store.clone())
            .with_force(self.config.force)
            .with_events(events.clone())
            .with_cancel(cancel.clone());
        walker.walk(&seeds).await;

        let pending: Vec<String> = store
            .list_pending_artifacts()
            .await?
            .into_iter()
            .filter(|name| !walker.visited().contains(name))
            .collect();
        if !pending.is_empty() {
            info!(pending = pending.len(), "resuming unfinished artifacts");
            walker.walk(&pending).await;
        }

        let walk = walker.finish();
        events.emit(ChannelEvent::WalkFinished {
            channel: id.to_string(),
            metrics: walk.metrics,
        });

        let manager = DownloadManager::new(
            id,
            self.config.max_concurrency,
            client,
            Arc::clone(&self.adapter),
            Arc::clone(&self.filter),
            self.config.output.full.clone(),
            self.delta_dir.clone(),
        )?
        .with_events(events)
        .with_cancel(cancel);
        let downloads = manager.run(store.as_ref(), &walk.failed).await?;

        Ok(ChannelReport {
            channel: id.to_string(),
            walk,
            downloads,
        })
    }
}

/// Runs the selected channels concurrently.
///
/// Configuration problems abort before any channel starts. After that, each
/// channel succeeds or fails on its own; the returned vector holds one result
/// per channel in configuration order.
///
/// # Errors
///
/// Returns [`PipelineError::Config`] for unknown channel ids or channels that
/// cannot be constructed, and [`PipelineError::Client`] if the HTTP client
/// cannot be built.
pub async fn run_all(
    config: &Config,
    options: &RunOptions,
    events: EventSink,
    cancel: CancelFlag,
) -> Result<Vec<Result<ChannelReport, PipelineError>>, PipelineError> {
    let staging = config.staging || options.staging;
    let stamp = if staging {
        None
    } else {
        Some(config.delta_stamp(&Local::now())?)
    };

    let selected: Vec<&ChannelConfig> = if options.channels.is_empty() {
        config.channels.iter().collect()
    } else {
        options
            .channels
            .iter()
            .map(|id| config.channel(id))
            .collect::<Result<_, _>>()?
    };

    let channels = selected
        .into_iter()
        .map(|channel| Channel::from_config(config, channel, stamp.as_deref()))
        .collect::<Result<Vec<_>, _>>()?;

    let client = HttpClient::new().map_err(PipelineError::Client)?;
    info!(channels = channels.len(), staging, "run started");

    let handles: Vec<_> = channels
        .into_iter()
        .map(|channel| {
            let client = client.clone();
            let events = events.clone();
            let cancel = cancel.clone();
            let id = channel.id().to_string();
            let span = info_span!("channel_task", channel = %id);
            let handle = tokio::spawn(
                async move { channel.run(client, events, cancel).await }.instrument(span),
            );
            (id, handle)
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (channel, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(PipelineError::Task {
                channel: channel.clone(),
                reason: e.to_string(),
            }),
        };
        if let Err(e) = &result {
            warn!(channel = %channel, error = %e, "channel failed");
        }
        results.push(result);
    }
    Ok(results)
}

/// Permanently excludes one version of an artifact from downloads.
///
/// # Errors
///
/// Returns [`PipelineError`] for an unknown channel, an unavailable store, or
/// a version the store has never seen.
#[instrument(skip(config), fields(op = "blacklist"))]
pub async fn blacklist(
    config: &Config,
    channel: &str,
    artifact: &str,
    version: &str,
) -> Result<(), PipelineError> {
    let channel = config.channel(channel)?;
    let db = Database::open_channel(&config.db_path, &channel.id).await?;
    let store = ArtifactStore::new(db);
    store.mark_blacklisted(artifact, version).await?;
    info!(channel = %channel.id, artifact, version, "version blacklisted");
    Ok(())
}

/// Overall result of a run, mapped to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every channel finished without failures.
    Success,
    /// All channels finished, but some artifacts or versions failed or the run was cancelled.
    Partial,
    /// At least one channel could not run to completion.
    Failure,
}

impl RunOutcome {
    /// Classifies per-channel results.
    #[must_use]
    pub fn from_results(results: &[Result<ChannelReport, PipelineError>]) -> Self {
        if results.iter().any(Result::is_err) {
            Self::Failure
        } else if results
            .iter()
            .flatten()
            .all(ChannelReport::is_clean)
        {
            Self::Success
        } else {
            Self::Partial
        }
    }

    #[must_use]
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Partial => 2,
        }
    }
}
