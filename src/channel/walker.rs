//! Iterative dependency graph walker.
//!
//! Names enter an explicit frontier stack. A name is recorded in the
//! [`VisitedSet`] before it is pushed, so every artifact is inspected at most
//! once per run and cycles terminate. Seeds are processed in input order and
//! the frontier is drained before the next seed starts.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::{Adapter, DiscoveredVersion};
use crate::cancel::CancelFlag;
use crate::events::{ChannelEvent, EventSink};
use crate::store::{
    Artifact, ArtifactRepository, ArtifactStatus, NewArtifactVersion, StoreError, VersionStatus,
};

/// Names seen during the current run.
#[derive(Debug, Clone, Default)]
pub struct VisitedSet {
    names: HashSet<String>,
}

impl VisitedSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `name`; returns false if it was already present.
    pub fn insert(&mut self, name: &str) -> bool {
        if self.names.contains(name) {
            return false;
        }
        self.names.insert(name.to_string())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Traversal counters. Reported only; never consulted for control flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkMetrics {
    /// Frontier-entry depth of the artifact being inspected.
    pub current_depth: usize,
    pub max_depth: usize,
    /// Artifacts whose inspection was attempted.
    pub inspected: usize,
    /// Versions newly added to the store.
    pub versions_registered: usize,
    /// Artifacts that failed this run.
    pub failed: usize,
}

impl WalkMetrics {
    fn enter(&mut self, depth: usize) {
        self.current_depth = depth;
        self.max_depth = self.max_depth.max(depth);
        self.inspected += 1;
    }
}

/// Outcome of a walk.
#[derive(Debug, Clone, Default)]
pub struct WalkReport {
    pub metrics: WalkMetrics,
    /// Artifacts whose inspection or bookkeeping failed this run.
    pub failed: HashSet<String>,
    /// True if the walk stopped early on cancellation.
    pub cancelled: bool,
}

/// Drives an [`Adapter`] over the dependency graph of a channel.
pub struct GraphWalker {
    channel: String,
    adapter: Arc<dyn Adapter>,
    store: Arc<dyn ArtifactRepository>,
    force: bool,
    events: EventSink,
    cancel: CancelFlag,
    visited: VisitedSet,
    report: WalkReport,
}

impl std::fmt::Debug for GraphWalker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphWalker")
            .field("channel", &self.channel)
            .field("kind", &self.adapter.kind())
            .field("force", &self.force)
            .field("visited", &self.visited.len())
            .finish_non_exhaustive()
    }
}

impl GraphWalker {
    #[must_use]
    pub fn new(
        channel: impl Into<String>,
        adapter: Arc<dyn Adapter>,
        store: Arc<dyn ArtifactRepository>,
    ) -> Self {
        Self {
            channel: channel.into(),
            adapter,
            store,
            force: false,
            events: EventSink::disabled(),
            cancel: CancelFlag::new(),
            visited: VisitedSet::new(),
            report: WalkReport::default(),
        }
    }

    /// Re-walk dependencies of versions already marked processed.
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Names visited so far in this run.
    #[must_use]
    pub fn visited(&self) -> &VisitedSet {
        &self.visited
    }

    /// Walks the graph reachable from `seeds`.
    ///
    /// May be called more than once; the visited set carries over, so names
    /// already handled this run are skipped.
    #[instrument(skip(self, seeds), fields(channel = %self.channel, op = "inspect", seeds = seeds.len()))]
    pub async fn walk(&mut self, seeds: &[String]) {
        for seed in seeds {
            if self.is_cancelled() {
                return;
            }
            if !self.visited.insert(seed) {
                debug!(artifact = %seed, "seed already visited");
                continue;
            }

            let mut frontier = vec![(seed.clone(), 0_usize)];
            while let Some((name, depth)) = frontier.pop() {
                if self.is_cancelled() {
                    return;
                }
                self.report.metrics.enter(depth);
                self.visit(&name, depth, &mut frontier).await;
            }
        }
    }

    /// Consumes the walker and returns what it observed.
    #[must_use]
    pub fn finish(self) -> WalkReport {
        info!(
            channel = %self.channel,
            inspected = self.report.metrics.inspected,
            versions = self.report.metrics.versions_registered,
            failed = self.report.metrics.failed,
            max_depth = self.report.metrics.max_depth,
            cancelled = self.report.cancelled,
            "walk finished"
        );
        self.report
    }

    fn is_cancelled(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            if !self.report.cancelled {
                warn!(channel = %self.channel, "walk cancelled");
            }
            self.report.cancelled = true;
        }
        self.report.cancelled
    }

    #[instrument(skip(self, frontier), fields(artifact = %name))]
    async fn visit(&mut self, name: &str, depth: usize, frontier: &mut Vec<(String, usize)>) {
        self.events.emit(ChannelEvent::Inspecting {
            channel: self.channel.clone(),
            artifact: name.to_string(),
            depth,
        });

        let artifact = match self.store.get_or_create(name).await {
            Ok(artifact) => artifact,
            Err(e) => {
                self.fail(name, &e.to_string()).await;
                return;
            }
        };

        let discovered = match self.adapter.inspect(name).await {
            Ok(discovered) => discovered,
            Err(e) => {
                self.fail(name, &e.to_string()).await;
                return;
            }
        };

        match self.record(&artifact, &discovered, depth, frontier).await {
            Ok(()) => {
                debug!(versions = discovered.len(), "artifact inspected");
                self.events.emit(ChannelEvent::Inspected {
                    channel: self.channel.clone(),
                    artifact: name.to_string(),
                    versions: discovered.len(),
                });
            }
            Err(e) => self.fail(name, &e.to_string()).await,
        }
    }

    /// Persists an inspection and enqueues unvisited dependencies.
    async fn record(
        &mut self,
        artifact: &Artifact,
        discovered: &[DiscoveredVersion],
        depth: usize,
        frontier: &mut Vec<(String, usize)>,
    ) -> Result<(), StoreError> {
        let name = artifact.name.as_str();
        if artifact.status == ArtifactStatus::Error {
            self.store
                .set_artifact_status(name, ArtifactStatus::Active)
                .await?;
        }

        for found in discovered {
            let known = artifact.version(&found.version).is_some();
            let stored = self
                .store
                .add_version_if_absent(
                    name,
                    &NewArtifactVersion {
                        version: &found.version,
                        url: &found.url,
                        downloads: found.downloads,
                        published_at: found.published_at,
                    },
                )
                .await?;
            if !known {
                self.report.metrics.versions_registered += 1;
            }

            match stored.status() {
                VersionStatus::Blacklisted => continue,
                VersionStatus::Processed if !self.force => continue,
                VersionStatus::Processed | VersionStatus::Unprocessed => {}
            }

            for dependency in &found.dependencies {
                if self.visited.insert(dependency) {
                    frontier.push((dependency.clone(), depth + 1));
                    self.store.get_or_create(dependency).await?;
                }
            }

            if stored.status() == VersionStatus::Unprocessed {
                self.store.mark_processed(name, &found.version).await?;
            }
        }
        Ok(())
    }

    async fn fail(&mut self, name: &str, error: &str) {
        warn!(channel = %self.channel, artifact = %name, error = %error, "artifact inspection failed");
        self.report.metrics.failed += 1;
        self.report.failed.insert(name.to_string());

        if let Err(e) = self
            .store
            .set_artifact_status(name, ArtifactStatus::Error)
            .await
        {
            warn!(artifact = %name, error = %e, locked = e.is_locked(), "failed to mark artifact as error");
        }

        self.events.emit(ChannelEvent::InspectFailed {
            channel: self.channel.clone(),
            artifact: name.to_string(),
            error: error.to_string(),
        });
    }
}
