//! Progress UI (one spinner per channel) driven by channel events.

use std::collections::HashMap;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use stockpile_core::ChannelEvent;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

/// Spawns the event observer.
///
/// With `use_spinner` false the events are drained without rendering; the
/// core's tracing output already covers them. The task ends once every sender
/// is dropped.
pub(crate) fn spawn_progress_ui(
    use_spinner: bool,
    mut events: UnboundedReceiver<ChannelEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if !use_spinner {
            while events.recv().await.is_some() {}
            return;
        }

        let multi = MultiProgress::new();
        let style = ProgressStyle::with_template("{spinner} {prefix:>12.bold} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let mut bars: HashMap<String, ProgressBar> = HashMap::new();

        while let Some(event) = events.recv().await {
            let bar = bars.entry(event.channel().to_string()).or_insert_with(|| {
                let bar = multi.add(ProgressBar::new_spinner());
                bar.set_style(style.clone());
                bar.set_prefix(event.channel().to_string());
                bar.enable_steady_tick(Duration::from_millis(100));
                bar
            });
            let message = describe(&event);
            if matches!(event, ChannelEvent::Completed { .. }) {
                bar.finish_with_message(message);
            } else {
                bar.set_message(message);
            }
        }

        for bar in bars.values().filter(|bar| !bar.is_finished()) {
            bar.abandon();
        }
    })
}

/// One-line status for an event.
pub(crate) fn describe(event: &ChannelEvent) -> String {
    match event {
        ChannelEvent::Started { seeds, .. } => format!("starting with {seeds} seeds"),
        ChannelEvent::Inspecting {
            artifact, depth, ..
        } => format!("inspecting {artifact} (depth {depth})"),
        ChannelEvent::Inspected {
            artifact, versions, ..
        } => format!("inspected {artifact}: {versions} versions"),
        ChannelEvent::InspectFailed {
            artifact, error, ..
        } => format!("failed to inspect {artifact}: {error}"),
        ChannelEvent::WalkFinished { metrics, .. } => format!(
            "discovery done: {} inspected, {} new versions, {} failed, max depth {}",
            metrics.inspected, metrics.versions_registered, metrics.failed, metrics.max_depth
        ),
        ChannelEvent::Downloading {
            artifact, version, ..
        } => format!("downloading {artifact}@{version}"),
        ChannelEvent::Downloaded {
            artifact,
            version,
            bytes,
            ..
        } => format!("downloaded {artifact}@{version} ({bytes} bytes)"),
        ChannelEvent::DownloadFailed {
            artifact,
            version,
            error,
            ..
        } => format!("failed {artifact}@{version}: {error}"),
        ChannelEvent::Completed { summary, .. } => format!(
            "done: {} packages, {} versions, {} downloaded, {} skipped, {} filtered, {} failed",
            summary.packages,
            summary.versions,
            summary.downloaded,
            summary.skipped,
            summary.filtered,
            summary.failed
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockpile_core::{DownloadSummary, EventSink};

    #[test]
    fn describe_completed_lists_all_counters() {
        let event = ChannelEvent::Completed {
            channel: "npm".to_string(),
            summary: DownloadSummary {
                packages: 3,
                versions: 7,
                downloaded: 4,
                skipped: 1,
                filtered: 2,
                failed: 0,
            },
        };

        assert_eq!(
            describe(&event),
            "done: 3 packages, 7 versions, 4 downloaded, 1 skipped, 2 filtered, 0 failed"
        );
    }

    #[test]
    fn describe_download_failure_names_version() {
        let event = ChannelEvent::DownloadFailed {
            channel: "npm".to_string(),
            artifact: "left-pad".to_string(),
            version: "1.0.0".to_string(),
            error: "HTTP 404".to_string(),
        };

        assert_eq!(describe(&event), "failed left-pad@1.0.0: HTTP 404");
    }

    #[tokio::test]
    async fn spawn_progress_ui_when_disabled_drains_and_ends_with_senders() {
        let (sink, rx) = EventSink::channel();
        let handle = spawn_progress_ui(false, rx);

        sink.emit(ChannelEvent::Started {
            channel: "npm".to_string(),
            seeds: 1,
        });
        drop(sink);

        handle.await.unwrap();
    }
}
