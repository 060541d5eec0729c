//! Progress events published by running channels.
//!
//! The core never renders anything. It pushes [`ChannelEvent`]s into an
//! [`EventSink`]; whoever holds the receiving end decides how to display them.

use tokio::sync::mpsc;

use crate::channel::WalkMetrics;
use crate::download::DownloadSummary;

/// Something that happened while a channel ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The channel opened its store and read its seed list.
    Started { channel: String, seeds: usize },
    /// An artifact was popped from the frontier.
    Inspecting {
        channel: String,
        artifact: String,
        depth: usize,
    },
    /// Metadata inspection succeeded.
    Inspected {
        channel: String,
        artifact: String,
        versions: usize,
    },
    /// Metadata inspection failed; the artifact is marked for retry.
    InspectFailed {
        channel: String,
        artifact: String,
        error: String,
    },
    /// Discovery finished.
    WalkFinished {
        channel: String,
        metrics: WalkMetrics,
    },
    /// A file transfer started.
    Downloading {
        channel: String,
        artifact: String,
        version: String,
    },
    /// A file was placed in the mirror.
    Downloaded {
        channel: String,
        artifact: String,
        version: String,
        bytes: u64,
    },
    /// A file transfer or placement failed.
    DownloadFailed {
        channel: String,
        artifact: String,
        version: String,
        error: String,
    },
    /// The download phase finished.
    Completed {
        channel: String,
        summary: DownloadSummary,
    },
}

impl ChannelEvent {
    /// Channel id the event belongs to.
    #[must_use]
    pub fn channel(&self) -> &str {
        match self {
            Self::Started { channel, .. }
            | Self::Inspecting { channel, .. }
            | Self::Inspected { channel, .. }
            | Self::InspectFailed { channel, .. }
            | Self::WalkFinished { channel, .. }
            | Self::Downloading { channel, .. }
            | Self::Downloaded { channel, .. }
            | Self::DownloadFailed { channel, .. }
            | Self::Completed { channel, .. } => channel,
        }
    }
}

/// Sending half of the event stream.
///
/// Cloning is cheap. A disabled sink, or one whose receiver was dropped,
/// silently discards events.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<ChannelEvent>>,
}

impl EventSink {
    /// Creates a connected sink and its receiver.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that drops every event.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: ChannelEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
