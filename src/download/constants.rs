//! Constants for the download module (timeouts, file naming).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default idle read timeout: longest wait for the next body chunk.
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Suffix of the temporary sibling a transfer streams into.
pub const PARTIAL_SUFFIX: &str = "part";
