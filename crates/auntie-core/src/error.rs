//! Per-item error taxonomy: every queued item ends in exactly one RunResult.

use thiserror::Error;

/// Terminal failure category for one work item.
///
/// Every variant isolates to a single item; only `Interrupted` is caused by
/// run-level cancellation. A `PostProcess` failure means the download itself
/// succeeded but the artifact could not be finalised, which is reported
/// separately from a failed fetch.
#[derive(Debug, Error)]
pub enum ItemError {
    /// The input could not be classified or expanded by the catalog.
    #[error("resolution failed: {0}")]
    Resolution(String),

    /// The working area for the download could not be created.
    #[error("setup failed: {0}")]
    Setup(String),

    /// get_iplayer exited nonzero, produced no output file, or its output
    /// could not be drained.
    #[error("download failed: {0}")]
    Download(String),

    /// Renaming, moving, or locating the finished artifact failed.
    #[error("post-processing failed: {0}")]
    PostProcess(String),

    /// The run was cancelled while this item was queued or in flight.
    #[error("interrupted")]
    Interrupted,
}
