//! Progress events and the live display pipeline.
//!
//! Workers parse subprocess output into `ProgressEvent`s and send them over
//! an mpsc channel; a single renderer task owns all terminal state, so
//! workers never touch the display directly.

pub mod parse;
pub mod render;

pub use parse::ProgressParser;
pub use render::Renderer;

/// Lifecycle stage of one stream of one download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The worker has started but the tool has not reported this stream yet.
    Waiting,
    Running,
    /// Post-fetch conversion (muxing/tagging) reported by the tool.
    Converting,
    Done,
    Failed,
}

/// Snapshot of one stream's progress, decoded from one output line.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub pid: String,
    /// Stream name as reported by the tool (e.g. `audio`, `video`), plus
    /// the pseudo-streams `waiting` and `converting`.
    pub stream: String,
    /// Clamped to [0, 100].
    pub percent: f64,
    /// Bytes transferred so far, when the source line reported a total size.
    pub transferred: Option<u64>,
    /// e.g. `3.4MB/s`; `None` until the tool reports one.
    pub rate: Option<String>,
    /// e.g. `00:05:10`; `None` until the tool reports one.
    pub eta: Option<String>,
    pub phase: Phase,
}

/// A progress event routed to the renderer, tagged with the item's queue
/// position for colour assignment and duplicate-PID disambiguation.
#[derive(Debug, Clone)]
pub struct DisplayUpdate {
    pub queue_index: usize,
    pub event: ProgressEvent,
}
