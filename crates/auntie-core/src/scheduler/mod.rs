//! Worker pool scheduling: strict FIFO dispatch into a bounded set of
//! download workers, fail-independent result collection.

mod decode;
mod pool;
mod worker;

use std::path::PathBuf;

use crate::error::ItemError;

pub use pool::run_pool;

/// Terminal outcome for one queued item. Exactly one of these exists for
/// every work item that entered the queue, success or failure.
#[derive(Debug)]
pub struct RunResult {
    pub queue_index: usize,
    pub pid: String,
    pub outcome: Result<PathBuf, ItemError>,
}

impl RunResult {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}
