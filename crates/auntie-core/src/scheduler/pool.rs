//! Run queued items concurrently with a bounded worker pool.
//!
//! Keeps up to `max_concurrency` workers in flight; when one finishes, the
//! next queued item is dispatched until the queue is empty. Dispatch is
//! strict FIFO with no reordering.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::future::Future;
use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::ItemError;
use crate::progress::DisplayUpdate;
use crate::resolve::WorkItem;

use super::{worker, RunResult};

/// Run every queued item with at most `max_concurrency` workers in flight.
///
/// One item's failure never cancels another; the run completes when all
/// dispatched workers have finished. On cancellation, dispatch stops,
/// in-flight workers kill their subprocess, and unfinished items report
/// `Interrupted`. The returned results cover every queued item and are
/// sorted by queue position.
pub async fn run_pool(
    items: Vec<WorkItem>,
    max_concurrency: usize,
    dest_dir: PathBuf,
    updates: mpsc::Sender<DisplayUpdate>,
    cancel: CancellationToken,
) -> Vec<RunResult> {
    let pool_cancel = cancel.clone();
    run_pool_with(items, max_concurrency, pool_cancel, move |item| {
        let dest_dir = dest_dir.clone();
        let updates = updates.clone();
        let cancel = cancel.clone();
        async move { worker::execute(item, dest_dir, updates, cancel).await }
    })
    .await
}

/// Pool loop, generic over the worker so the dispatch policy is testable
/// without spawning subprocesses.
pub(crate) async fn run_pool_with<F, Fut>(
    items: Vec<WorkItem>,
    max_concurrency: usize,
    cancel: CancellationToken,
    worker_fn: F,
) -> Vec<RunResult>
where
    F: Fn(WorkItem) -> Fut,
    Fut: Future<Output = RunResult> + Send + 'static,
{
    let max_concurrency = max_concurrency.max(1);
    let mut queue: VecDeque<WorkItem> = items.into();
    let mut join_set: JoinSet<RunResult> = JoinSet::new();
    let mut in_flight: HashMap<tokio::task::Id, (usize, String)> = HashMap::new();
    let mut results = Vec::new();

    loop {
        while join_set.len() < max_concurrency && !cancel.is_cancelled() {
            let Some(item) = queue.pop_front() else { break };
            let identity = (item.queue_index, item.pid.clone());
            let handle = join_set.spawn(worker_fn(item));
            in_flight.insert(handle.id(), identity);
        }

        let Some(joined) = join_set.join_next_with_id().await else {
            break;
        };
        match joined {
            Ok((id, result)) => {
                in_flight.remove(&id);
                results.push(result);
            }
            Err(err) => {
                // A panicking worker still owes its item a result.
                tracing::error!(%err, "worker task failed to complete");
                if let Some((queue_index, pid)) = in_flight.remove(&err.id()) {
                    results.push(RunResult {
                        queue_index,
                        pid,
                        outcome: Err(ItemError::Download("worker terminated abnormally".into())),
                    });
                }
            }
        }
    }

    // Items that were never dispatched (cancelled mid-run) still yield a result.
    for item in queue {
        results.push(RunResult {
            queue_index: item.queue_index,
            pid: item.pid,
            outcome: Err(ItemError::Interrupted),
        });
    }

    results.sort_by_key(|r| r.queue_index);
    results
}
