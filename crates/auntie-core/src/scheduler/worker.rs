//! One download worker: isolated working area, get_iplayer subprocess,
//! progress forwarding, and teardown into a RunResult.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use rand::Rng;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::ItemError;
use crate::iplayer;
use crate::postprocess;
use crate::progress::parse::{ProgressParser, WAITING_STREAM};
use crate::progress::{DisplayUpdate, Phase, ProgressEvent};
use crate::resolve::WorkItem;

use super::decode::LineDecoder;
use super::RunResult;

/// Trailing output lines kept for the failure summary.
const TAIL_LINES: usize = 12;

/// Grace period for the subprocess to exit after a kill on cancellation.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Run one work item to completion. Never propagates an error past this
/// boundary: every failure is captured into the RunResult.
pub(crate) async fn execute(
    item: WorkItem,
    dest_dir: PathBuf,
    updates: mpsc::Sender<DisplayUpdate>,
    cancel: CancellationToken,
) -> RunResult {
    let outcome = run(&item, &dest_dir, &updates, &cancel).await;
    match &outcome {
        Ok(path) => {
            tracing::info!(pid = item.pid.as_str(), path = %path.display(), "item completed")
        }
        Err(err) => tracing::warn!(pid = item.pid.as_str(), %err, "item failed"),
    }
    RunResult {
        queue_index: item.queue_index,
        pid: item.pid.clone(),
        outcome,
    }
}

async fn run(
    item: &WorkItem,
    dest_dir: &Path,
    updates: &mpsc::Sender<DisplayUpdate>,
    cancel: &CancellationToken,
) -> Result<PathBuf, ItemError> {
    let area = create_working_area(dest_dir, &item.pid)
        .map_err(|e| ItemError::Setup(format!("could not create working area: {e}")))?;
    tracing::debug!(pid = item.pid.as_str(), area = %area.display(), "working area created");

    let mut child = Command::new(iplayer::entrypoint())
        .args(iplayer::download_args(&item.pid, &area))
        .current_dir(&area)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ItemError::Download(format!("failed to start get_iplayer: {e}")))?;

    let (line_tx, mut line_rx) = mpsc::channel::<String>(64);
    let readers = vec![
        spawn_reader(child.stdout.take(), line_tx.clone()),
        spawn_reader(child.stderr.take(), line_tx),
    ];

    let mut parser = ProgressParser::new(item.pid.clone());
    let mut tail: VecDeque<String> = VecDeque::with_capacity(TAIL_LINES);
    let mut waiting_open = true;
    send(updates, item.queue_index, lifecycle_event(&item.pid, WAITING_STREAM, Phase::Waiting)).await;

    loop {
        tokio::select! {
            maybe_line = line_rx.recv() => match maybe_line {
                Some(line) => {
                    if item.options.debug {
                        tracing::debug!(pid = item.pid.as_str(), line = line.as_str(), "get_iplayer");
                    }
                    remember_tail(&mut tail, &line);
                    if let Some(event) = parser.feed(&line) {
                        if waiting_open && event.stream != WAITING_STREAM {
                            waiting_open = false;
                            send(updates, item.queue_index, lifecycle_event(&item.pid, WAITING_STREAM, Phase::Done)).await;
                        }
                        send(updates, item.queue_index, event).await;
                    }
                }
                None => break,
            },
            _ = cancel.cancelled() => {
                return Err(interrupt(item, &mut child, &parser, waiting_open, updates).await);
            }
        }
    }

    // Output fully drained; wait for the exit status (still interruptible).
    let waited = tokio::select! {
        status = child.wait() => Some(status),
        _ = cancel.cancelled() => None,
    };
    let status = match waited {
        Some(status) => status
            .map_err(|e| ItemError::Download(format!("failed to wait for get_iplayer: {e}")))?,
        None => return Err(interrupt(item, &mut child, &parser, waiting_open, updates).await),
    };

    let mut drain_error = None;
    for reader in readers {
        if let Ok(Err(e)) = reader.await {
            drain_error = Some(e);
        }
    }

    if !status.success() || drain_error.is_some() {
        close_streams(item, &parser, waiting_open, Phase::Failed, updates).await;
        let reason = match drain_error {
            Some(e) => format!("error draining get_iplayer output: {e}"),
            None => summarise_failure(status.code(), &tail),
        };
        return Err(ItemError::Download(reason));
    }

    close_streams(item, &parser, waiting_open, Phase::Done, updates).await;

    let artifact = postprocess::find_artifact(&area)
        .map_err(|e| ItemError::Download(format!("could not scan working area: {e}")))?
        .ok_or_else(|| ItemError::Download("no output file found in working area".into()))?;

    postprocess::finalize(
        &item.pid,
        &artifact,
        &area,
        dest_dir,
        item.options.rename,
        item.options.clean,
    )
    .map_err(|e| ItemError::PostProcess(format!("{e:#}")))
}

/// Create the hidden per-item directory `.auntie-<pid>-<token>`.
/// The token is regenerated while the name is taken; a create race fails
/// the item rather than retrying silently.
fn create_working_area(dest_dir: &Path, pid: &str) -> std::io::Result<PathBuf> {
    loop {
        let token: u32 = rand::thread_rng().gen();
        let path = dest_dir.join(format!(".auntie-{pid}-{token:08x}"));
        if path.exists() {
            continue;
        }
        std::fs::create_dir(&path)?;
        return Ok(path);
    }
}

/// Forward raw subprocess output to the line channel. The decoder handles
/// the tool's carriage-return progress rewrites.
fn spawn_reader<R>(reader: Option<R>, tx: mpsc::Sender<String>) -> JoinHandle<std::io::Result<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut reader) = reader else {
            return Ok(());
        };
        let mut decoder = LineDecoder::default();
        let mut chunk = [0u8; 1024];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    for line in decoder.push(&chunk[..n]) {
                        if tx.send(line).await.is_err() {
                            return Ok(());
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
        if let Some(rest) = decoder.finish() {
            let _ = tx.send(rest).await;
        }
        Ok(())
    })
}

/// Kill the subprocess, wait briefly, and mark this item's rows failed.
/// The working area is left in place for diagnosis.
async fn interrupt(
    item: &WorkItem,
    child: &mut Child,
    parser: &ProgressParser,
    waiting_open: bool,
    updates: &mpsc::Sender<DisplayUpdate>,
) -> ItemError {
    tracing::info!(pid = item.pid.as_str(), "cancelling; killing get_iplayer");
    if child.start_kill().is_ok() {
        let _ = tokio::time::timeout(KILL_GRACE, child.wait()).await;
    }
    close_streams(item, parser, waiting_open, Phase::Failed, updates).await;
    ItemError::Interrupted
}

/// Emit a terminal event for every still-open stream, including the
/// pseudo-streams. The parser never assigns the failed phase itself.
async fn close_streams(
    item: &WorkItem,
    parser: &ProgressParser,
    waiting_open: bool,
    phase: Phase,
    updates: &mpsc::Sender<DisplayUpdate>,
) {
    if waiting_open {
        send(updates, item.queue_index, lifecycle_event(&item.pid, WAITING_STREAM, phase)).await;
    }
    for stream in parser.open_streams() {
        send(updates, item.queue_index, lifecycle_event(&item.pid, &stream, phase)).await;
    }
}

fn lifecycle_event(pid: &str, stream: &str, phase: Phase) -> ProgressEvent {
    let done = phase == Phase::Done;
    ProgressEvent {
        pid: pid.to_string(),
        stream: stream.to_string(),
        percent: if done { 100.0 } else { 0.0 },
        transferred: None,
        rate: None,
        eta: done.then(|| "00:00:00".to_string()),
        phase,
    }
}

async fn send(updates: &mpsc::Sender<DisplayUpdate>, queue_index: usize, event: ProgressEvent) {
    // The renderer may already be gone during shutdown; that is fine.
    let _ = updates.send(DisplayUpdate { queue_index, event }).await;
}

fn remember_tail(tail: &mut VecDeque<String>, line: &str) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return;
    }
    if tail.len() == TAIL_LINES {
        tail.pop_front();
    }
    tail.push_back(trimmed.to_string());
}

/// Distil the exit status and the tail of captured output into a one-line
/// reason for the summary. Lines flagged ERROR/WARNING win over plain ones.
fn summarise_failure(code: Option<i32>, tail: &VecDeque<String>) -> String {
    let mut summary = match code {
        Some(code) => format!("get_iplayer exited with code {code}"),
        None => "get_iplayer was terminated by a signal".to_string(),
    };

    let flagged: Vec<&str> = tail
        .iter()
        .filter(|l| l.contains("ERROR") || l.contains("WARNING"))
        .map(String::as_str)
        .collect();
    let picked: Vec<&str> = if flagged.is_empty() {
        let mut last: Vec<&str> = tail.iter().rev().take(3).map(String::as_str).collect();
        last.reverse();
        last
    } else {
        flagged.into_iter().rev().take(3).rev().collect()
    };

    if !picked.is_empty() {
        summary.push_str(": ");
        summary.push_str(&picked.join(" | "));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn working_areas_are_hidden_and_distinct() {
        let dir = TempDir::new().expect("tempdir");
        let first = create_working_area(dir.path(), "b006q2x0").expect("create");
        let second = create_working_area(dir.path(), "b006q2x0").expect("create");

        assert_ne!(first, second);
        for area in [&first, &second] {
            let name = area.file_name().and_then(|n| n.to_str()).expect("name");
            assert!(name.starts_with(".auntie-b006q2x0-"));
            assert!(area.is_dir());
        }
    }

    #[test]
    fn failure_summary_prefers_flagged_lines() {
        let mut tail = VecDeque::new();
        remember_tail(&mut tail, "video: 10% of 1.2GB at 3.4MB/s, ETA 00:05:10");
        remember_tail(&mut tail, "ERROR: Failed to get media stream");
        remember_tail(&mut tail, "INFO: giving up");

        let summary = summarise_failure(Some(2), &tail);
        assert!(summary.starts_with("get_iplayer exited with code 2"));
        assert!(summary.contains("ERROR: Failed to get media stream"));
        assert!(!summary.contains("00:05:10"));
    }

    #[test]
    fn failure_summary_falls_back_to_last_lines() {
        let mut tail = VecDeque::new();
        for i in 0..5 {
            remember_tail(&mut tail, &format!("line {i}"));
        }
        let summary = summarise_failure(None, &tail);
        assert!(summary.starts_with("get_iplayer was terminated by a signal"));
        assert!(summary.contains("line 2 | line 3 | line 4"));
    }

    #[test]
    fn tail_is_bounded() {
        let mut tail = VecDeque::new();
        for i in 0..(TAIL_LINES + 5) {
            remember_tail(&mut tail, &format!("line {i}"));
        }
        assert_eq!(tail.len(), TAIL_LINES);
        assert_eq!(tail.front().map(String::as_str), Some("line 5"));
    }
}
