//! Input resolution: classify each input via the catalog and expand
//! collections into their episodes.

use std::time::Duration;

use tokio::process::Command;

use crate::config::RunOptions;
use crate::error::ItemError;
use crate::iplayer;
use crate::pid::{normalise_pid, PID_PATTERN};

/// One dispatchable unit: a programme PID plus the run-wide options.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Position in the resolved queue. Keys the display colour and keeps
    /// repeated PIDs distinct.
    pub queue_index: usize,
    pub pid: String,
    pub options: RunOptions,
}

/// Outcome of resolving all raw inputs.
#[derive(Debug, Default)]
pub struct Resolution {
    /// The flat download queue, in input order with expansions inlined.
    pub items: Vec<WorkItem>,
    /// Inputs that failed to classify or expand, with reasons. They never
    /// enter the queue; the run continues with the rest.
    pub failures: Vec<(String, ItemError)>,
}

/// How long one catalog invocation may take before the input is failed.
const CATALOG_TIMEOUT: Duration = Duration::from_secs(120);

/// Resolve raw PIDs/URLs into the download queue.
///
/// Expanded episodes are inserted at their parent's position, preserving
/// catalog order. Repeated PIDs are kept as-is: requesting the same episode
/// twice downloads it twice into distinct working areas.
pub async fn resolve_inputs(raw_inputs: &[String], options: RunOptions) -> Resolution {
    let mut resolution = Resolution::default();
    for raw in raw_inputs {
        let pid = normalise_pid(raw);
        match expand(&pid).await {
            Ok(episodes) => {
                for episode in episodes {
                    let queue_index = resolution.items.len();
                    resolution.items.push(WorkItem {
                        queue_index,
                        pid: episode,
                        options,
                    });
                }
            }
            Err(err) => {
                tracing::warn!(input = raw.as_str(), %err, "input failed to resolve");
                resolution.failures.push((raw.clone(), err));
            }
        }
    }
    resolution
}

/// Run the recursive catalog listing for one PID and return its episode
/// PIDs in catalog order.
async fn expand(pid: &str) -> Result<Vec<String>, ItemError> {
    if pid.is_empty() {
        return Err(ItemError::Resolution("empty identifier".into()));
    }

    let output = tokio::time::timeout(
        CATALOG_TIMEOUT,
        Command::new(iplayer::entrypoint())
            .args(iplayer::listing_args(pid))
            .output(),
    )
    .await
    .map_err(|_| ItemError::Resolution(format!("{pid}: catalog query timed out")))?
    .map_err(|e| ItemError::Resolution(format!("{pid}: failed to run get_iplayer ({e})")))?;

    if !output.status.success() {
        return Err(ItemError::Resolution(format!(
            "{pid}: catalog query exited with {}",
            output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let episodes = parse_episode_listing(&stdout);
    tracing::debug!(pid, count = episodes.len(), "catalog expansion");
    if episodes.is_empty() {
        return Err(ItemError::Resolution(format!(
            "{pid}: catalog query listed no episodes"
        )));
    }
    Ok(episodes)
}

/// Extract episode PIDs from `--pid-recursive-list` output: one line per
/// episode after the `Episodes:` header, in catalog order. Informational
/// lines mixed into the listing are skipped.
pub fn parse_episode_listing(stdout: &str) -> Vec<String> {
    let mut pids = Vec::new();
    let mut collecting = false;
    for line in stdout.lines() {
        let line = line.trim();
        if !collecting {
            if line.starts_with("Episodes:") {
                collecting = true;
            }
            continue;
        }
        if line.is_empty() || line.starts_with("INFO:") {
            continue;
        }
        if let Some(m) = PID_PATTERN.find(line) {
            pids.push(m.as_str().to_lowercase());
        }
    }
    pids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_requires_episodes_header() {
        let out = "b006q2x0: some episode\nb006q2x1: another\n";
        assert!(parse_episode_listing(out).is_empty());
    }

    #[test]
    fn listing_collects_in_catalog_order() {
        let out = "\
Matches:
Episodes:
Doctor Who: Series 1 - Rose, b0074g6s
Doctor Who: Series 1 - The End of the World, b0074g9c
INFO: 2 episodes found
";
        assert_eq!(parse_episode_listing(out), vec!["b0074g6s", "b0074g9c"]);
    }

    #[test]
    fn listing_skips_info_and_blank_lines() {
        let out = "Episodes:\n\nINFO: refreshing cache\nWatchdog, b0074g6s\n";
        assert_eq!(parse_episode_listing(out), vec!["b0074g6s"]);
    }

    #[test]
    fn episode_lists_itself() {
        let out = "Episodes:\nNewsnight, m0023xyz\n";
        assert_eq!(parse_episode_listing(out), vec!["m0023xyz"]);
    }
}
