//! Live multi-row terminal display, one row per (item, stream).

use std::collections::BTreeMap;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::mpsc;

use super::{DisplayUpdate, Phase};

/// Redraw cap so bursts of events coalesce instead of flooding the terminal.
const DRAW_HZ: u8 = 8;

/// Sentinels shown until the tool reports a rate/ETA.
const UNKNOWN_RATE: &str = "--.- MB/s";
const UNKNOWN_ETA: &str = "--:--:--";

/// Colour palette cycled by queue position; every row of an item shares one.
const PALETTE: [&str; 6] = ["cyan", "green", "yellow", "blue", "magenta", "white"];

/// Sort key: item identifier first so rows group by item, queue index second
/// so repeated PIDs stay distinct, stream name last. Rows are only ever
/// inserted and updated, never removed, so positions stay stable.
type RowKey = (String, usize, String);

struct Row {
    bar: ProgressBar,
    finished: bool,
}

/// Owns all terminal progress state. Workers never touch the display; they
/// send `DisplayUpdate`s over the channel this task consumes.
pub struct Renderer {
    multi: MultiProgress,
    rows: BTreeMap<RowKey, Row>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr_with_hz(DRAW_HZ))
    }

    /// Renderer that draws nowhere; used by tests.
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(target),
            rows: BTreeMap::new(),
        }
    }

    /// Consume updates until every sender is dropped, leaving the final rows
    /// on screen above the summary.
    pub async fn run(mut self, mut updates: mpsc::Receiver<DisplayUpdate>) {
        while let Some(update) = updates.recv().await {
            self.apply(update);
        }
    }

    /// Apply one update: find or create the row at its sorted position and
    /// refresh its contents. Rows in a terminal phase are frozen and ignore
    /// later events.
    pub fn apply(&mut self, update: DisplayUpdate) {
        let DisplayUpdate { queue_index, event } = update;
        let key: RowKey = (event.pid.clone(), queue_index, event.stream.clone());

        let position = self.rows.range(..&key).count();
        let multi = &self.multi;
        let row = self.rows.entry(key).or_insert_with(|| {
            let bar = multi.insert(position, ProgressBar::new(100));
            bar.set_style(row_style(item_colour(queue_index)));
            bar.set_prefix(format!("{:<10} {:<12}", event.pid, event.stream));
            Row {
                bar,
                finished: false,
            }
        });
        if row.finished {
            return;
        }

        match event.phase {
            Phase::Done => {
                row.bar.set_position(100);
                row.bar.set_message("(completed)".to_string());
                row.bar.finish();
                row.finished = true;
            }
            Phase::Failed => {
                // Keep the bar where it stopped; only the style changes.
                row.bar.set_style(row_style("red"));
                row.bar.set_message("(failed)".to_string());
                row.bar.abandon();
                row.finished = true;
            }
            Phase::Waiting => {
                row.bar.set_position(event.percent.round() as u64);
                row.bar.set_message(String::new());
            }
            Phase::Running | Phase::Converting => {
                row.bar.set_position(event.percent.round() as u64);
                let rate = event.rate.as_deref().unwrap_or(UNKNOWN_RATE);
                let eta = event.eta.as_deref().unwrap_or(UNKNOWN_ETA);
                row.bar.set_message(format!(
                    "{:>6.1}% (ETA {:<8}, {:>10})",
                    event.percent, eta, rate
                ));
            }
        }
    }

    #[cfg(test)]
    fn row_keys(&self) -> Vec<RowKey> {
        self.rows.keys().cloned().collect()
    }
}

fn item_colour(queue_index: usize) -> &'static str {
    PALETTE[queue_index % PALETTE.len()]
}

fn row_style(colour: &str) -> ProgressStyle {
    ProgressStyle::with_template(&format!("{{prefix}} |{{bar:30.{colour}}}| {{msg}}"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressEvent;

    fn update(queue_index: usize, pid: &str, stream: &str, percent: f64) -> DisplayUpdate {
        DisplayUpdate {
            queue_index,
            event: ProgressEvent {
                pid: pid.to_string(),
                stream: stream.to_string(),
                percent,
                transferred: None,
                rate: None,
                eta: None,
                phase: Phase::Running,
            },
        }
    }

    #[test]
    fn row_order_is_invariant_to_arrival_order() {
        let updates = vec![
            update(1, "b0074g9c", "video", 10.0),
            update(0, "b0074g6s", "audio", 20.0),
            update(1, "b0074g9c", "audio", 30.0),
            update(0, "b0074g6s", "video", 40.0),
        ];

        let mut forward = Renderer::hidden();
        for u in updates.iter().cloned() {
            forward.apply(u);
        }
        let mut backward = Renderer::hidden();
        for u in updates.iter().rev().cloned() {
            backward.apply(u);
        }

        assert_eq!(forward.row_keys(), backward.row_keys());
        let expected: Vec<RowKey> = vec![
            ("b0074g6s".into(), 0, "audio".into()),
            ("b0074g6s".into(), 0, "video".into()),
            ("b0074g9c".into(), 1, "audio".into()),
            ("b0074g9c".into(), 1, "video".into()),
        ];
        assert_eq!(forward.row_keys(), expected);
    }

    #[test]
    fn repeated_pids_keep_distinct_rows() {
        let mut renderer = Renderer::hidden();
        renderer.apply(update(0, "b0074g6s", "video", 10.0));
        renderer.apply(update(3, "b0074g6s", "video", 20.0));
        assert_eq!(renderer.row_keys().len(), 2);
    }

    #[test]
    fn terminal_rows_ignore_later_updates() {
        let mut renderer = Renderer::hidden();
        let mut done = update(0, "b0074g6s", "video", 50.0);
        done.event.phase = Phase::Done;
        renderer.apply(done);

        renderer.apply(update(0, "b0074g6s", "video", 10.0));
        let row = &renderer.rows[&("b0074g6s".to_string(), 0, "video".to_string())];
        assert!(row.finished);
        assert_eq!(row.bar.position(), 100);
    }

    #[test]
    fn palette_wraps_around() {
        assert_eq!(item_colour(0), item_colour(PALETTE.len()));
    }
}
