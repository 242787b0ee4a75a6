//! Incremental decoding of get_iplayer status lines into progress events.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::{Phase, ProgressEvent};

/// Stream progress, e.g. `video: 42% of 1.2GB at 3.4MB/s, ETA 00:05:10`.
/// The size, rate, and ETA fields are each optional; the tool commonly
/// omits them right at the start or end of a stream.
static PROGRESS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?P<stream>[a-z][a-z0-9+._-]*):\s+(?P<percent>\d+(?:\.\d+)?)%(?:\s+of\s+(?P<size>\S+))?(?:\s+at\s+(?P<rate>[^,\s]+))?(?:,\s*ETA\s+(?P<eta>\S+))?\s*$",
    )
    .unwrap()
});

/// Per-stream completion marker, e.g.
/// `INFO: Downloaded: 403.5 MB @ 3.4MB/s (00:02:01) [video]`.
static COMPLETED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)INFO:\s+Downloaded:.*?@\s*(?P<rate>.*?)\s*\([^)]*\)\s*\[(?P<stream>[^\]]+)\]")
        .unwrap()
});

/// Pseudo-stream opened when the tool reports a conversion step.
pub const CONVERTING_STREAM: &str = "converting";
/// Pseudo-stream shown between worker start and the first real stream line.
pub const WAITING_STREAM: &str = "waiting";

#[derive(Default)]
struct StreamState {
    rate: Option<String>,
    eta: Option<String>,
    done: bool,
}

/// Line-by-line parser for one download's output.
///
/// Pure per line apart from last-known rate/ETA per stream, which fill the
/// gaps when a later line omits them. Unrecognised lines produce no event.
pub struct ProgressParser {
    pid: String,
    streams: HashMap<String, StreamState>,
}

impl ProgressParser {
    pub fn new(pid: impl Into<String>) -> Self {
        Self {
            pid: pid.into(),
            streams: HashMap::new(),
        }
    }

    /// Decode one output line; at most one event per line.
    pub fn feed(&mut self, line: &str) -> Option<ProgressEvent> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Some(caps) = COMPLETED_LINE.captures(trimmed) {
            let stream = caps["stream"].trim().to_lowercase();
            let rate = caps.name("rate").map(|m| m.as_str().trim().to_string());
            let rate = rate.filter(|r| !r.is_empty());
            return Some(self.event(stream, 100.0, None, rate, Some("00:00:00".into()), Phase::Done));
        }

        if let Some(caps) = PROGRESS_LINE.captures(trimmed) {
            let stream = caps["stream"].to_lowercase();
            let percent: f64 = caps["percent"].parse().unwrap_or(0.0);
            let percent = percent.clamp(0.0, 100.0);
            let transferred = caps
                .name("size")
                .and_then(|m| parse_size(m.as_str()))
                .map(|total| (total as f64 * percent / 100.0) as u64);
            let rate = caps.name("rate").map(|m| m.as_str().to_string());
            let eta = caps.name("eta").map(|m| m.as_str().to_string());
            return Some(self.event(stream, percent, transferred, rate, eta, Phase::Running));
        }

        let lowered = trimmed.to_lowercase();
        if lowered.contains("converting") || lowered.contains("tagging") {
            return Some(self.event(CONVERTING_STREAM.into(), 0.0, None, None, None, Phase::Converting));
        }

        None
    }

    /// Streams that have produced events but not yet completed. The worker
    /// assigns their terminal phase (done or failed) at teardown.
    pub fn open_streams(&self) -> Vec<String> {
        let mut open: Vec<String> = self
            .streams
            .iter()
            .filter(|(_, state)| !state.done)
            .map(|(name, _)| name.clone())
            .collect();
        open.sort();
        open
    }

    fn event(
        &mut self,
        stream: String,
        percent: f64,
        transferred: Option<u64>,
        rate: Option<String>,
        eta: Option<String>,
        phase: Phase,
    ) -> ProgressEvent {
        let state = self.streams.entry(stream.clone()).or_default();
        if rate.is_some() {
            state.rate = rate;
        }
        if eta.is_some() {
            state.eta = eta;
        }
        if phase == Phase::Done {
            state.done = true;
        }
        ProgressEvent {
            pid: self.pid.clone(),
            stream,
            percent,
            transferred,
            rate: state.rate.clone(),
            eta: state.eta.clone(),
            phase,
        }
    }
}

/// Parse a human-readable size like `1.2GB` or `420.5MB` into bytes.
fn parse_size(value: &str) -> Option<u64> {
    let v = value.trim();
    let split = v.find(|c: char| !(c.is_ascii_digit() || c == '.'))?;
    let (number, unit) = v.split_at(split);
    let number: f64 = number.parse().ok()?;
    let factor = match unit.trim().to_ascii_uppercase().as_str() {
        "B" => 1.0,
        "KB" | "KIB" => 1024.0,
        "MB" | "MIB" => 1024.0 * 1024.0,
        "GB" | "GIB" => 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some((number * factor) as u64)
}
