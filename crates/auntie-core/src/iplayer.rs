//! Locating and invoking the external get_iplayer tool.

use std::env;
use std::ffi::OsString;
use std::path::Path;

/// Environment override for the get_iplayer entrypoint.
pub const COMMAND_ENV: &str = "GET_IPLAYER_COMMAND";

const DEFAULT_COMMAND: &str = "get_iplayer";

/// Quality preference passed to every download, best first.
const TV_QUALITY: &str = "fhd,hd,sd";

/// Resolve the get_iplayer entrypoint: env override, then PATH lookup, then
/// the bare name (a spawn failure then surfaces as that item's error).
pub fn entrypoint() -> OsString {
    if let Some(cmd) = env::var_os(COMMAND_ENV) {
        if !cmd.is_empty() {
            tracing::debug!(command = ?cmd, "using get_iplayer entrypoint from {}", COMMAND_ENV);
            return cmd;
        }
    }
    match which::which(DEFAULT_COMMAND) {
        Ok(found) => found.into_os_string(),
        Err(_) => {
            tracing::debug!("get_iplayer not found on PATH; falling back to bare name");
            OsString::from(DEFAULT_COMMAND)
        }
    }
}

/// Arguments for downloading one programme into `output_dir`.
///
/// The set is fixed: fetch with embedded subtitles, overwrite partial state
/// from an earlier attempt, descending quality preference, line-oriented
/// progress, and a generic metadata sidecar for the renamer.
pub fn download_args(pid: &str, output_dir: &Path) -> Vec<OsString> {
    vec![
        "--get".into(),
        "--subtitles".into(),
        "--subs-embed".into(),
        "--force".into(),
        "--overwrite".into(),
        format!("--tv-quality={TV_QUALITY}").into(),
        "--log-progress".into(),
        "--metadata=generic".into(),
        "--output".into(),
        output_dir.as_os_str().to_os_string(),
        format!("--pid={pid}").into(),
    ]
}

/// Arguments for the catalog query that classifies `pid` and lists its
/// episodes recursively (an episode lists itself; a series or brand lists
/// its children).
pub fn listing_args(pid: &str) -> Vec<OsString> {
    vec![format!("--pid={pid}").into(), "--pid-recursive-list".into()]
}
