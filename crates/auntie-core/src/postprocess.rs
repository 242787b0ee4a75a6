//! Post-download finalisation: locate the artifact, optionally rename it to
//! the Plex convention, move it out of the working area, and clean up.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Extensions that can be the primary media artifact.
const MEDIA_EXTENSIONS: [&str; 11] = [
    "mp4", "m4v", "mkv", "mov", "ts", "avi", "flv", "wmv", "webm", "mpg", "mpeg",
];

/// Subtitle sidecars moved along with the artifact.
const SUBTITLE_EXTENSIONS: [&str; 2] = ["srt", "ttml"];

/// Linux NAME_MAX.
const MAX_FILENAME_BYTES: usize = 255;

/// Metadata fields get_iplayer writes to the XML sidecar next to the artifact.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct EpisodeMetadata {
    pub show_title: String,
    pub season_number: String,
    pub episode_number: String,
    pub episode_title: String,
}

/// Locate the primary media artifact: the largest file under `working_area`
/// with a media extension. Subtitle sidecars never qualify.
pub fn find_artifact(working_area: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut best: Option<(u64, PathBuf)> = None;
    visit(working_area, &mut best)?;
    Ok(best.map(|(_, path)| path))
}

fn visit(dir: &Path, best: &mut Option<(u64, PathBuf)>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            visit(&path, best)?;
            continue;
        }
        if !file_type.is_file() {
            continue;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !MEDIA_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            continue;
        }
        let size = entry.metadata()?.len();
        if best.as_ref().map_or(true, |(largest, _)| size > *largest) {
            *best = Some((size, path));
        }
    }
    Ok(())
}

/// Move the artifact (and its subtitle sidecars) into `dest_dir`, renaming
/// to `Show - sNNeNN - Episode Title.ext` when `rename` is set and the
/// sidecar metadata is complete. Removes the working area afterwards when
/// `clean` is set. Returns the artifact's final path.
///
/// A second call for an already-moved artifact fails: the source no longer
/// exists, and that must surface rather than pass silently.
pub fn finalize(
    pid: &str,
    artifact: &Path,
    working_area: &Path,
    dest_dir: &Path,
    rename: bool,
    clean: bool,
) -> Result<PathBuf> {
    let original_name = artifact
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .with_context(|| format!("artifact has no usable filename: {}", artifact.display()))?;

    let target_name = if rename {
        let extension = artifact
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        match sidecar_metadata(artifact) {
            Some(meta) => match plex_filename(&meta, extension) {
                Some(name) => {
                    tracing::info!(pid, from = original_name.as_str(), to = name.as_str(), "renaming");
                    name
                }
                None => {
                    tracing::debug!(pid, "metadata incomplete; keeping original filename");
                    original_name.clone()
                }
            },
            None => {
                tracing::debug!(pid, "no metadata sidecar; keeping original filename");
                original_name.clone()
            }
        }
    } else {
        original_name.clone()
    };

    let destination = ensure_unique_path(dest_dir, &target_name);
    fs::rename(artifact, &destination).with_context(|| {
        format!(
            "move {} -> {}",
            artifact.display(),
            destination.display()
        )
    })?;
    tracing::info!(pid, path = %destination.display(), "artifact moved");

    move_subtitles(artifact, dest_dir)?;

    if clean {
        if let Err(err) = fs::remove_dir_all(working_area) {
            // Leftover temp data is not worth failing a finished download.
            tracing::warn!(pid, %err, "could not remove working area");
        }
    }

    Ok(destination)
}

/// Read the XML sidecar get_iplayer wrote next to the artifact, if any.
fn sidecar_metadata(artifact: &Path) -> Option<EpisodeMetadata> {
    let sidecar = artifact.with_extension("xml");
    let content = fs::read_to_string(&sidecar).ok()?;
    Some(parse_metadata(&content))
}

/// Extract the rename fields from the sidecar XML. get_iplayer writes flat
/// single-line elements, so plain tag scanning is enough.
pub fn parse_metadata(content: &str) -> EpisodeMetadata {
    let show = match tag(content, "brand") {
        Some(brand) => brand,
        None => tag(content, "name").unwrap_or_default(),
    };
    EpisodeMetadata {
        show_title: show,
        season_number: tag(content, "seriesnum").unwrap_or_default(),
        episode_number: tag(content, "episodenum").unwrap_or_default(),
        episode_title: tag(content, "episode").unwrap_or_default(),
    }
}

fn tag(content: &str, name: &str) -> Option<String> {
    let open = format!("<{name}>");
    let close = format!("</{name}>");
    let start = content.find(&open)? + open.len();
    let end = content[start..].find(&close)?;
    let value = content[start..start + end].trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// `Show - sNNeNN - Episode Title.ext`. Returns None when any required
/// field is missing so the caller keeps the original filename.
pub fn plex_filename(meta: &EpisodeMetadata, extension: &str) -> Option<String> {
    let show = sanitize_component(&meta.show_title);
    let episode = sanitize_component(&meta.episode_title);
    if show.is_empty() || episode.is_empty() {
        return None;
    }
    let season = two_digit(&meta.season_number)?;
    let number = two_digit(&meta.episode_number)?;

    let extension = extension.trim_start_matches('.');
    let mut stem = format!("{show} - s{season}e{number} - {episode}");
    let max_stem = MAX_FILENAME_BYTES
        .saturating_sub(extension.len() + 1)
        .max(1);
    if stem.len() > max_stem {
        let mut take = max_stem;
        while take > 0 && !stem.is_char_boundary(take) {
            take -= 1;
        }
        stem.truncate(take);
        stem.truncate(stem.trim_end().len());
    }
    Some(format!("{stem}.{extension}"))
}

fn two_digit(value: &str) -> Option<String> {
    let number: u32 = value.trim().parse().ok()?;
    Some(format!("{:02}", number % 100))
}

/// Strip characters that are unsafe in filenames and collapse whitespace.
fn sanitize_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_space = false;
    for c in value.trim().chars() {
        if matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control() {
            continue;
        }
        if c.is_whitespace() {
            if !prev_space {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
    }
    out.trim().to_string()
}

/// First of `name`, `name (1)`, `name (2)`, … that does not exist in `dir`.
fn ensure_unique_path(dir: &Path, filename: &str) -> PathBuf {
    let candidate = dir.join(filename);
    if !candidate.exists() {
        return candidate;
    }
    let stem = candidate
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());
    let extension = candidate
        .extension()
        .map(|e| e.to_string_lossy().into_owned());

    let mut index = 1;
    loop {
        let name = match &extension {
            Some(ext) => format!("{stem} ({index}).{ext}"),
            None => format!("{stem} ({index})"),
        };
        let next = dir.join(name);
        if !next.exists() {
            return next;
        }
        index += 1;
    }
}

/// Move subtitle sidecars that share the artifact's stem. Called after the
/// artifact itself has moved; only its old directory is consulted.
fn move_subtitles(artifact: &Path, dest_dir: &Path) -> Result<()> {
    let Some(dir) = artifact.parent() else {
        return Ok(());
    };
    let Some(stem) = artifact.file_stem().and_then(|s| s.to_str()) else {
        return Ok(());
    };
    for entry in fs::read_dir(dir).with_context(|| format!("scan {}", dir.display()))? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !SUBTITLE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            continue;
        }
        // Covers both `stem.srt` and `stem.en.srt`.
        let shares_stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s == stem || s.starts_with(stem));
        if !shares_stem {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let destination = ensure_unique_path(dest_dir, name);
        fs::rename(&path, &destination)
            .with_context(|| format!("move subtitles {} -> {}", path.display(), destination.display()))?;
        tracing::debug!(path = %destination.display(), "subtitles moved");
    }
    Ok(())
}
