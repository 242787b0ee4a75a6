//! PID normalisation: extract a programme identifier from raw input or URLs.

use regex::Regex;
use std::sync::LazyLock;

/// BBC programme identifiers: a letter followed by 7-10 non-vowel
/// alphanumerics (vowels never appear past the first character, which is
/// what lets the pattern skip ordinary words embedded in a URL).
pub static PID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[a-z][b-df-hj-np-tv-z0-9]{7,10}").unwrap());

const EPISODE_URL_PREFIX: &str = "https://www.bbc.co.uk/iplayer/episode/";

/// Whether `value` is exactly one PID-shaped token.
pub fn is_pid(value: &str) -> bool {
    PID_PATTERN
        .find(value)
        .is_some_and(|m| m.start() == 0 && m.end() == value.len())
}

/// Normalise a raw identifier or iPlayer URL to a lowercase PID.
///
/// Episode URLs take the path segment directly after the prefix. Series and
/// brand URLs, and any other free-form input, take the last embedded
/// PID-shaped token that contains a digit (tokens without digits are usually
/// slug words that happen to match), falling back to the last token overall.
/// Input with no PID-shaped token is passed through trimmed and lowercased
/// so the catalog query can reject it with a proper reason.
pub fn normalise_pid(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let lowered = trimmed.to_lowercase();

    if lowered.starts_with(EPISODE_URL_PREFIX) {
        let candidate = trimmed[EPISODE_URL_PREFIX.len()..]
            .split(['/', '?', '#'])
            .next()
            .unwrap_or("")
            .trim();
        if is_pid(candidate) {
            return candidate.to_lowercase();
        }
        tracing::debug!(input = trimmed, "episode URL without a PID segment");
    }

    let matches: Vec<&str> = PID_PATTERN.find_iter(trimmed).map(|m| m.as_str()).collect();
    let Some(last) = matches.last() else {
        tracing::debug!(input = trimmed, "no PID-shaped token; passing input through");
        return lowered;
    };

    for candidate in matches.iter().rev() {
        if candidate.chars().any(|c| c.is_ascii_digit()) {
            return candidate.to_lowercase();
        }
    }
    last.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_pid_passes_through() {
        assert_eq!(normalise_pid("b006q2x0"), "b006q2x0");
        assert_eq!(normalise_pid("  B006Q2X0  "), "b006q2x0");
    }

    #[test]
    fn episode_url_takes_path_segment() {
        assert_eq!(
            normalise_pid("https://www.bbc.co.uk/iplayer/episode/b006q2x0/some-slug"),
            "b006q2x0"
        );
        assert_eq!(
            normalise_pid("https://www.bbc.co.uk/iplayer/episode/b006q2x0?seriesId=x"),
            "b006q2x0"
        );
    }

    #[test]
    fn series_url_prefers_token_with_digit() {
        // "bcdfghjk" is PID-shaped but digit-free; the real PID wins.
        assert_eq!(
            normalise_pid("https://www.bbc.co.uk/iplayer/episodes/b007y6k8/bcdfghjk"),
            "b007y6k8"
        );
    }

    #[test]
    fn digit_free_token_is_last_resort() {
        assert_eq!(normalise_pid("see bcdfghjk please"), "bcdfghjk");
    }

    #[test]
    fn no_token_passes_input_through() {
        assert_eq!(normalise_pid("not a pid"), "not a pid");
        assert_eq!(normalise_pid(""), "");
    }

    #[test]
    fn is_pid_rejects_embedded_text() {
        assert!(is_pid("b006q2x0"));
        assert!(!is_pid("xb006q2x0y"));
        assert!(!is_pid("b00"));
    }
}
