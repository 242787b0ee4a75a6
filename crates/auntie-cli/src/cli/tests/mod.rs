//! Tests for CLI argument parsing and summary/exit-code behaviour.

use clap::Parser;
use std::path::PathBuf;

use auntie_core::error::ItemError;
use auntie_core::scheduler::RunResult;

use super::{print_summary, Cli};

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).expect("arguments should parse")
}

#[test]
fn cli_parse_single_pid() {
    let cli = parse(&["auntie", "b006q2x0"]);
    assert_eq!(cli.pids, vec!["b006q2x0"]);
    assert!(!cli.debug);
    assert!(!cli.no_clean);
    assert!(!cli.plex);
    assert!(cli.threads >= 1);
}

#[test]
fn cli_parse_multiple_pids_and_flags() {
    let cli = parse(&[
        "auntie",
        "--debug",
        "--no-clean",
        "--plex",
        "--threads",
        "3",
        "b006q2x0",
        "https://www.bbc.co.uk/iplayer/episode/b0074g6s/rose",
    ]);
    assert_eq!(cli.pids.len(), 2);
    assert!(cli.debug);
    assert!(cli.no_clean);
    assert!(cli.plex);
    assert_eq!(cli.threads, 3);
}

#[test]
fn cli_parse_short_flags() {
    let cli = parse(&["auntie", "-d", "-n", "-p", "-t", "2", "b006q2x0"]);
    assert!(cli.debug);
    assert!(cli.no_clean);
    assert!(cli.plex);
    assert_eq!(cli.threads, 2);
}

#[test]
fn cli_requires_at_least_one_pid() {
    assert!(Cli::try_parse_from(["auntie"]).is_err());
    assert!(Cli::try_parse_from(["auntie", "--plex"]).is_err());
}

fn result(queue_index: usize, outcome: Result<PathBuf, ItemError>) -> RunResult {
    RunResult {
        queue_index,
        pid: format!("pid{queue_index}"),
        outcome,
    }
}

#[test]
fn summary_exit_zero_when_all_succeed() {
    let results = vec![
        result(0, Ok(PathBuf::from("a.mp4"))),
        result(1, Ok(PathBuf::from("b.mp4"))),
    ];
    assert_eq!(print_summary(&[], &results, false), 0);
}

#[test]
fn summary_exit_nonzero_on_any_failure() {
    let results = vec![
        result(0, Err(ItemError::Download("exit code 1".into()))),
        result(1, Ok(PathBuf::from("b.mp4"))),
        result(2, Ok(PathBuf::from("c.mp4"))),
    ];
    assert_eq!(print_summary(&[], &results, false), 1);
}

#[test]
fn summary_exit_nonzero_on_resolution_failure() {
    let failures = vec![(
        "bogus".to_string(),
        ItemError::Resolution("bogus: catalog query listed no episodes".into()),
    )];
    assert_eq!(print_summary(&failures, &[], false), 1);
}

#[test]
fn summary_interrupted_exit_code() {
    let results = vec![result(0, Err(ItemError::Interrupted))];
    assert_eq!(print_summary(&[], &results, true), 130);
}
