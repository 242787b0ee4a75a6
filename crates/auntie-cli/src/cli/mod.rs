//! CLI for the auntie parallel download manager.

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use auntie_core::config::{default_threads, RunOptions};
use auntie_core::error::ItemError;
use auntie_core::progress::{DisplayUpdate, Renderer};
use auntie_core::resolve::{self, Resolution};
use auntie_core::scheduler::{self, RunResult};

/// Exit code for a run cancelled by SIGINT, matching shell convention.
const INTERRUPT_EXIT_CODE: i32 = 130;

/// Download multiple BBC iPlayer programmes in parallel.
#[derive(Debug, Parser)]
#[command(name = "auntie")]
#[command(about = "download multiple BBC iPlayer programmes in parallel", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Programme, series (season), or brand (show) PIDs or URLs to download.
    #[arg(value_name = "PID", required = true)]
    pub pids: Vec<String>,

    /// Enable verbose debug logging of get_iplayer interactions.
    #[arg(short, long)]
    pub debug: bool,

    /// Preserve the temporary download subdirectories instead of deleting them.
    #[arg(short = 'n', long)]
    pub no_clean: bool,

    /// Rename completed video files to the Plex naming convention.
    #[arg(short, long)]
    pub plex: bool,

    /// Maximum number of parallel download workers.
    #[arg(short, long, default_value_t = default_threads(), value_name = "N")]
    pub threads: usize,
}

/// Resolve, dispatch, render, and summarise one run; returns the exit code.
pub async fn run(cli: Cli) -> Result<i32> {
    let options = RunOptions {
        rename: cli.plex,
        clean: !cli.no_clean,
        debug: cli.debug,
    };
    let dest_dir = std::env::current_dir()?;

    let Resolution { items, failures } = resolve::resolve_inputs(&cli.pids, options).await;
    for (input, err) in &failures {
        eprintln!("{input}: {err}");
    }
    if items.is_empty() {
        println!("No programmes to download.");
        let code = if failures.is_empty() { 0 } else { 1 };
        return Ok(code);
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received; stopping dispatch");
                cancel.cancel();
            }
        });
    }

    let (update_tx, update_rx) = mpsc::channel::<DisplayUpdate>(256);
    let render_handle = tokio::spawn(Renderer::new().run(update_rx));

    let results = scheduler::run_pool(items, cli.threads, dest_dir, update_tx, cancel.clone()).await;

    // The pool dropped every sender, so the renderer drains and exits,
    // leaving the final rows on screen above the summary.
    let _ = render_handle.await;

    Ok(print_summary(&failures, &results, cancel.is_cancelled()))
}

/// Print one line per item (and per failed input) and derive the exit code.
fn print_summary(
    resolution_failures: &[(String, ItemError)],
    results: &[RunResult],
    interrupted: bool,
) -> i32 {
    let mut failures = resolution_failures.len();

    for (input, err) in resolution_failures {
        println!("{input}: {err}");
    }
    for result in results {
        match &result.outcome {
            Ok(path) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                println!("{}: completed ({name})", result.pid);
            }
            Err(ItemError::Interrupted) => {
                println!("{}: interrupted", result.pid);
            }
            Err(err) => {
                failures += 1;
                println!("{}: {err}", result.pid);
            }
        }
    }

    if interrupted {
        println!("Downloads interrupted by user");
        return INTERRUPT_EXIT_CODE;
    }
    if failures > 0 {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests;
