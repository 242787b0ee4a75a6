//! Run-wide options resolved from the CLI. Nothing is persisted to disk.

/// Options shared by every work item in a run.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Rename finished files to `Show - sNNeNN - Episode Title.ext`.
    pub rename: bool,
    /// Remove the per-item working area after a successful move.
    pub clean: bool,
    /// Forward raw get_iplayer output to the debug log.
    pub debug: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            rename: false,
            clean: true,
            debug: false,
        }
    }
}

/// Default worker count: one per available processing unit, 4 when the
/// parallelism cannot be determined.
pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_clean_and_quiet() {
        let opts = RunOptions::default();
        assert!(opts.clean);
        assert!(!opts.rename);
        assert!(!opts.debug);
    }

    #[test]
    fn default_threads_is_positive() {
        assert!(default_threads() >= 1);
    }
}
