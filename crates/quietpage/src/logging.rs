//! Logging setup.
//!
//! Everything in the crate logs through `tracing`. Filtering passes, mute
//! transitions and dropped events are emitted at debug/trace so a normal run
//! only shows session-level messages.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Verbosity level for logging output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Session start, disable decisions and summaries.
    #[default]
    Normal,
    /// Per-batch filtering and mute transitions.
    Verbose,
    /// Every recorded change and match.
    Trace,
}

impl Verbosity {
    /// Pick a verbosity from repeated `-v` flags and a `--quiet` switch.
    #[must_use]
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        if quiet {
            return Self::Quiet;
        }
        match verbose {
            0 => Self::Normal,
            1 => Self::Verbose,
            _ => Self::Trace,
        }
    }

    /// The tracing level this verbosity enables.
    #[must_use]
    pub fn level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    /// Default filter directive for the crate at this verbosity.
    #[must_use]
    pub fn directive(self) -> String {
        format!("quietpage={}", self.level())
    }
}

/// Initialize the global subscriber. `RUST_LOG` overrides `verbosity`.
///
/// Logs go to stderr so that command output on stdout stays parseable.
///
/// ```no_run
/// use quietpage::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::from_flags(1, false));
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));

    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(verbosity >= Verbosity::Verbose)
            .with_line_number(false),
    );

    // A subscriber may already be installed (tests, embedding callers).
    let _ = subscriber.try_init();
}

/// Quiet subscriber for tests; `RUST_LOG` still applies.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

impl PartialOrd for Verbosity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Verbosity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        fn rank(v: Verbosity) -> u8 {
            match v {
                Verbosity::Quiet => 0,
                Verbosity::Normal => 1,
                Verbosity::Verbose => 2,
                Verbosity::Trace => 3,
            }
        }
        rank(*self).cmp(&rank(*other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flags() {
        assert_eq!(Verbosity::from_flags(0, false), Verbosity::Normal);
        assert_eq!(Verbosity::from_flags(1, false), Verbosity::Verbose);
        assert_eq!(Verbosity::from_flags(5, false), Verbosity::Trace);
        assert_eq!(Verbosity::from_flags(2, true), Verbosity::Quiet);
    }

    #[test]
    fn test_level_and_directive() {
        assert_eq!(Verbosity::Quiet.level(), Level::ERROR);
        assert_eq!(Verbosity::Trace.level(), Level::TRACE);
        assert_eq!(Verbosity::Verbose.directive(), "quietpage=DEBUG");
    }

    #[test]
    fn test_ordering() {
        assert!(Verbosity::Quiet < Verbosity::Normal);
        assert!(Verbosity::Trace > Verbosity::Verbose);
    }

    #[test]
    fn test_init_logging_twice() {
        init_logging(Verbosity::Normal);
        init_logging(Verbosity::Trace);
        init_test_logging();
    }
}
