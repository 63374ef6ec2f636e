//! Command-line interface for quietpage.
//!
//! This module provides the CLI structure for the `qpage` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, FilterCommand, RunCommand, StatsCommand};

use crate::logging::Verbosity;

/// qpage - Filter profanity out of live pages and captions
///
/// Rewrites matching words in a document as it changes and mutes playback
/// while a matching caption is on screen.
#[derive(Debug, Parser)]
#[command(name = "qpage")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Filter a string and show what matched
    Filter(FilterCommand),

    /// Run a page session over a document fixture
    Run(RunCommand),

    /// Show stored session statistics
    Stats(StatsCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Verbosity selected by `-v` and `-q`.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.verbose, self.quiet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
        assert_eq!(Cli::command().get_name(), "qpage");
    }

    #[test]
    fn test_verbosity_flags() {
        assert_eq!(parse(&["qpage", "-q", "stats"]).verbosity(), Verbosity::Quiet);
        assert_eq!(parse(&["qpage", "stats"]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["qpage", "-v", "stats"]).verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["qpage", "-vv", "stats"]).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_parse_filter() {
        let cli = parse(&["qpage", "filter", "well darn", "--wordlist", "2"]);
        match cli.command {
            Command::Filter(cmd) => {
                assert_eq!(cmd.text, "well darn");
                assert_eq!(cmd.wordlist, Some(2));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_run() {
        let cli = parse(&[
            "qpage",
            "run",
            "--document",
            "page.json",
            "--script",
            "edits.json",
            "--host",
            "video.example.com",
            "--mute-audio",
            "--record",
        ]);
        match cli.command {
            Command::Run(cmd) => {
                assert_eq!(cmd.document, PathBuf::from("page.json"));
                assert_eq!(cmd.script, Some(PathBuf::from("edits.json")));
                assert_eq!(cmd.host, "video.example.com");
                assert!(cmd.mute_audio);
                assert!(cmd.record);
                assert!(!cmd.json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_run_requires_document() {
        assert!(Cli::try_parse_from(["qpage", "run"]).is_err());
    }

    #[test]
    fn test_parse_config_validate() {
        let cli = parse(&["qpage", "-c", "/custom/config.toml", "config", "validate"]);
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Validate { file: None })
        ));
    }
}
