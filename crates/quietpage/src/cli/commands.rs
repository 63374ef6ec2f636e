//! CLI command definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Filter a single string.
#[derive(Debug, Args)]
pub struct FilterCommand {
    /// Text to filter
    pub text: String,

    /// Wordlist to use (defaults to the configured text wordlist)
    #[arg(short, long)]
    pub wordlist: Option<u8>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Run a full page session against a document fixture.
#[derive(Debug, Args)]
pub struct RunCommand {
    /// JSON document fixture
    #[arg(short, long, value_name = "FILE")]
    pub document: PathBuf,

    /// JSON edit script, replayed one batch at a time
    #[arg(short, long, value_name = "FILE")]
    pub script: Option<PathBuf>,

    /// Hostname the page is served from
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Hostname of the embedding page, for framed documents
    #[arg(long)]
    pub parent_host: Option<String>,

    /// Referrer URL of the document
    #[arg(long)]
    pub referrer: Option<String>,

    /// Enable mute tracking regardless of configuration
    #[arg(long)]
    pub mute_audio: bool,

    /// Persist the session into the statistics store
    #[arg(long)]
    pub record: bool,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Show stored telemetry.
#[derive(Debug, Args)]
pub struct StatsCommand {
    /// Number of words and sessions to list
    #[arg(short, long, default_value = "10")]
    pub limit: usize,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
