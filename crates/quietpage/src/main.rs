//! `qpage` - CLI for quietpage
//!
//! Filters strings, replays page sessions against document fixtures and shows
//! stored session statistics.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use clap::Parser;
use tokio::sync::mpsc;

use quietpage::audio::RecordingPlayback;
use quietpage::cli::{Cli, Command, ConfigCommand, FilterCommand, RunCommand, StatsCommand};
use quietpage::document::fixture::render_outline;
use quietpage::document::script::{parse_script, Script};
use quietpage::policy::FrameContext;
use quietpage::report::StoreReporter;
use quietpage::storage::StatsStore;
use quietpage::wordlist::{Wordlist, WordlistRegistry};
use quietpage::{init_logging, Config, Document, FilterOrchestrator, TextFilterEngine};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Filter(cmd) => handle_filter(&config, &cmd),
        Command::Run(cmd) => handle_run(config, &cmd).await,
        Command::Stats(cmd) => handle_stats(&config, &cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn handle_filter(config: &Config, cmd: &FilterCommand) -> Result<(), Box<dyn std::error::Error>> {
    let id = cmd.wordlist.unwrap_or(config.filter.wordlist_id);
    let mut registry = WordlistRegistry::new();
    registry.register(Wordlist::from_config(config, id)?);
    let mut engine = TextFilterEngine::new(registry);

    let result = engine.filter_text(&cmd.text, id, true)?;
    if cmd.json {
        let output = serde_json::json!({
            "wordlist": id,
            "filtered": result.filtered,
            "modified": result.modified,
            "matches": result.match_counts,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", result.filtered);
        for (word, count) in &result.match_counts {
            println!("  {word}: {count}");
        }
    }
    Ok(())
}

async fn handle_run(mut config: Config, cmd: &RunCommand) -> Result<(), Box<dyn std::error::Error>> {
    let doc = Document::from_json(&std::fs::read_to_string(&cmd.document)?)?;
    let script: Script = match &cmd.script {
        Some(path) => parse_script(&std::fs::read_to_string(path)?)?,
        None => Vec::new(),
    };
    if cmd.mute_audio {
        config.audio.mute_audio = true;
    }

    let playback = RecordingPlayback::new();
    let timeline = playback.timeline();
    let database_path = config.database_path();
    let mut session = FilterOrchestrator::new(config, doc).with_playback(playback);
    if cmd.record {
        session = session.with_reporter(StoreReporter::new(StatsStore::open(&database_path)?));
    }

    let frame = FrameContext {
        hostname: cmd.host.clone(),
        parent_hostname: cmd.parent_host.clone(),
        referrer: cmd.referrer.clone(),
    };
    let status = session.start_framed(&frame);

    let (tx, rx) = mpsc::channel(16);
    let producer = tokio::spawn(async move {
        for batch in script {
            if tx.send(batch).await.is_err() {
                break;
            }
        }
    });
    let report = session.run(rx).await;
    producer.await?;

    let summary = session.unload();
    let outline = render_outline(session.document());
    let events = timeline.events();

    if cmd.json {
        let output = serde_json::json!({
            "status": status,
            "document": outline,
            "report": report,
            "timeline": events,
            "summary": summary,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Session: {} ({})", status.hostname, if status.disabled { "disabled" } else { "active" });
    println!();
    print!("{outline}");
    println!();
    println!(
        "Batches: {} events, {} modified, {} dropped, {} regions registered",
        report.events, report.modified, report.dropped, report.regions_registered
    );
    if !events.is_empty() {
        println!();
        println!("Playback:");
        for event in &events {
            match (&event.reason, event.muted) {
                (Some(reason), true) => println!("  {} muted ({reason})", event.at.to_rfc3339()),
                (_, true) => println!("  {} muted", event.at.to_rfc3339()),
                (_, false) => println!("  {} unmuted", event.at.to_rfc3339()),
            }
        }
    }
    if let Some(summary) = summary {
        println!();
        println!("Matches: {}", summary.total_matches());
        for entry in &summary.matches {
            println!("  [{}] {}: {}", entry.wordlist_id, entry.word, entry.count);
        }
    }
    Ok(())
}

fn handle_stats(config: &Config, cmd: &StatsCommand) -> Result<(), Box<dyn std::error::Error>> {
    let store = StatsStore::open(config.database_path())?;
    let stats = store.stats()?;
    let words = store.word_totals(cmd.limit)?;
    let sessions = store.recent_sessions(cmd.limit)?;

    if cmd.json {
        let output = serde_json::json!({
            "database_path": store.path(),
            "stats": stats,
            "words": words,
            "sessions": sessions,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("qpage statistics");
    println!("----------------");
    println!("Database:        {}", store.path().display());
    println!("Sessions:        {}", stats.sessions);
    println!("  disabled:      {}", stats.disabled_sessions);
    println!("Matches:         {}", stats.total_matches);
    println!("Mutes:           {}", stats.muted_spans);
    if let (Some(first), Some(last)) = (stats.first_session, stats.last_session) {
        println!("Range:           {} .. {}", first.to_rfc3339(), last.to_rfc3339());
    }
    println!("Size:            {} bytes", stats.db_size_bytes);

    if !words.is_empty() {
        println!();
        println!("Top words:");
        for word in &words {
            println!("  {:<16} {:>6} in {} sessions", word.word, word.count, word.sessions);
        }
    }
    if !sessions.is_empty() {
        println!();
        println!("Recent sessions:");
        for session in &sessions {
            println!(
                "  {} {:<24} {:>5} matches {:>3} mutes{}",
                session.started_at.to_rfc3339(),
                session.hostname,
                session.total_matches,
                session.muted_spans,
                if session.disabled { " (disabled)" } else { "" }
            );
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Filter]");
                println!("  Method:             {:?}", config.filter.method);
                println!("  Censor character:   {}", config.filter.censor_character);
                println!("  Text wordlist:      {}", config.filter.wordlist_id);
                println!("  Audio wordlist:     {}", config.filter.audio_wordlist_id);
                println!("  Audio only:         {}", config.filter.audio_only);
                println!();
                println!("[Words]");
                println!("  Configured:         {}", config.words.len());
                println!("  Domains:            {}", config.domains.len());
                println!();
                println!("[Audio]");
                println!("  Mute audio:         {}", config.audio.mute_audio);
                println!("  Simple unmute:      {}", config.audio.simple_unmute);
                println!("  Media rules:        {}", config.audio.media_rules.len());
                println!(
                    "  Auto captions:      {}",
                    config.audio.auto_captions.is_some()
                );
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
