//! `quietpage` - A live-document profanity filter with caption-driven audio muting
//!
//! This library rewrites matching words in a document tree as it changes,
//! descending into encapsulated (shadow) regions, and mutes media playback
//! while a matching caption is on screen.
//!
//! A page is driven by a [`FilterOrchestrator`]: it resolves the policy for
//! the page's hostname, sweeps the document once, then processes change
//! batches until the page unloads.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod audio;
pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod filter;
pub mod forbidden;
pub mod logging;
pub mod media;
pub mod policy;
pub mod report;
pub mod session;
pub mod storage;
pub mod watcher;
pub mod wordlist;

pub use audio::{AudioMuteCoordinator, MuteState, PlaybackControl};
pub use config::Config;
pub use document::{ChangeEvent, ChangeKind, Document, NodeId};
pub use error::{Error, Result};
pub use filter::{FilterResult, TextFilterEngine};
pub use logging::{init_logging, Verbosity};
pub use session::{FilterOrchestrator, SessionState};
pub use storage::StatsStore;
pub use watcher::{BatchReport, MutationWatcher};
pub use wordlist::{Wordlist, WordlistRegistry};
