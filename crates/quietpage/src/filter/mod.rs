//! Text filtering.
//!
//! [`text`] rewrites strings against a registered wordlist; [`node`] walks
//! document subtrees and routes every leaf through the text engine.

pub mod node;
pub mod text;

pub use node::{classify_node, discover_regions, filter_node, NodeClass, NodeFilter, NodeSweep};
pub use text::{FilterResult, MatchSpan, MatchStats, TextFilterEngine};
