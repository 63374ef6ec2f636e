//! String-level filtering against a registered wordlist.

use std::collections::BTreeMap;

use tracing::{trace, warn};

use crate::error::Result;
use crate::wordlist::{Wordlist, WordlistRegistry};

/// Outcome of filtering one string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterResult {
    /// The rewritten text.
    pub filtered: String,
    /// Whether `filtered` differs from the input.
    pub modified: bool,
    /// Number of matches per rule word.
    pub match_counts: BTreeMap<String, u32>,
}

impl FilterResult {
    /// A result that leaves `text` untouched.
    #[must_use]
    pub fn unchanged(text: &str) -> Self {
        Self {
            filtered: text.to_string(),
            modified: false,
            match_counts: BTreeMap::new(),
        }
    }

    /// Whether any rule matched, even if the replacement was identical.
    #[must_use]
    pub fn has_matches(&self) -> bool {
        !self.match_counts.is_empty()
    }

    /// Total matches across all rules.
    #[must_use]
    pub fn total_matches(&self) -> u32 {
        self.match_counts.values().sum()
    }
}

/// A claimed region of the input and what replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSpan {
    /// Byte offset where the replaced region starts.
    pub start: usize,
    /// Byte offset where the replaced region ends.
    pub end: usize,
    /// Word of the rule that claimed the region.
    pub word: String,
    /// Text written in place of the region.
    pub replacement: String,
}

/// Find every replacement `wordlist` makes in `text`, sorted by position.
///
/// Rules run in order over the original text. A match that overlaps a
/// region already claimed by an earlier rule is skipped, so the first rule
/// to claim a span wins it. Removals then take one adjacent space that no
/// other span claimed.
#[must_use]
pub fn plan(wordlist: &Wordlist, text: &str) -> Vec<MatchSpan> {
    let mut claimed: BTreeMap<usize, (MatchSpan, bool)> = BTreeMap::new();
    for rule in wordlist.rules() {
        for found in rule.find_all(text) {
            let (start, end) = (found.start(), found.end());
            if start == end || overlaps_claimed(&claimed, start, end) {
                continue;
            }
            let span = MatchSpan {
                start,
                end,
                word: rule.word.clone(),
                replacement: rule.replacement_for(found.as_str()),
            };
            claimed.insert(start, (span, rule.replacement.is_removal()));
        }
    }

    let mut spans: Vec<MatchSpan> = Vec::with_capacity(claimed.len());
    let mut entries = claimed.into_values().peekable();
    while let Some((mut span, removal)) = entries.next() {
        if removal {
            let floor = spans.last().map_or(0, |s| s.end);
            let ceiling = entries.peek().map_or(text.len(), |(next, _)| next.start);
            widen_removal(text, &mut span, floor, ceiling);
        }
        spans.push(span);
    }
    spans
}

// Claimed spans never overlap, so only the last one starting before `end`
// can reach into `start..end`.
fn overlaps_claimed(claimed: &BTreeMap<usize, (MatchSpan, bool)>, start: usize, end: usize) -> bool {
    claimed
        .range(..end)
        .next_back()
        .is_some_and(|(_, (span, _))| span.end > start)
}

// Removing a word also takes one adjacent space so no double space is left.
// The space must lie within `floor..ceiling`, outside every other span.
fn widen_removal(text: &str, span: &mut MatchSpan, floor: usize, ceiling: usize) {
    if let Some(prev) = text[..span.start].chars().next_back() {
        if prev.is_whitespace() && span.start - prev.len_utf8() >= floor {
            span.start -= prev.len_utf8();
            return;
        }
    }
    if let Some(next) = text[span.end..].chars().next() {
        if next.is_whitespace() && span.end + next.len_utf8() <= ceiling {
            span.end += next.len_utf8();
        }
    }
}

/// Rebuild `text` with `spans` (sorted, non-overlapping) replaced, in one pass.
#[must_use]
pub fn splice(text: &str, spans: &[MatchSpan]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for span in spans {
        out.push_str(&text[cursor..span.start]);
        out.push_str(&span.replacement);
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Filter `text` with an already resolved wordlist. Pure.
#[must_use]
pub fn filter_with(wordlist: &Wordlist, text: &str) -> FilterResult {
    let spans = plan(wordlist, text);
    if spans.is_empty() {
        return FilterResult::unchanged(text);
    }
    let filtered = splice(text, &spans);
    FilterResult {
        modified: filtered != text,
        filtered,
        match_counts: count_words(&spans),
    }
}

fn count_words(spans: &[MatchSpan]) -> BTreeMap<String, u32> {
    let mut counts = BTreeMap::new();
    for span in spans {
        *counts.entry(span.word.clone()).or_insert(0) += 1;
    }
    counts
}

/// Session match statistics, keyed by `(wordlist id, word)`.
///
/// Counters only ever grow; they feed reporting and never decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchStats {
    counts: BTreeMap<(u8, String), u64>,
}

impl MatchStats {
    /// Add `count` matches of `word` in wordlist `wordlist_id`.
    pub fn record(&mut self, wordlist_id: u8, word: &str, count: u32) {
        *self
            .counts
            .entry((wordlist_id, word.to_string()))
            .or_insert(0) += u64::from(count);
    }

    /// Matches recorded for one word in one wordlist.
    #[must_use]
    pub fn count(&self, wordlist_id: u8, word: &str) -> u64 {
        self.counts
            .get(&(wordlist_id, word.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Matches recorded across everything.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// `(wordlist id, word, count)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &str, u64)> {
        self.counts
            .iter()
            .map(|((id, word), count)| (*id, word.as_str(), *count))
    }
}

/// Filters strings against the session's wordlists and keeps match statistics.
#[derive(Debug, Default)]
pub struct TextFilterEngine {
    registry: WordlistRegistry,
    stats: MatchStats,
}

impl TextFilterEngine {
    /// Create an engine over a populated registry.
    #[must_use]
    pub fn new(registry: WordlistRegistry) -> Self {
        Self {
            registry,
            stats: MatchStats::default(),
        }
    }

    /// The wordlists this engine filters with.
    #[must_use]
    pub fn registry(&self) -> &WordlistRegistry {
        &self.registry
    }

    /// Mutable access for registering wordlists during session setup.
    pub fn registry_mut(&mut self) -> &mut WordlistRegistry {
        &mut self.registry
    }

    /// Statistics accumulated so far.
    #[must_use]
    pub fn stats(&self) -> &MatchStats {
        &self.stats
    }

    /// Filter `text` with wordlist `wordlist_id`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::WordlistMissing`] if the wordlist is not registered.
    ///
    /// # Example
    ///
    /// ```
    /// use quietpage::filter::TextFilterEngine;
    /// use quietpage::wordlist::{MatchMethod, Replacement, Wordlist, WordlistRegistry, WordlistRule};
    ///
    /// let mut registry = WordlistRegistry::new();
    /// let rule = WordlistRule::new("darn", MatchMethod::Exact, Replacement::default(), false).unwrap();
    /// registry.register(Wordlist::with_rules(1, vec![rule]));
    ///
    /// let mut engine = TextFilterEngine::new(registry);
    /// let result = engine.filter_text("that darn thing", 1, true).unwrap();
    /// assert_eq!(result.filtered, "that **** thing");
    /// assert!(result.modified);
    /// ```
    pub fn filter_text(
        &mut self,
        text: &str,
        wordlist_id: u8,
        record_stats: bool,
    ) -> Result<FilterResult> {
        let result = filter_with(self.registry.get(wordlist_id)?, text);
        if record_stats {
            self.record(wordlist_id, &result.match_counts);
        }
        if result.modified {
            trace!(wordlist_id, matches = result.total_matches(), "Filtered text");
        }
        Ok(result)
    }

    /// Like [`filter_text`](Self::filter_text), but a missing wordlist yields
    /// an unchanged result instead of an error.
    pub fn filter_text_or_passthrough(
        &mut self,
        text: &str,
        wordlist_id: u8,
        record_stats: bool,
    ) -> FilterResult {
        match self.filter_text(text, wordlist_id, record_stats) {
            Ok(result) => result,
            Err(e) => {
                warn!(wordlist_id, error = %e, "Filter pass skipped");
                FilterResult::unchanged(text)
            }
        }
    }

    /// Plan replacements for `text` without applying them, recording
    /// statistics for the planned matches when asked.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::WordlistMissing`] if the wordlist is not registered.
    pub fn plan_text(
        &mut self,
        text: &str,
        wordlist_id: u8,
        record_stats: bool,
    ) -> Result<Vec<MatchSpan>> {
        let spans = plan(self.registry.get(wordlist_id)?, text);
        if record_stats {
            self.record(wordlist_id, &count_words(&spans));
        }
        Ok(spans)
    }

    fn record(&mut self, wordlist_id: u8, counts: &BTreeMap<String, u32>) {
        for (word, count) in counts {
            self.stats.record(wordlist_id, word, *count);
        }
    }

    /// Drop every wordlist. Statistics are kept for the final report.
    pub fn release(&mut self) {
        self.registry.clear();
    }
}
