//! Wordlists: ordered, compiled rule sets keyed by id.
//!
//! - [`WordlistRule`] pairs a compiled matcher with boundary semantics and a
//!   replacement policy.
//! - [`Wordlist`] is an ordered sequence of rules. Evaluation order is
//!   insertion order.
//! - [`WordlistRegistry`] indexes wordlists for the lifetime of a session.
//!
//! # Example
//!
//! ```
//! use quietpage::wordlist::{MatchMethod, Replacement, Wordlist, WordlistRegistry, WordlistRule};
//!
//! let mut list = Wordlist::new(1);
//! list.push(WordlistRule::new("darn", MatchMethod::Exact, Replacement::default(), false).unwrap());
//!
//! let mut registry = WordlistRegistry::new();
//! assert!(registry.register(list));
//! assert_eq!(registry.get(1).unwrap().len(), 1);
//! assert!(registry.get(2).is_err());
//! ```

mod registry;
mod rule;

pub use registry::WordlistRegistry;
pub use rule::{MatchMethod, Replacement, WordlistRule};

use crate::config::Config;
use crate::error::Result;

/// Wordlist id that contains every configured word.
pub const ALL_WORDS: u8 = 0;

/// An ordered set of compiled rules.
#[derive(Debug, Clone)]
pub struct Wordlist {
    /// Wordlist id.
    pub id: u8,
    rules: Vec<WordlistRule>,
}

impl Wordlist {
    /// Create an empty wordlist.
    #[must_use]
    pub fn new(id: u8) -> Self {
        Self {
            id,
            rules: Vec::new(),
        }
    }

    /// Create a wordlist from already compiled rules.
    #[must_use]
    pub fn with_rules(id: u8, rules: Vec<WordlistRule>) -> Self {
        Self { id, rules }
    }

    /// Append a rule; it is evaluated after every existing rule.
    pub fn push(&mut self, rule: WordlistRule) {
        self.rules.push(rule);
    }

    /// Rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[WordlistRule] {
        &self.rules
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the wordlist has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Build wordlist `id` from the configured words.
    ///
    /// Longer words are evaluated first so a phrase wins over a word it
    /// contains. With wordlists disabled every id receives every word.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured word fails to compile.
    pub fn from_config(config: &Config, id: u8) -> Result<Self> {
        let mut words: Vec<_> = config
            .words
            .iter()
            .filter(|(_, word)| {
                id == ALL_WORDS || !config.filter.wordlists_enabled || word.lists.contains(&id)
            })
            .collect();
        words.sort_by(|(a, _), (b, _)| {
            b.chars()
                .count()
                .cmp(&a.chars().count())
                .then_with(|| a.cmp(b))
        });

        let rules = words
            .into_iter()
            .map(|(text, word)| {
                WordlistRule::new(
                    text,
                    word.match_method,
                    config.filter.replacement(word),
                    word.case_sensitive,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::with_rules(id, rules))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WordConfig;

    fn config_with_words() -> Config {
        let mut config = Config::default();
        config.words.clear();
        config.words.insert(
            "darn".to_string(),
            WordConfig {
                lists: vec![1],
                ..WordConfig::default()
            },
        );
        config.words.insert(
            "darn it".to_string(),
            WordConfig {
                lists: vec![1, 2],
                ..WordConfig::default()
            },
        );
        config.words.insert(
            "heck".to_string(),
            WordConfig {
                lists: vec![2],
                ..WordConfig::default()
            },
        );
        config
    }

    #[test]
    fn test_from_config_orders_longest_first() {
        let list = Wordlist::from_config(&config_with_words(), ALL_WORDS).unwrap();
        let words: Vec<_> = list.rules().iter().map(|r| r.word.as_str()).collect();
        assert_eq!(words, vec!["darn it", "darn", "heck"]);
    }

    #[test]
    fn test_from_config_selects_list_members() {
        let config = config_with_words();
        let one = Wordlist::from_config(&config, 1).unwrap();
        let two = Wordlist::from_config(&config, 2).unwrap();
        assert_eq!(one.len(), 2);
        assert_eq!(two.len(), 2);
        assert!(two.rules().iter().any(|r| r.word == "heck"));
        assert!(Wordlist::from_config(&config, 9).unwrap().is_empty());
    }

    #[test]
    fn test_from_config_without_wordlists_uses_all_words() {
        let mut config = config_with_words();
        config.filter.wordlists_enabled = false;
        let nine = Wordlist::from_config(&config, 9).unwrap();
        assert_eq!(nine.len(), 3);
        assert_eq!(nine.id, 9);
    }
}
