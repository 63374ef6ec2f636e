//! Compiled wordlist rules.
//!
//! A rule pairs a compiled matcher with the boundary semantics it was built
//! with and the replacement policy applied to each match.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Boundary semantics for a word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    /// Whole-word match only: "cat" does not match inside "category".
    #[default]
    Exact,
    /// Substring match anywhere.
    Partial,
    /// Substring match that expands to the whole word containing it.
    Whole,
}

/// What a match is replaced with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Replacement {
    /// Mask the match with a character.
    Censor {
        /// Masking character.
        character: char,
        /// Fixed mask length; 0 keeps the length of the match.
        fixed_length: usize,
        /// Keep the first character of the match.
        preserve_first: bool,
        /// Keep the last character of the match.
        preserve_last: bool,
    },
    /// Swap the match for another word.
    Substitute {
        /// The substitute.
        text: String,
        /// Wrap the substitute in brackets so the change is visible.
        mark: bool,
        /// Mirror the capitalization of the match.
        preserve_case: bool,
    },
    /// Drop the match.
    Remove,
}

impl Default for Replacement {
    fn default() -> Self {
        Self::Censor {
            character: '*',
            fixed_length: 0,
            preserve_first: false,
            preserve_last: false,
        }
    }
}

impl Replacement {
    /// Compute the replacement text for one match.
    #[must_use]
    pub fn apply(&self, matched: &str) -> String {
        match self {
            Self::Censor {
                character,
                fixed_length,
                preserve_first,
                preserve_last,
            } => {
                let chars: Vec<char> = matched.chars().collect();
                let length = if *fixed_length > 0 {
                    *fixed_length
                } else {
                    chars.len()
                };
                let mut out: Vec<char> = std::iter::repeat(*character).take(length).collect();
                if *preserve_first && !chars.is_empty() && !out.is_empty() {
                    out[0] = chars[0];
                }
                if *preserve_last && chars.len() > 1 && out.len() > 1 {
                    let last = out.len() - 1;
                    out[last] = chars[chars.len() - 1];
                }
                out.into_iter().collect()
            }
            Self::Substitute {
                text,
                mark,
                preserve_case,
            } => {
                let word = if *preserve_case {
                    match_case(matched, text)
                } else {
                    text.clone()
                };
                if *mark {
                    format!("[{word}]")
                } else {
                    word
                }
            }
            Self::Remove => String::new(),
        }
    }

    /// Whether this policy drops matches entirely.
    #[must_use]
    pub fn is_removal(&self) -> bool {
        matches!(self, Self::Remove)
    }
}

fn match_case(matched: &str, substitute: &str) -> String {
    let letters: Vec<char> = matched.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() > 1 && letters.iter().all(|c| c.is_uppercase()) {
        return substitute.to_uppercase();
    }
    if letters.first().is_some_and(|c| c.is_uppercase()) {
        let mut chars = substitute.chars();
        return match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };
    }
    substitute.to_string()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// A compiled wordlist rule. Immutable once built.
#[derive(Debug, Clone)]
pub struct WordlistRule {
    /// The configured word, used as the rule's name in statistics.
    pub word: String,

    /// Boundary semantics the matcher was compiled with.
    pub method: MatchMethod,

    /// Replacement policy.
    pub replacement: Replacement,

    regex: Regex,
}

impl WordlistRule {
    /// Compile a rule for `word`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] if the word cannot be compiled.
    pub fn new(
        word: &str,
        method: MatchMethod,
        replacement: Replacement,
        case_sensitive: bool,
    ) -> Result<Self> {
        let escaped = regex::escape(word);
        let pattern = match method {
            MatchMethod::Exact => {
                let starts_word = word.chars().next().is_some_and(is_word_char);
                let ends_word = word.chars().last().is_some_and(is_word_char);
                format!(
                    "{}{escaped}{}",
                    if starts_word { r"\b" } else { "" },
                    if ends_word { r"\b" } else { "" }
                )
            }
            MatchMethod::Partial => escaped,
            MatchMethod::Whole => format!(r"\w*{escaped}\w*"),
        };
        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|source| Error::InvalidPattern {
                word: word.to_string(),
                source,
            })?;
        Ok(Self {
            word: word.to_string(),
            method,
            replacement,
            regex,
        })
    }

    /// Wrap a matcher compiled elsewhere.
    #[must_use]
    pub fn from_regex(word: &str, regex: Regex, replacement: Replacement) -> Self {
        Self {
            word: word.to_string(),
            method: MatchMethod::Partial,
            replacement,
            regex,
        }
    }

    /// Check if the text contains a match.
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Find all non-overlapping matches, left to right.
    pub fn find_all<'a>(&self, text: &'a str) -> regex::Matches<'_, 'a> {
        self.regex.find_iter(text)
    }

    /// Replacement text for one matched span.
    #[must_use]
    pub fn replacement_for(&self, matched: &str) -> String {
        self.replacement.apply(matched)
    }
}
