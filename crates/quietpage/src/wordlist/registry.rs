//! Registry of compiled wordlists for a session.

use std::collections::HashMap;

use tracing::debug;

use super::Wordlist;
use crate::error::{Error, Result};

/// Holds the wordlists a session filters with, keyed by id.
///
/// Registration is idempotent by id: the first wordlist registered under an
/// id stays for the rest of the session.
#[derive(Debug, Default)]
pub struct WordlistRegistry {
    lists: HashMap<u8, Wordlist>,
}

impl WordlistRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wordlist. Returns `false` if the id was already registered.
    pub fn register(&mut self, wordlist: Wordlist) -> bool {
        if self.lists.contains_key(&wordlist.id) {
            debug!(id = wordlist.id, "Wordlist already registered");
            return false;
        }
        debug!(id = wordlist.id, rules = wordlist.len(), "Registered wordlist");
        self.lists.insert(wordlist.id, wordlist);
        true
    }

    /// Look up a wordlist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WordlistMissing`] if no wordlist has that id.
    pub fn get(&self, id: u8) -> Result<&Wordlist> {
        self.lists.get(&id).ok_or(Error::WordlistMissing { id })
    }

    /// Whether a wordlist with this id is registered.
    #[must_use]
    pub fn contains(&self, id: u8) -> bool {
        self.lists.contains_key(&id)
    }

    /// Registered ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<u8> {
        let mut ids: Vec<u8> = self.lists.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered wordlists.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Release every wordlist.
    pub fn clear(&mut self) {
        self.lists.clear();
    }
}
