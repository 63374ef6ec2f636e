//! Configuration management for quietpage.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::collections::BTreeMap;
use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::wordlist::{MatchMethod, Replacement, WordlistRule};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "quietpage";

/// Default statistics database file name.
const DATABASE_FILE_NAME: &str = "stats.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `QUIETPAGE_`, sections split on `__`)
/// 2. TOML config file at `~/.config/quietpage/config.toml`
/// 3. Default values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Text filtering configuration.
    pub filter: FilterConfig,
    /// Configured words, keyed by the word itself.
    pub words: BTreeMap<String, WordConfig>,
    /// Per-domain overrides, keyed by hostname.
    pub domains: BTreeMap<String, DomainConfig>,
    /// Audio muting configuration.
    pub audio: AudioConfig,
    /// Statistics storage configuration.
    pub storage: StorageConfig,
}

/// How matches are rewritten in visible text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMethod {
    /// Mask matches with the censor character.
    #[default]
    Censor,
    /// Replace matches with the word's substitute.
    Substitute,
    /// Drop matches.
    Remove,
}

/// Text filtering configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Replacement method.
    pub method: FilterMethod,
    /// Character used by the censor method. Must be exactly one character.
    pub censor_character: String,
    /// Fixed censor length; 0 keeps the length of the match.
    pub censor_fixed_length: usize,
    /// Keep the first character of censored words.
    pub preserve_first: bool,
    /// Keep the last character of censored words.
    pub preserve_last: bool,
    /// Substitute used for words without their own `sub`.
    pub default_substitute: String,
    /// Wrap substitutes in brackets.
    pub substitution_mark: bool,
    /// Mirror the capitalization of the matched word in substitutes.
    pub preserve_case: bool,
    /// Wordlist used for visible text.
    pub wordlist_id: u8,
    /// Wordlist used for caption/audio matching.
    pub audio_wordlist_id: u8,
    /// Honor per-word `lists`. When false every wordlist holds every word.
    pub wordlists_enabled: bool,
    /// Only mute audio; never rewrite visible text.
    pub audio_only: bool,
    /// Only filter domains explicitly enabled in `domains`.
    pub enabled_domains_only: bool,
}

/// A configured word.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WordConfig {
    /// Boundary semantics.
    pub match_method: MatchMethod,
    /// Substitute for the substitute method.
    pub sub: Option<String>,
    /// Match case exactly.
    pub case_sensitive: bool,
    /// Wordlist ids this word belongs to.
    pub lists: Vec<u8>,
}

/// Per-domain overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainConfig {
    /// Never filter this domain.
    pub disabled: bool,
    /// Filter this domain when `enabled_domains_only` is set.
    pub enabled: bool,
    /// Use cross-node matching for this domain.
    pub advanced: bool,
    /// Visible-text wordlist override.
    pub wordlist_id: Option<u8>,
    /// Audio wordlist override.
    pub audio_wordlist_id: Option<u8>,
}

/// A caption element recognized by the selector media adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaRuleConfig {
    /// Name for logs and statistics.
    pub name: String,
    /// Required tag of the caption element.
    pub tag: Option<String>,
    /// Required class of the caption element.
    pub class: Option<String>,
    /// Required class of the caption element's parent.
    pub parent_class: Option<String>,
    /// Override of the global simple-unmute policy.
    pub simple_unmute: Option<bool>,
}

/// Layout of an auto-generated caption stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoCaptionConfig {
    /// Class of the caption window holding the rows.
    pub container_class: String,
    /// Class of each caption row.
    pub row_class: String,
    /// Class of the text segments inside a row.
    pub text_class: String,
}

/// Audio muting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Mute audio while a matching caption is shown.
    pub mute_audio: bool,
    /// Allow unmuting when removed caption text is contained in the last muted text.
    pub simple_unmute: bool,
    /// Caption elements to track.
    pub media_rules: Vec<MediaRuleConfig>,
    /// Auto-generated caption stream layout, if the site has one.
    pub auto_captions: Option<AutoCaptionConfig>,
}

/// Statistics storage configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the statistics database.
    /// Defaults to `~/.local/share/quietpage/stats.db`
    pub database_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            words: default_words(),
            domains: BTreeMap::new(),
            audio: AudioConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            method: FilterMethod::Censor,
            censor_character: "*".to_string(),
            censor_fixed_length: 0,
            preserve_first: false,
            preserve_last: false,
            default_substitute: "censored".to_string(),
            substitution_mark: false,
            preserve_case: true,
            wordlist_id: 0,
            audio_wordlist_id: 0,
            wordlists_enabled: true,
            audio_only: false,
            enabled_domains_only: false,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            mute_audio: false,
            simple_unmute: true,
            media_rules: Vec::new(),
            auto_captions: None,
        }
    }
}

/// Default words shipped with a fresh configuration.
fn default_words() -> BTreeMap<String, WordConfig> {
    [
        ("damn", MatchMethod::Exact, "dang"),
        ("darn", MatchMethod::Exact, "dang"),
        ("crap", MatchMethod::Whole, "crud"),
        ("hell", MatchMethod::Exact, "heck"),
    ]
    .into_iter()
    .map(|(word, match_method, sub)| {
        (
            word.to_string(),
            WordConfig {
                match_method,
                sub: Some(sub.to_string()),
                case_sensitive: false,
                lists: Vec::new(),
            },
        )
    })
    .collect()
}

impl FilterConfig {
    /// The replacement policy for a configured word.
    #[must_use]
    pub fn replacement(&self, word: &WordConfig) -> Replacement {
        match self.method {
            FilterMethod::Censor => Replacement::Censor {
                character: self.censor_character.chars().next().unwrap_or('*'),
                fixed_length: self.censor_fixed_length,
                preserve_first: self.preserve_first,
                preserve_last: self.preserve_last,
            },
            FilterMethod::Substitute => Replacement::Substitute {
                text: word
                    .sub
                    .clone()
                    .unwrap_or_else(|| self.default_substitute.clone()),
                mark: self.substitution_mark,
                preserve_case: self.preserve_case,
            },
            FilterMethod::Remove => Replacement::Remove,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("QUIETPAGE_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.filter.censor_character.chars().count() != 1 {
            return Err(Error::config_validation(format!(
                "censor_character must be exactly one character, got {:?}",
                self.filter.censor_character
            )));
        }

        for (word, word_config) in &self.words {
            if word.trim().is_empty() {
                return Err(Error::config_validation("words must not be empty"));
            }
            WordlistRule::new(
                word,
                word_config.match_method,
                Replacement::Remove,
                word_config.case_sensitive,
            )
            .map_err(|e| Error::config_validation(format!("invalid word pattern: {e}")))?;
        }

        for rule in &self.audio.media_rules {
            if rule.tag.is_none() && rule.class.is_none() && rule.parent_class.is_none() {
                return Err(Error::config_validation(format!(
                    "media rule '{}' needs a tag, class or parent_class",
                    rule.name
                )));
            }
        }

        if let Some(auto) = &self.audio.auto_captions {
            if auto.container_class.is_empty() || auto.row_class.is_empty() {
                return Err(Error::config_validation(
                    "auto_captions needs container_class and row_class",
                ));
            }
        }

        Ok(())
    }

    /// Get the statistics database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }
}
