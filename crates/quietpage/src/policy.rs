//! Which filtering policy applies to a site.

use std::collections::BTreeMap;

use serde::Serialize;
use url::Url;

use crate::config::{Config, DomainConfig};

/// Effective policy for one hostname.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DomainPolicy {
    /// Whether the page is filtered at all.
    pub enabled: bool,
    /// Wordlist for visible text.
    pub wordlist_id: u8,
    /// Wordlist for caption matching.
    pub audio_wordlist_id: u8,
    /// Match across adjacent text nodes.
    pub advanced_mode: bool,
}

/// Resolves a hostname to a policy.
pub trait DomainPolicyResolver {
    /// Policy for `hostname`.
    fn resolve(&self, hostname: &str) -> DomainPolicy;
}

/// Resolver backed by the `domains` configuration section.
///
/// A hostname uses its own entry when there is one, otherwise the entry of
/// the closest parent domain (`news.example.com` falls back to `example.com`).
#[derive(Debug, Clone, Default)]
pub struct ConfigPolicyResolver {
    domains: BTreeMap<String, DomainConfig>,
    enabled_domains_only: bool,
    wordlist_id: u8,
    audio_wordlist_id: u8,
}

impl ConfigPolicyResolver {
    /// Build from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            domains: config
                .domains
                .iter()
                .map(|(host, domain)| (normalize_host(host), domain.clone()))
                .collect(),
            enabled_domains_only: config.filter.enabled_domains_only,
            wordlist_id: config.filter.wordlist_id,
            audio_wordlist_id: config.filter.audio_wordlist_id,
        }
    }

    /// The most specific domain entry for `hostname`.
    #[must_use]
    pub fn domain_for(&self, hostname: &str) -> Option<&DomainConfig> {
        let host = normalize_host(hostname);
        let mut candidate = host.as_str();
        loop {
            if let Some(domain) = self.domains.get(candidate) {
                return Some(domain);
            }
            candidate = candidate.split_once('.')?.1;
        }
    }
}

impl DomainPolicyResolver for ConfigPolicyResolver {
    fn resolve(&self, hostname: &str) -> DomainPolicy {
        let domain = self.domain_for(hostname).cloned().unwrap_or_default();
        DomainPolicy {
            enabled: !(domain.disabled || (self.enabled_domains_only && !domain.enabled)),
            wordlist_id: domain.wordlist_id.unwrap_or(self.wordlist_id),
            audio_wordlist_id: domain.audio_wordlist_id.unwrap_or(self.audio_wordlist_id),
            advanced_mode: domain.advanced,
        }
    }
}

fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Where a document is being shown, for hostname resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameContext {
    /// The document's own hostname.
    pub hostname: String,
    /// Hostname of the embedding page, when framed and readable.
    pub parent_hostname: Option<String>,
    /// The document's referrer URL.
    pub referrer: Option<String>,
}

impl FrameContext {
    /// A top-level document.
    #[must_use]
    pub fn top_level(hostname: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            ..Self::default()
        }
    }

    /// The hostname policy is resolved for: the embedding page's, then the
    /// referrer's, then the document's own.
    #[must_use]
    pub fn effective_hostname(&self) -> String {
        self.parent_hostname
            .as_deref()
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .or_else(|| self.referrer.as_deref().and_then(url_host))
            .unwrap_or_else(|| self.hostname.clone())
    }
}

/// Hostname part of a URL, if it has one.
fn url_host(referrer: &str) -> Option<String> {
    let url = Url::parse(referrer.trim()).ok()?;
    url.host_str()
        .filter(|host| !host.is_empty())
        .map(str::to_ascii_lowercase)
}
