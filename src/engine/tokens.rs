//! Token registry - per-community table of accepted token symbols
//!
//! Pure lookup layer. Each community configures an ordered token list with
//! exactly one default. Lookups are case-insensitive and tolerate a trailing
//! plural "s" (a tip of "5 donuts" resolves to the configured "donut")
//! before falling back to an unknown-token result.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// One configured token for a community
#[derive(Debug, Clone, Deserialize)]
pub struct TokenEntry {
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
}

/// Per-community token configuration as it appears in the tokens file
#[derive(Debug, Clone, Deserialize)]
pub struct CommunityTokenEntry {
    pub community: String,
    pub tokens: Vec<TokenEntry>,
}

/// Result of resolving a raw token string against a community's list
#[derive(Debug, Clone, PartialEq)]
pub enum TokenResolution {
    /// Matched a configured token; carries the configured (canonical) name
    Resolved(String),
    /// No configured token matched; carries what the user typed
    Unknown(String),
}

/// Community token tables keyed by normalized community name
pub struct TokenRegistry {
    by_community: HashMap<String, Vec<TokenEntry>>,
}

impl TokenRegistry {
    /// Build a registry from parsed config entries
    ///
    /// Community names are normalized (lowercased, leading "r/" stripped)
    /// so lookups work regardless of how the stream spells the community.
    pub fn from_entries(entries: Vec<CommunityTokenEntry>) -> Self {
        let mut by_community = HashMap::new();
        for entry in entries {
            by_community.insert(Self::normalize_community(&entry.community), entry.tokens);
        }
        Self { by_community }
    }

    /// Load the registry from a JSON tokens file
    ///
    /// File format: `[{"community": "r/name", "tokens": [{"name": "donut", "is_default": true}]}]`
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let raw = fs::read_to_string(path)?;
        let entries: Vec<CommunityTokenEntry> = serde_json::from_str(&raw)?;
        Ok(Self::from_entries(entries))
    }

    /// Normalize a community identifier for lookup
    pub fn normalize_community(community: &str) -> String {
        let lowered = community.to_lowercase();
        match lowered.strip_prefix("r/") {
            Some(stripped) => stripped.to_string(),
            None => lowered,
        }
    }

    /// Token list for a community, if one is configured
    pub fn tokens_for(&self, community: &str) -> Option<&[TokenEntry]> {
        self.by_community
            .get(&Self::normalize_community(community))
            .map(|v| v.as_slice())
    }

    /// The community's configured default token name
    pub fn default_token(&self, community: &str) -> Option<&str> {
        self.tokens_for(community)?
            .iter()
            .find(|t| t.is_default)
            .map(|t| t.name.as_str())
    }

    /// Resolve a raw token string against a community's configured list
    ///
    /// Case-insensitive exact match first, then a plural-tolerant retry with
    /// the trailing "s" stripped. Anything else is `Unknown`.
    pub fn resolve(&self, community: &str, raw: &str) -> TokenResolution {
        let tokens = match self.tokens_for(community) {
            Some(tokens) => tokens,
            None => return TokenResolution::Unknown(raw.to_string()),
        };

        let lowered = raw.to_lowercase();
        if let Some(hit) = tokens.iter().find(|t| t.name.to_lowercase() == lowered) {
            return TokenResolution::Resolved(hit.name.clone());
        }

        // Plural fallback: "donuts" -> "donut"
        if let Some(singular) = lowered.strip_suffix('s') {
            if let Some(hit) = tokens.iter().find(|t| t.name.to_lowercase() == singular) {
                return TokenResolution::Resolved(hit.name.clone());
            }
        }

        TokenResolution::Unknown(raw.to_string())
    }
}
