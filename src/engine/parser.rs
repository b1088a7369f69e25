//! Tip parser - extracts structured tip intents from free-text comments
//!
//! Pure function of (comment, token registry): no registry writes, no side
//! effects beyond logging, deterministic and restartable on redelivery.
//!
//! Normative grammar, per occurrence, applied line by line against the
//! lowercased body:
//!
//! ```text
//! TRIGGER [u/RECIPIENT] AMOUNT [TOKEN]
//! ```
//!
//! - RECIPIENT omitted -> the parent comment's author; if the parent has no
//!   resolvable author the occurrence is dropped silently (logged only).
//! - TOKEN omitted -> the community's configured default token.
//! - TOKEN present -> case-insensitive, plural-tolerant registry lookup; a
//!   miss is carried forward as an unknown-token resolution for the
//!   validation pipeline to reject.
//! - AMOUNT is captured raw; normalization belongs to validation.

use crate::engine::tokens::{TokenRegistry, TokenResolution};
use crate::engine::types::TipIntent;
use crate::stream::CommentEvent;
use once_cell::sync::Lazy;
use regex::Regex;

static LINE_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r|\n").unwrap());

/// Compiled tip grammar for one trigger
pub struct TipParser {
    grammar: Regex,
}

impl TipParser {
    /// Compile the grammar for a literal trigger token
    pub fn new(trigger: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let pattern = format!(
            r"{}\s+(?:u/([a-z0-9_\-]+)\s+)?([0-9]*\.?[0-9]+)\s*([a-z0-9_]+)?",
            regex::escape(&trigger.to_lowercase())
        );
        Ok(Self {
            grammar: Regex::new(&pattern)?,
        })
    }

    /// Extract ordered tip intents from one comment
    ///
    /// Returns one intent per syntactic occurrence on any line, in text
    /// order. Occurrences whose recipient cannot be resolved are dropped.
    pub fn parse(&self, comment: &CommentEvent, registry: &TokenRegistry) -> Vec<TipIntent> {
        let mut intents = Vec::new();
        let body = comment.body.to_lowercase();
        let community = TokenRegistry::normalize_community(&comment.community);

        for line in LINE_SPLIT.split(&body) {
            for caps in self.grammar.captures_iter(line) {
                log::info!("  tip intent detected");

                let (recipient, explicit_recipient) = match caps.get(1) {
                    Some(m) => (m.as_str().to_string(), true),
                    None => match &comment.parent_author {
                        Some(author) => (author.clone(), false),
                        None => {
                            // Known edge case: deleted/missing parent author.
                            // Dropped without a user-facing error.
                            log::warn!(
                                "  parent author missing for {}, skipping tip",
                                comment.content_id
                            );
                            continue;
                        }
                    },
                };

                let raw_amount = caps[2].to_string();

                let token = match caps.get(3) {
                    Some(m) => registry.resolve(&community, m.as_str()),
                    None => match registry.default_token(&community) {
                        Some(name) => TokenResolution::Resolved(name.to_string()),
                        None => {
                            // Community with no token table configured;
                            // nothing can be tipped here.
                            log::warn!("  no tokens configured for {}, skipping tip", community);
                            continue;
                        }
                    },
                };

                intents.push(TipIntent {
                    sender: comment.author.clone(),
                    recipient,
                    explicit_recipient,
                    raw_amount,
                    token,
                    content_id: comment.content_id.clone(),
                    parent_content_id: comment.parent_content_id.clone(),
                    submission_id: comment.submission_id.clone(),
                    community: community.clone(),
                });
            }
        }

        intents
    }
}
