//! Core engine data types
//!
//! `TipIntent` is ephemeral parser output; `Tip` is the persisted ledger row.
//! Intents exist only for the duration of one processing pass and are never
//! stored.

/// A structured tip extracted from one syntactic occurrence of the trigger
///
/// The amount is still the raw captured string at this stage; normalization
/// happens in the validation pipeline, not the parser. The recipient has
/// already been resolved (explicit `u/name`, or the parent comment's author
/// when omitted) because occurrences with no resolvable recipient are dropped
/// inside the parser.
#[derive(Debug, Clone)]
pub struct TipIntent {
    pub sender: String,
    pub recipient: String,
    /// True when the recipient was typed explicitly rather than inferred
    /// from the parent comment
    pub explicit_recipient: bool,
    pub raw_amount: String,
    pub token: crate::engine::tokens::TokenResolution,
    pub content_id: String,
    pub parent_content_id: String,
    pub submission_id: String,
    pub community: String,
}

/// A validated tip ready for (or read back from) the ledger
///
/// Invariants enforced upstream: amount > 0 with 5 decimal places, sender !=
/// recipient, token is a member of the community's configured set. Weight is
/// informational vote metadata in [0.0, 1.0] and never gates persistence.
#[derive(Debug, Clone)]
pub struct Tip {
    pub sender: String,
    pub recipient: String,
    pub amount: f64,
    pub weight: f64,
    pub token: String,
    pub content_id: String,
    pub parent_content_id: String,
    pub submission_id: String,
    pub community: String,
}

/// Terminal result of processing one comment
///
/// Exposed to callers for logging and retry decisions: only `Deferred`
/// should be retried (via stream redelivery); everything else is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Valid tips written to the ledger together with the marker
    Persisted,
    /// Every parsed intent failed validation; reply explains why
    Rejected,
    /// Recognized and answered without touching the tip ledger
    /// (status/sub queries, registration, fallback link)
    Replied,
    /// Marker already present; redelivered comment, nothing done
    AlreadyProcessed,
    /// Infrastructure failure; marker not written, safe to redeliver
    Deferred,
}

/// What a command handler hands back to the dispatcher
#[derive(Debug, Clone)]
pub struct CommandReply {
    pub outcome: Outcome,
    pub reply: Option<String>,
}

impl CommandReply {
    pub fn new(outcome: Outcome, reply: Option<String>) -> Self {
        Self { outcome, reply }
    }

    pub fn silent(outcome: Outcome) -> Self {
        Self {
            outcome,
            reply: None,
        }
    }
}
