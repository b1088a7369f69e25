//! # Command Parsing & Ledger Engine
//!
//! Turns free-text comments into validated, atomically-persisted tip records
//! with exactly-once processing across restarts.
//!
//! ## Pipeline
//!
//! ```text
//! CommentEvent
//!     ↓
//! Dispatcher (ordered trigger/handler table)
//!     ↓
//! TipEngine::process_comment()
//!     ↓
//! TipParser (grammar: TRIGGER [u/RECIPIENT] AMOUNT [TOKEN])
//!     ↓
//! validate_intent() (token, self-tip, amount, registration)
//!     ↓
//! WeightCache (vote metadata, never a gate)
//!     ↓
//! LedgerDb::write_tips() (tips + marker, one transaction)
//! ```
//!
//! Per comment the state machine is
//! `Seen → Recognized → Parsed → Validated → (Rejected | Persisted)`;
//! the tip ledger is append-only after that.
//!
//! ## Module Organization
//!
//! - `types` - Tip intents, persisted tips, processing outcomes
//! - `tokens` - Per-community token registry (pure lookup)
//! - `recognizer` - Whole-token command trigger matching
//! - `parser` - Grammar extraction, zero or more intents per comment
//! - `validate` - Business rules and amount normalization
//! - `weights` - TTL-cached governance weight snapshot
//! - `ledger` - SQLite store: users, tips, idempotency markers
//! - `rounds` - Read-side aggregation over the active distribution round
//! - `engine` - Per-comment orchestration and reply text
//! - `register` - Payout-address registration command
//! - `dispatch` - Ordered (trigger, handler) command table

pub mod dispatch;
pub mod engine;
pub mod ledger;
pub mod parser;
pub mod recognizer;
pub mod register;
pub mod rounds;
pub mod tokens;
pub mod types;
pub mod validate;
pub mod weights;

// Re-export commonly used types
pub use dispatch::{CommandHandler, Dispatcher};
pub use engine::TipEngine;
pub use ledger::{LedgerDb, UserRecord, WriteOutcome};
pub use parser::TipParser;
pub use recognizer::CommandTrigger;
pub use register::RegisterCommand;
pub use rounds::{DistributionRound, RoundAggregator, TokenRoundStatus, TokenTotal};
pub use tokens::{TokenRegistry, TokenResolution};
pub use types::{CommandReply, Outcome, Tip, TipIntent};
pub use validate::{normalize_amount, validate_intent, TipVerdict};
pub use weights::{HttpWeightProvider, WeightCache, WeightProvider};
