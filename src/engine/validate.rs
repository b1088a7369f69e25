//! Validation pipeline - business rules between parser and ledger
//!
//! Applied per intent, in order: token validity, self-tip check, amount
//! normalization, sender registration, recipient existence. The first
//! failing check wins and attaches the single user-facing message; later
//! checks are skipped. No side effects beyond registry reads.
//!
//! Recipient existence is not a gate: a tip to an unregistered handle still
//! persists, but the success reply carries a warning that the recipient must
//! register before the round closes to receive it.

use crate::engine::ledger::LedgerDb;
use crate::engine::tokens::TokenResolution;
use crate::engine::types::{Tip, TipIntent};

/// Largest accepted integer part: 10 digits
const AMOUNT_OVERFLOW: f64 = 10_000_000_000.0;

/// Outcome of validating one intent
#[derive(Debug, Clone)]
pub enum TipVerdict {
    /// Executable tip; weight is filled in by the caller before persistence.
    /// `recipient_registered` drives the registration warning in the reply.
    Valid {
        tip: Tip,
        recipient_registered: bool,
    },
    /// Terminal per-intent failure with its user-facing message
    Rejected { reply: String },
}

/// Parse and normalize a raw amount string
///
/// Rounds to 5 decimal places. Rejects unparseable input, non-positive
/// values and values whose integer part exceeds 10 digits. Normalization is
/// idempotent: feeding a normalized value back in returns it unchanged.
pub fn normalize_amount(raw: &str) -> Option<f64> {
    let parsed: f64 = raw.trim().parse().ok()?;
    if !parsed.is_finite() {
        return None;
    }

    let rounded = (parsed * 100_000.0).round() / 100_000.0;
    if rounded <= 0.0 {
        return None;
    }
    if rounded.trunc() >= AMOUNT_OVERFLOW {
        return None;
    }

    Some(rounded)
}

/// Run the validation pipeline over one intent
///
/// Registry reads can fail on infrastructure trouble; that error propagates
/// so the caller can defer the whole comment instead of rejecting it.
pub fn validate_intent(
    intent: &TipIntent,
    ledger: &LedgerDb,
    register_url: &str,
) -> Result<TipVerdict, Box<dyn std::error::Error>> {
    let sender = &intent.sender;

    // 1. Token validity (plural-tolerant lookup already happened in the parser)
    let token = match &intent.token {
        TokenResolution::Resolved(name) => name.clone(),
        TokenResolution::Unknown(raw) => {
            return Ok(TipVerdict::Rejected {
                reply: format!(
                    "❌ Sorry u/{}, `{}` is not a valid token for this sub.",
                    sender, raw
                ),
            });
        }
    };

    // 2. Self-tip check
    if sender.to_lowercase() == intent.recipient.to_lowercase() {
        log::info!("  attempted self tipping");
        return Ok(TipVerdict::Rejected {
            reply: format!("❌ Sorry u/{}, you cannot tip yourself!", sender),
        });
    }

    // 3. Amount normalization
    let amount = match normalize_amount(&intent.raw_amount) {
        Some(amount) => amount,
        None => {
            log::info!("  invalid amount: {:?}", intent.raw_amount);
            return Ok(TipVerdict::Rejected {
                reply: format!("❌ Sorry u/{}, that amount is invalid!", sender),
            });
        }
    };

    // 4 & 5. Sender registration and recipient existence, one lookup
    let found = ledger.lookup_users(&[sender.as_str(), intent.recipient.as_str()])?;

    let sender_registered = found
        .iter()
        .any(|u| u.username.to_lowercase() == sender.to_lowercase());

    // Adopt the registry's casing of the recipient handle when known
    let mut recipient = intent.recipient.clone();
    let mut recipient_registered = false;
    if let Some(user) = found
        .iter()
        .find(|u| u.username.to_lowercase() == intent.recipient.to_lowercase())
    {
        recipient = user.username.clone();
        recipient_registered = true;
    }

    if !sender_registered {
        log::info!("  sender not registered");
        return Ok(TipVerdict::Rejected {
            reply: format!(
                "❌ Sorry u/{} - you are not registered.  Please use the [!register command]({}) to register.",
                sender, register_url
            ),
        });
    }

    Ok(TipVerdict::Valid {
        tip: Tip {
            sender: sender.clone(),
            recipient,
            amount,
            weight: 0.0,
            token,
            content_id: intent.content_id.clone(),
            parent_content_id: intent.parent_content_id.clone(),
            submission_id: intent.submission_id.clone(),
            community: intent.community.clone(),
        },
        recipient_registered,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    const ADDR: &str = "0x00000000000000000000000000000000000000aa";

    fn make_db() -> (NamedTempFile, LedgerDb) {
        let temp = NamedTempFile::new().unwrap();
        let db =
            LedgerDb::open_with_timestamp_fn(temp.path(), Arc::new(|| 1_700_000_000)).unwrap();
        (temp, db)
    }

    fn make_intent(sender: &str, recipient: &str, raw_amount: &str, token: TokenResolution) -> TipIntent {
        TipIntent {
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            explicit_recipient: true,
            raw_amount: raw_amount.to_string(),
            token,
            content_id: "t1_comment".to_string(),
            parent_content_id: "t1_parent".to_string(),
            submission_id: "sub1".to_string(),
            community: "ethtrader".to_string(),
        }
    }

    fn resolved(token: &str) -> TokenResolution {
        TokenResolution::Resolved(token.to_string())
    }

    #[test]
    fn test_normalize_amount_basic() {
        assert_eq!(normalize_amount("421.68"), Some(421.68));
        assert_eq!(normalize_amount("0000025"), Some(25.0));
        assert_eq!(normalize_amount(".54"), Some(0.54));
        assert_eq!(normalize_amount("0.54"), Some(0.54));
        assert_eq!(normalize_amount("10"), Some(10.0));
    }

    #[test]
    fn test_normalize_amount_rounds_to_five_places() {
        assert_eq!(normalize_amount("0.54000005"), Some(0.54));
        assert_eq!(normalize_amount("0.540009"), Some(0.54001));
    }

    #[test]
    fn test_normalize_amount_idempotent() {
        let first = normalize_amount("0.540009").unwrap();
        let second = normalize_amount(&first.to_string()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_normalize_amount_overflow_guard() {
        // 10 integer digits is the ceiling
        assert_eq!(normalize_amount("9999999999"), Some(9_999_999_999.0));
        assert_eq!(
            normalize_amount("9999999999.22222"),
            Some(9_999_999_999.22222)
        );
        assert_eq!(normalize_amount("99999999999"), None);
        assert_eq!(normalize_amount("10000000000"), None);
    }

    #[test]
    fn test_normalize_amount_rejects_garbage() {
        assert_eq!(normalize_amount("0"), None);
        assert_eq!(normalize_amount("-5"), None);
        assert_eq!(normalize_amount("abc"), None);
        assert_eq!(normalize_amount(""), None);
        assert_eq!(normalize_amount("nan"), None);
        assert_eq!(normalize_amount("inf"), None);
    }

    #[test]
    fn test_unknown_token_rejected_first() {
        let (_temp, db) = make_db();
        let intent = make_intent("alice", "bob", "5", TokenResolution::Unknown("moons".to_string()));

        match validate_intent(&intent, &db, "https://example.org").unwrap() {
            TipVerdict::Rejected { reply } => {
                assert!(reply.contains("not a valid token for this sub"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_self_tip_rejected_case_insensitive() {
        let (_temp, db) = make_db();
        db.upsert_address("Alice", ADDR, "t1_reg").unwrap();

        let intent = make_intent("Alice", "alice", "5", resolved("donut"));
        match validate_intent(&intent, &db, "https://example.org").unwrap() {
            TipVerdict::Rejected { reply } => assert!(reply.contains("cannot tip yourself")),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_amount_rejected() {
        let (_temp, db) = make_db();
        db.upsert_address("alice", ADDR, "t1_reg").unwrap();

        for raw in ["0", "-1", "99999999999", "five"] {
            let intent = make_intent("alice", "bob", raw, resolved("donut"));
            match validate_intent(&intent, &db, "https://example.org").unwrap() {
                TipVerdict::Rejected { reply } => assert!(reply.contains("that amount is invalid")),
                other => panic!("expected rejection for {:?}, got {:?}", raw, other),
            }
        }
    }

    #[test]
    fn test_unregistered_sender_rejected() {
        let (_temp, db) = make_db();

        let intent = make_intent("ghost", "bob", "5", resolved("donut"));
        match validate_intent(&intent, &db, "https://example.org/reg").unwrap() {
            TipVerdict::Rejected { reply } => {
                assert!(reply.contains("you are not registered"));
                assert!(reply.contains("https://example.org/reg"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_unregistered_recipient_still_valid() {
        let (_temp, db) = make_db();
        db.upsert_address("alice", ADDR, "t1_reg").unwrap();

        let intent = make_intent("alice", "newcomer", "5", resolved("donut"));
        match validate_intent(&intent, &db, "https://example.org").unwrap() {
            TipVerdict::Valid {
                tip,
                recipient_registered,
            } => {
                assert!(!recipient_registered);
                assert_eq!(tip.recipient, "newcomer");
                assert_eq!(tip.amount, 5.0);
            }
            other => panic!("expected valid, got {:?}", other),
        }
    }

    #[test]
    fn test_recipient_casing_adopted_from_registry() {
        let (_temp, db) = make_db();
        db.upsert_address("alice", ADDR, "t1_a").unwrap();
        db.upsert_address("BobTheBuilder", ADDR, "t1_b").unwrap();

        let intent = make_intent("alice", "bobthebuilder", "5", resolved("donut"));
        match validate_intent(&intent, &db, "https://example.org").unwrap() {
            TipVerdict::Valid {
                tip,
                recipient_registered,
            } => {
                assert!(recipient_registered);
                assert_eq!(tip.recipient, "BobTheBuilder");
            }
            other => panic!("expected valid, got {:?}", other),
        }
    }

    #[test]
    fn test_first_failure_wins() {
        // Unknown token beats the self-tip and the bad amount
        let (_temp, db) = make_db();
        let intent = make_intent(
            "alice",
            "alice",
            "-3",
            TokenResolution::Unknown("moons".to_string()),
        );
        match validate_intent(&intent, &db, "https://example.org").unwrap() {
            TipVerdict::Rejected { reply } => {
                assert!(reply.contains("not a valid token"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }
}
