//! Tip engine - per-comment pipeline orchestration
//!
//! Drives one comment through `Seen -> Recognized -> Parsed -> Validated ->
//! (Rejected | Persisted)`. Terminal states either reply without touching the
//! ledger or commit all valid tips plus the processing marker atomically.
//! Infrastructure failures surface as a single "try again later" reply with
//! no marker written, so stream redelivery retries the comment from the top.
//!
//! The `!tip status` and `!tip sub` subcommands are answered from the round
//! aggregator; a recognized comment that parses to zero tips falls back to an
//! on-chain tipping deep link.

use crate::engine::dispatch::CommandHandler;
use crate::engine::ledger::{LedgerDb, WriteOutcome};
use crate::engine::parser::TipParser;
use crate::engine::recognizer::CommandTrigger;
use crate::engine::rounds::RoundAggregator;
use crate::engine::tokens::TokenRegistry;
use crate::engine::types::{CommandReply, Outcome, Tip};
use crate::engine::validate::{validate_intent, TipVerdict};
use crate::engine::weights::WeightCache;
use crate::stream::CommentEvent;
use regex::Regex;
use std::sync::{Arc, Mutex};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Marker command name for everything the tip engine does
const COMMAND: &str = "tip";

pub struct TipEngine {
    trigger: CommandTrigger,
    parser: TipParser,
    tokens: TokenRegistry,
    ledger: Arc<LedgerDb>,
    rounds: RoundAggregator,
    weights: Arc<Mutex<WeightCache>>,
    status_re: Regex,
    sub_re: Regex,
    register_url: String,
    tip_link_base: String,
}

impl TipEngine {
    pub fn new(
        trigger: &str,
        tokens: TokenRegistry,
        ledger: Arc<LedgerDb>,
        weights: Arc<Mutex<WeightCache>>,
        register_url: String,
        tip_link_base: String,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let escaped = regex::escape(&trigger.to_lowercase());
        let rounds = RoundAggregator::new(ledger.connection(), ledger.timestamp_fn());

        Ok(Self {
            trigger: CommandTrigger::new(&[trigger])?,
            parser: TipParser::new(trigger)?,
            tokens,
            ledger,
            rounds,
            weights,
            status_re: Regex::new(&format!(r"{}\s+status", escaped))?,
            sub_re: Regex::new(&format!(r"{}\s+sub", escaped))?,
            register_url,
            tip_link_base,
        })
    }

    /// Process one comment to a terminal state
    ///
    /// Never returns an error: infrastructure failures collapse into a
    /// deferred outcome with the generic retry reply and no marker.
    pub fn process_comment(&self, comment: &CommentEvent) -> CommandReply {
        log::info!(
            "process tip command - content_id: {} | author: {}",
            comment.content_id,
            comment.author
        );

        match self.try_process(comment) {
            Ok(reply) => reply,
            Err(e) => {
                log::error!("❌ Failed to process {}: {}", comment.content_id, e);
                CommandReply::new(
                    Outcome::Deferred,
                    Some(self.sign(format!(
                        "❌ Sorry u/{}, I was unable to process your tip at this time.  Please try again later!",
                        comment.author
                    ))),
                )
            }
        }
    }

    fn try_process(
        &self,
        comment: &CommentEvent,
    ) -> Result<CommandReply, Box<dyn std::error::Error>> {
        if self.ledger.has_processed(&comment.content_id, COMMAND)? {
            log::info!("  previously processed...");
            return Ok(CommandReply::silent(Outcome::AlreadyProcessed));
        }

        let body = comment.body.to_lowercase();
        if self.status_re.is_match(&body) {
            return self.handle_status(comment);
        }
        if self.sub_re.is_match(&body) {
            return self.handle_sub(comment);
        }

        let intents = self.parser.parse(comment, &self.tokens);
        if intents.is_empty() {
            return self.handle_fallback_link(comment);
        }

        // Validate in text order, assembling the combined reply as we go
        let mut messages = Vec::with_capacity(intents.len());
        let mut valid_tips: Vec<Tip> = Vec::new();

        for intent in &intents {
            match validate_intent(intent, &self.ledger, &self.register_url)? {
                TipVerdict::Rejected { reply } => messages.push(reply),
                TipVerdict::Valid {
                    mut tip,
                    recipient_registered,
                } => {
                    tip.weight = self
                        .weights
                        .lock()
                        .unwrap()
                        .weight_for(&tip.sender, tip.amount);
                    messages.push(self.success_message(&tip, recipient_registered));
                    valid_tips.push(tip);
                }
            }
        }

        let reply = messages.join("\n\n");

        if valid_tips.is_empty() {
            self.ledger.set_processed(&comment.content_id, COMMAND)?;
            return Ok(CommandReply::new(Outcome::Rejected, Some(self.sign(reply))));
        }

        match self
            .ledger
            .write_tips(&valid_tips, &comment.content_id, COMMAND)?
        {
            WriteOutcome::Written(count) => {
                log::info!("  persisted {} tip(s)", count);
                Ok(CommandReply::new(Outcome::Persisted, Some(self.sign(reply))))
            }
            WriteOutcome::AlreadyProcessed => {
                // Redelivery raced us between the top-of-pipeline check and
                // the transaction; the first delivery already replied
                log::info!("  previously processed...");
                Ok(CommandReply::silent(Outcome::AlreadyProcessed))
            }
            WriteOutcome::Nothing => Ok(CommandReply::silent(Outcome::Rejected)),
        }
    }

    /// `!tip status` - the author's sent/received summary for the round
    fn handle_status(
        &self,
        comment: &CommentEvent,
    ) -> Result<CommandReply, Box<dyn std::error::Error>> {
        log::info!("  user checking status");
        let author = &comment.author;

        let registered = self
            .ledger
            .lookup_user(author)?
            .map(|u| u.address.is_some())
            .unwrap_or(false);

        if !registered {
            log::info!("  user not registered");
            self.ledger.set_processed(&comment.content_id, COMMAND)?;
            return Ok(CommandReply::new(
                Outcome::Replied,
                Some(self.sign(format!(
                    "Sorry u/{}, you are not registered.  Please use the !register command to register!",
                    author
                ))),
            ));
        }

        let community = TokenRegistry::normalize_community(&comment.community);
        let sent = self.rounds.tips_sent_in_round(author, &community)?;
        let received = self.rounds.tips_received_in_round(author, &community)?;

        let mut reply = format!(
            "u/{} has had the following tip activity this round:\n",
            author
        );

        if sent.is_empty() {
            reply.push_str(&format!("- **SENT:** u/{} 0 (0 tips sent)\n", author));
        } else {
            for total in &sent {
                reply.push_str(&format!(
                    "- **SENT:** {} {} ({} tips sent)\n",
                    round5(total.amount),
                    total.token,
                    total.count
                ));
            }
        }

        if received.is_empty() {
            reply.push_str(&format!("- **RECEIVED:** u/{} 0 (0 tips received)\n", author));
        } else {
            for total in &received {
                reply.push_str(&format!(
                    "- **RECEIVED:** {} {} ({} tips received)\n",
                    round5(total.amount),
                    total.token,
                    total.count
                ));
            }
        }

        self.ledger.set_processed(&comment.content_id, COMMAND)?;
        Ok(CommandReply::new(Outcome::Replied, Some(self.sign(reply))))
    }

    /// `!tip sub` - the community's round digest plus its valid token list
    fn handle_sub(
        &self,
        comment: &CommentEvent,
    ) -> Result<CommandReply, Box<dyn std::error::Error>> {
        log::info!("  sub status");
        let community = TokenRegistry::normalize_community(&comment.community);
        let status = self.rounds.sub_status(&community)?;

        let mut reply = if status.is_empty() {
            format!("Nobody has tipped in r/{} this round", community)
        } else {
            let mut text = format!(
                "r/{} has had the following tips this round:\n\n",
                community
            );
            for token in &status {
                text.push_str(&format!(
                    "&ensp;&ensp;{} {} ({} tips total, {} average)\n\n",
                    round5(token.amount),
                    token.token,
                    token.count,
                    round2(token.average)
                ));
            }
            text
        };

        if let Some(tokens) = self.tokens.tokens_for(&community) {
            reply.push_str(&format!("\n\nValid tokens for r/{} are:\n\n", community));
            for token in tokens {
                reply.push_str(&format!(
                    "&ensp;&ensp;{}{}\n\n",
                    token.name,
                    if token.is_default { " (default)" } else { "" }
                ));
            }
        }

        self.ledger.set_processed(&comment.content_id, COMMAND)?;
        Ok(CommandReply::new(Outcome::Replied, Some(self.sign(reply))))
    }

    /// Bare `!tip` (or an occurrence the grammar could not use): reply with
    /// the on-chain tipping deep link instead
    fn handle_fallback_link(
        &self,
        comment: &CommentEvent,
    ) -> Result<CommandReply, Box<dyn std::error::Error>> {
        log::info!("  on-chain tipping (or fallback)");

        let mut desktop = format!(
            "{}?action=tip&contentId={}",
            self.tip_link_base, comment.parent_content_id
        );

        // Direct-to-recipient params only when the parent is a comment by a
        // registered user
        if comment.parent_content_id.starts_with("t1_") {
            if let Some(parent_author) = &comment.parent_author {
                if let Some(user) = self.ledger.lookup_user(parent_author)? {
                    if let Some(address) = user.address {
                        desktop.push_str(&format!(
                            "&recipient={}&address={}",
                            user.username, address
                        ));
                    }
                }
            }
        }

        let mobile = format!("https://metamask.app.link/dapp/{}", desktop);
        let reply = format!(
            "**[Leave a tip]** [Desktop]({}) | [Mobile (Metamask Only)]({})",
            desktop, mobile
        );

        self.ledger.set_processed(&comment.content_id, COMMAND)?;
        Ok(CommandReply::new(Outcome::Replied, Some(self.sign(reply))))
    }

    fn success_message(&self, tip: &Tip, recipient_registered: bool) -> String {
        let mut message = format!(
            "u/{} has tipped u/{} {} {} (weight: {})",
            tip.sender, tip.recipient, tip.amount, tip.token, tip.weight
        );

        if !recipient_registered {
            log::info!("  recipient is not registered");
            message.push_str(&format!(
                "\n\n⚠️ u/{} is not currently registered and will not receive this tip unless they [register]({}) before this round ends.",
                tip.recipient, self.register_url
            ));
        }

        message
    }

    fn sign(&self, reply: String) -> String {
        format!(
            "{}\n\n^(tipstream {} | Learn more about [tipping]({}))",
            reply, VERSION, self.register_url
        )
    }
}

impl CommandHandler for TipEngine {
    fn name(&self) -> &'static str {
        COMMAND
    }

    fn trigger(&self) -> &CommandTrigger {
        &self.trigger
    }

    fn handle(&self, comment: &CommentEvent) -> CommandReply {
        self.process_comment(comment)
    }
}

fn round5(value: f64) -> f64 {
    (value * 100_000.0).round() / 100_000.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tokens::{CommunityTokenEntry, TokenEntry};
    use crate::engine::weights::WeightRecord;
    use tempfile::NamedTempFile;

    const ADDR_A: &str = "0x00000000000000000000000000000000000000aa";
    const ADDR_B: &str = "0x00000000000000000000000000000000000000bb";

    struct Fixture {
        _temp: NamedTempFile,
        engine: TipEngine,
        ledger: Arc<LedgerDb>,
    }

    fn make_engine(now: i64) -> Fixture {
        let temp = NamedTempFile::new().unwrap();
        let ledger = Arc::new(
            LedgerDb::open_with_timestamp_fn(temp.path(), Arc::new(move || now)).unwrap(),
        );

        let tokens = TokenRegistry::from_entries(vec![CommunityTokenEntry {
            community: "ethtrader".to_string(),
            tokens: vec![
                TokenEntry {
                    name: "donut".to_string(),
                    is_default: true,
                },
                TokenEntry {
                    name: "contrib".to_string(),
                    is_default: false,
                },
            ],
        }]);

        let mut cache =
            WeightCache::new_with_timestamp_fn(20_000, 3600, Arc::new(move || now));
        cache.install(vec![WeightRecord {
            username: "alice".to_string(),
            weight: 10_000,
        }]);

        let engine = TipEngine::new(
            "!tip",
            tokens,
            Arc::clone(&ledger),
            Arc::new(Mutex::new(cache)),
            "https://example.org/register".to_string(),
            "https://tips.example.org/tip/".to_string(),
        )
        .unwrap();

        Fixture {
            _temp: temp,
            engine,
            ledger,
        }
    }

    fn make_comment(id: &str, body: &str, author: &str, parent_author: Option<&str>) -> CommentEvent {
        CommentEvent {
            content_id: id.to_string(),
            body: body.to_string(),
            author: author.to_string(),
            parent_content_id: "t1_parent".to_string(),
            parent_author: parent_author.map(|s| s.to_string()),
            submission_id: "sub1".to_string(),
            community: "ethtrader".to_string(),
        }
    }

    #[test]
    fn test_valid_tip_persists_and_replies() {
        let fx = make_engine(1500);
        fx.ledger.insert_round(1, "ethtrader", 1000, 2000).unwrap();
        fx.ledger.upsert_address("alice", ADDR_A, "t1_r").unwrap();
        fx.ledger.upsert_address("bob", ADDR_B, "t1_r2").unwrap();

        let reply = fx
            .engine
            .process_comment(&make_comment("t1_c1", "!tip u/bob 5 donut", "alice", None));

        assert_eq!(reply.outcome, Outcome::Persisted);
        let text = reply.reply.unwrap();
        assert!(text.contains("u/alice has tipped u/bob 5 donut (weight: 0.5)"));
        assert!(!text.contains("not currently registered"));
        assert!(fx.ledger.has_processed("t1_c1", "tip").unwrap());
    }

    #[test]
    fn test_redelivered_comment_is_silent_noop() {
        let fx = make_engine(1500);
        fx.ledger.upsert_address("alice", ADDR_A, "t1_r").unwrap();

        let comment = make_comment("t1_c1", "!tip u/bob 5 donut", "alice", None);
        let first = fx.engine.process_comment(&comment);
        assert_eq!(first.outcome, Outcome::Persisted);

        let second = fx.engine.process_comment(&comment);
        assert_eq!(second.outcome, Outcome::AlreadyProcessed);
        assert!(second.reply.is_none());
    }

    #[test]
    fn test_self_tip_rejected_no_rows() {
        let fx = make_engine(1500);
        fx.ledger.upsert_address("alice", ADDR_A, "t1_r").unwrap();

        let reply = fx
            .engine
            .process_comment(&make_comment("t1_c1", "!tip u/alice 5 donut", "alice", None));

        assert_eq!(reply.outcome, Outcome::Rejected);
        assert!(reply.reply.unwrap().contains("cannot tip yourself"));

        // Rejections never write ledger rows but do mark the comment
        let agg = RoundAggregator::new(fx.ledger.connection(), fx.ledger.timestamp_fn());
        fx.ledger.insert_round(1, "ethtrader", 1000, 2000).unwrap();
        assert!(agg.tips_sent_in_round("alice", "ethtrader").unwrap().is_empty());
        assert!(fx.ledger.has_processed("t1_c1", "tip").unwrap());
    }

    #[test]
    fn test_multi_tip_partial_validity() {
        // One good tip and one self-tip in the same comment: the good one
        // persists, the reply explains both
        let fx = make_engine(1500);
        fx.ledger.upsert_address("alice", ADDR_A, "t1_r").unwrap();
        fx.ledger.upsert_address("bob", ADDR_B, "t1_r2").unwrap();

        let body = "!tip u/bob 5 donut\n!tip u/alice 3 donut";
        let reply = fx
            .engine
            .process_comment(&make_comment("t1_c1", body, "alice", None));

        assert_eq!(reply.outcome, Outcome::Persisted);
        let text = reply.reply.unwrap();
        assert!(text.contains("has tipped u/bob 5 donut"));
        assert!(text.contains("cannot tip yourself"));
    }

    #[test]
    fn test_unregistered_recipient_warning() {
        let fx = make_engine(1500);
        fx.ledger.upsert_address("alice", ADDR_A, "t1_r").unwrap();

        let reply = fx
            .engine
            .process_comment(&make_comment("t1_c1", "!tip u/newcomer 5", "alice", None));

        assert_eq!(reply.outcome, Outcome::Persisted);
        let text = reply.reply.unwrap();
        assert!(text.contains("u/newcomer is not currently registered"));
    }

    #[test]
    fn test_implicit_recipient_from_parent() {
        let fx = make_engine(1500);
        fx.ledger.upsert_address("alice", ADDR_A, "t1_r").unwrap();

        let reply = fx
            .engine
            .process_comment(&make_comment("t1_c1", "!tip 2.5", "alice", Some("carol")));

        assert_eq!(reply.outcome, Outcome::Persisted);
        assert!(reply.reply.unwrap().contains("has tipped u/carol 2.5 donut"));
    }

    #[test]
    fn test_bare_tip_falls_back_to_link() {
        let fx = make_engine(1500);
        fx.ledger.upsert_address("carol", ADDR_B, "t1_r").unwrap();

        let reply = fx
            .engine
            .process_comment(&make_comment("t1_c1", "!tip", "alice", Some("carol")));

        assert_eq!(reply.outcome, Outcome::Replied);
        let text = reply.reply.unwrap();
        assert!(text.contains("**[Leave a tip]**"));
        assert!(text.contains("recipient=carol"));
        assert!(text.contains(ADDR_B));
        assert!(fx.ledger.has_processed("t1_c1", "tip").unwrap());
    }

    #[test]
    fn test_fallback_link_without_registered_parent() {
        let fx = make_engine(1500);

        let reply = fx
            .engine
            .process_comment(&make_comment("t1_c1", "!tip", "alice", Some("ghost")));

        assert_eq!(reply.outcome, Outcome::Replied);
        let text = reply.reply.unwrap();
        assert!(text.contains("contentId=t1_parent"));
        assert!(!text.contains("recipient="));
    }

    #[test]
    fn test_status_unregistered_author() {
        let fx = make_engine(1500);

        let reply = fx
            .engine
            .process_comment(&make_comment("t1_c1", "!tip status", "ghost", None));

        assert_eq!(reply.outcome, Outcome::Replied);
        assert!(reply.reply.unwrap().contains("you are not registered"));
    }

    #[test]
    fn test_status_reports_sent_and_received() {
        let fx = make_engine(1500);
        fx.ledger.insert_round(1, "ethtrader", 1000, 2000).unwrap();
        fx.ledger.upsert_address("alice", ADDR_A, "t1_r").unwrap();
        fx.ledger.upsert_address("bob", ADDR_B, "t1_r2").unwrap();

        fx.engine
            .process_comment(&make_comment("t1_c1", "!tip u/bob 5 donut", "alice", None));

        let reply = fx
            .engine
            .process_comment(&make_comment("t1_c2", "!tip status", "alice", None));
        assert_eq!(reply.outcome, Outcome::Replied);
        let text = reply.reply.unwrap();
        assert!(text.contains("- **SENT:** 5 donut (1 tips sent)"));
        assert!(text.contains("- **RECEIVED:** u/alice 0 (0 tips received)"));

        let reply = fx
            .engine
            .process_comment(&make_comment("t1_c3", "!tip status", "bob", None));
        assert!(reply
            .reply
            .unwrap()
            .contains("- **RECEIVED:** 5 donut (1 tips received)"));
    }

    #[test]
    fn test_sub_status_lists_tokens() {
        let fx = make_engine(1500);
        fx.ledger.insert_round(1, "ethtrader", 1000, 2000).unwrap();
        fx.ledger.upsert_address("alice", ADDR_A, "t1_r").unwrap();

        fx.engine
            .process_comment(&make_comment("t1_c1", "!tip u/bob 4 donut", "alice", None));

        let reply = fx
            .engine
            .process_comment(&make_comment("t1_c2", "!tip sub", "carol", None));
        assert_eq!(reply.outcome, Outcome::Replied);
        let text = reply.reply.unwrap();
        assert!(text.contains("4 donut (1 tips total, 4 average)"));
        assert!(text.contains("donut (default)"));
        assert!(text.contains("contrib"));
    }

    #[test]
    fn test_sub_status_empty_round() {
        let fx = make_engine(1500);
        fx.ledger.insert_round(1, "ethtrader", 1000, 2000).unwrap();

        let reply = fx
            .engine
            .process_comment(&make_comment("t1_c1", "!tip sub", "carol", None));
        assert!(reply
            .reply
            .unwrap()
            .contains("Nobody has tipped in r/ethtrader this round"));
    }

    #[test]
    fn test_weight_zero_for_unknown_sender() {
        let fx = make_engine(1500);
        fx.ledger.upsert_address("dave", ADDR_A, "t1_r").unwrap();

        let reply = fx
            .engine
            .process_comment(&make_comment("t1_c1", "!tip u/bob 5", "dave", None));
        assert!(reply.reply.unwrap().contains("(weight: 0)"));
    }
}
