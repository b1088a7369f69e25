//! Register command - the user registry's write path
//!
//! `!register <address>` stores or replaces the author's payout address;
//! `!register status` reports what is on file. Addresses must be `0x`
//! followed by 40 hex characters, matched as a whole token. Registration
//! shares the marker table with the tip engine (command name "register"),
//! so a redelivered registration comment is a no-op.

use crate::engine::dispatch::CommandHandler;
use crate::engine::ledger::LedgerDb;
use crate::engine::recognizer::CommandTrigger;
use crate::engine::types::{CommandReply, Outcome};
use crate::stream::CommentEvent;
use regex::Regex;
use std::sync::Arc;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const COMMAND: &str = "register";

pub struct RegisterCommand {
    trigger: CommandTrigger,
    trigger_text: String,
    address_re: Regex,
    status_re: Regex,
    ledger: Arc<LedgerDb>,
}

impl RegisterCommand {
    pub fn new(trigger: &str, ledger: Arc<LedgerDb>) -> Result<Self, Box<dyn std::error::Error>> {
        let escaped = regex::escape(&trigger.to_lowercase());
        Ok(Self {
            trigger: CommandTrigger::new(&[trigger])?,
            trigger_text: trigger.to_lowercase(),
            address_re: Regex::new(&format!(r"(?i){}\s+(0x[a-fA-F0-9]{{40}})\b", escaped))?,
            status_re: Regex::new(&format!(r"{}\s+status", escaped))?,
            ledger,
        })
    }

    fn try_process(
        &self,
        comment: &CommentEvent,
    ) -> Result<CommandReply, Box<dyn std::error::Error>> {
        log::info!(
            "process reg command - content_id: {} | author: {}",
            comment.content_id,
            comment.author
        );

        if self.ledger.has_processed(&comment.content_id, COMMAND)? {
            log::info!("  previously processed...");
            return Ok(CommandReply::silent(Outcome::AlreadyProcessed));
        }

        let user = &comment.author;

        let reply = if self.status_re.is_match(&comment.body.to_lowercase()) {
            log::info!("  checking status");
            match self.ledger.lookup_user(user)?.and_then(|u| u.address) {
                Some(address) => {
                    format!(
                        "u/{} is registered with the following address: `{}`",
                        user, address
                    )
                }
                None => {
                    format!(
                        "u/{} is not registered.  Please use the `{} <address>` command to register your wallet address.",
                        user, self.trigger_text
                    )
                }
            }
        } else if let Some(caps) = self.address_re.captures(&comment.body) {
            let address = &caps[1];
            log::info!(
                "  registering {} with wallet ...{}",
                user,
                &address[address.len() - 5..]
            );
            self.ledger
                .upsert_address(user, address, &comment.content_id)?;
            format!(
                "u/{} successfully registered with the following address: `{}`",
                user, address
            )
        } else {
            log::warn!("  invalid or missing address");
            "Invalid address.  Please ensure the address is in the format '0x' followed by 40 hexadecimal characters".to_string()
        };

        self.ledger.set_processed(&comment.content_id, COMMAND)?;
        Ok(CommandReply::new(Outcome::Replied, Some(self.sign(reply))))
    }

    fn sign(&self, reply: String) -> String {
        format!(
            "{}\n\n^(This output was generated by tipstream {})",
            reply, VERSION
        )
    }
}

impl CommandHandler for RegisterCommand {
    fn name(&self) -> &'static str {
        COMMAND
    }

    fn trigger(&self) -> &CommandTrigger {
        &self.trigger
    }

    fn handle(&self, comment: &CommentEvent) -> CommandReply {
        match self.try_process(comment) {
            Ok(reply) => reply,
            Err(e) => {
                log::error!("❌ Failed to register {}: {}", comment.content_id, e);
                CommandReply::new(
                    Outcome::Deferred,
                    Some(self.sign(
                        "Unable to register at this time.  Please try again later.".to_string(),
                    )),
                )
            }
        }
    }
}
