//! Command dispatch - ordered (recognizer, handler) table
//!
//! Handlers share no mutable state, so dispatch is a flat list tried in
//! order: the first handler whose trigger matches the comment body takes the
//! comment, and no other handler sees it. A comment matching nothing is
//! ignored entirely (no reply, no marker).

use crate::engine::recognizer::CommandTrigger;
use crate::engine::types::CommandReply;
use crate::stream::CommentEvent;

/// One command the bot understands
pub trait CommandHandler: Send + Sync {
    /// Marker command name (the second half of the idempotency key)
    fn name(&self) -> &'static str;

    /// Recognizer deciding whether this handler wants the comment
    fn trigger(&self) -> &CommandTrigger;

    /// Process the comment to a terminal state
    fn handle(&self, comment: &CommentEvent) -> CommandReply;
}

/// Ordered handler table
pub struct Dispatcher {
    handlers: Vec<Box<dyn CommandHandler>>,
}

impl Dispatcher {
    pub fn new(handlers: Vec<Box<dyn CommandHandler>>) -> Self {
        Self { handlers }
    }

    /// Route one comment to the first matching handler
    pub fn dispatch(&self, comment: &CommentEvent) -> Option<CommandReply> {
        for handler in &self.handlers {
            if handler.trigger().matches(&comment.body) {
                log::info!(
                    "  dispatching {} to '{}' handler",
                    comment.content_id,
                    handler.name()
                );
                return Some(handler.handle(comment));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::Outcome;

    struct StubHandler {
        name: &'static str,
        trigger: CommandTrigger,
    }

    impl StubHandler {
        fn new(name: &'static str, alias: &str) -> Self {
            Self {
                name,
                trigger: CommandTrigger::new(&[alias]).unwrap(),
            }
        }
    }

    impl CommandHandler for StubHandler {
        fn name(&self) -> &'static str {
            self.name
        }

        fn trigger(&self) -> &CommandTrigger {
            &self.trigger
        }

        fn handle(&self, _comment: &CommentEvent) -> CommandReply {
            CommandReply::new(Outcome::Replied, Some(self.name.to_string()))
        }
    }

    fn make_comment(body: &str) -> CommentEvent {
        CommentEvent {
            content_id: "t1_c".to_string(),
            body: body.to_string(),
            author: "alice".to_string(),
            parent_content_id: "t1_p".to_string(),
            parent_author: None,
            submission_id: "sub".to_string(),
            community: "ethtrader".to_string(),
        }
    }

    #[test]
    fn test_first_matching_handler_wins() {
        let dispatcher = Dispatcher::new(vec![
            Box::new(StubHandler::new("tip", "!tip")),
            Box::new(StubHandler::new("register", "!register")),
        ]);

        let reply = dispatcher.dispatch(&make_comment("!tip 5")).unwrap();
        assert_eq!(reply.reply.as_deref(), Some("tip"));

        let reply = dispatcher
            .dispatch(&make_comment("!register 0xabc"))
            .unwrap();
        assert_eq!(reply.reply.as_deref(), Some("register"));
    }

    #[test]
    fn test_unmatched_comment_ignored() {
        let dispatcher = Dispatcher::new(vec![Box::new(StubHandler::new("tip", "!tip"))]);
        assert!(dispatcher.dispatch(&make_comment("great post")).is_none());
        // Whole-token rule holds at the dispatch layer too
        assert!(dispatcher.dispatch(&make_comment("!tipping")).is_none());
    }
}
