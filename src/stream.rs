//! Comment stream interfaces
//!
//! The platform client that produces comments and posts replies is an
//! external collaborator. This module defines the exchange types plus a
//! newline-delimited JSON adapter over stdin/stdout so the bot can be run
//! against any stream that speaks that framing.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// One comment as delivered by the stream
///
/// `parent_author` is nullable: deleted or missing accounts arrive as None
/// and make implicit-recipient tips unresolvable.
#[derive(Debug, Clone, Deserialize)]
pub struct CommentEvent {
    pub content_id: String,
    pub body: String,
    pub author: String,
    pub parent_content_id: String,
    pub parent_author: Option<String>,
    pub submission_id: String,
    pub community: String,
}

/// A reply destined for the platform, addressed by the comment it answers
#[derive(Debug, Clone, Serialize)]
pub struct OutboundReply {
    pub content_id: String,
    pub body: String,
}

/// Read JSON-encoded comments from stdin, one per line
///
/// Malformed lines are logged and skipped; the stream itself is the only
/// ordering authority, so this adapter adds no buffering beyond the channel.
/// Returns when stdin closes.
pub async fn read_stdin_comments(tx: mpsc::Sender<CommentEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<CommentEvent>(line) {
                    Ok(comment) => {
                        if tx.send(comment).await.is_err() {
                            // Ingestion shut down, nothing left to feed
                            return;
                        }
                    }
                    Err(e) => {
                        log::warn!("⚠️  Skipping malformed comment line: {}", e);
                    }
                }
            }
            Ok(None) => {
                log::info!("Comment stream closed");
                return;
            }
            Err(e) => {
                log::error!("❌ Failed to read comment stream: {}", e);
                return;
            }
        }
    }
}

/// Write replies to stdout as JSON lines until the channel closes
pub async fn write_replies(mut rx: mpsc::Receiver<OutboundReply>) {
    while let Some(reply) = rx.recv().await {
        match serde_json::to_string(&reply) {
            Ok(line) => println!("{}", line),
            Err(e) => log::error!("❌ Failed to encode reply for {}: {}", reply.content_id, e),
        }
    }
}
