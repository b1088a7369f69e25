//! Comment ingestion - single-worker processing loop
//!
//! One logical worker consumes comments in delivery order; there is no
//! internal parallelism across comments, and none is needed for a
//! human-paced workload. The loop also owns the periodic governance-weight
//! snapshot refresh so the engine itself never blocks on the network.
//!
//! The only concurrency concern is redelivery after a crash or reconnect,
//! which the processing markers make safe; this loop deliberately does
//! nothing extra about it.

use crate::engine::dispatch::Dispatcher;
use crate::engine::types::Outcome;
use crate::engine::weights::{WeightCache, WeightProvider};
use crate::stream::{CommentEvent, OutboundReply};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};

/// Run the ingestion loop until the comment channel closes
///
/// Arguments:
/// - `rx`: inbound comments from the stream adapter
/// - `reply_tx`: outbound replies toward the platform
/// - `dispatcher`: the command table
/// - `bot_username`: the bot's own comments are skipped
/// - `weights` / `provider`: snapshot cache and its refresh source; with no
///   provider configured the cache stays empty and weights compute to 0
/// - `refresh_secs`: how often to check the cache TTL
pub async fn run_ingestion(
    mut rx: mpsc::Receiver<CommentEvent>,
    reply_tx: mpsc::Sender<OutboundReply>,
    dispatcher: Arc<Dispatcher>,
    bot_username: String,
    weights: Arc<Mutex<WeightCache>>,
    provider: Option<Arc<dyn WeightProvider>>,
    refresh_secs: u64,
) {
    log::info!("🚀 Starting comment ingestion");

    let mut refresh_timer = interval(Duration::from_secs(refresh_secs.max(1)));

    loop {
        tokio::select! {
            comment = rx.recv() => {
                let comment = match comment {
                    Some(comment) => comment,
                    None => {
                        log::info!("Comment channel closed, ingestion stopping");
                        return;
                    }
                };

                if comment.author.eq_ignore_ascii_case(&bot_username) {
                    continue;
                }

                let Some(result) = dispatcher.dispatch(&comment) else {
                    continue; // no command recognized
                };

                log::info!("  outcome for {}: {:?}", comment.content_id, result.outcome);
                if result.outcome == Outcome::Deferred {
                    log::warn!("⚠️  Deferred {}; stream redelivery will retry", comment.content_id);
                }

                if let Some(body) = result.reply {
                    let reply = OutboundReply {
                        content_id: comment.content_id.clone(),
                        body,
                    };
                    if reply_tx.send(reply).await.is_err() {
                        log::error!("❌ Reply channel closed, ingestion stopping");
                        return;
                    }
                }
            }

            _ = refresh_timer.tick() => {
                refresh_weights(&weights, provider.as_deref()).await;
            }
        }
    }
}

/// Refresh the weight snapshot when the cache has outlived its TTL
///
/// Fetch failures are logged and swallowed: a stale snapshot only affects
/// weight precision, never ledger correctness.
async fn refresh_weights(weights: &Arc<Mutex<WeightCache>>, provider: Option<&dyn WeightProvider>) {
    let Some(provider) = provider else {
        return;
    };

    let stale = weights.lock().unwrap().is_stale();
    if !stale {
        return;
    }

    match provider.fetch().await {
        Ok(records) => {
            weights.lock().unwrap().install(records);
        }
        Err(e) => {
            log::error!("❌ Failed to refresh weight snapshot: {}", e);
        }
    }
}
