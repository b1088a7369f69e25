pub mod config;
pub mod engine;
pub mod ingestion;
pub mod stream;

use {
    config::Config,
    engine::{
        dispatch::{CommandHandler, Dispatcher},
        engine::TipEngine,
        ledger::LedgerDb,
        register::RegisterCommand,
        tokens::TokenRegistry,
        weights::{HttpWeightProvider, WeightCache, WeightProvider},
    },
    std::path::Path,
    std::sync::{Arc, Mutex},
    stream::{CommentEvent, OutboundReply},
    tokio::sync::mpsc,
};

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let config = Config::from_env();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    log::info!("🚀 Starting tipstream...");
    log::info!("📊 Configuration:");
    log::info!("   DB path: {}", config.db_path);
    log::info!("   Tokens file: {}", config.tokens_path);
    log::info!("   Tip trigger: {}", config.tip_trigger);
    log::info!(
        "   Weight snapshot: {}",
        config.weights_url.as_deref().unwrap_or("(none)")
    );

    // Ledger store (users, tips, markers, rounds)
    let ledger = Arc::new(LedgerDb::open(Path::new(&config.db_path))?);

    // Per-community token tables
    let tokens = TokenRegistry::load(Path::new(&config.tokens_path))?;

    // Governance-weight snapshot cache; refreshed by the ingestion loop
    let weights = Arc::new(Mutex::new(WeightCache::new(
        config.max_weight,
        config.weight_refresh_secs as i64,
    )));
    let provider: Option<Arc<dyn WeightProvider>> = config
        .weights_url
        .clone()
        .map(|url| Arc::new(HttpWeightProvider::new(url)) as Arc<dyn WeightProvider>);

    // Command table, tried in order
    let tip_engine = TipEngine::new(
        &config.tip_trigger,
        tokens,
        Arc::clone(&ledger),
        Arc::clone(&weights),
        config.register_help_url.clone(),
        config.tip_link_base.clone(),
    )?;
    let register = RegisterCommand::new(&config.register_trigger, Arc::clone(&ledger))?;

    let dispatcher = Arc::new(Dispatcher::new(vec![
        Box::new(tip_engine) as Box<dyn CommandHandler>,
        Box::new(register) as Box<dyn CommandHandler>,
    ]));

    // Channels: stream adapter -> ingestion -> reply sink
    let (comment_tx, comment_rx) = mpsc::channel::<CommentEvent>(config.channel_buffer);
    let (reply_tx, reply_rx) = mpsc::channel::<OutboundReply>(config.channel_buffer);

    let reader = tokio::spawn(stream::read_stdin_comments(comment_tx));
    let writer = tokio::spawn(stream::write_replies(reply_rx));

    ingestion::run_ingestion(
        comment_rx,
        reply_tx,
        dispatcher,
        config.bot_username.clone(),
        weights,
        provider,
        config.weight_refresh_secs,
    )
    .await;

    reader.await?;
    writer.await?;

    log::info!("✅ tipstream stopped");
    Ok(())
}
