use std::sync::Arc;

use alarms::{AlarmEngine, LogNotifier, Notifier, Strategy, StrategyRunner, TelegramNotifier};
use anyhow::Context;
use common::logger::init_logger;
use market::feed::ReplayFeed;
use market::symbols::load_symbols_from_dir;
use store::{HistoryStore, SqliteHistoryStore};
use streamer::{AppConfig, Counters, Supervisor};
use tokio::sync::watch;
use tracing::{error, info, warn};

fn build_notifier(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Notifier>> {
    match &cfg.telegram {
        Some(t) => {
            let notifier = TelegramNotifier::new(&t.bot_token, t.chat_id.clone())
                .context("building telegram client")?;
            Ok(Arc::new(notifier))
        }
        None => {
            info!("telegram not configured, alarms go to the log only");
            Ok(Arc::new(LogNotifier))
        }
    }
}

/// Flips the shutdown flag on Ctrl-C. The sender is kept alive otherwise,
/// so monitors only stop on a real request.
fn spawn_shutdown_listener(tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                let _ = tx.send(true);
            }
            Err(e) => {
                error!(error = %e, "cannot listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AppConfig::from_env().context("loading configuration")?;
    init_logger("streamer", cfg.json_logs);

    info!("Starting candle streamer...");

    let symbols = load_symbols_from_dir(&cfg.tickers_dir);
    if symbols.is_empty() {
        warn!(dir = %cfg.tickers_dir.display(), "no symbols to monitor, exiting");
        return Ok(());
    }

    let store: Arc<dyn HistoryStore> = Arc::new(
        SqliteHistoryStore::connect(&cfg.database_url)
            .await
            .context("opening history store")?,
    );

    let notifier = build_notifier(&cfg)?;
    let engine = Arc::new(AlarmEngine::new(store.clone(), notifier, cfg.dedup_window()));
    let strategies: Vec<Arc<dyn Strategy>> = cfg
        .strategies
        .iter()
        .map(|k| k.build(cfg.detectors, cfg.indicators.ema_period))
        .collect();
    let runner = Arc::new(StrategyRunner::new(strategies, engine, store.clone()));
    info!(strategies = ?runner.strategy_names(), "strategies enabled");

    let counters = Counters::default();
    let feed = Arc::new(ReplayFeed::new(&cfg.replay_dir));
    let supervisor = Supervisor::new(feed, store, runner, cfg.pipeline_settings(), counters.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_shutdown_listener(shutdown_tx);

    let summary = supervisor.run(symbols, shutdown_rx).await?;

    for candle in &summary.open_candles {
        info!(symbol = %candle.symbol, start = %candle.start, "bucket left open at shutdown");
    }
    if !summary.skipped.is_empty() {
        warn!(skipped = ?summary.skipped, "instruments skipped during backfill");
    }
    counters.log_summary();

    Ok(())
}
