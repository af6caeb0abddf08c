use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeDelta};
use parking_lot::Mutex;
use tokio::sync::watch;

use alarms::{AlarmEngine, DetectorSettings, NotificationError, Notifier, Strategy, StrategyKind, StrategyRunner};
use market::indicators::IndicatorMode;
use store::{HistoryStore, MemoryHistoryStore};
use streamer::{Counters, PipelineSettings, Supervisor, SupervisorError};

use mock_feed::{ScriptedFeed, at, bar, flat_daily, tick};

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, _symbol: &str, _ts: NaiveDateTime, message: &str) -> Result<(), NotificationError> {
        self.sent.lock().push(message.to_string());
        Ok(())
    }
}

struct Harness {
    supervisor: Supervisor<ScriptedFeed>,
    store: Arc<MemoryHistoryStore>,
    notifier: Arc<RecordingNotifier>,
    counters: Counters,
}

fn harness(feed: ScriptedFeed, kinds: &[StrategyKind], mode: IndicatorMode) -> Harness {
    let store = Arc::new(MemoryHistoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = Arc::new(AlarmEngine::new(store.clone(), notifier.clone(), TimeDelta::minutes(15)));
    let strategies: Vec<Arc<dyn Strategy>> = kinds.iter().map(|k| k.build(DetectorSettings::default(), 9)).collect();
    let runner = Arc::new(StrategyRunner::new(strategies, engine, store.clone()));
    let counters = Counters::default();

    let settings = PipelineSettings {
        indicator_mode: mode,
        ..PipelineSettings::default()
    };
    let supervisor = Supervisor::new(Arc::new(feed), store.clone(), runner, settings, counters.clone());

    Harness {
        supervisor,
        store,
        notifier,
        counters,
    }
}

/// Flat session at 100, then a drop to 90 that crosses below the EMA.
fn exit_scenario() -> ScriptedFeed {
    ScriptedFeed::default().with_instrument(
        "ABC",
        vec![bar(at(9, 30, 0), 100.0, 0.0, 1_000.0), bar(at(9, 32, 0), 100.0, 0.0, 1_000.0)],
        flat_daily(),
        vec![
            tick(at(9, 34, 5), 100.0, 10.0),
            tick(at(9, 36, 5), 90.0, 10.0),
            tick(at(9, 38, 0), 90.0, 10.0),
        ],
    )
}

fn idle() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    // Keep the sender alive for the whole test.
    std::mem::forget(tx);
    rx
}

#[tokio::test]
async fn live_candles_are_stored_and_evaluated() {
    let h = harness(exit_scenario(), &[StrategyKind::Exit], IndicatorMode::FullRecompute);

    let summary = h.supervisor.run(vec!["ABC".into()], idle()).await.unwrap();

    assert_eq!(summary.live, vec!["ABC".to_string()]);
    assert!(summary.skipped.is_empty());

    let rows = h.store.fetch_all("ABC").await.unwrap();
    let times: Vec<_> = rows.iter().map(|r| r.timestamp()).collect();
    assert_eq!(times, vec![at(9, 30, 0), at(9, 32, 0), at(9, 34, 0), at(9, 36, 0)]);
    assert_eq!(rows[2].ema, 100.0);
    assert_eq!(rows[3].ema, 98.0);
    assert!(rows.iter().all(|r| r.relatr.is_some()));

    // The 9:38 bucket never saw a following tick.
    assert_eq!(summary.open_candles.len(), 1);
    assert_eq!(summary.open_candles[0].start, at(9, 38, 0));

    assert_eq!(
        *h.notifier.sent.lock(),
        vec!["EMA9 crossover down detected for ABC at 90.00".to_string()]
    );
    assert_eq!(Counters::get(&h.counters.candles_finalized), 2);
    assert_eq!(Counters::get(&h.counters.ticks_ingested), 3);
    assert_eq!(Counters::get(&h.counters.alarms_raised), 1);
}

#[tokio::test]
async fn incremental_mode_stores_the_same_rows() {
    let full = harness(exit_scenario(), &[StrategyKind::Exit], IndicatorMode::FullRecompute);
    let inc = harness(exit_scenario(), &[StrategyKind::Exit], IndicatorMode::Incremental);

    full.supervisor.run(vec!["ABC".into()], idle()).await.unwrap();
    inc.supervisor.run(vec!["ABC".into()], idle()).await.unwrap();

    assert_eq!(
        full.store.fetch_all("ABC").await.unwrap(),
        inc.store.fetch_all("ABC").await.unwrap()
    );
    assert_eq!(full.store.alarms(), inc.store.alarms());
}

#[tokio::test]
async fn connection_failure_ends_the_run() {
    let feed = ScriptedFeed {
        refuse_connect: true,
        ..exit_scenario()
    };
    let h = harness(feed, &[], IndicatorMode::FullRecompute);

    let err = h.supervisor.run(vec!["ABC".into()], idle()).await.unwrap_err();
    assert!(matches!(err, SupervisorError::Connect(_)));
    assert_eq!(h.store.row_count("ABC"), 0);
}

#[tokio::test]
async fn failed_backfill_skips_only_that_instrument() {
    let feed = exit_scenario();
    let h = harness(feed, &[], IndicatorMode::FullRecompute);

    let summary = h
        .supervisor
        .run(vec!["ABC".into(), "GONE".into()], idle())
        .await
        .unwrap();

    assert_eq!(summary.live, vec!["ABC".to_string()]);
    assert_eq!(summary.skipped, vec!["GONE".to_string()]);
    assert_eq!(h.store.row_count("ABC"), 4);
    assert_eq!(Counters::get(&h.counters.instruments_skipped), 1);
}

#[tokio::test]
async fn refused_subscription_is_reported_as_skipped() {
    let mut feed = exit_scenario().with_instrument(
        "XYZ",
        vec![bar(at(9, 30, 0), 50.0, 0.0, 1_000.0)],
        flat_daily(),
        vec![tick(at(9, 34, 5), 50.0, 1.0)],
    );
    feed.refuse_subscription.insert("XYZ".to_string());
    let h = harness(feed, &[], IndicatorMode::FullRecompute);

    let summary = h
        .supervisor
        .run(vec!["ABC".into(), "XYZ".into()], idle())
        .await
        .unwrap();

    assert_eq!(summary.live, vec!["ABC".to_string()]);
    assert_eq!(summary.skipped, vec!["XYZ".to_string()]);
    assert_eq!(Counters::get(&h.counters.instruments_skipped), 1);
    assert_eq!(Counters::get(&h.counters.pipeline_failures), 1);
    // ABC is unaffected.
    assert_eq!(h.store.row_count("ABC"), 4);
}

#[tokio::test]
async fn late_ticks_are_rejected_and_counted() {
    let feed = ScriptedFeed::default().with_instrument(
        "ABC",
        vec![bar(at(9, 30, 0), 100.0, 0.0, 1_000.0)],
        flat_daily(),
        vec![
            tick(at(9, 34, 5), 100.0, 10.0),
            tick(at(9, 36, 5), 101.0, 10.0),
            tick(at(9, 35, 59), 250.0, 10.0),
            tick(at(9, 38, 0), 101.0, 10.0),
        ],
    );
    let h = harness(feed, &[], IndicatorMode::FullRecompute);

    h.supervisor.run(vec!["ABC".into()], idle()).await.unwrap();

    assert_eq!(Counters::get(&h.counters.ticks_rejected_late), 1);
    let rows = h.store.fetch_all("ABC").await.unwrap();
    assert!(rows.iter().all(|r| r.high < 250.0));
}

#[tokio::test]
async fn live_candle_matching_backfilled_bar_is_not_duplicated() {
    let feed = ScriptedFeed::default().with_instrument(
        "ABC",
        vec![bar(at(9, 30, 0), 100.0, 0.0, 1_000.0), bar(at(9, 32, 0), 100.0, 0.0, 1_000.0)],
        flat_daily(),
        vec![
            tick(at(9, 32, 30), 104.0, 10.0),
            tick(at(9, 34, 0), 104.0, 10.0),
            tick(at(9, 36, 0), 104.0, 10.0),
        ],
    );
    let h = harness(feed, &[], IndicatorMode::Incremental);

    h.supervisor.run(vec!["ABC".into()], idle()).await.unwrap();

    assert_eq!(Counters::get(&h.counters.rows_duplicate), 1);
    let rows = h.store.fetch_all("ABC").await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1].close, 100.0);

    // The skipped duplicate did not leak into the running sums.
    let expected_vwap = (100.0 * 2_000.0 + 104.0 * 10.0) / 2_010.0;
    assert!((rows[2].vwap - expected_vwap).abs() < 0.006);
}

#[tokio::test]
async fn shutdown_drains_and_reports_open_bucket() {
    let mut feed = exit_scenario();
    feed.hold_open.insert("ABC".into());
    let h = harness(feed, &[StrategyKind::Exit], IndicatorMode::FullRecompute);
    let (tx, rx) = watch::channel(false);

    let supervisor = h.supervisor;
    let run = tokio::spawn(async move { supervisor.run(vec!["ABC".into()], rx).await });

    tokio::time::timeout(Duration::from_secs(5), async {
        while Counters::get(&h.counters.ticks_ingested) < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    tx.send(true).unwrap();
    let summary = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    // Both finalized candles were drained through the worker before exit.
    assert_eq!(h.store.row_count("ABC"), 4);
    assert_eq!(summary.open_candles.len(), 1);
}
