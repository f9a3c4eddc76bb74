//! End-to-end scan flow: registry → market data → signal → alert → ledger,
//! plus the daily reset and operator controls around it.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_test::assert_ok;

use stonkz::chart::SparklineRenderer;
use stonkz::config::ScannerConfig;
use stonkz::engine::{
    AlertLedger, Clock, DayBoundaryScheduler, ScanController, ScanCycle, SignalBoard, TickerOutcome,
};
use stonkz::notify::{deliver_all, Dispatcher};
use stonkz::signal::SignalEngine;
use stonkz::storage::TickerRegistry;
use stonkz::types::{Alert, ScanState, TickerError};

use crate::fakes::*;

struct Harness {
    registry: Arc<FakeRegistry>,
    market: Arc<FakeMarket>,
    ledger: Arc<AlertLedger>,
    board: Arc<SignalBoard>,
}

impl Harness {
    fn new(symbols: &[&str]) -> Self {
        Self {
            registry: Arc::new(FakeRegistry::with(symbols)),
            market: Arc::new(FakeMarket::new()),
            ledger: Arc::new(AlertLedger::new()),
            board: Arc::new(SignalBoard::new()),
        }
    }

    fn cycle(&self, dispatcher: Dispatcher) -> ScanCycle {
        ScanCycle::new(
            self.registry.clone(),
            self.market.clone(),
            SignalEngine::default(),
            Arc::new(SparklineRenderer::default()),
            dispatcher,
            self.ledger.clone(),
            self.board.clone(),
            ScannerConfig::default(),
            "@everyone".into(),
        )
    }

    /// A cycle whose alerts are collected on the returned receiver.
    fn queued_cycle(&self) -> (ScanCycle, mpsc::Receiver<Alert>) {
        let (dispatcher, rx) = Dispatcher::channel(16);
        (self.cycle(dispatcher), rx)
    }
}

/// Deliver everything queued once the cycle (the only sender) is gone.
async fn drain(cycle: ScanCycle, rx: mpsc::Receiver<Alert>) -> Vec<Alert> {
    drop(cycle);
    let sink = Arc::new(RecordingSink::default());
    deliver_all(rx, sink.clone()).await;
    sink.alerts()
}

#[tokio::test]
async fn test_abc_alerts_once_per_market_day() {
    let h = Harness::new(&["ABC"]);
    let abc = ticker("ABC");
    let series = steady_uptrend(&abc);
    assert!((sar_of(&series) - 100.0).abs() < 1e-9);
    h.market.set(series.clone(), breakout_quote(&series));

    let (cycle, rx) = h.queued_cycle();

    let first = assert_ok!(cycle.run_once().await);
    assert_eq!(first.outcome(&abc), Some(&TickerOutcome::Alerted));
    assert!(h.ledger.has_alerted(&abc));

    let second = assert_ok!(cycle.run_once().await);
    assert_eq!(second.outcome(&abc), Some(&TickerOutcome::Skipped));

    // Signal history + chart history on the first pass; nothing on the second.
    assert_eq!(h.market.history_calls(), vec![abc.clone(), abc.clone()]);

    let alerts = drain(cycle, rx).await;
    assert_eq!(alerts.len(), 1);
    let msg = &alerts[0].message;
    assert!(msg.contains("ABC"), "{msg}");
    assert!(msg.contains("SAR: 5.00% higher"), "{msg}");
    assert!(msg.contains("Volume: 100.00% higher"), "{msg}");
    assert!(msg.starts_with("🚨 @everyone BUY Alert"), "{msg}");
    assert!(alerts[0].chart.bytes.starts_with(b"\x89PNG"));
}

#[tokio::test]
async fn test_unknown_ticker_does_not_block_others() {
    let h = Harness::new(&["GONE", "ABC"]);
    let series = steady_uptrend(&ticker("ABC"));
    h.market.set(series.clone(), breakout_quote(&series));

    let (cycle, rx) = h.queued_cycle();
    let report = assert_ok!(cycle.run_once().await);

    assert!(matches!(
        report.outcome(&ticker("GONE")),
        Some(TickerOutcome::Failed(TickerError::Fetch(_)))
    ));
    assert_eq!(report.outcome(&ticker("ABC")), Some(&TickerOutcome::Alerted));
    assert!(!h.ledger.has_alerted(&ticker("GONE")));

    let alerts = drain(cycle, rx).await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].ticker, ticker("ABC"));
}

#[tokio::test]
async fn test_cleared_flags_allow_realert() {
    let h = Harness::new(&["ABC"]);
    let series = steady_uptrend(&ticker("ABC"));
    h.market.set(series.clone(), breakout_quote(&series));

    let (cycle, rx) = h.queued_cycle();
    assert_ok!(cycle.run_once().await);
    assert_eq!(h.ledger.clear(), 1);
    assert_ok!(cycle.run_once().await);

    assert_eq!(drain(cycle, rx).await.len(), 2);
}

#[tokio::test]
async fn test_removed_ticker_leaves_signal_board() {
    let h = Harness::new(&["ABC", "XYZ"]);
    for symbol in ["ABC", "XYZ"] {
        let series = steady_uptrend(&ticker(symbol));
        let mut quote = breakout_quote(&series);
        quote.current_volume = 500.0;
        h.market.set(series, quote);
    }

    let (cycle, _rx) = h.queued_cycle();
    assert_ok!(cycle.run_once().await);
    assert_eq!(h.board.ranked().await.len(), 2);

    assert!(assert_ok!(h.registry.remove(&ticker("XYZ")).await));
    assert_ok!(cycle.run_once().await);
    let remaining: Vec<_> = h.board.ranked().await.into_iter().map(|s| s.ticker).collect();
    assert_eq!(remaining, vec![ticker("ABC")]);
}

// ---------------------------------------------------------------------------
// Timer-driven flow
// ---------------------------------------------------------------------------

/// Local wall clock starting at `base`, advancing with tokio's paused clock.
struct TestClock {
    base: NaiveDateTime,
    origin: tokio::time::Instant,
}

impl Clock for TestClock {
    fn now(&self) -> NaiveDateTime {
        self.base + chrono::Duration::from_std(tokio::time::Instant::now() - self.origin).unwrap()
    }
}

#[tokio::test(start_paused = true)]
async fn test_scanning_across_the_market_open() {
    let h = Harness::new(&["ABC"]);
    let series = steady_uptrend(&ticker("ABC"));
    h.market.set(series.clone(), breakout_quote(&series));

    let sink = Arc::new(RecordingSink::default());
    let (dispatcher, _delivery) = Dispatcher::spawn(sink.clone(), 16);
    let controller = Arc::new(ScanController::new(
        Arc::new(h.cycle(dispatcher)),
        Duration::from_secs(60),
    ));

    // Friday 09:00; the ledger resets at 09:30.
    let clock = Arc::new(TestClock {
        base: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(9, 0, 0).unwrap(),
        origin: tokio::time::Instant::now(),
    });
    let scheduler = Arc::new(DayBoundaryScheduler::new(
        h.ledger.clone(),
        clock,
        NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
    ));
    let reset = Arc::clone(&scheduler).spawn();

    assert!(controller.start());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(sink.alerts().len(), 1);

    // 09:29:50: every cycle so far skipped ABC.
    tokio::time::sleep(Duration::from_secs(29 * 60 + 40)).await;
    assert_eq!(sink.alerts().len(), 1);
    assert!(controller.stats().cycles_run >= 29);

    // 09:31: the reset happened and ABC alerted again.
    tokio::time::sleep(Duration::from_secs(70)).await;
    assert_eq!(sink.alerts().len(), 2);

    // Rest of the morning: no more.
    tokio::time::sleep(Duration::from_secs(60 * 60)).await;
    assert_eq!(sink.alerts().len(), 2);

    controller.stop();
    assert_eq!(controller.state(), ScanState::Idle);
    reset.abort();
}
