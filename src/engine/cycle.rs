//! One scan pass over the watchlist.
//!
//! registry snapshot → skip already-alerted → fetch history + quote →
//! evaluate → on breakout render chart, hand off alert, mark ledger.
//!
//! Every per-ticker failure becomes a `TickerOutcome::Failed` in the cycle
//! report; nothing a single ticker does can abort the pass.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::chart::ChartRenderer;
use crate::config::ScannerConfig;
use crate::engine::ledger::AlertLedger;
use crate::market::MarketData;
use crate::notify::{build_alert, format_alert_message, Dispatcher};
use crate::signal::SignalEngine;
use crate::storage::TickerRegistry;
use crate::types::{LiveQuote, RegistryError, RenderError, SignalResult, Ticker, TickerError};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum TickerOutcome {
    /// Already alerted this market day; nothing fetched.
    Skipped,
    NoSignal,
    Alerted,
    Failed(TickerError),
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Registry order.
    pub outcomes: Vec<(Ticker, TickerOutcome)>,
}

impl CycleReport {
    pub fn alerted(&self) -> usize {
        self.count(|o| matches!(o, TickerOutcome::Alerted))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TickerOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TickerOutcome::Failed(_)))
    }

    pub fn outcome(&self, ticker: &Ticker) -> Option<&TickerOutcome> {
        self.outcomes.iter().find(|(t, _)| t == ticker).map(|(_, o)| o)
    }

    fn count(&self, pred: impl Fn(&TickerOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

// ---------------------------------------------------------------------------
// Signal board
// ---------------------------------------------------------------------------

/// Last evaluation of one ticker, as shown on the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct TickerSnapshot {
    pub ticker: Ticker,
    pub price: f64,
    pub volume: f64,
    pub day_change_pct: Option<f64>,
    pub sar_percent: Option<f64>,
    pub momentum: Option<f64>,
    pub volume_percent: Option<f64>,
    pub breakout: bool,
    pub evaluated_at: DateTime<Utc>,
}

impl TickerSnapshot {
    pub fn new(ticker: Ticker, quote: &LiveQuote, signal: &SignalResult, at: DateTime<Utc>) -> Self {
        let finite = |v: f64| v.is_finite().then_some(v);
        Self {
            ticker,
            price: quote.current_price,
            volume: quote.current_volume,
            day_change_pct: quote.day_change_pct(),
            sar_percent: finite(signal.sar_percent),
            momentum: signal.momentum_score.filter(|m| m.is_finite()),
            volume_percent: finite(signal.volume_percent),
            breakout: signal.breakout,
            evaluated_at: at,
        }
    }
}

/// Most recent signal per ticker. Written by the scan cycle, read by the
/// dashboard.
#[derive(Debug, Default)]
pub struct SignalBoard {
    entries: RwLock<HashMap<Ticker, TickerSnapshot>>,
}

impl SignalBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, snapshot: TickerSnapshot) {
        self.entries.write().await.insert(snapshot.ticker.clone(), snapshot);
    }

    /// Drop entries for tickers no longer watched.
    pub async fn retain(&self, watched: &HashSet<Ticker>) {
        self.entries.write().await.retain(|t, _| watched.contains(t));
    }

    pub async fn get(&self, ticker: &Ticker) -> Option<TickerSnapshot> {
        self.entries.read().await.get(ticker).cloned()
    }

    /// All entries, highest SAR % first; undefined SAR % sorts last.
    pub async fn ranked(&self) -> Vec<TickerSnapshot> {
        let mut all: Vec<TickerSnapshot> = self.entries.read().await.values().cloned().collect();
        all.sort_by(|a, b| {
            let key = |s: &TickerSnapshot| s.sar_percent.unwrap_or(f64::NEG_INFINITY);
            key(b).total_cmp(&key(a)).then_with(|| a.ticker.cmp(&b.ticker))
        });
        all
    }
}

// ---------------------------------------------------------------------------
// Scan cycle
// ---------------------------------------------------------------------------

/// Result of the fetch + evaluate stage for one ticker.
enum Evaluation {
    Skipped,
    Done { quote: LiveQuote, signal: SignalResult },
    Failed(TickerError),
}

pub struct ScanCycle {
    registry: Arc<dyn TickerRegistry>,
    market: Arc<dyn MarketData>,
    engine: SignalEngine,
    renderer: Arc<dyn ChartRenderer>,
    dispatcher: Dispatcher,
    ledger: Arc<AlertLedger>,
    board: Arc<SignalBoard>,
    config: ScannerConfig,
    mention: String,
    // Held for the whole pass so two passes never interleave.
    running: Mutex<()>,
}

impl ScanCycle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<dyn TickerRegistry>,
        market: Arc<dyn MarketData>,
        engine: SignalEngine,
        renderer: Arc<dyn ChartRenderer>,
        dispatcher: Dispatcher,
        ledger: Arc<AlertLedger>,
        board: Arc<SignalBoard>,
        config: ScannerConfig,
        mention: String,
    ) -> Self {
        Self {
            registry,
            market,
            engine,
            renderer,
            dispatcher,
            ledger,
            board,
            config,
            mention,
            running: Mutex::new(()),
        }
    }

    pub fn ledger(&self) -> &Arc<AlertLedger> {
        &self.ledger
    }

    pub fn board(&self) -> &Arc<SignalBoard> {
        &self.board
    }

    /// Run one full pass. Only a failure to read the registry fails the
    /// pass as a whole.
    pub async fn run_once(&self) -> Result<CycleReport, RegistryError> {
        let _running = self.running.lock().await;
        let started_at = Utc::now();

        let tickers = self.registry.list().await?;
        self.board
            .retain(&tickers.iter().cloned().collect::<HashSet<_>>())
            .await;

        info!(tickers = tickers.len(), alerted = self.ledger.len(), "Scan cycle starting");

        let mut outcomes = Vec::with_capacity(tickers.len());
        let mut evaluations = stream::iter(tickers)
            .map(|ticker| async move {
                let evaluation = self.evaluate_ticker(&ticker).await;
                (ticker, evaluation)
            })
            .buffered(self.config.fetch_concurrency.max(1));

        while let Some((ticker, evaluation)) = evaluations.next().await {
            let outcome = match evaluation {
                Evaluation::Skipped => TickerOutcome::Skipped,
                Evaluation::Failed(e) => TickerOutcome::Failed(e),
                Evaluation::Done { quote, signal } => {
                    self.board
                        .record(TickerSnapshot::new(ticker.clone(), &quote, &signal, Utc::now()))
                        .await;
                    if signal.breakout {
                        match self.alert(&ticker, &quote, &signal).await {
                            Ok(()) => TickerOutcome::Alerted,
                            Err(e) => TickerOutcome::Failed(e),
                        }
                    } else {
                        TickerOutcome::NoSignal
                    }
                }
            };

            match &outcome {
                TickerOutcome::Failed(TickerError::EmptySeries(_)) => {
                    debug!(ticker = %ticker, "Empty price series, skipping")
                }
                TickerOutcome::Failed(e) => warn!(ticker = %ticker, error = %e, "Ticker failed this cycle"),
                _ => {}
            }
            outcomes.push((ticker, outcome));
        }

        let report = CycleReport {
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };
        info!(
            alerted = report.alerted(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Scan cycle complete"
        );
        Ok(report)
    }

    async fn evaluate_ticker(&self, ticker: &Ticker) -> Evaluation {
        if self.ledger.has_alerted(ticker) {
            debug!(ticker = %ticker, "Already alerted today");
            return Evaluation::Skipped;
        }

        let series = match self
            .market
            .fetch_history(ticker, &self.config.history_range, &self.config.history_interval)
            .await
        {
            Ok(s) if s.is_empty() => return Evaluation::Failed(TickerError::EmptySeries(ticker.to_string())),
            Ok(s) => s,
            Err(e) => return Evaluation::Failed(e.into()),
        };
        let quote = match self.market.fetch_quote(ticker).await {
            Ok(q) => q,
            Err(e) => return Evaluation::Failed(e.into()),
        };

        let signal = self.engine.evaluate(&series, &quote);
        debug!(
            ticker = %ticker,
            price = quote.current_price,
            sar = signal.sar_level,
            momentum = ?signal.momentum_score,
            volume_pct = signal.volume_percent,
            breakout = signal.breakout,
            "Evaluated"
        );
        Evaluation::Done { quote, signal }
    }

    /// Render, hand off, and only then mark the ticker.
    async fn alert(&self, ticker: &Ticker, quote: &LiveQuote, signal: &SignalResult) -> Result<(), TickerError> {
        let history = self
            .market
            .fetch_history(ticker, &self.config.chart_range, &self.config.chart_interval)
            .await
            .map_err(|e| RenderError(format!("chart history for {ticker}: {e}")))?;
        let chart = self
            .renderer
            .render(&history.with_current_price(quote.current_price, Utc::now()))?;

        let message = format_alert_message(&self.mention, ticker, quote, signal);
        let alert = build_alert(ticker, message, chart);
        let alert_id = alert.id;
        self.dispatcher.hand_off(alert)?;
        self.ledger.mark_alerted(ticker);

        info!(
            ticker = %ticker,
            alert_id = %alert_id,
            price = quote.current_price,
            sar_pct = signal.sar_percent,
            volume_pct = signal.volume_percent,
            "Breakout alert handed off"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
