//! In-memory collaborators for integration testing.
//!
//! Deterministic stand-ins for the ticker registry, the market-data
//! provider and the alert sink. Everything is controllable from test code
//! and records what the scanner asked of it.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use stonkz::market::MarketData;
use stonkz::notify::AlertSink;
use stonkz::signal::SignalEngine;
use stonkz::storage::TickerRegistry;
use stonkz::types::*;

pub fn ticker(symbol: &str) -> Ticker {
    Ticker::parse(symbol).unwrap()
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub struct FakeRegistry {
    tickers: Mutex<Vec<Ticker>>,
}

impl FakeRegistry {
    pub fn with(symbols: &[&str]) -> Self {
        Self {
            tickers: Mutex::new(symbols.iter().map(|s| ticker(s)).collect()),
        }
    }
}

#[async_trait]
impl TickerRegistry for FakeRegistry {
    async fn list(&self) -> Result<Vec<Ticker>, RegistryError> {
        Ok(self.tickers.lock().unwrap().clone())
    }

    async fn add(&self, t: &Ticker) -> Result<bool, RegistryError> {
        let mut tickers = self.tickers.lock().unwrap();
        if tickers.contains(t) {
            return Ok(false);
        }
        tickers.push(t.clone());
        Ok(true)
    }

    async fn remove(&self, t: &Ticker) -> Result<bool, RegistryError> {
        let mut tickers = self.tickers.lock().unwrap();
        let before = tickers.len();
        tickers.retain(|x| x != t);
        Ok(tickers.len() != before)
    }
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeMarket {
    series: Mutex<HashMap<Ticker, PriceSeries>>,
    quotes: Mutex<HashMap<Ticker, LiveQuote>>,
    history_calls: Mutex<Vec<Ticker>>,
}

impl FakeMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, series: PriceSeries, quote: LiveQuote) {
        self.quotes.lock().unwrap().insert(series.ticker.clone(), quote);
        self.series.lock().unwrap().insert(series.ticker.clone(), series);
    }

    /// Every history request so far, signal and chart fetches alike.
    pub fn history_calls(&self) -> Vec<Ticker> {
        self.history_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketData for FakeMarket {
    async fn fetch_history(&self, t: &Ticker, _range: &str, _interval: &str) -> Result<PriceSeries, FetchError> {
        self.history_calls.lock().unwrap().push(t.clone());
        self.series
            .lock()
            .unwrap()
            .get(t)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(t.to_string()))
    }

    async fn fetch_quote(&self, t: &Ticker) -> Result<LiveQuote, FetchError> {
        self.quotes
            .lock()
            .unwrap()
            .get(t)
            .copied()
            .ok_or_else(|| FetchError::MissingField {
                ticker: t.to_string(),
                field: "regularMarketPrice",
            })
    }
}

// ---------------------------------------------------------------------------
// Alert sink
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSink {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingSink {
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn send(&self, alert: &Alert) -> Result<()> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

// ---------------------------------------------------------------------------
// Market scenarios
// ---------------------------------------------------------------------------

/// 30 steadily rising half-hour bars, scaled so the Parabolic SAR of the
/// last bar is 100. The weighted z-score of a straight line is ~1.486.
pub fn steady_uptrend(t: &Ticker) -> PriceSeries {
    // SAR of the unscaled line 100, 101, ... 129 with a 1-point range.
    let scale = 100.0 / 124.491_463_685_817_12;
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
    let bars = (0..30)
        .map(|i| {
            let c = 100.0 + i as f64;
            PriceBar {
                timestamp: start + Duration::minutes(30 * i),
                open: Some(c * scale),
                high: Some((c + 0.5) * scale),
                low: Some((c - 0.5) * scale),
                close: c * scale,
                volume: Some(1000.0),
            }
        })
        .collect();
    PriceSeries::new(t.clone(), bars)
}

/// SAR level the default engine computes for `series`.
pub fn sar_of(series: &PriceSeries) -> f64 {
    let quote = LiveQuote {
        current_price: 1.0,
        current_volume: 0.0,
        average_volume: 1.0,
        previous_close: None,
    };
    SignalEngine::default().evaluate(series, &quote).sar_level
}

/// Price 5% above the SAR, volume twice the average.
pub fn breakout_quote(series: &PriceSeries) -> LiveQuote {
    LiveQuote {
        current_price: sar_of(series) * 1.05,
        current_volume: 2000.0,
        average_volume: 1000.0,
        previous_close: series.closes().last().copied(),
    }
}
