//! Shared types for the STONKZ scanner.
//!
//! These types form the data model used across all modules: the watched
//! symbols, price history, live quotes, signal results, alerts, and the
//! error taxonomy consumed by the scan cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

const MAX_SYMBOL_LEN: usize = 32;

/// A case-normalized ticker symbol. Identity is exact string match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticker(String);

impl Ticker {
    /// Normalize (trim + upper-case) and validate a user-supplied symbol.
    ///
    /// Accepts the characters Yahoo uses in symbols: letters, digits and
    /// `.`, `-`, `^`, `=`. Long enough for OCC option symbols.
    pub fn parse(raw: &str) -> Result<Self, RegistryError> {
        let symbol = raw.trim().to_uppercase();
        let valid = !symbol.is_empty()
            && symbol.len() <= MAX_SYMBOL_LEN
            && symbol
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));
        if !valid {
            return Err(RegistryError::InvalidTicker(raw.to_string()));
        }
        Ok(Self(symbol))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Ticker {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ticker::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Price data
// ---------------------------------------------------------------------------

/// One interval's OHLCV sample. Only `close` is guaranteed; a synthetic
/// "current" bar built from a live quote carries nothing else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
    pub volume: Option<f64>,
}

impl PriceBar {
    /// Close-only bar, as appended from a live quote.
    pub fn synthetic(timestamp: DateTime<Utc>, close: f64) -> Self {
        Self {
            timestamp,
            open: None,
            high: None,
            low: None,
            close,
            volume: None,
        }
    }
}

/// Ordered price history for one ticker. Timestamps are strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub ticker: Ticker,
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Build a series, sorting by timestamp. On duplicate timestamps the
    /// later sample wins.
    pub fn new(ticker: Ticker, mut bars: Vec<PriceBar>) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        let mut deduped: Vec<PriceBar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.timestamp == bar.timestamp => *last = bar,
                _ => deduped.push(bar),
            }
        }
        Self { ticker, bars: deduped }
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&PriceBar> {
        self.bars.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// Highs, with a missing high surfacing as NaN.
    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high.unwrap_or(f64::NAN)).collect()
    }

    /// Lows, with a missing low surfacing as NaN.
    pub fn lows(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.low.unwrap_or(f64::NAN)).collect()
    }

    /// Append the live price as a synthetic bar. The bar is placed at `at`,
    /// or one second after the last bar if `at` is not newer.
    pub fn with_current_price(mut self, price: f64, at: DateTime<Utc>) -> Self {
        let timestamp = match self.bars.last() {
            Some(last) if at <= last.timestamp => last.timestamp + chrono::Duration::seconds(1),
            _ => at,
        };
        self.bars.push(PriceBar::synthetic(timestamp, price));
        self
    }
}

/// Real-time quote snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiveQuote {
    pub current_price: f64,
    pub current_volume: f64,
    /// As reported; 0 when the provider has nothing.
    pub average_volume: f64,
    pub previous_close: Option<f64>,
}

impl LiveQuote {
    /// Average volume floored at 1 so ratios never divide by zero.
    pub fn effective_average_volume(&self) -> f64 {
        self.average_volume.max(1.0)
    }

    /// Percent move versus the previous close, when one is known and positive.
    pub fn day_change_pct(&self) -> Option<f64> {
        match self.previous_close {
            Some(prev) if prev > 0.0 => Some((self.current_price - prev) / prev * 100.0),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Signal result
// ---------------------------------------------------------------------------

/// Outcome of evaluating one ticker. Derived and ephemeral.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalResult {
    /// Parabolic SAR of the most recent bar (NaN when undefined).
    pub sar_level: f64,
    /// `(price - sar) / sar * 100` (NaN when undefined).
    pub sar_percent: f64,
    /// Latest weighted z-score, when enough bars exist.
    pub momentum_score: Option<f64>,
    pub momentum_above_threshold: bool,
    /// `(volume / avg - 1) * 100`.
    pub volume_percent: f64,
    pub price_above_sar: bool,
    pub volume_surge: bool,
    pub breakout: bool,
}

// ---------------------------------------------------------------------------
// Scan state
// ---------------------------------------------------------------------------

/// Process-wide scanning mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    Idle,
    Scanning,
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanState::Idle => write!(f, "idle"),
            ScanState::Scanning => write!(f, "scanning"),
        }
    }
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// A breakout alert ready for delivery.
#[derive(Debug, Clone)]
pub struct Alert {
    pub id: uuid::Uuid,
    pub ticker: Ticker,
    pub message: String,
    pub chart: Chart,
    pub created_at: DateTime<Utc>,
}

/// Rendered chart image.
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub file_name: &'static str,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Market-data failures for a single ticker.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("ticker not found: {0}")]
    NotFound(String),

    #[error("no price data returned for {0}")]
    Empty(String),

    #[error("missing field `{field}` for {ticker}")]
    MissingField { ticker: String, field: &'static str },

    #[error("network error: {0}")]
    Network(String),
}

/// Chart generation failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("chart render failed: {0}")]
pub struct RenderError(pub String);

/// Scheduler computed a non-positive delay.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("clock anomaly: next fire is {delay_ms} ms away")]
pub struct ClockAnomaly {
    pub delay_ms: i64,
}

/// Alert could not be queued for delivery.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HandOffError {
    #[error("notification queue is full")]
    QueueFull,

    #[error("notification dispatcher has stopped")]
    Closed,
}

/// Ticker registry failures.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid ticker symbol: {0:?}")]
    InvalidTicker(String),

    #[error("registry storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Why a single ticker produced no alert this cycle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TickerError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("empty price series for {0}")]
    EmptySeries(String),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    HandOff(#[from] HandOffError),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn bar(secs: i64, close: f64) -> PriceBar {
        PriceBar {
            timestamp: ts(secs),
            open: Some(close),
            high: Some(close + 1.0),
            low: Some(close - 1.0),
            close,
            volume: Some(1000.0),
        }
    }

    #[test]
    fn test_ticker_normalizes() {
        assert_eq!(Ticker::parse(" aapl ").unwrap().as_str(), "AAPL");
        assert_eq!(Ticker::parse("brk.b").unwrap().as_str(), "BRK.B");
        assert_eq!("^gspc".parse::<Ticker>().unwrap().to_string(), "^GSPC");
    }

    #[test]
    fn test_ticker_rejects_garbage() {
        assert!(Ticker::parse("").is_err());
        assert!(Ticker::parse("   ").is_err());
        assert!(Ticker::parse("AB CD").is_err());
        assert!(Ticker::parse("DROP;TABLE").is_err());
        assert!(Ticker::parse(&"A".repeat(33)).is_err());
    }

    #[test]
    fn test_ticker_accepts_option_symbols() {
        assert_eq!(
            Ticker::parse("aapl240119c00150000").unwrap().as_str(),
            "AAPL240119C00150000"
        );
        assert!(Ticker::parse(&"A".repeat(32)).is_ok());
    }

    #[test]
    fn test_ticker_serializes_as_string() {
        let t = Ticker::parse("abc").unwrap();
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"ABC\"");
    }

    #[test]
    fn test_series_sorts_and_dedups() {
        let t = Ticker::parse("ABC").unwrap();
        let series = PriceSeries::new(t, vec![bar(60, 2.0), bar(0, 1.0), bar(60, 3.0)]);
        assert_eq!(series.len(), 2);
        assert_eq!(series.closes(), vec![1.0, 3.0]);
        assert!(series.bars().windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_series_missing_high_low_are_nan() {
        let t = Ticker::parse("ABC").unwrap();
        let series = PriceSeries::new(t, vec![PriceBar::synthetic(ts(0), 5.0)]);
        assert!(series.highs()[0].is_nan());
        assert!(series.lows()[0].is_nan());
    }

    #[test]
    fn test_with_current_price_keeps_order() {
        let t = Ticker::parse("ABC").unwrap();
        let series = PriceSeries::new(t, vec![bar(0, 1.0), bar(60, 2.0)]);

        let later = series.clone().with_current_price(2.5, ts(120));
        assert_eq!(later.last().unwrap().timestamp, ts(120));
        assert_eq!(later.last().unwrap().high, None);

        let stale = series.with_current_price(2.5, ts(30));
        assert_eq!(stale.len(), 3);
        assert_eq!(stale.last().unwrap().timestamp, ts(61));
        assert_eq!(stale.last().unwrap().close, 2.5);
    }

    #[test]
    fn test_effective_average_volume_floor() {
        let mut q = LiveQuote {
            current_price: 10.0,
            current_volume: 500.0,
            average_volume: 0.0,
            previous_close: None,
        };
        assert_eq!(q.effective_average_volume(), 1.0);
        q.average_volume = f64::NAN;
        assert_eq!(q.effective_average_volume(), 1.0);
        q.average_volume = 2500.0;
        assert_eq!(q.effective_average_volume(), 2500.0);
    }

    #[test]
    fn test_day_change_pct() {
        let q = LiveQuote {
            current_price: 110.0,
            current_volume: 0.0,
            average_volume: 1.0,
            previous_close: Some(100.0),
        };
        assert!((q.day_change_pct().unwrap() - 10.0).abs() < 1e-9);

        let no_prev = LiveQuote { previous_close: Some(0.0), ..q };
        assert_eq!(no_prev.day_change_pct(), None);
    }

    #[test]
    fn test_ticker_error_display() {
        let e = TickerError::from(FetchError::NotFound("XYZ".into()));
        assert_eq!(e.to_string(), "ticker not found: XYZ");
        let e = TickerError::EmptySeries("ABC".into());
        assert!(e.to_string().contains("ABC"));
    }
}
