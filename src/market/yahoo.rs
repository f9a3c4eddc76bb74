//! Yahoo Finance chart API client.
//!
//! Uses the public v8 chart endpoint for both history and quotes:
//! `GET {base}/{symbol}?range=1mo&interval=30m`. The quote comes from the
//! chart metadata; average volume is the mean daily volume over the
//! configured quote window.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::MarketData;
use crate::config::MarketDataConfig;
use crate::types::{FetchError, LiveQuote, PriceBar, PriceSeries, Ticker};

// ---------------------------------------------------------------------------
// API response types (Yahoo JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    regular_market_price: Option<f64>,
    #[serde(default)]
    regular_market_volume: Option<f64>,
    #[serde(default)]
    previous_close: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteColumns>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteColumns {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Unwrap the single chart result or classify the failure.
fn into_result(ticker: &Ticker, body: ChartResponse) -> Result<ChartResult, FetchError> {
    if let Some(err) = body.chart.error {
        return Err(if err.code.eq_ignore_ascii_case("Not Found") {
            FetchError::NotFound(ticker.to_string())
        } else {
            FetchError::Network(format!("Yahoo error {}: {}", err.code, err.description))
        });
    }
    body.chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| FetchError::Empty(ticker.to_string()))
}

/// Column-oriented chart data → bars. Rows without a close are dropped.
fn to_series(ticker: &Ticker, result: &ChartResult) -> Result<PriceSeries, FetchError> {
    let timestamps = result.timestamp.as_deref().unwrap_or_default();
    let empty = QuoteColumns::default();
    let cols = result.indicators.quote.first().unwrap_or(&empty);
    let at = |col: &[Option<f64>], i: usize| col.get(i).copied().flatten();

    let bars: Vec<PriceBar> = timestamps
        .iter()
        .enumerate()
        .filter_map(|(i, &ts)| {
            let close = at(&cols.close, i)?;
            let timestamp = Utc.timestamp_opt(ts, 0).single()?;
            Some(PriceBar {
                timestamp,
                open: at(&cols.open, i),
                high: at(&cols.high, i),
                low: at(&cols.low, i),
                close,
                volume: at(&cols.volume, i),
            })
        })
        .collect();

    if bars.is_empty() {
        return Err(FetchError::Empty(ticker.to_string()));
    }
    Ok(PriceSeries::new(ticker.clone(), bars))
}

/// Quote from chart metadata plus daily bars for the volume average.
fn to_quote(ticker: &Ticker, result: &ChartResult) -> Result<LiveQuote, FetchError> {
    let current_price = result
        .meta
        .regular_market_price
        .ok_or_else(|| FetchError::MissingField {
            ticker: ticker.to_string(),
            field: "regularMarketPrice",
        })?;

    let daily = to_series(ticker, result).ok();
    let volumes: Vec<f64> = daily
        .iter()
        .flat_map(|s| s.bars().iter().filter_map(|b| b.volume))
        .collect();
    let average_volume = if volumes.is_empty() {
        0.0
    } else {
        volumes.iter().sum::<f64>() / volumes.len() as f64
    };

    let previous_close = result.meta.previous_close.or_else(|| {
        let closes = daily.as_ref()?.closes();
        closes.len().checked_sub(2).map(|i| closes[i])
    });

    Ok(LiveQuote {
        current_price,
        current_volume: result.meta.regular_market_volume.unwrap_or(0.0),
        average_volume,
        previous_close,
    })
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct YahooClient {
    http: Client,
    base_url: String,
    quote_range: String,
}

impl YahooClient {
    pub fn new(config: &MarketDataConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36")
            .build()
            .context("Failed to build HTTP client for Yahoo Finance")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            quote_range: config.quote_range.clone(),
        })
    }

    async fn chart(&self, ticker: &Ticker, range: &str, interval: &str) -> Result<ChartResult, FetchError> {
        // Yahoo uses hyphens for share classes (BRK-B, not BRK.B).
        let symbol = ticker.as_str().replace('.', "-");
        let url = format!(
            "{}/{}?range={}&interval={}&includePrePost=false",
            self.base_url,
            urlencoding::encode(&symbol),
            urlencoding::encode(range),
            urlencoding::encode(interval),
        );

        debug!(url = %url, "Fetching Yahoo chart");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(ticker.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Network(format!("Yahoo API error {status}")));
        }

        let body: ChartResponse = resp
            .json()
            .await
            .map_err(|e| FetchError::Network(format!("Failed to parse Yahoo response: {e}")))?;

        into_result(ticker, body)
    }
}

#[async_trait]
impl MarketData for YahooClient {
    async fn fetch_history(
        &self,
        ticker: &Ticker,
        range: &str,
        interval: &str,
    ) -> Result<PriceSeries, FetchError> {
        let result = self.chart(ticker, range, interval).await?;
        to_series(ticker, &result)
    }

    async fn fetch_quote(&self, ticker: &Ticker) -> Result<LiveQuote, FetchError> {
        let result = self.chart(ticker, &self.quote_range, "1d").await?;
        to_quote(ticker, &result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
