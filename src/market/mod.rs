//! Market data integrations.
//!
//! Defines the `MarketData` trait consumed by the scan cycle and provides
//! the Yahoo Finance implementation.

pub mod yahoo;

use async_trait::async_trait;

use crate::types::{FetchError, LiveQuote, PriceSeries, Ticker};

/// Abstraction over a remote OHLCV + quote provider.
///
/// Calls are fallible and may be slow; the scan cycle treats every failure
/// as "skip this ticker for this cycle".
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Historical bars over `range` (e.g. "1mo") at `interval` (e.g. "30m").
    async fn fetch_history(
        &self,
        ticker: &Ticker,
        range: &str,
        interval: &str,
    ) -> Result<PriceSeries, FetchError>;

    /// Current price/volume snapshot.
    async fn fetch_quote(&self, ticker: &Ticker) -> Result<LiveQuote, FetchError>;
}
