//! Signal engine: decides whether a ticker is breaking out.
//!
//! A breakout needs all three of:
//! 1. live price above the Parabolic SAR of the latest bar, with the SAR in
//!    a rising (long) regime;
//! 2. live volume at least `volume_multiplier` × average volume;
//! 3. weighted rolling z-score of closes strictly above `momentum_threshold`.
//!
//! Evaluation is pure: no I/O, no clock, same inputs → same output.

pub mod momentum;
pub mod sar;

use serde::Deserialize;

use crate::types::{LiveQuote, PriceSeries, SignalResult};
use sar::Trend;

// ---------------------------------------------------------------------------
// Configuration (defaults, overridden by config.toml at runtime)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// SAR acceleration step (also the initial factor).
    pub sar_step: f64,
    /// SAR acceleration cap.
    pub sar_max: f64,
    /// Rolling window for close mean/stdev.
    pub zscore_window: usize,
    /// WMA length applied to the z-scores.
    pub wma_period: usize,
    pub momentum_threshold: f64,
    pub volume_multiplier: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            sar_step: 0.02,
            sar_max: 0.2,
            zscore_window: 10,
            wma_period: 10,
            momentum_threshold: 1.18,
            volume_multiplier: 1.5,
        }
    }
}

impl SignalConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.sar_step > 0.0 && self.sar_max >= self.sar_step) {
            anyhow::bail!("signal.sar_step must be > 0 and <= signal.sar_max");
        }
        if self.zscore_window < 2 {
            anyhow::bail!("signal.zscore_window must be at least 2");
        }
        if self.wma_period == 0 {
            anyhow::bail!("signal.wma_period must be at least 1");
        }
        if !self.momentum_threshold.is_finite() || !self.volume_multiplier.is_finite() {
            anyhow::bail!("signal thresholds must be finite");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct SignalEngine {
    config: SignalConfig,
}

impl Default for SignalEngine {
    fn default() -> Self {
        Self::new(SignalConfig::default())
    }
}

impl SignalEngine {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    /// Evaluate one ticker's history against its live quote.
    ///
    /// Too little history, non-finite inputs, or a zero SAR level never
    /// panic; they simply yield `breakout = false`.
    pub fn evaluate(&self, series: &PriceSeries, quote: &LiveQuote) -> SignalResult {
        let cfg = &self.config;
        let closes = series.closes();

        let sar = sar::latest_sar(
            &series.highs(),
            &series.lows(),
            &closes,
            cfg.sar_step,
            cfg.sar_max,
        );
        let sar_level = sar.map(|p| p.value).unwrap_or(f64::NAN);
        let sar_percent = percent_above(quote.current_price, sar_level).unwrap_or(f64::NAN);
        let price_above_sar = matches!(sar, Some(p) if p.trend == Trend::Rising)
            && sar_percent.is_finite()
            && quote.current_price > sar_level;

        let avg_volume = quote.effective_average_volume();
        let volume_percent = (quote.current_volume / avg_volume - 1.0) * 100.0;
        let volume_surge = volume_percent.is_finite()
            && quote.current_volume >= cfg.volume_multiplier * avg_volume;

        let momentum_score =
            momentum::latest_weighted_zscore(&closes, cfg.zscore_window, cfg.wma_period);
        let momentum_above_threshold =
            matches!(momentum_score, Some(z) if z > cfg.momentum_threshold);

        SignalResult {
            sar_level,
            sar_percent,
            momentum_score,
            momentum_above_threshold,
            volume_percent,
            price_above_sar,
            volume_surge,
            breakout: price_above_sar && volume_surge && momentum_above_threshold,
        }
    }
}

/// `(value - level) / level * 100`, or `None` for a zero or non-finite level.
fn percent_above(value: f64, level: f64) -> Option<f64> {
    if level == 0.0 || !level.is_finite() || !value.is_finite() {
        return None;
    }
    Some((value - level) / level * 100.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
